use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Admin-authored notice shown to every signed-in resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    pub posted_at: DateTime<Utc>,
}

/// Storage seam for announcements.
pub trait AnnouncementRepository: Send + Sync {
    fn insert(&self, announcement: Announcement) -> Result<Announcement, StoreError>;
    fn remove(&self, id: &str) -> Result<(), StoreError>;
    fn all(&self) -> Result<Vec<Announcement>, StoreError>;
}

/// New-announcement payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnouncementDraft {
    pub title: String,
    pub content: String,
}

static ANNOUNCEMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_announcement_id() -> String {
    let id = ANNOUNCEMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("ann-{id:04}")
}

#[derive(Clone)]
pub struct AnnouncementBoard {
    announcements: Arc<dyn AnnouncementRepository>,
}

impl AnnouncementBoard {
    pub fn new(announcements: Arc<dyn AnnouncementRepository>) -> Self {
        Self { announcements }
    }

    pub fn post(&self, draft: AnnouncementDraft) -> Result<Announcement, StoreError> {
        self.announcements.insert(Announcement {
            id: next_announcement_id(),
            title: draft.title,
            content: draft.content,
            posted_at: Utc::now(),
        })
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.announcements.remove(id)
    }

    /// Newest first.
    pub fn list(&self) -> Result<Vec<Announcement>, StoreError> {
        let mut all = self.announcements.all()?;
        all.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
        Ok(all)
    }
}
