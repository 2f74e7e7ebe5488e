use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::inventory::ApartmentId;
use super::StoreError;
use crate::auth::Role;

/// Account record: source of truth for authorization checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apartment_id: Option<ApartmentId>,
}

impl UserRecord {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role: Role::User,
            apartment_id: None,
        }
    }
}

/// Append-only trace of role mutations so transitions stay reconstructable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangeEvent {
    pub email: String,
    pub previous: Role,
    pub new: Role,
    pub changed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_apartment: Option<ApartmentId>,
}

/// Storage seam for user records.
pub trait UserRepository: Send + Sync {
    fn insert(&self, record: UserRecord) -> Result<UserRecord, StoreError>;
    fn fetch(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    fn update(&self, record: UserRecord) -> Result<(), StoreError>;
    fn count_by_role(&self, role: Role) -> Result<u64, StoreError>;
}

/// Sink for role-change events.
pub trait RoleAuditLog: Send + Sync {
    fn append(&self, event: RoleChangeEvent) -> Result<(), StoreError>;
}

/// Registration and lookup over the identity store.
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserRepository>,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    /// Idempotent first-sign-in registration. An existing record wins; a new
    /// account starts with role `user` and no apartment.
    pub fn register(&self, email: &str) -> Result<UserRecord, StoreError> {
        if let Some(existing) = self.users.fetch(email)? {
            return Ok(existing);
        }
        match self.users.insert(UserRecord::new(email)) {
            Ok(record) => Ok(record),
            // Lost a race with a concurrent registration; the stored record
            // is the answer either way.
            Err(StoreError::Conflict) => self
                .users
                .fetch(email)?
                .ok_or(StoreError::NotFound),
            Err(other) => Err(other),
        }
    }

    pub fn fetch(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.users.fetch(email)
    }

    pub fn role_of(&self, email: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.users.fetch(email)?.map(|record| record.role))
    }
}
