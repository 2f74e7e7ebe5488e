use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::UserRepository;
use super::inventory::{ApartmentId, ApartmentRepository, BookingStatus};
use super::StoreError;
use crate::auth::Role;

/// Identifier wrapper for membership requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

/// Lifecycle of a request: `pending` until an admin decides it, then frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// A user's ask to occupy an apartment, subject to admin approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApartmentRequest {
    pub id: RequestId,
    pub email: String,
    pub apartment_id: ApartmentId,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
}

/// Storage seam for the request workflow.
pub trait RequestRepository: Send + Sync {
    fn insert(&self, request: ApartmentRequest) -> Result<ApartmentRequest, StoreError>;
    fn fetch(&self, id: &RequestId) -> Result<Option<ApartmentRequest>, StoreError>;
    fn update(&self, request: ApartmentRequest) -> Result<(), StoreError>;
    /// The caller's pending request, if any. One pending request per user is
    /// the enforced invariant.
    fn pending_for(&self, email: &str) -> Result<Option<ApartmentRequest>, StoreError>;
    fn pending(&self) -> Result<Vec<ApartmentRequest>, StoreError>;
}

/// Submission payload: the requester names themselves and a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub email: String,
    pub apartment_id: ApartmentId,
}

/// Closed set of submission outcomes so callers branch on variants instead
/// of message strings.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("already a member")]
    AlreadyMember,
    #[error("already requested")]
    AlreadyRequested,
    #[error("forbidden access")]
    Forbidden,
    #[error("apartment not found")]
    ApartmentNotFound,
    #[error("apartment unavailable")]
    ApartmentUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum DecideError {
    #[error("request not found")]
    NotFound,
    #[error("request already decided")]
    AlreadyDecided,
    #[error("pending is not a decision")]
    NotADecision,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The request/allocation workflow's first half: intake and admin decision.
/// Accepting a request records the decision only; allocation is a separate
/// follow-up command (see `MembershipService::allocate`).
#[derive(Clone)]
pub struct RequestService {
    requests: Arc<dyn RequestRepository>,
    apartments: Arc<dyn ApartmentRepository>,
    users: Arc<dyn UserRepository>,
}

impl RequestService {
    pub fn new(
        requests: Arc<dyn RequestRepository>,
        apartments: Arc<dyn ApartmentRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            requests,
            apartments,
            users,
        }
    }

    /// Submit a request on the caller's own behalf. On success a `pending`
    /// request exists and nothing else has changed.
    pub fn submit(
        &self,
        caller: &str,
        submission: SubmitRequest,
    ) -> Result<ApartmentRequest, SubmitError> {
        if caller != submission.email {
            return Err(SubmitError::Forbidden);
        }

        let user = self
            .users
            .fetch(&submission.email)?
            .ok_or(SubmitError::Forbidden)?;
        if user.role != Role::User {
            return Err(SubmitError::AlreadyMember);
        }

        if self.requests.pending_for(&submission.email)?.is_some() {
            return Err(SubmitError::AlreadyRequested);
        }

        let apartment = self
            .apartments
            .fetch(&submission.apartment_id)?
            .ok_or(SubmitError::ApartmentNotFound)?;
        if apartment.booking_status != BookingStatus::Available {
            return Err(SubmitError::ApartmentUnavailable);
        }

        let request = ApartmentRequest {
            id: next_request_id(),
            email: submission.email,
            apartment_id: submission.apartment_id,
            status: RequestStatus::Pending,
            requested_at: Utc::now(),
        };
        let stored = self.requests.insert(request)?;
        Ok(stored)
    }

    /// Record an admin decision exactly once. Retrying the identical
    /// decision returns the stored record; a conflicting one fails.
    pub fn decide(
        &self,
        id: &RequestId,
        decision: RequestStatus,
    ) -> Result<ApartmentRequest, DecideError> {
        if decision == RequestStatus::Pending {
            return Err(DecideError::NotADecision);
        }

        let mut request = self.requests.fetch(id)?.ok_or(DecideError::NotFound)?;
        match request.status {
            RequestStatus::Pending => {
                request.status = decision;
                self.requests.update(request.clone())?;
                Ok(request)
            }
            current if current == decision => Ok(request),
            _ => Err(DecideError::AlreadyDecided),
        }
    }

    /// Pending queue for the admin review screen.
    pub fn pending(&self) -> Result<Vec<ApartmentRequest>, StoreError> {
        self.requests.pending()
    }
}
