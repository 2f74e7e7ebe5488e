use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{RoleAuditLog, RoleChangeEvent, UserRepository};
use super::inventory::{ApartmentId, ApartmentRepository, BookingStatus};
use super::StoreError;
use crate::auth::Role;

/// Durable assignment of one apartment to one member, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub email: String,
    pub apartment_id: ApartmentId,
    pub allocated_at: DateTime<Utc>,
}

/// Storage seam for allocation records.
pub trait AllocationRepository: Send + Sync {
    fn insert(&self, record: AllocationRecord) -> Result<AllocationRecord, StoreError>;
    fn fetch(&self, email: &str) -> Result<Option<AllocationRecord>, StoreError>;
    fn remove(&self, email: &str) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AllocateError {
    #[error("apartment not found")]
    ApartmentNotFound,
    #[error("member already holds a different apartment")]
    AlreadyAllocated,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Admin payload for a role transition, optionally releasing the member's
/// apartment on the way down.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleUpdate {
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub apartment_id: Option<ApartmentId>,
    #[serde(default)]
    pub delete_apartment: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RoleUpdateError {
    #[error("user not found")]
    UserNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Second half of the request/allocation workflow: materializing an accepted
/// request into an allocation, and admin-driven role transitions.
#[derive(Clone)]
pub struct MembershipService {
    users: Arc<dyn UserRepository>,
    apartments: Arc<dyn ApartmentRepository>,
    allocations: Arc<dyn AllocationRepository>,
    audit: Arc<dyn RoleAuditLog>,
}

impl MembershipService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        apartments: Arc<dyn ApartmentRepository>,
        allocations: Arc<dyn AllocationRepository>,
        audit: Arc<dyn RoleAuditLog>,
    ) -> Self {
        Self {
            users,
            apartments,
            allocations,
            audit,
        }
    }

    /// Record the allocation for an accepted request and take the apartment
    /// off the market. Retrying the identical pair is a no-op returning the
    /// stored record.
    pub fn allocate(
        &self,
        email: &str,
        apartment_id: &ApartmentId,
    ) -> Result<AllocationRecord, AllocateError> {
        if let Some(existing) = self.allocations.fetch(email)? {
            if existing.apartment_id == *apartment_id {
                return Ok(existing);
            }
            return Err(AllocateError::AlreadyAllocated);
        }

        let mut apartment = self
            .apartments
            .fetch(apartment_id)?
            .ok_or(AllocateError::ApartmentNotFound)?;

        let record = self.allocations.insert(AllocationRecord {
            email: email.to_string(),
            apartment_id: apartment_id.clone(),
            allocated_at: Utc::now(),
        })?;

        apartment.booking_status = BookingStatus::Unavailable;
        self.apartments.update(apartment)?;

        Ok(record)
    }

    /// Apply an admin role transition. With `delete_apartment` set, the
    /// previously allocated apartment is looked up from the stored user
    /// record and freed before that record is rewritten; reversing the order
    /// would lose the apartment id along with the old record.
    pub fn update_role(&self, update: RoleUpdate) -> Result<UserRecordView, RoleUpdateError> {
        let mut user = self
            .users
            .fetch(&update.email)?
            .ok_or(RoleUpdateError::UserNotFound)?;
        let previous_role = user.role;

        let mut released = None;
        if update.delete_apartment {
            if let Some(held) = user.apartment_id.clone() {
                self.allocations.remove(&update.email)?;
                if let Some(mut apartment) = self.apartments.fetch(&held)? {
                    apartment.booking_status = BookingStatus::Available;
                    self.apartments.update(apartment)?;
                }
                released = Some(held);
            }
        }

        user.role = update.role;
        user.apartment_id = if update.delete_apartment {
            None
        } else {
            update.apartment_id.or(user.apartment_id)
        };
        self.users.update(user.clone())?;

        self.audit.append(RoleChangeEvent {
            email: user.email.clone(),
            previous: previous_role,
            new: user.role,
            changed_at: Utc::now(),
            released_apartment: released.clone(),
        })?;

        Ok(UserRecordView {
            email: user.email,
            role: user.role,
            apartment_id: user.apartment_id,
            released_apartment: released,
        })
    }

    /// The member's own allocation, for the "my apartment" screen.
    pub fn my_apartment(&self, email: &str) -> Result<Option<AllocationRecord>, StoreError> {
        self.allocations.fetch(email)
    }
}

/// Role-transition response: the rewritten record plus what was freed.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecordView {
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apartment_id: Option<ApartmentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub released_apartment: Option<ApartmentId>,
}
