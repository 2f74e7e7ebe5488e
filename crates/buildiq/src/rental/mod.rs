//! Apartment-rental domain: inventory, membership requests, allocations,
//! billing, and announcements.
//!
//! Each submodule pairs a small domain model with a repository trait so the
//! services can be exercised against in-memory stores in tests and against a
//! durable document store in production.

pub mod announcements;
pub mod billing;
pub mod identity;
pub mod inventory;
pub mod membership;
pub mod requests;
pub mod router;

#[cfg(test)]
mod tests;

pub use announcements::{Announcement, AnnouncementBoard, AnnouncementDraft, AnnouncementRepository};
pub use billing::{
    BillingService, ChargeAuthorization, ChargeError, ChargeGateway, Coupon, CouponError,
    CouponRepository, CouponValidity, PaymentLedger, PaymentRecord, PaymentSubmission, QuoteError,
    QuoteRequest,
};
pub use identity::{RoleAuditLog, RoleChangeEvent, UserDirectory, UserRecord, UserRepository};
pub use inventory::{
    Apartment, ApartmentId, ApartmentRepository, BookingStatus, InventoryService, ListingError,
    ListingPage, ListingQuery, Statistics,
};
pub use membership::{
    AllocateError, AllocationRecord, AllocationRepository, MembershipService, RoleUpdate,
    RoleUpdateError, UserRecordView,
};
pub use requests::{
    ApartmentRequest, DecideError, RequestId, RequestRepository, RequestService, RequestStatus,
    SubmitError, SubmitRequest,
};
pub use router::{rental_router, ApiContext};

/// Error enumeration shared by every store seam. Mirrors what a document
/// database driver can actually tell us: a uniqueness clash, a missing
/// document, or an unreachable backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
