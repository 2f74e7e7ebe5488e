use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::auth::{AuthError, Identity, IssuedToken, Role, TokenService};
use crate::rental::announcements::AnnouncementBoard;
use crate::rental::billing::{
    BillingService, ChargeAuthorization, ChargeError, ChargeGateway, Coupon, CouponRepository,
    CouponValidity, PaymentLedger, PaymentRecord,
};
use crate::rental::identity::{
    RoleAuditLog, RoleChangeEvent, UserDirectory, UserRecord, UserRepository,
};
use crate::rental::inventory::{
    Apartment, ApartmentId, ApartmentRepository, BookingStatus, InventoryService,
};
use crate::rental::membership::{AllocationRecord, AllocationRepository, MembershipService};
use crate::rental::requests::{ApartmentRequest, RequestId, RequestRepository, RequestService, RequestStatus};
use crate::rental::router::{rental_router, ApiContext};
use crate::rental::{Announcement, AnnouncementRepository, StoreError};

#[derive(Default, Clone)]
pub(super) struct MemoryUsers {
    records: Arc<Mutex<HashMap<String, UserRecord>>>,
}

impl UserRepository for MemoryUsers {
    fn insert(&self, record: UserRecord) -> Result<UserRecord, StoreError> {
        let mut guard = self.records.lock().expect("user mutex poisoned");
        if guard.contains_key(&record.email) {
            return Err(StoreError::Conflict);
        }
        guard.insert(record.email.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let guard = self.records.lock().expect("user mutex poisoned");
        Ok(guard.get(email).cloned())
    }

    fn update(&self, record: UserRecord) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("user mutex poisoned");
        if !guard.contains_key(&record.email) {
            return Err(StoreError::NotFound);
        }
        guard.insert(record.email.clone(), record);
        Ok(())
    }

    fn count_by_role(&self, role: Role) -> Result<u64, StoreError> {
        let guard = self.records.lock().expect("user mutex poisoned");
        Ok(guard.values().filter(|record| record.role == role).count() as u64)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAudit {
    events: Arc<Mutex<Vec<RoleChangeEvent>>>,
}

impl MemoryAudit {
    pub(super) fn events(&self) -> Vec<RoleChangeEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}

impl RoleAuditLog for MemoryAudit {
    fn append(&self, event: RoleChangeEvent) -> Result<(), StoreError> {
        self.events
            .lock()
            .expect("audit mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryApartments {
    records: Arc<Mutex<HashMap<ApartmentId, Apartment>>>,
}

impl ApartmentRepository for MemoryApartments {
    fn insert(&self, apartment: Apartment) -> Result<Apartment, StoreError> {
        let mut guard = self.records.lock().expect("apartment mutex poisoned");
        if guard.contains_key(&apartment.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(apartment.id.clone(), apartment.clone());
        Ok(apartment)
    }

    fn fetch(&self, id: &ApartmentId) -> Result<Option<Apartment>, StoreError> {
        let guard = self.records.lock().expect("apartment mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, apartment: Apartment) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("apartment mutex poisoned");
        if !guard.contains_key(&apartment.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(apartment.id.clone(), apartment);
        Ok(())
    }

    fn all(&self) -> Result<Vec<Apartment>, StoreError> {
        let guard = self.records.lock().expect("apartment mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRequests {
    records: Arc<Mutex<HashMap<RequestId, ApartmentRequest>>>,
}

impl RequestRepository for MemoryRequests {
    fn insert(&self, request: ApartmentRequest) -> Result<ApartmentRequest, StoreError> {
        let mut guard = self.records.lock().expect("request mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<ApartmentRequest>, StoreError> {
        let guard = self.records.lock().expect("request mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(&self, request: ApartmentRequest) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("request mutex poisoned");
        if !guard.contains_key(&request.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(request.id.clone(), request);
        Ok(())
    }

    fn pending_for(&self, email: &str) -> Result<Option<ApartmentRequest>, StoreError> {
        let guard = self.records.lock().expect("request mutex poisoned");
        Ok(guard
            .values()
            .find(|request| request.email == email && request.status == RequestStatus::Pending)
            .cloned())
    }

    fn pending(&self) -> Result<Vec<ApartmentRequest>, StoreError> {
        let guard = self.records.lock().expect("request mutex poisoned");
        let mut pending: Vec<ApartmentRequest> = guard
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(pending)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAllocations {
    records: Arc<Mutex<HashMap<String, AllocationRecord>>>,
}

impl AllocationRepository for MemoryAllocations {
    fn insert(&self, record: AllocationRecord) -> Result<AllocationRecord, StoreError> {
        let mut guard = self.records.lock().expect("allocation mutex poisoned");
        if guard.contains_key(&record.email) {
            return Err(StoreError::Conflict);
        }
        guard.insert(record.email.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, email: &str) -> Result<Option<AllocationRecord>, StoreError> {
        let guard = self.records.lock().expect("allocation mutex poisoned");
        Ok(guard.get(email).cloned())
    }

    fn remove(&self, email: &str) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("allocation mutex poisoned");
        guard.remove(email).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryCoupons {
    records: Arc<Mutex<HashMap<String, Coupon>>>,
}

impl CouponRepository for MemoryCoupons {
    fn insert(&self, coupon: Coupon) -> Result<Coupon, StoreError> {
        let mut guard = self.records.lock().expect("coupon mutex poisoned");
        if guard.contains_key(&coupon.code) {
            return Err(StoreError::Conflict);
        }
        guard.insert(coupon.code.clone(), coupon.clone());
        Ok(coupon)
    }

    fn fetch(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let guard = self.records.lock().expect("coupon mutex poisoned");
        Ok(guard.get(code).cloned())
    }

    fn update(&self, coupon: Coupon) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("coupon mutex poisoned");
        if !guard.contains_key(&coupon.code) {
            return Err(StoreError::NotFound);
        }
        guard.insert(coupon.code.clone(), coupon);
        Ok(())
    }

    fn remove(&self, code: &str) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("coupon mutex poisoned");
        guard.remove(code).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn all(&self) -> Result<Vec<Coupon>, StoreError> {
        let guard = self.records.lock().expect("coupon mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryLedger {
    records: Arc<Mutex<Vec<PaymentRecord>>>,
}

impl PaymentLedger for MemoryLedger {
    fn append(&self, record: PaymentRecord) -> Result<PaymentRecord, StoreError> {
        self.records
            .lock()
            .expect("ledger mutex poisoned")
            .push(record.clone());
        Ok(record)
    }

    fn history(&self, email: &str) -> Result<Vec<PaymentRecord>, StoreError> {
        let guard = self.records.lock().expect("ledger mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| record.email == email)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAnnouncements {
    records: Arc<Mutex<HashMap<String, Announcement>>>,
}

impl AnnouncementRepository for MemoryAnnouncements {
    fn insert(&self, announcement: Announcement) -> Result<Announcement, StoreError> {
        let mut guard = self.records.lock().expect("announcement mutex poisoned");
        guard.insert(announcement.id.clone(), announcement.clone());
        Ok(announcement)
    }

    fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("announcement mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    fn all(&self) -> Result<Vec<Announcement>, StoreError> {
        let guard = self.records.lock().expect("announcement mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

/// Token backend that hands out revocable opaque tokens.
#[derive(Default, Clone)]
pub(super) struct MemoryTokens {
    sessions: Arc<Mutex<HashMap<String, String>>>,
}

impl TokenService for MemoryTokens {
    fn issue(&self, email: &str) -> Result<IssuedToken, AuthError> {
        let token = format!("tok-{email}");
        self.sessions
            .lock()
            .expect("token mutex poisoned")
            .insert(token.clone(), email.to_string());
        Ok(IssuedToken { token })
    }

    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let guard = self.sessions.lock().expect("token mutex poisoned");
        guard
            .get(token)
            .map(|email| Identity {
                email: email.clone(),
            })
            .ok_or(AuthError::Unauthorized)
    }

    fn revoke(&self, token: &str) -> Result<(), AuthError> {
        self.sessions
            .lock()
            .expect("token mutex poisoned")
            .remove(token);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(super) struct StaticGateway;

impl ChargeGateway for StaticGateway {
    fn authorize(&self, amount_minor: u64) -> Result<ChargeAuthorization, ChargeError> {
        Ok(ChargeAuthorization {
            client_secret: format!("pi_test_{amount_minor}"),
            amount_minor,
        })
    }
}

pub(super) struct OfflineGateway;

impl ChargeGateway for OfflineGateway {
    fn authorize(&self, _amount_minor: u64) -> Result<ChargeAuthorization, ChargeError> {
        Err(ChargeError::Unavailable("processor offline".to_string()))
    }
}

/// All in-memory stores bundled so individual tests can reach behind the
/// services they exercise.
pub(super) struct Stores {
    pub(super) users: Arc<MemoryUsers>,
    pub(super) audit: Arc<MemoryAudit>,
    pub(super) apartments: Arc<MemoryApartments>,
    pub(super) requests: Arc<MemoryRequests>,
    pub(super) allocations: Arc<MemoryAllocations>,
    pub(super) coupons: Arc<MemoryCoupons>,
    pub(super) ledger: Arc<MemoryLedger>,
    pub(super) announcements: Arc<MemoryAnnouncements>,
    pub(super) tokens: Arc<MemoryTokens>,
}

impl Default for Stores {
    fn default() -> Self {
        Self {
            users: Arc::new(MemoryUsers::default()),
            audit: Arc::new(MemoryAudit::default()),
            apartments: Arc::new(MemoryApartments::default()),
            requests: Arc::new(MemoryRequests::default()),
            allocations: Arc::new(MemoryAllocations::default()),
            coupons: Arc::new(MemoryCoupons::default()),
            ledger: Arc::new(MemoryLedger::default()),
            announcements: Arc::new(MemoryAnnouncements::default()),
            tokens: Arc::new(MemoryTokens::default()),
        }
    }
}

impl Stores {
    pub(super) fn directory(&self) -> UserDirectory {
        UserDirectory::new(self.users.clone())
    }

    pub(super) fn inventory(&self) -> InventoryService {
        InventoryService::new(self.apartments.clone(), self.users.clone())
    }

    pub(super) fn request_service(&self) -> RequestService {
        RequestService::new(
            self.requests.clone(),
            self.apartments.clone(),
            self.users.clone(),
        )
    }

    pub(super) fn membership(&self) -> MembershipService {
        MembershipService::new(
            self.users.clone(),
            self.apartments.clone(),
            self.allocations.clone(),
            self.audit.clone(),
        )
    }

    pub(super) fn billing(&self) -> BillingService {
        BillingService::new(
            self.coupons.clone(),
            self.ledger.clone(),
            Arc::new(StaticGateway),
        )
    }

    pub(super) fn context(&self) -> Arc<ApiContext> {
        Arc::new(ApiContext {
            tokens: self.tokens.clone(),
            directory: self.directory(),
            inventory: self.inventory(),
            requests: self.request_service(),
            membership: self.membership(),
            billing: self.billing(),
            announcements: AnnouncementBoard::new(self.announcements.clone()),
        })
    }

    pub(super) fn router(&self) -> axum::Router {
        rental_router(self.context())
    }

    pub(super) fn seed_apartment(&self, id: &str, rent: u32, status: BookingStatus) {
        self.apartments
            .insert(Apartment {
                id: ApartmentId(id.to_string()),
                rent,
                booking_status: status,
            })
            .expect("seed apartment");
    }

    pub(super) fn seed_user(&self, email: &str, role: Role) {
        let mut record = UserRecord::new(email);
        record.role = role;
        self.users.insert(record).expect("seed user");
    }

    pub(super) fn seed_coupon(&self, code: &str, percent: u8, validity: CouponValidity) {
        self.coupons
            .insert(Coupon {
                code: code.to_string(),
                discount_percent: percent,
                validity,
                description: String::new(),
            })
            .expect("seed coupon");
    }

    /// Issue a bearer token for an already-seeded account.
    pub(super) fn token_for(&self, email: &str) -> String {
        self.tokens.issue(email).expect("token issued").token
    }
}

pub(super) async fn read_json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
