use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use buildiq::auth::{AuthError, Identity, IssuedToken, Role, TokenService};
use buildiq::config::AuthConfig;
use buildiq::rental::{
    Announcement, AnnouncementBoard, AnnouncementRepository, Apartment, ApartmentId,
    ApartmentRepository, ApartmentRequest, ApiContext, AllocationRecord, AllocationRepository,
    BillingService, BookingStatus, ChargeAuthorization, ChargeError, ChargeGateway, Coupon,
    CouponRepository, CouponValidity, InventoryService, MembershipService, PaymentLedger,
    PaymentRecord, RequestId, RequestRepository, RequestService, RequestStatus, RoleAuditLog,
    RoleChangeEvent, StoreError, UserDirectory, UserRecord, UserRepository,
};
use chrono::{DateTime, Duration, Utc};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryUsers {
    records: Arc<Mutex<HashMap<String, UserRecord>>>,
}

impl UserRepository for InMemoryUsers {
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
pub(crate) struct InMemoryRoleAudit {
    events: Arc<Mutex<Vec<RoleChangeEvent>>>,
}

impl InMemoryRoleAudit {
    pub(crate) fn events(&self) -> Vec<RoleChangeEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }
}

impl RoleAuditLog for InMemoryRoleAudit {
    fn append(&self, event: RoleChangeEvent) -> Result<(), StoreError> {
        self.events
            .lock()
            .expect("audit mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApartments {
    records: Arc<Mutex<HashMap<ApartmentId, Apartment>>>,
}

impl ApartmentRepository for InMemoryApartments {
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
pub(crate) struct InMemoryRequests {
    records: Arc<Mutex<HashMap<RequestId, ApartmentRequest>>>,
}

impl RequestRepository for InMemoryRequests {
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
pub(crate) struct InMemoryAllocations {
    records: Arc<Mutex<HashMap<String, AllocationRecord>>>,
}

impl AllocationRepository for InMemoryAllocations {
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
pub(crate) struct InMemoryCoupons {
    records: Arc<Mutex<HashMap<String, Coupon>>>,
}

impl CouponRepository for InMemoryCoupons {
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
pub(crate) struct InMemoryLedger {
    records: Arc<Mutex<Vec<PaymentRecord>>>,
}

impl PaymentLedger for InMemoryLedger {
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
pub(crate) struct InMemoryAnnouncements {
    records: Arc<Mutex<HashMap<String, Announcement>>>,
}

impl AnnouncementRepository for InMemoryAnnouncements {
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

struct Session {
    email: String,
    expires_at: DateTime<Utc>,
}

/// Opaque revocable bearer tokens with a fixed time-to-live.
pub(crate) struct SessionTokenService {
    ttl: Duration,
    sequence: AtomicU64,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionTokenService {
    pub(crate) fn new(config: &AuthConfig) -> Self {
        Self {
            ttl: Duration::hours(config.token_ttl_hours),
            sequence: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

impl TokenService for SessionTokenService {
    fn issue(&self, email: &str) -> Result<IssuedToken, AuthError> {
        let serial = self.sequence.fetch_add(1, Ordering::Relaxed);
        let token = format!("biq-{serial:012x}");
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        guard.insert(
            token.clone(),
            Session {
                email: email.to_string(),
                expires_at: Utc::now() + self.ttl,
            },
        );
        Ok(IssuedToken { token })
    }

    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut guard = self.sessions.lock().expect("session mutex poisoned");
        match guard.get(token) {
            Some(session) if session.expires_at > Utc::now() => Ok(Identity {
                email: session.email.clone(),
            }),
            Some(_) => {
                // Expired sessions are pruned on contact.
                guard.remove(token);
                Err(AuthError::Unauthorized)
            }
            None => Err(AuthError::Unauthorized),
        }
    }

    fn revoke(&self, token: &str) -> Result<(), AuthError> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .remove(token);
        Ok(())
    }
}

/// Stand-in for the card processor: authorizes every amount it is asked to.
#[derive(Default)]
pub(crate) struct StaticChargeGateway {
    sequence: AtomicU64,
}

impl ChargeGateway for StaticChargeGateway {
    fn authorize(&self, amount_minor: u64) -> Result<ChargeAuthorization, ChargeError> {
        let serial = self.sequence.fetch_add(1, Ordering::Relaxed);
        Ok(ChargeAuthorization {
            client_secret: format!("pi_{serial:08}_secret_{amount_minor}"),
            amount_minor,
        })
    }
}

/// The full adapter set backing one service instance.
pub(crate) struct Adapters {
    pub(crate) users: Arc<InMemoryUsers>,
    pub(crate) audit: Arc<InMemoryRoleAudit>,
    pub(crate) apartments: Arc<InMemoryApartments>,
    pub(crate) requests: Arc<InMemoryRequests>,
    pub(crate) allocations: Arc<InMemoryAllocations>,
    pub(crate) coupons: Arc<InMemoryCoupons>,
    pub(crate) ledger: Arc<InMemoryLedger>,
    pub(crate) announcements: Arc<InMemoryAnnouncements>,
    pub(crate) tokens: Arc<SessionTokenService>,
}

impl Adapters {
    pub(crate) fn new(auth: &AuthConfig) -> Self {
        Self {
            users: Arc::new(InMemoryUsers::default()),
            audit: Arc::new(InMemoryRoleAudit::default()),
            apartments: Arc::new(InMemoryApartments::default()),
            requests: Arc::new(InMemoryRequests::default()),
            allocations: Arc::new(InMemoryAllocations::default()),
            coupons: Arc::new(InMemoryCoupons::default()),
            ledger: Arc::new(InMemoryLedger::default()),
            announcements: Arc::new(InMemoryAnnouncements::default()),
            tokens: Arc::new(SessionTokenService::new(auth)),
        }
    }

    pub(crate) fn context(&self) -> Arc<ApiContext> {
        Arc::new(ApiContext {
            tokens: self.tokens.clone(),
            directory: UserDirectory::new(self.users.clone()),
            inventory: InventoryService::new(self.apartments.clone(), self.users.clone()),
            requests: RequestService::new(
                self.requests.clone(),
                self.apartments.clone(),
                self.users.clone(),
            ),
            membership: MembershipService::new(
                self.users.clone(),
                self.apartments.clone(),
                self.allocations.clone(),
                self.audit.clone(),
            ),
            billing: BillingService::new(
                self.coupons.clone(),
                self.ledger.clone(),
                Arc::new(StaticChargeGateway::default()),
            ),
            announcements: AnnouncementBoard::new(self.announcements.clone()),
        })
    }

    /// Starter data for local runs and the demo command.
    pub(crate) fn seed(&self) {
        for (id, rent) in [
            ("apt-101", 950),
            ("apt-102", 1050),
            ("apt-201", 1200),
            ("apt-202", 1350),
            ("apt-301", 1500),
        ] {
            let _ = self.apartments.insert(Apartment {
                id: ApartmentId(id.to_string()),
                rent,
                booking_status: BookingStatus::Available,
            });
        }

        let _ = self.coupons.insert(Coupon {
            code: "SAVE10".to_string(),
            discount_percent: 10,
            validity: CouponValidity::Valid,
            description: "move-in season discount".to_string(),
        });

        let mut admin = UserRecord::new("admin@buildiq.example");
        admin.role = Role::Admin;
        let _ = self.users.insert(admin);
    }
}
