use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::announcements::{AnnouncementBoard, AnnouncementDraft};
use super::billing::{
    BillingService, Coupon, CouponError, CouponValidity, PaymentSubmission, QuoteError,
    QuoteRequest,
};
use super::identity::UserDirectory;
use super::inventory::{ApartmentId, BookingStatus, InventoryService, ListingError, ListingQuery};
use super::membership::{AllocateError, MembershipService, RoleUpdate, RoleUpdateError};
use super::requests::{DecideError, RequestId, RequestService, RequestStatus, SubmitError, SubmitRequest};
use super::StoreError;
use crate::auth::{bearer_token, AuthError, Identity, Role, TokenService};

/// Everything a handler needs, threaded through as router state.
pub struct ApiContext {
    pub tokens: Arc<dyn TokenService>,
    pub directory: UserDirectory,
    pub inventory: InventoryService,
    pub requests: RequestService,
    pub membership: MembershipService,
    pub billing: BillingService,
    pub announcements: AnnouncementBoard,
}

impl ApiContext {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = bearer_token(headers)?;
        self.tokens.verify(token)
    }

    fn require_admin(&self, identity: &Identity) -> Result<(), AuthError> {
        match self.directory.role_of(&identity.email) {
            Ok(Some(Role::Admin)) => Ok(()),
            Ok(_) => Err(AuthError::Forbidden),
            Err(err) => Err(AuthError::Backend(err.to_string())),
        }
    }

    fn require_self(&self, identity: &Identity, email: &str) -> Result<(), AuthError> {
        if identity.email == email {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// The whole rental HTTP surface over a shared [`ApiContext`].
pub fn rental_router(context: Arc<ApiContext>) -> Router {
    Router::new()
        .route("/jwt", post(issue_token))
        .route("/logout", get(logout))
        .route("/users", post(register_user))
        .route("/user/:email", get(user_record))
        .route("/apartments", get(list_apartments))
        .route("/apartment-status/:id", get(apartment_status))
        .route("/request-apartment", post(request_apartment))
        .route("/requests", get(pending_requests))
        .route("/update-request", patch(update_request))
        .route("/accepted-requests", post(record_allocation))
        .route("/allocate-apartment/:id", patch(flip_apartment))
        .route("/update-role", patch(update_role))
        .route("/my-apartment/:email", get(my_apartment))
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/payments", post(record_payment))
        .route("/payments/:email", get(payment_history))
        .route("/payments-history/:email", get(payment_history))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/:code", patch(update_coupon).delete(delete_coupon))
        .route(
            "/announcements",
            get(list_announcements).post(post_announcement),
        )
        .route("/announcements/:id", delete(delete_announcement))
        .route("/statistics", get(statistics))
        .with_state(context)
}

fn store_failure(err: StoreError) -> Response {
    let payload = json!({ "error": err.to_string() });
    let status = match err {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::Conflict => StatusCode::CONFLICT,
        StoreError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(payload)).into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
}

/// Business-rule rejections ride back as a successful response with a
/// `status` flag so front-end flows can branch without error handling.
fn rejection(status: &str) -> Response {
    (StatusCode::OK, Json(json!({ "status": status }))).into_response()
}

#[derive(Debug, Deserialize)]
struct TokenClaim {
    email: String,
}

async fn issue_token(
    State(context): State<Arc<ApiContext>>,
    Json(claim): Json<TokenClaim>,
) -> Response {
    match context.tokens.issue(&claim.email) {
        Ok(issued) => (
            StatusCode::OK,
            Json(json!({ "success": true, "token": issued.token })),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

async fn logout(State(context): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    // Logout always succeeds from the client's perspective; a missing or
    // already-dead token leaves nothing to revoke.
    if let Ok(token) = bearer_token(&headers) {
        let _ = context.tokens.revoke(token);
    }
    (StatusCode::OK, Json(json!({ "success": true }))).into_response()
}

#[derive(Debug, Deserialize)]
struct Registration {
    email: String,
}

async fn register_user(
    State(context): State<Arc<ApiContext>>,
    Json(registration): Json<Registration>,
) -> Response {
    match context.directory.register(&registration.email) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => store_failure(err),
    }
}

async fn user_record(
    State(context): State<Arc<ApiContext>>,
    Path(email): Path<String>,
) -> Response {
    match context.directory.fetch(&email) {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => not_found("user not found"),
        Err(err) => store_failure(err),
    }
}

async fn list_apartments(
    State(context): State<Arc<ApiContext>>,
    Query(query): Query<ListingQuery>,
) -> Response {
    match context.inventory.list(&query) {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(err @ (ListingError::InvalidPage | ListingError::InvalidLimit)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(ListingError::Store(err)) => store_failure(err),
    }
}

async fn apartment_status(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.inventory.availability(&ApartmentId(id)) {
        Ok(Some(available)) => {
            (StatusCode::OK, Json(json!({ "available": available }))).into_response()
        }
        Ok(None) => not_found("apartment not found"),
        Err(err) => store_failure(err),
    }
}

async fn request_apartment(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(submission): Json<SubmitRequest>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };

    match context.requests.submit(&identity.email, submission) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(SubmitError::AlreadyMember) => rejection("already_member"),
        Err(SubmitError::AlreadyRequested) => rejection("already_requested"),
        Err(SubmitError::ApartmentUnavailable) => rejection("apartment_unavailable"),
        Err(SubmitError::Forbidden) => AuthError::Forbidden.into_response(),
        Err(SubmitError::ApartmentNotFound) => not_found("apartment not found"),
        Err(SubmitError::Store(err)) => store_failure(err),
    }
}

async fn pending_requests(State(context): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.requests.pending() {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(err) => store_failure(err),
    }
}

#[derive(Debug, Deserialize)]
struct Decision {
    id: RequestId,
    status: RequestStatus,
}

async fn update_request(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(decision): Json<Decision>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.requests.decide(&decision.id, decision.status) {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(DecideError::NotFound) => not_found("request not found"),
        Err(err @ (DecideError::AlreadyDecided | DecideError::NotADecision)) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(DecideError::Store(err)) => store_failure(err),
    }
}

#[derive(Debug, Deserialize)]
struct AllocationClaim {
    email: String,
    apartment_id: ApartmentId,
}

async fn record_allocation(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(claim): Json<AllocationClaim>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.membership.allocate(&claim.email, &claim.apartment_id) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(AllocateError::ApartmentNotFound) => not_found("apartment not found"),
        Err(err @ AllocateError::AlreadyAllocated) => (
            StatusCode::CONFLICT,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(AllocateError::Store(err)) => store_failure(err),
    }
}

#[derive(Debug, Deserialize)]
struct StatusFlip {
    status: BookingStatus,
}

async fn flip_apartment(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(flip): Json<StatusFlip>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.inventory.set_status(&ApartmentId(id), flip.status) {
        Ok(apartment) => (StatusCode::OK, Json(apartment)).into_response(),
        Err(StoreError::NotFound) => not_found("apartment not found"),
        Err(err) => store_failure(err),
    }
}

async fn update_role(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(update): Json<RoleUpdate>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.membership.update_role(update) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(RoleUpdateError::UserNotFound) => not_found("user not found"),
        Err(RoleUpdateError::Store(err)) => store_failure(err),
    }
}

async fn my_apartment(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_self(&identity, &email) {
        return err.into_response();
    }

    match context.membership.my_apartment(&email) {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => not_found("no apartment allocated"),
        Err(err) => store_failure(err),
    }
}

async fn create_payment_intent(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(request): Json<QuoteRequest>,
) -> Response {
    if let Err(err) = context.authenticate(&headers) {
        return err.into_response();
    }

    match context.billing.quote(&request) {
        Ok(authorization) => (StatusCode::OK, Json(authorization)).into_response(),
        Err(QuoteError::Gateway(err)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(QuoteError::Store(err)) => store_failure(err),
    }
}

async fn record_payment(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(submission): Json<PaymentSubmission>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_self(&identity, &submission.email) {
        return err.into_response();
    }

    match context.billing.record(submission) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => store_failure(err),
    }
}

async fn payment_history(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_self(&identity, &email) {
        return err.into_response();
    }

    match context.billing.history(&email) {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(err) => store_failure(err),
    }
}

async fn list_coupons(State(context): State<Arc<ApiContext>>) -> Response {
    match context.billing.coupons() {
        Ok(coupons) => (StatusCode::OK, Json(coupons)).into_response(),
        Err(err) => store_failure(err),
    }
}

async fn create_coupon(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(coupon): Json<Coupon>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.billing.create_coupon(coupon) {
        Ok(created) => (StatusCode::OK, Json(created)).into_response(),
        Err(err @ CouponError::InvalidPercent) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(CouponError::Store(err)) => store_failure(err),
    }
}

#[derive(Debug, Deserialize)]
struct CouponPatch {
    #[serde(default)]
    discount_percent: Option<u8>,
    #[serde(default)]
    validity: Option<CouponValidity>,
    #[serde(default)]
    description: Option<String>,
}

async fn update_coupon(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(patch): Json<CouponPatch>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    let mut coupon = match context.billing.coupon(&code) {
        Ok(Some(coupon)) => coupon,
        Ok(None) => return not_found("coupon not found"),
        Err(err) => return store_failure(err),
    };

    if let Some(percent) = patch.discount_percent {
        coupon.discount_percent = percent;
    }
    if let Some(validity) = patch.validity {
        coupon.validity = validity;
    }
    if let Some(description) = patch.description {
        coupon.description = description;
    }

    match context.billing.update_coupon(coupon.clone()) {
        Ok(()) => (StatusCode::OK, Json(coupon)).into_response(),
        Err(err @ CouponError::InvalidPercent) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
        Err(CouponError::Store(err)) => store_failure(err),
    }
}

async fn delete_coupon(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.billing.delete_coupon(&code) {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": code }))).into_response(),
        Err(StoreError::NotFound) => not_found("coupon not found"),
        Err(err) => store_failure(err),
    }
}

async fn list_announcements(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
) -> Response {
    if let Err(err) = context.authenticate(&headers) {
        return err.into_response();
    }

    match context.announcements.list() {
        Ok(announcements) => (StatusCode::OK, Json(announcements)).into_response(),
        Err(err) => store_failure(err),
    }
}

async fn post_announcement(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Json(draft): Json<AnnouncementDraft>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.announcements.post(draft) {
        Ok(announcement) => (StatusCode::OK, Json(announcement)).into_response(),
        Err(err) => store_failure(err),
    }
}

async fn delete_announcement(
    State(context): State<Arc<ApiContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.announcements.delete(&id) {
        Ok(()) => (StatusCode::OK, Json(json!({ "deleted": id }))).into_response(),
        Err(StoreError::NotFound) => not_found("announcement not found"),
        Err(err) => store_failure(err),
    }
}

async fn statistics(State(context): State<Arc<ApiContext>>, headers: HeaderMap) -> Response {
    let identity = match context.authenticate(&headers) {
        Ok(identity) => identity,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = context.require_admin(&identity) {
        return err.into_response();
    }

    match context.inventory.statistics() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(err) => store_failure(err),
    }
}
