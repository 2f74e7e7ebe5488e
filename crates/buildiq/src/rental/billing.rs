use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreError;

/// Manually toggled coupon flag, distinct from any expiry date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouponValidity {
    Valid,
    Invalid,
}

/// Discount coupon keyed by its unique code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount_percent: u8,
    pub validity: CouponValidity,
    #[serde(default)]
    pub description: String,
}

/// Storage seam for coupons.
pub trait CouponRepository: Send + Sync {
    fn insert(&self, coupon: Coupon) -> Result<Coupon, StoreError>;
    fn fetch(&self, code: &str) -> Result<Option<Coupon>, StoreError>;
    fn update(&self, coupon: Coupon) -> Result<(), StoreError>;
    fn remove(&self, code: &str) -> Result<(), StoreError>;
    fn all(&self) -> Result<Vec<Coupon>, StoreError>;
}

/// Append-only ledger entry for a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub email: String,
    pub rent: u32,
    pub discount: u32,
    pub amount: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Append-only payment store. Records are never mutated or deleted.
pub trait PaymentLedger: Send + Sync {
    fn append(&self, record: PaymentRecord) -> Result<PaymentRecord, StoreError>;
    fn history(&self, email: &str) -> Result<Vec<PaymentRecord>, StoreError>;
}

/// Opaque authorization from the external payment processor. The client
/// completes the card charge with `client_secret`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeAuthorization {
    pub client_secret: String,
    pub amount_minor: u64,
}

/// Payment-processor seam; amounts are in minor currency units.
pub trait ChargeGateway: Send + Sync {
    fn authorize(&self, amount_minor: u64) -> Result<ChargeAuthorization, ChargeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChargeError {
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
}

/// Quote input. `discount` is advisory bookkeeping only; the percentage
/// actually applied comes from the stored coupon.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub rent: u32,
    #[serde(default)]
    pub coupon: Option<String>,
    #[serde(default)]
    pub discount: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("discount percent cannot exceed 100")]
    InvalidPercent,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error(transparent)]
    Gateway(#[from] ChargeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Client-supplied payment to persist. The recorded `amount` is always
/// recomputed as `rent - discount`; a client cannot name its own total.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSubmission {
    pub email: String,
    pub rent: u32,
    #[serde(default)]
    pub discount: u32,
    #[serde(default)]
    pub coupon: Option<String>,
}

/// Quotes, the payment ledger, and coupon administration.
#[derive(Clone)]
pub struct BillingService {
    coupons: Arc<dyn CouponRepository>,
    ledger: Arc<dyn PaymentLedger>,
    gateway: Arc<dyn ChargeGateway>,
}

/// Integer-floor percentage discount, as the storefront displays it.
/// Saturates at zero so a legacy over-100 coupon cannot underflow the charge.
fn discounted_rent(rent: u32, percent: u8) -> u32 {
    rent.saturating_sub((u64::from(rent) * u64::from(percent) / 100) as u32)
}

impl BillingService {
    pub fn new(
        coupons: Arc<dyn CouponRepository>,
        ledger: Arc<dyn PaymentLedger>,
        gateway: Arc<dyn ChargeGateway>,
    ) -> Self {
        Self {
            coupons,
            ledger,
            gateway,
        }
    }

    /// Compute the charge for a rent figure and optional coupon, then obtain
    /// a charge authorization for it in minor units. Unknown or invalidated
    /// coupon codes apply no discount; only a stored `Valid` coupon does,
    /// and its stored percentage wins over anything the caller claims.
    pub fn quote(&self, request: &QuoteRequest) -> Result<ChargeAuthorization, QuoteError> {
        let charge = match &request.coupon {
            None => request.rent,
            Some(code) => match self.coupons.fetch(code)? {
                Some(coupon) if coupon.validity == CouponValidity::Valid => {
                    discounted_rent(request.rent, coupon.discount_percent)
                }
                _ => request.rent,
            },
        };

        let authorization = self.gateway.authorize(u64::from(charge) * 100)?;
        Ok(authorization)
    }

    /// Append a completed payment to the ledger. The coupon is not
    /// re-validated here; the quote and record steps are not atomically
    /// linked.
    pub fn record(&self, submission: PaymentSubmission) -> Result<PaymentRecord, StoreError> {
        let amount = submission.rent.saturating_sub(submission.discount);
        self.ledger.append(PaymentRecord {
            email: submission.email,
            rent: submission.rent,
            discount: submission.discount,
            amount,
            coupon: submission.coupon,
            paid_at: Utc::now(),
        })
    }

    /// Ledger readback, newest first.
    pub fn history(&self, email: &str) -> Result<Vec<PaymentRecord>, StoreError> {
        let mut records = self.ledger.history(email)?;
        records.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(records)
    }

    pub fn coupons(&self) -> Result<Vec<Coupon>, StoreError> {
        self.coupons.all()
    }

    pub fn coupon(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        self.coupons.fetch(code)
    }

    pub fn create_coupon(&self, coupon: Coupon) -> Result<Coupon, CouponError> {
        if coupon.discount_percent > 100 {
            return Err(CouponError::InvalidPercent);
        }
        Ok(self.coupons.insert(coupon)?)
    }

    pub fn update_coupon(&self, coupon: Coupon) -> Result<(), CouponError> {
        if coupon.discount_percent > 100 {
            return Err(CouponError::InvalidPercent);
        }
        Ok(self.coupons.update(coupon)?)
    }

    pub fn delete_coupon(&self, code: &str) -> Result<(), StoreError> {
        self.coupons.remove(code)
    }
}

#[cfg(test)]
mod tests {
    use super::discounted_rent;

    #[test]
    fn discount_floors_to_integer() {
        assert_eq!(discounted_rent(1000, 10), 900);
        assert_eq!(discounted_rent(999, 10), 900);
        assert_eq!(discounted_rent(1000, 0), 1000);
        assert_eq!(discounted_rent(1000, 100), 0);
    }

    #[test]
    fn discount_above_one_hundred_saturates_at_zero() {
        assert_eq!(discounted_rent(1000, 150), 0);
        assert_eq!(discounted_rent(1000, u8::MAX), 0);
    }
}
