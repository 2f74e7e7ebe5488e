use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::identity::UserRepository;
use super::StoreError;
use crate::auth::Role;

/// Identifier wrapper for apartment listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApartmentId(pub String);

/// Whether a listing can currently be requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Available,
    Unavailable,
}

impl BookingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BookingStatus::Available => "available",
            BookingStatus::Unavailable => "unavailable",
        }
    }
}

/// An advertised apartment. `booking_status` flips to unavailable exactly
/// when an allocation references the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apartment {
    pub id: ApartmentId,
    pub rent: u32,
    pub booking_status: BookingStatus,
}

/// Storage seam for the apartment inventory.
pub trait ApartmentRepository: Send + Sync {
    fn insert(&self, apartment: Apartment) -> Result<Apartment, StoreError>;
    fn fetch(&self, id: &ApartmentId) -> Result<Option<Apartment>, StoreError>;
    fn update(&self, apartment: Apartment) -> Result<(), StoreError>;
    fn all(&self) -> Result<Vec<Apartment>, StoreError>;
}

/// Rent-range filter plus page-based pagination, all optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    #[serde(default)]
    pub min_rent: Option<u32>,
    #[serde(default)]
    pub max_rent: Option<u32>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One page of listings, ascending by rent.
#[derive(Debug, Clone, Serialize)]
pub struct ListingPage {
    pub apartments: Vec<Apartment>,
    pub page: u32,
    pub total_pages: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ListingError {
    #[error("page numbers start at 1")]
    InvalidPage,
    #[error("limit must be greater than zero")]
    InvalidLimit,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Aggregate counts for the admin dashboard. Percentages are zero when the
/// inventory is empty; otherwise they sum to exactly 100.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_apartments: u64,
    pub available_percent: f64,
    pub unavailable_percent: f64,
    pub user_count: u64,
    pub member_count: u64,
}

/// Read-side queries over the inventory plus the availability flip used by
/// the allocation flow.
#[derive(Clone)]
pub struct InventoryService {
    apartments: Arc<dyn ApartmentRepository>,
    users: Arc<dyn UserRepository>,
}

impl InventoryService {
    pub fn new(apartments: Arc<dyn ApartmentRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { apartments, users }
    }

    /// Rent-filtered listing sorted ascending by rent. Pages are 1-indexed;
    /// without a `limit` the whole match set comes back as a single page.
    pub fn list(&self, query: &ListingQuery) -> Result<ListingPage, ListingError> {
        let min_rent = query.min_rent.unwrap_or(0);
        let max_rent = query.max_rent.unwrap_or(u32::MAX);
        let page = query.page.unwrap_or(1);
        if page == 0 {
            return Err(ListingError::InvalidPage);
        }
        if query.limit == Some(0) {
            return Err(ListingError::InvalidLimit);
        }

        let mut matching: Vec<Apartment> = self
            .apartments
            .all()?
            .into_iter()
            .filter(|apartment| apartment.rent >= min_rent && apartment.rent <= max_rent)
            .collect();
        matching.sort_by(|a, b| a.rent.cmp(&b.rent).then_with(|| a.id.0.cmp(&b.id.0)));

        let total = matching.len();
        let (slice, total_pages) = match query.limit {
            Some(limit) => {
                let limit = limit as usize;
                let total_pages = total.div_ceil(limit) as u32;
                let skip = (page as usize - 1) * limit;
                let slice = matching.into_iter().skip(skip).take(limit).collect();
                (slice, total_pages)
            }
            None => {
                let total_pages = u32::from(total > 0);
                let slice = if page == 1 { matching } else { Vec::new() };
                (slice, total_pages)
            }
        };

        Ok(ListingPage {
            apartments: slice,
            page,
            total_pages,
        })
    }

    /// Availability derives from `booking_status` alone.
    pub fn availability(&self, id: &ApartmentId) -> Result<Option<bool>, StoreError> {
        Ok(self
            .apartments
            .fetch(id)?
            .map(|apartment| apartment.booking_status == BookingStatus::Available))
    }

    pub fn set_status(
        &self,
        id: &ApartmentId,
        status: BookingStatus,
    ) -> Result<Apartment, StoreError> {
        let mut apartment = self.apartments.fetch(id)?.ok_or(StoreError::NotFound)?;
        apartment.booking_status = status;
        self.apartments.update(apartment.clone())?;
        Ok(apartment)
    }

    pub fn statistics(&self) -> Result<Statistics, StoreError> {
        let apartments = self.apartments.all()?;
        let total = apartments.len() as u64;
        let available = apartments
            .iter()
            .filter(|apartment| apartment.booking_status == BookingStatus::Available)
            .count() as u64;

        let (available_percent, unavailable_percent) = if total == 0 {
            (0.0, 0.0)
        } else {
            let available_percent = available as f64 * 100.0 / total as f64;
            (available_percent, 100.0 - available_percent)
        };

        Ok(Statistics {
            total_apartments: total,
            available_percent,
            unavailable_percent,
            user_count: self.users.count_by_role(Role::User)?,
            member_count: self.users.count_by_role(Role::Member)?,
        })
    }
}
