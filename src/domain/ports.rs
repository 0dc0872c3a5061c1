use crate::domain::checkout::Checkout;
use crate::domain::patron::Patron;
use crate::domain::pickup::PickupLibraries;
use crate::domain::request::{Request, RequestSource};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct RenewalOutcome {
    pub item_key: String,
    pub new_due_date: Option<DateTime<Utc>>,
}

/// The circulation system of record. Symphony and FOLIO both implement it.
#[async_trait]
pub trait IlsClient: Send + Sync {
    fn name(&self) -> &'static str;

    /// Verifies a library ID + PIN and returns the patron key.
    async fn authenticate(&self, library_id: &str, pin: &str) -> Result<String>;

    async fn find_patron_by_university_id(&self, university_id: &str) -> Result<String>;

    /// Loads the patron with checkouts, requests, fines, payments and group.
    async fn patron_info(&self, patron_key: &str) -> Result<Patron>;

    async fn renew(&self, patron: &Patron, checkout: &Checkout) -> Result<RenewalOutcome>;

    async fn cancel_request(&self, patron: &Patron, request: &Request) -> Result<()>;

    async fn change_pickup_library(&self, request: &Request, library_code: &str) -> Result<()>;

    async fn change_not_needed_after(&self, request: &Request, date: NaiveDate) -> Result<()>;

    /// Records a gateway-accepted payment against the patron's open fines.
    async fn record_payment(&self, patron_key: &str, amount: Decimal, session_id: &str) -> Result<()>;

    /// Pickup libraries known to the ILS, merged with configured labels.
    async fn pickup_libraries(&self) -> Result<PickupLibraries>;
}

/// A service holding requests that are not in the ILS (BorrowDirect, ILLiad).
#[async_trait]
pub trait RequestSourceClient: Send + Sync {
    fn source(&self) -> RequestSource;

    async fn requests_for(&self, patron: &Patron) -> Result<Vec<Request>>;
}
