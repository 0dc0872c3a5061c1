//! In-memory ILS for controller tests. Every write is recorded so tests can
//! assert which calls reached the ILS.

use crate::config::toml_config::PaymentConfig;
use crate::core::portal::PortalService;
use crate::core::requests::RequestAggregator;
use crate::domain::checkout::Checkout;
use crate::domain::patron::Patron;
use crate::domain::pickup::PickupLibraries;
use crate::domain::ports::{IlsClient, RenewalOutcome};
use crate::domain::request::Request;
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

pub const SECRET: &str = "shared-secret";

#[derive(Debug, Clone, PartialEq)]
pub enum IlsCall {
    Renew(String),
    Cancel(String),
    ChangePickup(String, String),
    ChangeNotNeededAfter(String, NaiveDate),
    RecordPayment(String, Decimal, String),
}

pub struct RecordingIls {
    patron: Patron,
    pickup: PickupLibraries,
    fail_not_needed_after: bool,
    calls: Mutex<Vec<IlsCall>>,
}

impl RecordingIls {
    pub fn new(patron: Patron) -> Self {
        Self {
            patron,
            pickup: PickupLibraries::default(),
            fail_not_needed_after: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pickup(mut self, pickup: PickupLibraries) -> Self {
        self.pickup = pickup;
        self
    }

    pub fn failing_not_needed_after(mut self) -> Self {
        self.fail_not_needed_after = true;
        self
    }

    pub fn calls(&self) -> Vec<IlsCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: IlsCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IlsClient for RecordingIls {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn authenticate(&self, _library_id: &str, _pin: &str) -> Result<String> {
        Ok(self.patron.key.clone())
    }

    async fn find_patron_by_university_id(&self, _university_id: &str) -> Result<String> {
        Ok(self.patron.key.clone())
    }

    async fn patron_info(&self, _patron_key: &str) -> Result<Patron> {
        Ok(self.patron.clone())
    }

    async fn renew(&self, _patron: &Patron, checkout: &Checkout) -> Result<RenewalOutcome> {
        self.record(IlsCall::Renew(checkout.key.clone()));
        Ok(RenewalOutcome {
            item_key: checkout.item_key.clone(),
            new_due_date: None,
        })
    }

    async fn cancel_request(&self, _patron: &Patron, request: &Request) -> Result<()> {
        self.record(IlsCall::Cancel(request.key.clone()));
        Ok(())
    }

    async fn change_pickup_library(&self, request: &Request, library_code: &str) -> Result<()> {
        self.record(IlsCall::ChangePickup(request.key.clone(), library_code.to_string()));
        Ok(())
    }

    async fn change_not_needed_after(&self, request: &Request, date: NaiveDate) -> Result<()> {
        self.record(IlsCall::ChangeNotNeededAfter(request.key.clone(), date));
        if self.fail_not_needed_after {
            return Err(PortalError::Request {
                message: "hold record is locked".to_string(),
            });
        }
        Ok(())
    }

    async fn record_payment(&self, patron_key: &str, amount: Decimal, session_id: &str) -> Result<()> {
        self.record(IlsCall::RecordPayment(
            patron_key.to_string(),
            amount,
            session_id.to_string(),
        ));
        Ok(())
    }

    async fn pickup_libraries(&self) -> Result<PickupLibraries> {
        Ok(self.pickup.clone())
    }
}

pub fn payment_config() -> PaymentConfig {
    PaymentConfig {
        form_url: "https://testsecureacceptance.cybersource.com/pay".to_string(),
        access_key: "access".to_string(),
        profile_id: "profile".to_string(),
        secret_key: SECRET.to_string(),
        currency: "USD".to_string(),
        locale: "en".to_string(),
    }
}

pub fn service(ils: RecordingIls) -> (PortalService, Arc<RecordingIls>) {
    let ils = Arc::new(ils);
    let service = PortalService::new(ils.clone(), RequestAggregator::empty(), payment_config(), "");
    (service, ils)
}
