use crate::core::flash::Flash;
use crate::core::portal::PortalService;
use crate::domain::fine;
use crate::domain::group::View;
use crate::domain::money::format_currency;
use crate::domain::patron::Role;
use crate::payment::{PaymentRequest, PaymentResponse};
use crate::utils::error::{PortalError, Result};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

/// Builds the signed checkout form for everything owed in `view`.
pub async fn start(service: &PortalService, patron_key: &str, view: View) -> Result<PaymentRequest> {
    let patron = service.patron(patron_key).await?;
    if patron.role() == Role::Proxy {
        return Err(PortalError::PaymentNotAllowed {
            message: "Fines for proxy borrowing are paid by the sponsor.".to_string(),
        });
    }
    if !patron.can_pay(view) {
        return Err(PortalError::PaymentNotAllowed {
            message: "There is nothing to pay.".to_string(),
        });
    }

    let amount = fine::total_owed_refs(&patron.visible_fines(view));
    let request = PaymentRequest::new(
        service.payment_config(),
        &patron.key,
        amount,
        Utc::now(),
        Uuid::new_v4(),
    )?;
    tracing::info!(
        "💳 Payment {} started for {} ({})",
        request.transaction_uuid,
        patron.key,
        format_currency(amount)
    );
    Ok(request)
}

/// Handles the gateway's accept callback. The signature is checked before
/// the decision, and only a verified ACCEPT is recorded in the ILS.
pub async fn accept(service: &PortalService, params: HashMap<String, String>) -> Flash {
    let response = match PaymentResponse::from_params(params, &service.payment_config().secret_key) {
        Ok(response) => response,
        Err(e @ PortalError::InvalidSignature) => {
            tracing::error!("❌ Payment callback failed signature verification");
            return Flash::from_error(&e);
        }
        Err(e) => {
            tracing::warn!("Payment not accepted: {}", e);
            return Flash::from_error(&e);
        }
    };

    let amount = response.amount();
    if let Err(e) = service
        .ils()
        .record_payment(response.patron_key(), amount, response.session_id())
        .await
    {
        tracing::error!(
            "❌ Payment {} for {} was taken but not recorded: {}",
            response.session_id(),
            response.patron_key(),
            e
        );
        return Flash::alert(format!(
            "Your payment of {} was received but could not be posted to your account. Please contact the library.",
            format_currency(amount)
        ));
    }

    tracing::info!(
        "✅ Payment {} ({}) accepted for {}",
        response.session_id(),
        response.transaction_id(),
        response.patron_key()
    );
    Flash::success(format!(
        "Success! Your payment of {} has been received.",
        format_currency(amount)
    ))
}

pub fn cancel() -> Flash {
    Flash::notice("Payment canceled. No payment was made.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flash::FlashLevel;
    use crate::core::testing::{self, IlsCall, RecordingIls, SECRET};
    use crate::domain::fine::Fine;
    use crate::domain::patron::Patron;
    use crate::payment::Security;
    use rust_decimal::Decimal;
    use tokio_test::{assert_err, assert_ok};

    fn owing_patron() -> Patron {
        let mut patron = Patron::new("p1", "Pat", "Ron");
        let mut fine = Fine::new("f1", "OVERDUE", Decimal::new(1250, 2));
        fine.patron_key = "p1".to_string();
        patron.fines.push(fine);
        patron
    }

    fn callback(decision: &str) -> HashMap<String, String> {
        let mut params: HashMap<String, String> = [
            ("decision", decision),
            ("reason_code", "100"),
            ("transaction_id", "6000000000000000000001"),
            ("req_amount", "12.50"),
            ("req_reference_number", "p1"),
            ("req_transaction_uuid", "session-1"),
            (
                "signed_field_names",
                "decision,reason_code,transaction_id,req_amount,req_reference_number,req_transaction_uuid,signed_field_names",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let signature = Security::sign(&params, SECRET).unwrap();
        params.insert("signature".to_string(), signature);
        params
    }

    #[tokio::test]
    async fn test_start_signs_the_amount_owed() {
        let (portal, _) = testing::service(RecordingIls::new(owing_patron()));
        let request = assert_ok!(start(&portal, "p1", View::Own).await);
        assert_eq!(request.get("amount"), Some("12.50"));
        assert_eq!(request.get("reference_number"), Some("p1"));
        assert!(!request.signature().is_empty());
    }

    #[tokio::test]
    async fn test_start_refuses_proxy_and_zero_balance() {
        let mut proxy = owing_patron();
        proxy.proxy = true;
        let (proxy_portal, _) = testing::service(RecordingIls::new(proxy));
        assert_err!(start(&proxy_portal, "p1", View::Own).await);

        let (settled_portal, _) = testing::service(RecordingIls::new(Patron::new("p1", "Pat", "Ron")));
        assert_err!(start(&settled_portal, "p1", View::Own).await);
    }

    #[tokio::test]
    async fn test_accept_records_verified_payment_once() {
        let (portal, ils) = testing::service(RecordingIls::new(owing_patron()));
        let flash = accept(&portal, callback("ACCEPT")).await;
        assert_eq!(flash.level, FlashLevel::Success);
        assert_eq!(flash.message, "Success! Your payment of $12.50 has been received.");

        assert_eq!(
            ils.calls(),
            vec![IlsCall::RecordPayment(
                "p1".to_string(),
                Decimal::new(1250, 2),
                "session-1".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_rejected_callbacks_record_nothing() {
        let (portal, ils) = testing::service(RecordingIls::new(owing_patron()));

        let mut tampered = callback("ACCEPT");
        tampered.insert("req_amount".to_string(), "0.01".to_string());
        let invalid = accept(&portal, tampered).await;
        assert!(invalid.is_alert());

        let canceled = accept(&portal, callback("CANCEL")).await;
        assert!(canceled.is_alert());
        assert_eq!(canceled.message, "Payment canceled. No payment was made.");
        assert_ne!(invalid.message, canceled.message);

        let declined = accept(&portal, callback("DECLINE")).await;
        assert!(declined.message.contains("failed"));

        assert!(ils.calls().is_empty());
    }

    #[test]
    fn test_cancel_is_a_notice() {
        assert_eq!(cancel().level, FlashLevel::Notice);
    }
}
