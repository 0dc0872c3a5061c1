use crate::adapters::http::{build_client, date_at, error_message, read_json, str_at};
use crate::config::toml_config::BorrowDirectConfig;
use crate::domain::patron::Patron;
use crate::domain::ports::RequestSourceClient;
use crate::domain::request::{Request, RequestSource};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

/// Relais statuses for requests that are done or have become ILS checkouts.
const FINISHED_STATUSES: &[&str] = &["ON_LOAN", "COMPLETED", "UNFILLED", "CANCELLED", "RETURNED"];

/// BorrowDirect requests held in the Relais D2D portal.
pub struct BorrowDirectClient {
    config: BorrowDirectConfig,
    client: Client,
}

impl BorrowDirectClient {
    pub fn new(config: BorrowDirectConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: build_client(Some(10))?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn authorization_id(&self, barcode: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/portal-service/user/authentication"))
            .json(&json!({
                "ApiKey": self.config.api_key,
                "UserGroup": "patron",
                "LibrarySymbol": self.config.library_symbol,
                "PartnershipId": self.config.partnership_id,
                "PatronId": barcode,
            }))
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        if !status.is_success() {
            return Err(PortalError::Authentication {
                message: error_message(&body)
                    .or_else(|| str_at(&body, "/Problem/Message"))
                    .unwrap_or_else(|| format!("Relais authentication returned {}", status)),
            });
        }
        str_at(&body, "/AuthorizationId")
            .ok_or_else(|| PortalError::ils("Relais response had no AuthorizationId"))
    }
}

#[async_trait]
impl RequestSourceClient for BorrowDirectClient {
    fn source(&self) -> RequestSource {
        RequestSource::BorrowDirect
    }

    async fn requests_for(&self, patron: &Patron) -> Result<Vec<Request>> {
        let Some(barcode) = patron.barcode.as_deref() else {
            return Ok(Vec::new());
        };

        let aid = self.authorization_id(barcode).await?;
        let response = self
            .client
            .get(self.url("/portal-service/request/query/my"))
            .query(&[("type", "open"), ("fullRecord", "0"), ("aid", aid.as_str())])
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        // Relais answers 404 when the patron has no open requests
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(PortalError::ils(
                error_message(&body).unwrap_or_else(|| format!("Relais query returned {}", status)),
            ));
        }

        Ok(parse_requests(&body, &patron.key, self.config.manage_url.as_deref()))
    }
}

pub fn parse_requests(body: &Value, patron_key: &str, manage_url: Option<&str>) -> Vec<Request> {
    body.as_array()
        .into_iter()
        .flatten()
        .filter(|record| {
            let status = str_at(record, "/RequestStatus").unwrap_or_default();
            !FINISHED_STATUSES.contains(&status.as_str())
        })
        .map(|record| {
            let mut request = Request::new(
                str_at(record, "/RequestNumber").unwrap_or_default(),
                RequestSource::BorrowDirect,
                str_at(record, "/Title").unwrap_or_default(),
            );
            request.patron_key = patron_key.to_string();
            request.author = str_at(record, "/Author");
            request.status = status_label(&str_at(record, "/RequestStatus").unwrap_or_default());
            request.pickup_library = str_at(record, "/PickupLocation");
            request.placed_date = date_at(record, "/RequestDate");
            request.manage_url = manage_url.map(str::to_string);
            request
        })
        .collect()
}

fn status_label(status: &str) -> String {
    match status {
        "ENTERED" => "Requested".to_string(),
        "IN_PROCESS" => "In process".to_string(),
        "SHIPPED" => "Shipped".to_string(),
        other => other.replace('_', " ").to_lowercase(),
    }
}
