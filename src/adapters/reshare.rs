use crate::adapters::cache::TtlCache;
use crate::adapters::http::{bool_at, build_client, date_at, error_message, read_json, str_at};
use crate::config::toml_config::ReshareConfig;
use crate::domain::patron::Patron;
use crate::domain::ports::RequestSourceClient;
use crate::domain::request::{Request, RequestSource};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Requester-side states after which the request is no longer shown.
const TERMINAL_STATES: &[&str] = &[
    "REQ_REQUEST_COMPLETE",
    "REQ_CANCELLED",
    "REQ_END_OF_ROTA",
    "REQ_CHECKED_IN",
    "REQ_AWAITING_RETURN_SHIPPING",
    "REQ_SHIPPED_TO_SUPPLIER",
    "REQ_FILLED_LOCALLY",
];

/// BorrowDirect requests placed through Project ReShare.
pub struct ReshareClient {
    config: ReshareConfig,
    client: Client,
    token: TtlCache<String>,
}

impl ReshareClient {
    pub fn new(config: ReshareConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: build_client(Some(10))?,
            token: TtlCache::new(TOKEN_TTL),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn okapi_token(&self) -> Result<Arc<String>> {
        self.token
            .get_or_try_insert(|| async {
                let response = self
                    .client
                    .post(self.url("/authn/login"))
                    .header("X-Okapi-Tenant", &self.config.tenant)
                    .json(&json!({
                        "username": self.config.username,
                        "password": self.config.password,
                    }))
                    .send()
                    .await?;
                let token = response
                    .headers()
                    .get("x-okapi-token")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let (status, body) = read_json(response).await?;
                if !status.is_success() {
                    return Err(PortalError::Authentication {
                        message: error_message(&body)
                            .unwrap_or_else(|| format!("ReShare login returned {}", status)),
                    });
                }
                token
                    .or_else(|| str_at(&body, "/okapiToken"))
                    .ok_or_else(|| PortalError::ils("ReShare login response had no token"))
            })
            .await
    }
}

#[async_trait]
impl RequestSourceClient for ReshareClient {
    fn source(&self) -> RequestSource {
        RequestSource::Reshare
    }

    async fn requests_for(&self, patron: &Patron) -> Result<Vec<Request>> {
        let Some(barcode) = patron.barcode.as_deref() else {
            return Ok(Vec::new());
        };

        let token = self.okapi_token().await?;
        let response = self
            .client
            .get(self.url("/rs/patronrequests"))
            .query(&[
                ("match", "patronIdentifier"),
                ("term", barcode),
                ("perPage", "100"),
            ])
            .header("X-Okapi-Tenant", &self.config.tenant)
            .header("X-Okapi-Token", token.as_str())
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        if status == StatusCode::UNAUTHORIZED {
            self.token.invalidate().await;
        }
        if !status.is_success() {
            return Err(PortalError::ils(
                error_message(&body).unwrap_or_else(|| format!("ReShare query returned {}", status)),
            ));
        }

        Ok(parse_requests(&body, &patron.key, self.config.manage_url.as_deref()))
    }
}

pub fn parse_requests(body: &Value, patron_key: &str, manage_url: Option<&str>) -> Vec<Request> {
    body.as_array()
        .into_iter()
        .flatten()
        .filter(|record| bool_at(record, "/isRequester"))
        .filter(|record| {
            let state = str_at(record, "/state/code").unwrap_or_default();
            !TERMINAL_STATES.contains(&state.as_str())
        })
        .map(|record| {
            let state = str_at(record, "/state/code").unwrap_or_default();
            let mut request = Request::new(
                str_at(record, "/hrid")
                    .or_else(|| str_at(record, "/id"))
                    .unwrap_or_default(),
                RequestSource::Reshare,
                str_at(record, "/title").unwrap_or_default(),
            );
            request.patron_key = patron_key.to_string();
            request.author = str_at(record, "/author");
            request.ready = state == "REQ_RECEIVED";
            request.status = state_label(&state).to_string();
            request.pickup_library = str_at(record, "/pickupLocationSlug")
                .or_else(|| str_at(record, "/pickupLocation"));
            request.placed_date = date_at(record, "/dateCreated");
            request.fill_by_date = date_at(record, "/neededBy");
            request.manage_url = manage_url.map(str::to_string);
            request
        })
        .collect()
}

fn state_label(state: &str) -> &'static str {
    match state {
        "REQ_IDLE" | "REQ_VALIDATED" | "REQ_SOURCING_ITEM" | "REQ_SUPPLIER_IDENTIFIED"
        | "REQ_REQUEST_SENT_TO_SUPPLIER" | "REQ_CONDITIONAL_ANSWER_RECEIVED" => "In process",
        "REQ_EXPECTS_TO_SUPPLY" => "Expected to ship",
        "REQ_SHIPPED" => "Shipped",
        "REQ_RECEIVED" => "Received",
        "REQ_UNFILLED" => "Unfilled",
        _ => "Requested",
    }
}
