use crate::adapters::cache::TtlCache;
use crate::adapters::http::{bool_at, build_client, error_message, parse_datetime, read_json, str_at, u32_at};
use crate::config::toml_config::FolioConfig;
use crate::domain::checkout::{Checkout, LoanPolicy, Renewals};
use crate::domain::fine::{Fine, Payment};
use crate::domain::group::{Group, GroupMember};
use crate::domain::money::{amount_from_json, to_gateway_amount};
use crate::domain::patron::{Patron, Role, Standing};
use crate::domain::pickup::PickupLibraries;
use crate::domain::ports::{IlsClient, RenewalOutcome};
use crate::domain::request::{Request, RequestSource};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

const TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

const PATRON_QUERY: &str = r#"
query PatronInfo($id: UUID!) {
  patron(id: $id) {
    user {
      id barcode username active expirationDate
      personal { firstName lastName preferredFirstName email }
      patronGroup { group }
      blocks { message blockBorrowing blockRequests }
      manualBlocks { desc borrowing requests }
      proxiesOf { userId proxyUserId proxyUser { personal { firstName lastName preferredFirstName } } }
      proxiesFor { userId proxyUserId }
    }
    loans {
      id userId proxyUserId loanDate dueDate claimedReturnedDate
      dueDateChangedByRecall renewalCount loanPolicyId overdue
      feesAndFines { amountRemainingToPay }
      item {
        id barcode title instanceId queueTotalLength
        status { name }
        materialType { name }
        effectiveLocation { code name library { code } }
        effectiveCallNumberComponents { callNumber }
        contributors { name }
      }
    }
    holds {
      id requesterId proxyUserId requestType status position queueTotalLength
      requestDate requestExpirationDate holdShelfExpirationDate awaitingPickupRequestClosedDate
      patronComments
      pickupServicePoint { code name }
      item { itemId barcode title instanceId callNumber effectiveLocation { code name library { code } } }
      instance { title contributors { name } }
    }
    accounts {
      id userId loanId feeFineType amount remaining title barcode
      status { name }
      paymentStatus { name }
      metadata { createdDate updatedDate }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct PatronData {
    patron: Option<FolioPatron>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolioPatron {
    pub user: FolioUser,
    #[serde(default)]
    pub loans: Vec<FolioLoan>,
    #[serde(default)]
    pub holds: Vec<FolioHold>,
    #[serde(default)]
    pub accounts: Vec<FolioAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolioUser {
    pub id: String,
    pub barcode: Option<String>,
    pub username: Option<String>,
    pub active: Option<bool>,
    pub expiration_date: Option<String>,
    pub personal: Option<Personal>,
    pub patron_group: Option<PatronGroup>,
    #[serde(default)]
    pub blocks: Vec<AutomatedBlock>,
    #[serde(default)]
    pub manual_blocks: Vec<ManualBlock>,
    #[serde(default)]
    pub proxies_of: Vec<ProxyRecord>,
    #[serde(default)]
    pub proxies_for: Vec<ProxyRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personal {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub preferred_first_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatronGroup {
    pub group: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedBlock {
    pub message: Option<String>,
    #[serde(default)]
    pub block_borrowing: bool,
    #[serde(default)]
    pub block_requests: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualBlock {
    pub desc: Option<String>,
    #[serde(default)]
    pub borrowing: bool,
    #[serde(default)]
    pub requests: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRecord {
    pub user_id: String,
    pub proxy_user_id: String,
    pub proxy_user: Option<ProxyUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyUser {
    pub personal: Option<Personal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FolioLocation {
    pub code: Option<String>,
    pub name: Option<String>,
    pub library: Option<LibraryRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRef {
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolioLoan {
    pub id: String,
    pub user_id: Option<String>,
    pub proxy_user_id: Option<String>,
    pub loan_date: Option<String>,
    pub due_date: Option<String>,
    pub claimed_returned_date: Option<String>,
    #[serde(default)]
    pub due_date_changed_by_recall: Option<bool>,
    pub renewal_count: Option<u32>,
    pub loan_policy_id: Option<String>,
    pub overdue: Option<bool>,
    pub fees_and_fines: Option<FeesAndFines>,
    pub item: Option<FolioItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesAndFines {
    pub amount_remaining_to_pay: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolioItem {
    pub id: String,
    pub barcode: Option<String>,
    pub title: Option<String>,
    pub instance_id: Option<String>,
    pub queue_total_length: Option<u32>,
    pub status: Option<Named>,
    pub material_type: Option<Named>,
    pub effective_location: Option<FolioLocation>,
    pub effective_call_number_components: Option<CallNumberComponents>,
    #[serde(default)]
    pub contributors: Vec<Named>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNumberComponents {
    pub call_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolioHold {
    pub id: String,
    pub requester_id: Option<String>,
    pub proxy_user_id: Option<String>,
    pub request_type: Option<String>,
    pub status: Option<String>,
    pub position: Option<u32>,
    pub queue_total_length: Option<u32>,
    pub request_date: Option<String>,
    pub request_expiration_date: Option<String>,
    pub hold_shelf_expiration_date: Option<String>,
    pub awaiting_pickup_request_closed_date: Option<String>,
    pub patron_comments: Option<String>,
    pub pickup_service_point: Option<ServicePointRef>,
    pub item: Option<HoldItem>,
    pub instance: Option<HoldInstance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicePointRef {
    pub code: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldItem {
    pub item_id: Option<String>,
    pub barcode: Option<String>,
    pub title: Option<String>,
    pub instance_id: Option<String>,
    pub call_number: Option<String>,
    pub effective_location: Option<FolioLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoldInstance {
    pub title: Option<String>,
    #[serde(default)]
    pub contributors: Vec<Named>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolioAccount {
    pub id: String,
    pub user_id: Option<String>,
    pub loan_id: Option<String>,
    pub fee_fine_type: Option<String>,
    pub amount: Option<Value>,
    pub remaining: Option<Value>,
    pub title: Option<String>,
    pub barcode: Option<String>,
    pub status: Option<Named>,
    pub payment_status: Option<Named>,
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub created_date: Option<String>,
    pub updated_date: Option<String>,
}

/// Loan policy fields the portal needs, keyed by policy id.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRules {
    pub policy: LoanPolicy,
    /// `None` when renewals are unlimited.
    pub renewals_allowed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServicePoint {
    pub id: String,
    pub code: String,
    pub name: String,
}

pub struct FolioClient {
    config: FolioConfig,
    pickup: PickupLibraries,
    client: Client,
    token: TtlCache<String>,
    loan_policies: TtlCache<HashMap<String, PolicyRules>>,
    service_points: TtlCache<Vec<ServicePoint>>,
}

impl FolioClient {
    pub fn new(config: FolioConfig, pickup: PickupLibraries, reference_ttl: Duration) -> Result<Self> {
        let client = build_client(config.timeout_seconds)?;
        Ok(Self {
            config,
            pickup,
            client,
            token: TtlCache::new(TOKEN_TTL),
            loan_policies: TtlCache::new(reference_ttl),
            service_points: TtlCache::new(reference_ttl),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.okapi_url.trim_end_matches('/'), path)
    }

    async fn okapi_token(&self) -> Result<Arc<String>> {
        self.token
            .get_or_try_insert(|| async {
                tracing::debug!("Logging in to Okapi as {}", self.config.username);
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
                let header_token = response
                    .headers()
                    .get("x-okapi-token")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let (status, body) = read_json(response).await?;
                if !status.is_success() {
                    return Err(PortalError::Authentication {
                        message: error_message(&body)
                            .unwrap_or_else(|| format!("Okapi login returned {}", status)),
                    });
                }
                header_token
                    .or_else(|| str_at(&body, "/okapiToken"))
                    .ok_or_else(|| PortalError::ils("Okapi login response had no token"))
            })
            .await
    }

    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Value)> {
        let token = self.okapi_token().await?;
        let response = request
            .header("X-Okapi-Tenant", &self.config.tenant)
            .header("X-Okapi-Token", token.as_str())
            .header("Accept", "application/json")
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        if status == StatusCode::UNAUTHORIZED {
            self.token.invalidate().await;
            return Err(PortalError::ils("Okapi token expired"));
        }
        Ok((status, body))
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!("FOLIO GET {}", path);
        let (status, body) = self.send(self.client.get(self.url(path)).query(query)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(PortalError::NotFound {
                what: "record".to_string(),
                key: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(PortalError::ils(
                error_message(&body).unwrap_or_else(|| format!("GET {} returned {}", path, status)),
            ));
        }
        Ok(body)
    }

    async fn fetch_patron(&self, user_id: &str) -> Result<FolioPatron> {
        tracing::debug!("FOLIO GraphQL patron query for {}", user_id);
        let (status, body) = self
            .send(self.client.post(&self.config.graphql_url).json(&json!({
                "query": PATRON_QUERY,
                "variables": { "id": user_id },
            })))
            .await?;
        if !status.is_success() {
            return Err(PortalError::ils(
                error_message(&body).unwrap_or_else(|| format!("GraphQL returned {}", status)),
            ));
        }

        let response: GraphQlResponse<PatronData> = serde_json::from_value(body)?;
        if let Some(error) = response.errors.first() {
            return Err(PortalError::ils(error.message.clone()));
        }
        response
            .data
            .and_then(|d| d.patron)
            .ok_or_else(|| PortalError::NotFound {
                what: "patron".to_string(),
                key: user_id.to_string(),
            })
    }

    async fn policies(&self) -> Result<Arc<HashMap<String, PolicyRules>>> {
        self.loan_policies
            .get_or_try_insert(|| async {
                let body = self
                    .get_json("/loan-policy-storage/loan-policies", &[("limit", "2000")])
                    .await?;
                let policies = body
                    .pointer("/loanPolicies")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().filter_map(parse_loan_policy).collect())
                    .unwrap_or_default();
                Ok(policies)
            })
            .await
    }

    async fn pickup_service_points(&self) -> Result<Arc<Vec<ServicePoint>>> {
        self.service_points
            .get_or_try_insert(|| async {
                let body = self
                    .get_json(
                        "/service-points",
                        &[("query", "pickupLocation==true"), ("limit", "2000")],
                    )
                    .await?;
                Ok(body
                    .pointer("/servicepoints")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().filter_map(parse_service_point).collect())
                    .unwrap_or_default())
            })
            .await
    }

    async fn user_id_by(&self, index: &str, value: &str) -> Result<String> {
        let query = format!("{}==\"{}\"", index, value);
        let body = self
            .get_json("/users", &[("query", query.as_str()), ("limit", "1")])
            .await?;
        str_at(&body, "/users/0/id").ok_or_else(|| PortalError::NotFound {
            what: "patron".to_string(),
            key: value.to_string(),
        })
    }

    async fn update_request<F>(&self, request: &Request, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Value) + Send,
    {
        let path = format!("/circulation/requests/{}", request.key);
        let mut record = self.get_json(&path, &[]).await?;
        edit(&mut record);
        let (status, body) = self.send(self.client.put(self.url(&path)).json(&record)).await?;
        if !status.is_success() {
            return Err(PortalError::Request {
                message: error_message(&body)
                    .unwrap_or_else(|| format!("request update returned {}", status)),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IlsClient for FolioClient {
    fn name(&self) -> &'static str {
        "folio"
    }

    async fn authenticate(&self, library_id: &str, pin: &str) -> Result<String> {
        let user_id = self.user_id_by("barcode", library_id).await.map_err(|e| match e {
            PortalError::NotFound { .. } => PortalError::Authentication {
                message: "unknown library ID".to_string(),
            },
            other => other,
        })?;
        let (status, _) = self
            .send(
                self.client
                    .post(self.url("/patron-pin/verify"))
                    .json(&json!({ "id": user_id, "pin": pin })),
            )
            .await?;
        if !status.is_success() {
            return Err(PortalError::Authentication {
                message: "invalid library ID or PIN".to_string(),
            });
        }
        Ok(user_id)
    }

    async fn find_patron_by_university_id(&self, university_id: &str) -> Result<String> {
        self.user_id_by("externalSystemId", university_id).await
    }

    async fn patron_info(&self, patron_key: &str) -> Result<Patron> {
        let policies = self.policies().await?;
        let data = self.fetch_patron(patron_key).await?;
        let sponsor_id = data.user.proxies_for.first().map(|p| p.user_id.clone());
        let mut patron = build_patron(data, &policies);

        // proxy-borrowed items live on the sponsor's account
        if let Some(sponsor_id) = sponsor_id {
            let sponsor = build_patron(self.fetch_patron(&sponsor_id).await?, &policies);
            patron.sponsor_standing = Some(sponsor.status(Utc::now()));
            if let Some(group) = &sponsor.group {
                let key = patron.key.clone();
                patron.checkouts.extend(group.checkouts.iter().filter(|c| c.patron_key == key).cloned());
                patron.requests.extend(group.requests.iter().filter(|r| r.patron_key == key).cloned());
            }
            patron.group = sponsor.group;
        }

        tracing::info!(
            "Loaded FOLIO patron {} ({} checkouts, {} requests, {} fines)",
            patron.key,
            patron.checkouts.len(),
            patron.requests.len(),
            patron.fines.len()
        );
        Ok(patron)
    }

    async fn renew(&self, patron: &Patron, checkout: &Checkout) -> Result<RenewalOutcome> {
        // proxy and group loans are owned by the sponsor
        let own_loan = patron.role() != Role::Proxy
            && patron.checkouts.iter().any(|c| c.key == checkout.key);
        let owner = if own_loan {
            patron.key.as_str()
        } else {
            patron
                .group
                .as_ref()
                .and_then(|g| g.sponsor_key.as_deref())
                .unwrap_or(patron.key.as_str())
        };
        tracing::debug!("Renewing item {} for {}", checkout.item_key, owner);

        let (status, body) = self
            .send(
                self.client
                    .post(self.url("/circulation/renew-by-id"))
                    .json(&json!({ "itemId": checkout.item_key, "userId": owner })),
            )
            .await?;
        if !status.is_success() {
            return Err(PortalError::Checkout {
                message: error_message(&body).unwrap_or_else(|| format!("renew returned {}", status)),
            });
        }
        Ok(RenewalOutcome {
            item_key: checkout.item_key.clone(),
            new_due_date: str_at(&body, "/dueDate").and_then(|d| parse_datetime(&d)),
        })
    }

    async fn cancel_request(&self, patron: &Patron, request: &Request) -> Result<()> {
        let path = format!("/patron/account/{}/hold/{}/cancel", patron.key, request.key);
        let (status, body) = self
            .send(self.client.post(self.url(&path)).json(&json!({
                "holdId": request.key,
                "cancellationReasonId": self.config.cancel_reason_id,
                "canceledByUserId": patron.key,
                "canceledDate": Utc::now().to_rfc3339(),
            })))
            .await?;
        if !status.is_success() {
            return Err(PortalError::Request {
                message: error_message(&body).unwrap_or_else(|| format!("cancel returned {}", status)),
            });
        }
        Ok(())
    }

    async fn change_pickup_library(&self, request: &Request, library_code: &str) -> Result<()> {
        let points = self.pickup_service_points().await?;
        let point = points
            .iter()
            .find(|sp| sp.code == library_code)
            .ok_or_else(|| PortalError::PickupNotAllowed {
                library: library_code.to_string(),
            })?;
        let service_point_id = point.id.clone();
        self.update_request(request, move |record| {
            record["pickupServicePointId"] = json!(service_point_id);
        })
        .await
    }

    async fn change_not_needed_after(&self, request: &Request, date: NaiveDate) -> Result<()> {
        let expires = format!("{}T23:59:59.000+00:00", date.format("%Y-%m-%d"));
        self.update_request(request, move |record| {
            record["requestExpirationDate"] = json!(expires);
        })
        .await
    }

    async fn record_payment(&self, patron_key: &str, amount: Decimal, session_id: &str) -> Result<()> {
        let query = format!("(userId=={} and status.name==Open)", patron_key);
        let body = self
            .get_json("/accounts", &[("query", query.as_str()), ("limit", "100")])
            .await?;
        let account_ids: Vec<String> = body
            .pointer("/accounts")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|a| str_at(a, "/id")).collect())
            .unwrap_or_default();
        if account_ids.is_empty() {
            tracing::warn!("No open accounts for {} while recording payment {}", patron_key, session_id);
            return Ok(());
        }

        let (status, body) = self
            .send(self.client.post(self.url("/accounts-bulk/pay")).json(&json!({
                "accountIds": account_ids,
                "amount": to_gateway_amount(amount),
                "paymentMethod": "Credit card",
                "servicePointId": self.config.payment_service_point_id,
                "userName": self.config.username,
                "transactionInfo": session_id,
                "notifyPatron": true,
            })))
            .await?;
        if !status.is_success() {
            return Err(PortalError::ils(
                error_message(&body).unwrap_or_else(|| format!("bulk pay returned {}", status)),
            ));
        }
        tracing::info!("✅ Recorded payment of {} for {} (session {})", amount, patron_key, session_id);
        Ok(())
    }

    async fn pickup_libraries(&self) -> Result<PickupLibraries> {
        let points = self.pickup_service_points().await?;
        let mut pickup = self.pickup.clone();
        pickup.merge_labels(points.iter().map(|sp| (sp.code.clone(), sp.name.clone())));
        Ok(pickup)
    }
}

pub fn parse_loan_policy(record: &Value) -> Option<(String, PolicyRules)> {
    let id = str_at(record, "/id")?;
    let name = str_at(record, "/name").unwrap_or_default();
    let interval = str_at(record, "/loansPolicy/period/intervalId").unwrap_or_default();
    let renewals_allowed = if bool_at(record, "/renewalsPolicy/unlimited") {
        None
    } else {
        Some(u32_at(record, "/renewalsPolicy/numberAllowed").unwrap_or(0))
    };
    let renew_items_with_request = match record.pointer("/requestManagement/holds/renewItemsWithRequest") {
        Some(Value::Bool(b)) => *b,
        _ => true,
    };

    let policy = LoanPolicy {
        renewable: bool_at(record, "/renewable"),
        renew_from_days: None,
        renew_items_with_request,
        short_term: matches!(interval.as_str(), "Hours" | "Minutes"),
        name,
    };
    Some((id, PolicyRules { policy, renewals_allowed }))
}

fn parse_service_point(record: &Value) -> Option<ServicePoint> {
    Some(ServicePoint {
        id: str_at(record, "/id")?,
        code: str_at(record, "/code")?,
        name: str_at(record, "/discoveryDisplayName")
            .or_else(|| str_at(record, "/name"))
            .unwrap_or_default(),
    })
}

fn date(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().and_then(parse_datetime)
}

fn personal_name(personal: Option<&Personal>) -> (String, String, Option<String>) {
    let personal = personal.cloned().unwrap_or_default();
    (
        personal.first_name.unwrap_or_default(),
        personal.last_name.unwrap_or_default(),
        personal.preferred_first_name,
    )
}

fn standing(user: &FolioUser) -> Standing {
    let barred = user
        .manual_blocks
        .iter()
        .any(|b| b.desc.as_deref().is_some_and(|d| d.to_ascii_lowercase().contains("barred")));
    if barred {
        return Standing::Barred;
    }
    let blocked = user.blocks.iter().any(|b| b.block_borrowing || b.block_requests)
        || user.manual_blocks.iter().any(|b| b.borrowing || b.requests);
    if blocked {
        return Standing::Blocked;
    }
    if user.active == Some(false) {
        return Standing::Expired;
    }
    Standing::Ok
}

pub fn parse_loan(loan: &FolioLoan, patron_key: &str, policies: &HashMap<String, PolicyRules>) -> Checkout {
    let item = loan.item.as_ref();
    let mut checkout = Checkout::new(
        loan.id.clone(),
        item.map(|i| i.id.clone()).unwrap_or_default(),
        item.and_then(|i| i.title.clone()).unwrap_or_default(),
    );
    let item_status = item
        .and_then(|i| i.status.as_ref())
        .and_then(|s| s.name.clone())
        .unwrap_or_default();
    let location = item.and_then(|i| i.effective_location.as_ref());
    let rules = loan.loan_policy_id.as_ref().and_then(|id| policies.get(id));
    let renewal_count = loan.renewal_count.unwrap_or(0);

    checkout.patron_key = patron_key.to_string();
    checkout.barcode = item.and_then(|i| i.barcode.clone());
    checkout.catalog_key = item.and_then(|i| i.instance_id.clone());
    checkout.author = item.and_then(|i| i.contributors.first()).and_then(|c| c.name.clone());
    checkout.call_number = item
        .and_then(|i| i.effective_call_number_components.as_ref())
        .and_then(|c| c.call_number.clone());
    checkout.library = location.and_then(|l| l.library.as_ref()).and_then(|l| l.code.clone());
    checkout.location = location.and_then(|l| l.code.clone());
    checkout.checkout_date = date(&loan.loan_date);
    checkout.due_date = date(&loan.due_date);
    if loan.due_date_changed_by_recall == Some(true) {
        checkout.recall_due_date = checkout.due_date;
    }
    let loan_date = checkout.checkout_date;
    checkout.claims_returned_date = date(&loan.claimed_returned_date)
        .or_else(|| (item_status == "Claimed returned").then_some(loan_date).flatten());
    checkout.lost = matches!(item_status.as_str(), "Aged to lost" | "Declared lost");
    checkout.overdue_flag = loan.overdue.unwrap_or(false);
    checkout.accrued = amount_from_json(
        loan.fees_and_fines
            .as_ref()
            .and_then(|f| f.amount_remaining_to_pay.as_ref()),
    );
    checkout.hold_queue_length = item.and_then(|i| i.queue_total_length).unwrap_or(0);
    checkout.renewal_count = renewal_count;
    checkout.unseen_renewals_remaining = Renewals::Unlimited;
    checkout.seen_renewals_remaining =
        Renewals::from_allowance(rules.and_then(|r| r.renewals_allowed), renewal_count);
    if let Some(rules) = rules {
        checkout.policy = rules.policy.clone();
        if rules.renewals_allowed.is_none() {
            checkout.seen_renewals_remaining = Renewals::Unlimited;
        }
    }
    checkout.reserve = checkout.policy.name.to_ascii_lowercase().contains("reserve")
        || checkout.location.as_deref().is_some_and(|l| l.contains("RESV"));
    checkout
}

pub fn parse_hold(hold: &FolioHold, patron_key: &str) -> Request {
    let title = hold
        .instance
        .as_ref()
        .and_then(|i| i.title.clone())
        .or_else(|| hold.item.as_ref().and_then(|i| i.title.clone()))
        .unwrap_or_default();
    let status = hold.status.clone().unwrap_or_default();
    let mut request = Request::new(hold.id.clone(), RequestSource::Ils, title);

    request.patron_key = patron_key.to_string();
    request.ready = status == "Open - Awaiting pickup";
    request.status = status
        .split_once(" - ")
        .map(|(_, detail)| detail.to_string())
        .unwrap_or(status.clone());
    request.author = hold
        .instance
        .as_ref()
        .and_then(|i| i.contributors.first())
        .and_then(|c| c.name.clone());
    request.catalog_key = hold.item.as_ref().and_then(|i| i.instance_id.clone());
    request.item_key = hold.item.as_ref().and_then(|i| i.item_id.clone());
    request.call_number = hold.item.as_ref().and_then(|i| i.call_number.clone());
    request.item_location = hold
        .item
        .as_ref()
        .and_then(|i| i.effective_location.as_ref())
        .and_then(|l| l.code.clone());
    request.queue_position = hold.position;
    request.queue_length = hold.queue_total_length;
    request.pickup_library = hold.pickup_service_point.as_ref().and_then(|sp| sp.code.clone());
    request.placed_date = date(&hold.request_date);
    request.fill_by_date = date(&hold.request_expiration_date);
    request.expiration_date = date(&hold.hold_shelf_expiration_date);
    request.waiting_date = date(&hold.awaiting_pickup_request_closed_date);
    request.comment = hold.patron_comments.clone();
    request
}

fn account_open(account: &FolioAccount) -> bool {
    account
        .status
        .as_ref()
        .and_then(|s| s.name.as_deref())
        .map_or(true, |s| s.eq_ignore_ascii_case("open"))
}

pub fn parse_fine(account: &FolioAccount, patron_key: &str) -> Fine {
    let mut fine = Fine::new(
        account.id.clone(),
        account.fee_fine_type.clone().unwrap_or_default(),
        amount_from_json(account.remaining.as_ref()),
    );
    fine.patron_key = patron_key.to_string();
    fine.fee = amount_from_json(account.amount.as_ref()).max(fine.owed);
    fine.bill_date = account.metadata.as_ref().and_then(|m| date(&m.created_date));
    fine.title = account.title.clone();
    fine.barcode = account.barcode.clone();
    fine.loan_key = account.loan_id.clone();
    fine
}

pub fn parse_payment(account: &FolioAccount, patron_key: &str) -> Payment {
    let metadata = account.metadata.as_ref();
    Payment {
        key: account.id.clone(),
        patron_key: patron_key.to_string(),
        description: account.fee_fine_type.clone().unwrap_or_default(),
        amount: amount_from_json(account.amount.as_ref()),
        bill_date: metadata.and_then(|m| date(&m.created_date)),
        payment_date: metadata.and_then(|m| date(&m.updated_date)),
        method: None,
        resolution: account
            .payment_status
            .as_ref()
            .and_then(|s| s.name.clone())
            .unwrap_or_else(|| "Closed".to_string()),
        title: account.title.clone(),
    }
}

/// Turns one GraphQL patron into the domain model. Items a proxy borrowed on
/// this patron's account become the group's items, keyed by the proxy.
pub fn build_patron(data: FolioPatron, policies: &HashMap<String, PolicyRules>) -> Patron {
    let user = &data.user;
    let (first, last, preferred) = personal_name(user.personal.as_ref());
    let mut patron = Patron::new(user.id.clone(), first, last);
    patron.barcode = user.barcode.clone();
    patron.username = user.username.clone();
    patron.preferred_name = preferred;
    patron.email = user.personal.as_ref().and_then(|p| p.email.clone());
    patron.patron_type = user.patron_group.as_ref().and_then(|g| g.group.clone());
    patron.standing = standing(user);
    patron.expires_at = date(&user.expiration_date);
    patron.sponsor = !user.proxies_of.is_empty();
    patron.proxy = !user.proxies_for.is_empty();

    let mut group = Group::default();
    let mut proxy_loans: HashMap<&str, &str> = HashMap::new();

    for loan in &data.loans {
        match loan.proxy_user_id.as_deref() {
            Some(proxy) => {
                proxy_loans.insert(loan.id.as_str(), proxy);
                group.checkouts.push(parse_loan(loan, proxy, policies));
            }
            None => patron.checkouts.push(parse_loan(loan, &user.id, policies)),
        }
    }

    for hold in &data.holds {
        match hold.proxy_user_id.as_deref() {
            Some(proxy) => group.requests.push(parse_hold(hold, proxy)),
            None => patron.requests.push(parse_hold(hold, &user.id)),
        }
    }

    for account in &data.accounts {
        let proxy = account
            .loan_id
            .as_deref()
            .and_then(|loan| proxy_loans.get(loan).copied());
        let open = account_open(account);
        match (proxy, open) {
            (Some(proxy), true) => group.fines.push(parse_fine(account, proxy)),
            (Some(proxy), false) => group.payments.push(parse_payment(account, proxy)),
            (None, true) => patron.fines.push(parse_fine(account, &user.id)),
            (None, false) => patron.payments.push(parse_payment(account, &user.id)),
        }
    }

    if patron.sponsor {
        group.sponsor_key = Some(user.id.clone());
        group.members.push(GroupMember {
            key: user.id.clone(),
            name: patron.display_name(),
            sponsor: true,
        });
        let mut seen = HashSet::new();
        for record in user.proxies_of.iter().filter(|r| seen.insert(r.proxy_user_id.clone())) {
            let mut member = Patron::new(record.proxy_user_id.clone(), "", "");
            let (first, last, preferred) =
                personal_name(record.proxy_user.as_ref().and_then(|u| u.personal.as_ref()));
            member.first_name = first;
            member.last_name = last;
            member.preferred_name = preferred;
            group.members.push(GroupMember {
                key: record.proxy_user_id.clone(),
                name: member.display_name(),
                sponsor: false,
            });
        }
        patron.group = Some(group);
    } else if !group.checkouts.is_empty() || !group.requests.is_empty() {
        tracing::warn!("Patron {} has proxy loans but no proxies on record", user.id);
        patron.group = Some(group);
    }

    patron
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::group::View;
    use crate::domain::patron::Role;
    use crate::domain::renewal::NonRenewableReason;
    use chrono::TimeZone;

    fn policies() -> HashMap<String, PolicyRules> {
        let records = json!([
            {
                "id": "policy-1",
                "name": "Standard loan",
                "renewable": true,
                "loansPolicy": {"period": {"duration": 28, "intervalId": "Days"}},
                "renewalsPolicy": {"unlimited": false, "numberAllowed": 3},
                "requestManagement": {"holds": {"renewItemsWithRequest": false}}
            },
            {
                "id": "policy-2",
                "name": "Course reserve 2 hour",
                "renewable": false,
                "loansPolicy": {"period": {"duration": 2, "intervalId": "Hours"}},
                "renewalsPolicy": {"unlimited": true}
            }
        ]);
        records
            .as_array()
            .unwrap()
            .iter()
            .filter_map(parse_loan_policy)
            .collect()
    }

    fn fixture() -> FolioPatron {
        serde_json::from_value(json!({
            "user": {
                "id": "sponsor-1",
                "barcode": "2550001",
                "username": "prof",
                "active": true,
                "expirationDate": "2030-01-01T00:00:00.000+00:00",
                "personal": {"firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.edu"},
                "patronGroup": {"group": "faculty"},
                "blocks": [],
                "manualBlocks": [],
                "proxiesOf": [
                    {"userId": "sponsor-1", "proxyUserId": "proxy-1",
                     "proxyUser": {"personal": {"firstName": "Grad", "lastName": "Student"}}}
                ],
                "proxiesFor": []
            },
            "loans": [
                {
                    "id": "loan-own",
                    "userId": "sponsor-1",
                    "dueDate": "2024-06-01T23:59:59.000+00:00",
                    "renewalCount": 3,
                    "loanPolicyId": "policy-1",
                    "item": {"id": "item-1", "title": "Own Book", "status": {"name": "Checked out"},
                             "effectiveLocation": {"code": "GRE-STACKS", "library": {"code": "GREEN"}}}
                },
                {
                    "id": "loan-proxy",
                    "userId": "sponsor-1",
                    "proxyUserId": "proxy-1",
                    "dueDate": "2024-06-01T23:59:59.000+00:00",
                    "loanPolicyId": "policy-1",
                    "item": {"id": "item-2", "title": "Proxy Book", "status": {"name": "Declared lost"}}
                }
            ],
            "holds": [
                {"id": "hold-1", "status": "Open - Awaiting pickup", "position": 1,
                 "pickupServicePoint": {"code": "GREEN-LOAN"},
                 "instance": {"title": "Held", "contributors": [{"name": "Author, A."}]}},
                {"id": "hold-2", "proxyUserId": "proxy-1", "status": "Open - Not yet filled",
                 "instance": {"title": "Proxy Hold"}}
            ],
            "accounts": [
                {"id": "acct-own", "feeFineType": "Overdue fine", "amount": 5.0, "remaining": 5.0,
                 "status": {"name": "Open"}},
                {"id": "acct-proxy", "loanId": "loan-proxy", "feeFineType": "Lost item fee",
                 "amount": 100.0, "remaining": 60.0, "status": {"name": "Open"}},
                {"id": "acct-paid", "feeFineType": "Overdue fine", "amount": 2.0, "remaining": 0.0,
                 "status": {"name": "Closed"}, "paymentStatus": {"name": "Paid fully"}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_loan_policy() {
        let policies = policies();
        assert_eq!(policies["policy-1"].renewals_allowed, Some(3));
        assert!(!policies["policy-1"].policy.renew_items_with_request);
        assert!(policies["policy-2"].policy.short_term);
        assert_eq!(policies["policy-2"].renewals_allowed, None);
    }

    #[test]
    fn test_sponsor_group_split() {
        let patron = build_patron(fixture(), &policies());
        assert_eq!(patron.role(), Role::Sponsor);
        assert_eq!(patron.checkouts.len(), 1);
        assert_eq!(patron.requests.len(), 1);
        assert_eq!(patron.fines.len(), 1);
        assert_eq!(patron.payments.len(), 1);
        assert_eq!(patron.payments[0].resolution, "Paid fully");

        let group = patron.group.as_ref().unwrap();
        assert_eq!(group.checkouts[0].patron_key, "proxy-1");
        assert_eq!(group.requests[0].patron_key, "proxy-1");
        assert_eq!(group.fines[0].owed, Decimal::new(60, 0));
        assert_eq!(group.member_name("proxy-1"), Some("Grad Student"));
        assert_eq!(patron.visible_fines(View::Group).len(), 1);
    }

    #[test]
    fn test_loan_renewability() {
        let patron = build_patron(fixture(), &policies());
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap();

        let own = &patron.checkouts[0];
        assert_eq!(own.seen_renewals_remaining, Renewals::Remaining(0));
        assert_eq!(own.unseen_renewals_remaining, Renewals::Unlimited);
        assert_eq!(own.library.as_deref(), Some("GREEN"));
        assert_eq!(own.non_renewable_reason(now), Some(NonRenewableReason::NoRenewals));

        let proxy = &patron.group.as_ref().unwrap().checkouts[0];
        assert_eq!(proxy.non_renewable_reason(now), Some(NonRenewableReason::Lost));
    }

    #[test]
    fn test_hold_status_and_pickup() {
        let patron = build_patron(fixture(), &policies());
        let hold = &patron.requests[0];
        assert!(hold.ready_for_pickup());
        assert_eq!(hold.status, "Awaiting pickup");
        assert_eq!(hold.pickup_library.as_deref(), Some("GREEN-LOAN"));
        assert_eq!(hold.author.as_deref(), Some("Author, A."));
    }

    #[test]
    fn test_blocks_map_to_standing() {
        let mut data = fixture();
        data.user.manual_blocks.push(ManualBlock {
            desc: Some("Patron barred by circulation".to_string()),
            borrowing: true,
            requests: true,
        });
        assert_eq!(build_patron(data.clone(), &policies()).standing, Standing::Barred);

        data.user.manual_blocks.clear();
        data.user.blocks.push(AutomatedBlock {
            message: Some("Maximum number of overdue items".to_string()),
            block_borrowing: true,
            block_requests: false,
        });
        assert_eq!(build_patron(data, &policies()).standing, Standing::Blocked);
    }

    #[test]
    fn test_recalled_loan_with_queue() {
        let loan: FolioLoan = serde_json::from_value(json!({
            "id": "loan-r",
            "dueDate": "2024-06-01T23:59:59.000+00:00",
            "dueDateChangedByRecall": true,
            "loanPolicyId": "policy-1",
            "item": {"id": "item-r", "title": "Recalled", "queueTotalLength": 2}
        }))
        .unwrap();
        let checkout = parse_loan(&loan, "p1", &policies());
        assert!(checkout.recalled());
        assert_eq!(checkout.recall_due_date, checkout.due_date);
    }
}
