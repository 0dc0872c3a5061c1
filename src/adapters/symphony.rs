use crate::adapters::cache::TtlCache;
use crate::adapters::http::{
    bool_at, build_client, date_at, error_message, read_json, str_at, u32_at,
};
use crate::config::toml_config::SymphonyConfig;
use crate::domain::checkout::{Checkout, LoanPolicy, Renewals};
use crate::domain::fine::{Fine, Payment};
use crate::domain::group::{Group, GroupMember};
use crate::domain::money::amount_from_json;
use crate::domain::patron::{Patron, Standing};
use crate::domain::pickup::PickupLibraries;
use crate::domain::ports::{IlsClient, RenewalOutcome};
use crate::domain::request::{Request, RequestSource};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const SESSION_TTL: Duration = Duration::from_secs(30 * 60);

const CIRC_RECORD_FIELDS: &str = "circRecordList{*,circulationRule{*},library{key},item{key,barcode,itemType{key},currentLocation{key},holdRecordList{key},call{dispCallNumber},bib{key,title,author}}}";
const BLOCK_FIELDS: &str = "blockList{*,item{barcode,bib{title,author}}}";
const HOLD_FIELDS: &str = "holdRecordList{*,item{key,currentLocation{key},call{dispCallNumber}},bib{key,title,author}}";
const PATRON_FIELDS: &str = "key,firstName,lastName,middleName,preferredName,barcode,alternateID,standing,privilegeExpiresDate,profile{key},address1";

pub struct SymphonyClient {
    config: SymphonyConfig,
    pickup: PickupLibraries,
    client: Client,
    session: TtlCache<String>,
    libraries: TtlCache<Vec<(String, String)>>,
}

impl SymphonyClient {
    pub fn new(config: SymphonyConfig, pickup: PickupLibraries, reference_ttl: Duration) -> Result<Self> {
        let client = build_client(config.timeout_seconds)?;
        Ok(Self {
            config,
            pickup,
            client,
            session: TtlCache::new(SESSION_TTL),
            libraries: TtlCache::new(reference_ttl),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-sirs-clientID", &self.config.client_id)
            .header(
                "SD-Originating-App-Id",
                self.config.app_id.as_deref().unwrap_or("MYLIBRARY"),
            )
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
    }

    async fn session_token(&self) -> Result<Arc<String>> {
        self.session
            .get_or_try_insert(|| async {
                tracing::debug!("Logging in to Symphony as {}", self.config.username);
                let response = self
                    .with_headers(self.client.post(self.url("/user/staff/login")))
                    .json(&json!({
                        "login": self.config.username,
                        "password": self.config.password,
                    }))
                    .send()
                    .await?;
                let (status, body) = read_json(response).await?;
                if !status.is_success() {
                    return Err(PortalError::Authentication {
                        message: error_message(&body)
                            .unwrap_or_else(|| format!("staff login returned {}", status)),
                    });
                }
                str_at(&body, "/sessionToken").ok_or_else(|| {
                    PortalError::ils("Symphony staff login response had no sessionToken")
                })
            })
            .await
    }

    /// Sends an authenticated request. A 401 drops the cached session so the
    /// next action logs in again.
    async fn send(&self, request: RequestBuilder) -> Result<(StatusCode, Value)> {
        let token = self.session_token().await?;
        let response = self
            .with_headers(request)
            .header("x-sirs-sessionToken", token.as_str())
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate().await;
            return Err(PortalError::ils("Symphony session expired"));
        }
        Ok((status, body))
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        tracing::debug!("Symphony GET {}", path);
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

    fn include_fields(&self) -> String {
        let member_fields = format!("{},{},{},{}", PATRON_FIELDS, CIRC_RECORD_FIELDS, BLOCK_FIELDS, HOLD_FIELDS);
        format!(
            "{},groupSettings{{*,responsibility{{key}},group{{key,memberList{{{}}}}}}}",
            member_fields, member_fields
        )
    }

    async fn payments(&self, patron_key: &str) -> Vec<Payment> {
        let Some(legacy) = self.config.legacy_base_url.as_deref() else {
            return Vec::new();
        };

        let result: Result<Value> = async {
            let token = self.session_token().await?;
            let url = format!("{}/rest/patron/lookupPatronInfo", legacy.trim_end_matches('/'));
            tracing::debug!("Symphony legacy fee lookup for {}", patron_key);
            let response = self
                .client
                .get(url)
                .query(&[
                    ("clientID", self.config.client_id.as_str()),
                    ("userID", patron_key),
                    ("includeFeeInfo", "PAID_FEES_AND_PAYMENTS"),
                    ("json", "true"),
                ])
                .header("x-sirs-sessionToken", token.as_str())
                .header("Accept", "application/json")
                .send()
                .await?;
            let (status, body) = read_json(response).await?;
            if !status.is_success() {
                return Err(PortalError::ils(
                    error_message(&body).unwrap_or_else(|| format!("fee lookup returned {}", status)),
                ));
            }
            Ok(body)
        }
        .await;

        match result {
            Ok(body) => parse_payments(&body, patron_key),
            Err(e) => {
                tracing::warn!("⚠️ Payment history unavailable for {}: {}", patron_key, e);
                Vec::new()
            }
        }
    }

    fn hold_record_body(request: &Request, fields: Value) -> Value {
        json!({
            "resource": "/circulation/holdRecord",
            "key": request.key,
            "fields": fields,
        })
    }

    async fn update_hold(&self, request: &Request, fields: Value) -> Result<()> {
        let path = format!("/circulation/holdRecord/key/{}", request.key);
        let (status, body) = self
            .send(
                self.client
                    .put(self.url(&path))
                    .json(&Self::hold_record_body(request, fields)),
            )
            .await?;
        if !status.is_success() {
            return Err(PortalError::Request {
                message: error_message(&body)
                    .unwrap_or_else(|| format!("hold update returned {}", status)),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IlsClient for SymphonyClient {
    fn name(&self) -> &'static str {
        "symphony"
    }

    async fn authenticate(&self, library_id: &str, pin: &str) -> Result<String> {
        let (status, body) = self
            .send(
                self.client
                    .post(self.url("/user/patron/authenticate"))
                    .json(&json!({ "barcode": library_id, "password": pin })),
            )
            .await?;
        if !status.is_success() {
            return Err(PortalError::Authentication {
                message: error_message(&body).unwrap_or_else(|| "invalid library ID or PIN".to_string()),
            });
        }
        str_at(&body, "/patronKey").ok_or_else(|| PortalError::Authentication {
            message: "no patron key in authentication response".to_string(),
        })
    }

    async fn find_patron_by_university_id(&self, university_id: &str) -> Result<String> {
        let query = format!("ALT_ID:{}", university_id);
        let body = self
            .get_json(
                "/user/patron/search",
                &[("q", query.as_str()), ("includeFields", "key")],
            )
            .await?;
        str_at(&body, "/result/0/key").ok_or_else(|| PortalError::NotFound {
            what: "patron".to_string(),
            key: university_id.to_string(),
        })
    }

    async fn patron_info(&self, patron_key: &str) -> Result<Patron> {
        let path = format!("/user/patron/key/{}", patron_key);
        let include = self.include_fields();
        let record = self
            .get_json(&path, &[("includeFields", include.as_str())])
            .await?;
        let mut patron = parse_patron(&record, &self.config.non_renewable_item_types)?;
        patron.payments = self.payments(&patron.key).await;
        tracing::info!(
            "Loaded Symphony patron {} ({} checkouts, {} requests, {} fines)",
            patron.key,
            patron.checkouts.len(),
            patron.requests.len(),
            patron.fines.len()
        );
        Ok(patron)
    }

    async fn renew(&self, patron: &Patron, checkout: &Checkout) -> Result<RenewalOutcome> {
        tracing::debug!("Renewing {} for {}", checkout.item_key, patron.key);
        let (status, body) = self
            .send(
                self.client
                    .post(self.url("/circulation/circRecord/renew"))
                    .json(&json!({
                        "item": { "resource": "/catalog/item", "key": checkout.item_key }
                    })),
            )
            .await?;
        if !status.is_success() {
            return Err(PortalError::Checkout {
                message: error_message(&body).unwrap_or_else(|| format!("renew returned {}", status)),
            });
        }
        Ok(RenewalOutcome {
            item_key: checkout.item_key.clone(),
            new_due_date: date_at(&body, "/circRecord/fields/dueDate"),
        })
    }

    async fn cancel_request(&self, patron: &Patron, request: &Request) -> Result<()> {
        tracing::debug!("Cancelling hold {} for {}", request.key, patron.key);
        let (status, body) = self
            .send(
                self.client
                    .post(self.url("/circulation/holdRecord/cancelHold"))
                    .json(&json!({
                        "holdRecord": { "resource": "/circulation/holdRecord", "key": request.key }
                    })),
            )
            .await?;
        if !status.is_success() {
            return Err(PortalError::Request {
                message: error_message(&body).unwrap_or_else(|| format!("cancel returned {}", status)),
            });
        }
        Ok(())
    }

    async fn change_pickup_library(&self, request: &Request, library_code: &str) -> Result<()> {
        self.update_hold(
            request,
            json!({ "pickupLibrary": { "resource": "/policy/library", "key": library_code } }),
        )
        .await
    }

    async fn change_not_needed_after(&self, request: &Request, date: NaiveDate) -> Result<()> {
        self.update_hold(
            request,
            json!({ "fillByDate": date.format("%Y-%m-%d").to_string() }),
        )
        .await
    }

    async fn record_payment(&self, patron_key: &str, amount: Decimal, session_id: &str) -> Result<()> {
        // Symphony receives card payments through the gateway's own bill
        // posting; the portal only logs the accepted transaction.
        tracing::info!(
            "Symphony payment of {} for {} accepted (session {})",
            amount,
            patron_key,
            session_id
        );
        Ok(())
    }

    async fn pickup_libraries(&self) -> Result<PickupLibraries> {
        let libraries = self
            .libraries
            .get_or_try_insert(|| async {
                let body = self
                    .get_json(
                        "/policy/library/simpleQuery",
                        &[("key", "*"), ("includeFields", "description")],
                    )
                    .await?;
                Ok(body
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|lib| {
                                Some((str_at(lib, "/key")?, str_at(lib, "/fields/description")?))
                            })
                            .collect()
                    })
                    .unwrap_or_default())
            })
            .await?;

        let mut pickup = self.pickup.clone();
        pickup.merge_labels(libraries.iter().cloned());
        Ok(pickup)
    }
}

fn list<'a>(record: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    record
        .pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn email(record: &Value) -> Option<String> {
    list(record, "/fields/address1")
        .find(|entry| str_at(entry, "/fields/code/key").as_deref() == Some("EMAIL"))
        .and_then(|entry| str_at(entry, "/fields/data"))
}

fn base_patron(record: &Value, non_renewable_types: &[String]) -> Result<Patron> {
    let key = str_at(record, "/key")
        .ok_or_else(|| PortalError::ils("Symphony patron record has no key"))?;

    let mut patron = Patron::new(
        key.clone(),
        str_at(record, "/fields/firstName").unwrap_or_default(),
        str_at(record, "/fields/lastName").unwrap_or_default(),
    );
    patron.barcode = str_at(record, "/fields/barcode");
    patron.username = str_at(record, "/fields/alternateID");
    patron.preferred_name = str_at(record, "/fields/preferredName");
    patron.email = email(record);
    patron.patron_type = str_at(record, "/fields/profile/key");
    patron.standing = Standing::from_ils(&str_at(record, "/fields/standing/key").unwrap_or_default());
    patron.expires_at = date_at(record, "/fields/privilegeExpiresDate");
    patron.checkouts = list(record, "/fields/circRecordList")
        .map(|c| parse_checkout(c, &key, non_renewable_types))
        .collect();
    patron.fines = list(record, "/fields/blockList")
        .map(|b| parse_fine(b, &key))
        .collect();
    patron.requests = list(record, "/fields/holdRecordList")
        .map(|h| parse_request(h, &key))
        .collect();
    Ok(patron)
}

fn responsibility(record: &Value) -> Option<String> {
    str_at(record, "/fields/groupSettings/fields/responsibility/key")
}

pub fn parse_patron(record: &Value, non_renewable_types: &[String]) -> Result<Patron> {
    let mut patron = base_patron(record, non_renewable_types)?;

    let group_key = str_at(record, "/fields/groupSettings/fields/group/key");
    patron.sponsor = responsibility(record).as_deref() == Some("SPONSOR");
    patron.proxy = group_key.is_some() && !patron.sponsor;

    if group_key.is_none() {
        return Ok(patron);
    }

    let mut group = Group::default();
    for member_record in list(record, "/fields/groupSettings/fields/group/fields/memberList") {
        let member = match base_patron(member_record, non_renewable_types) {
            Ok(member) => member,
            Err(e) => {
                tracing::warn!("Skipping unreadable group member: {}", e);
                continue;
            }
        };
        let is_sponsor = responsibility(member_record).as_deref() == Some("SPONSOR")
            || (patron.sponsor && member.key == patron.key);

        group.members.push(GroupMember {
            key: member.key.clone(),
            name: member.display_name(),
            sponsor: is_sponsor,
        });

        if is_sponsor {
            group.sponsor_key = Some(member.key.clone());
            if patron.proxy {
                patron.sponsor_standing = Some(member.standing);
            }
            continue;
        }

        group.checkouts.extend(member.checkouts);
        group.requests.extend(member.requests);
        group.fines.extend(member.fines);
    }

    if patron.sponsor && group.sponsor_key.is_none() {
        group.sponsor_key = Some(patron.key.clone());
    }
    patron.group = Some(group);
    Ok(patron)
}

pub fn parse_checkout(record: &Value, patron_key: &str, non_renewable_types: &[String]) -> Checkout {
    let item_key = str_at(record, "/fields/item/key").unwrap_or_default();
    let mut checkout = Checkout::new(
        str_at(record, "/key").unwrap_or_else(|| item_key.clone()),
        item_key,
        str_at(record, "/fields/item/fields/bib/fields/title").unwrap_or_default(),
    );

    let location = str_at(record, "/fields/item/fields/currentLocation/key");
    let library = str_at(record, "/fields/library/key");
    let item_type = str_at(record, "/fields/item/fields/itemType/key");

    checkout.patron_key = patron_key.to_string();
    checkout.barcode = str_at(record, "/fields/item/fields/barcode");
    checkout.catalog_key = str_at(record, "/fields/item/fields/bib/key");
    checkout.author = str_at(record, "/fields/item/fields/bib/fields/author");
    checkout.call_number = str_at(record, "/fields/item/fields/call/fields/dispCallNumber");
    checkout.checkout_date = date_at(record, "/fields/checkOutDate");
    checkout.due_date = date_at(record, "/fields/dueDate");
    checkout.recall_due_date = date_at(record, "/fields/recallDueDate");
    checkout.claims_returned_date = date_at(record, "/fields/claimsReturnedDate");
    checkout.overdue_flag = bool_at(record, "/fields/overdue");
    checkout.accrued = amount_from_json(record.pointer("/fields/estimatedOverdueAmount"));
    checkout.lost = str_at(record, "/fields/status").as_deref() == Some("LOST")
        || location.as_deref().is_some_and(|l| l.starts_with("LOST"));
    checkout.reserve = location.as_deref().is_some_and(|l| l.contains("RESV"))
        || library.as_deref() == Some("RESERVES");
    checkout.cdl = library.as_deref() == Some("CDL") || location.as_deref() == Some("CDL");
    checkout.hold_queue_length = list(record, "/fields/item/fields/holdRecordList").count() as u32;
    checkout.renewal_count = u32_at(record, "/fields/renewalCount").unwrap_or(0);
    checkout.unseen_renewals_remaining = renewals(record, "unseenRenewalsRemaining");
    checkout.seen_renewals_remaining = renewals(record, "seenRenewalsRemaining");
    checkout.policy = LoanPolicy {
        name: str_at(record, "/fields/circulationRule/key").unwrap_or_default(),
        renewable: item_type
            .as_deref()
            .map_or(true, |t| !non_renewable_types.iter().any(|n| n == t)),
        renew_from_days: u32_at(record, "/fields/circulationRule/fields/renewFromPeriod")
            .filter(|days| *days > 0)
            .map(i64::from),
        renew_items_with_request: true,
        short_term: str_at(record, "/fields/circulationRule/fields/loanPeriod/fields/periodType/key")
            .as_deref()
            == Some("HOURLY"),
    };
    checkout.library = library;
    checkout.location = location;
    checkout
}

fn renewals(record: &Value, field: &str) -> Renewals {
    if bool_at(record, &format!("/fields/{}Unlimited", field)) {
        return Renewals::Unlimited;
    }
    match u32_at(record, &format!("/fields/{}", field)) {
        Some(n) => Renewals::Remaining(n),
        None => Renewals::Unlimited,
    }
}

pub fn parse_fine(record: &Value, patron_key: &str) -> Fine {
    let owed = amount_from_json(record.pointer("/fields/owed"));
    let mut fine = Fine::new(
        str_at(record, "/key").unwrap_or_default(),
        str_at(record, "/fields/block/key").unwrap_or_default(),
        owed,
    );
    fine.patron_key = patron_key.to_string();
    fine.fee = amount_from_json(record.pointer("/fields/amount")).max(owed);
    fine.bill_date = date_at(record, "/fields/createDate");
    fine.title = str_at(record, "/fields/item/fields/bib/fields/title");
    fine.author = str_at(record, "/fields/item/fields/bib/fields/author");
    fine.barcode = str_at(record, "/fields/item/fields/barcode");
    fine.library = str_at(record, "/fields/library/key");
    fine
}

pub fn parse_request(record: &Value, patron_key: &str) -> Request {
    let mut request = Request::new(
        str_at(record, "/key").unwrap_or_default(),
        RequestSource::Ils,
        str_at(record, "/fields/bib/fields/title").unwrap_or_default(),
    );
    let status = str_at(record, "/fields/status").unwrap_or_default();

    request.patron_key = patron_key.to_string();
    request.ready = status == "BEING_HELD";
    request.status = match status.as_str() {
        "BEING_HELD" => "Ready for pickup".to_string(),
        "PLACED" => "Waiting".to_string(),
        "SUSPENDED" => "Suspended".to_string(),
        other => other.to_string(),
    };
    request.author = str_at(record, "/fields/bib/fields/author");
    request.catalog_key = str_at(record, "/fields/bib/key");
    request.item_key = str_at(record, "/fields/item/key");
    request.call_number = str_at(record, "/fields/item/fields/call/fields/dispCallNumber");
    request.item_location = str_at(record, "/fields/item/fields/currentLocation/key");
    request.queue_position = u32_at(record, "/fields/queuePosition");
    request.queue_length = u32_at(record, "/fields/queueLength");
    request.pickup_library = str_at(record, "/fields/pickupLibrary/key");
    request.placed_date = date_at(record, "/fields/placedDate");
    request.fill_by_date = date_at(record, "/fields/fillByDate");
    request.expiration_date = date_at(record, "/fields/expirationDate");
    request.waiting_date = date_at(record, "/fields/beingHeldDate");
    request.comment = str_at(record, "/fields/comment");
    request
}

pub fn parse_payments(body: &Value, patron_key: &str) -> Vec<Payment> {
    list(body, "/feeInfo")
        .map(|fee| Payment {
            key: str_at(fee, "/billNumber").unwrap_or_default(),
            patron_key: patron_key.to_string(),
            description: str_at(fee, "/billReasonDescription")
                .or_else(|| str_at(fee, "/billReasonID"))
                .unwrap_or_default(),
            amount: fee
                .pointer("/feePaymentInfo/paymentAmount")
                .map(|v| amount_from_json(Some(v)))
                .unwrap_or_else(|| amount_from_json(fee.pointer("/amount"))),
            bill_date: date_at(fee, "/dateBilled"),
            payment_date: date_at(fee, "/feePaymentInfo/paymentDate"),
            method: str_at(fee, "/feePaymentInfo/paymentTypeDescription"),
            resolution: if fee.pointer("/feePaymentInfo").is_some() {
                "Paid".to_string()
            } else {
                "Waived".to_string()
            },
            title: str_at(fee, "/feeItemInfo/title"),
        })
        .collect()
}
