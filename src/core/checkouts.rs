use crate::core::flash::{Flash, FlashLevel};
use crate::core::portal::PortalService;
use crate::domain::checkout::Checkout;
use crate::domain::group::View;
use crate::domain::patron::Patron;
use crate::domain::sort::{sort_by, SortField};
use crate::utils::error::{PortalError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutRow {
    pub key: String,
    pub item_key: String,
    pub title: String,
    pub author: Option<String>,
    pub call_number: Option<String>,
    pub library: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub recall_due_date: Option<DateTime<Utc>>,
    pub status: &'static str,
    pub days_overdue: i64,
    pub accrued: Decimal,
    pub renewable: bool,
    pub non_renewable_reason: Option<String>,
    /// Group member who borrowed the item, in the group view.
    pub borrower: Option<String>,
    pub catalog_url: Option<String>,
}

fn status(checkout: &Checkout, now: DateTime<Utc>) -> &'static str {
    if checkout.lost() {
        "Lost"
    } else if checkout.claimed_returned() {
        "Claimed returned"
    } else if checkout.recalled() {
        "Recalled"
    } else if checkout.overdue(now) {
        "Overdue"
    } else {
        "OK"
    }
}

pub fn rows(
    patron: &Patron,
    view: View,
    sort: SortField,
    now: DateTime<Utc>,
    catalog_url: &str,
) -> Vec<CheckoutRow> {
    let mut checkouts = patron.visible_checkouts(view);
    sort_by(&mut checkouts, sort);

    checkouts
        .into_iter()
        .map(|c| {
            let reason = c.non_renewable_reason(now);
            CheckoutRow {
                key: c.key.clone(),
                item_key: c.item_key.clone(),
                title: c.title.clone(),
                author: c.author.clone(),
                call_number: c.call_number.clone(),
                library: c.library.clone(),
                due_date: c.due_date,
                recall_due_date: c.recall_due_date,
                status: status(c, now),
                days_overdue: c.days_overdue(now),
                accrued: c.accrued,
                renewable: reason.is_none() && !c.cdl,
                non_renewable_reason: reason.map(|r| r.to_string()),
                borrower: match view {
                    View::Group => patron
                        .group
                        .as_ref()
                        .and_then(|g| g.member_name(&c.patron_key))
                        .map(str::to_string),
                    View::Own => None,
                },
                catalog_url: c.catalog_url(catalog_url),
            }
        })
        .collect()
}

pub async fn list(
    service: &PortalService,
    patron_key: &str,
    view: View,
    sort: SortField,
) -> Result<Vec<CheckoutRow>> {
    let patron = service.patron(patron_key).await?;
    Ok(rows(&patron, view, sort, Utc::now(), service.catalog_url()))
}

/// Renews one checkout. CDL loans and items the rules already rule out are
/// refused without calling the ILS.
pub async fn renew(service: &PortalService, patron_key: &str, key: &str) -> Result<Flash> {
    let patron = service.patron(patron_key).await?;
    let now = Utc::now();
    let checkout = patron
        .find_checkout(key)
        .ok_or_else(|| PortalError::NotFound {
            what: "checkout".to_string(),
            key: key.to_string(),
        })?;

    if !patron.can_renew(now) {
        return Ok(Flash::alert(format!(
            "Sorry! Your account status ({}) does not allow renewals.",
            patron.status(now).label()
        )));
    }
    if checkout.cdl {
        return Ok(Flash::alert(format!(
            "Sorry! \"{}\" is a digital loan and cannot be renewed.",
            checkout.title
        )));
    }
    if let Some(reason) = checkout.non_renewable_reason(now) {
        return Ok(Flash::alert(format!(
            "Sorry! \"{}\" cannot be renewed: {}.",
            checkout.title, reason
        )));
    }

    Ok(renew_one(service, &patron, checkout).await)
}

async fn renew_one(service: &PortalService, patron: &Patron, checkout: &Checkout) -> Flash {
    match service.ils().renew(patron, checkout).await {
        Ok(outcome) => {
            tracing::info!(
                "Renewed {} for {} (due {:?})",
                outcome.item_key,
                patron.key,
                outcome.new_due_date
            );
            Flash::success(format!("Success! \"{}\" was renewed.", checkout.title))
        }
        Err(e) => {
            tracing::warn!("Renewal of {} for {} failed: {}", checkout.item_key, patron.key, e);
            Flash::alert(format!(
                "Sorry! Something went wrong and \"{}\" was not renewed.",
                checkout.title
            ))
        }
    }
}

/// Renews every eligible own checkout. CDL loans are never renewed here.
pub async fn renew_all(service: &PortalService, patron_key: &str) -> Result<Flash> {
    let patron = service.patron(patron_key).await?;
    let now = Utc::now();
    if !patron.can_renew(now) {
        return Ok(Flash::alert(format!(
            "Sorry! Your account status ({}) does not allow renewals.",
            patron.status(now).label()
        )));
    }

    let eligible: Vec<&Checkout> = patron
        .checkouts
        .iter()
        .filter(|c| c.renewable(now) && !c.cdl)
        .collect();
    if eligible.is_empty() {
        return Ok(Flash::notice("There are no items eligible for renewal."));
    }

    let mut renewed = 0usize;
    for checkout in &eligible {
        if renew_one(service, &patron, checkout).await.level == FlashLevel::Success {
            renewed += 1;
        }
    }
    let failed = eligible.len() - renewed;
    tracing::info!("Renew all for {}: {} renewed, {} failed", patron.key, renewed, failed);

    Ok(if failed == 0 {
        Flash::success(format!("Success! {} item(s) were renewed.", renewed))
    } else {
        Flash::alert(format!(
            "{} item(s) were renewed. Sorry! {} item(s) could not be renewed.",
            renewed, failed
        ))
    })
}
