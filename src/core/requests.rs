use crate::core::flash::Flash;
use crate::core::portal::PortalService;
use crate::domain::group::View;
use crate::domain::patron::Patron;
use crate::domain::pickup::PickupLibraries;
use crate::domain::ports::RequestSourceClient;
use crate::domain::request::{Request, RequestSource};
use crate::domain::sort::{sort_by, SortField};
use crate::utils::error::{PortalError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Merges ILS requests with the interlibrary loan services.
pub struct RequestAggregator {
    sources: Vec<Arc<dyn RequestSourceClient>>,
}

impl RequestAggregator {
    pub fn new(sources: Vec<Arc<dyn RequestSourceClient>>) -> Self {
        Self { sources }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Requests from every supplementary source. A failing source is logged
    /// and contributes nothing.
    pub async fn supplementary(&self, patron: &Patron) -> Vec<Request> {
        let mut requests = Vec::new();
        for source in &self.sources {
            match source.requests_for(patron).await {
                Ok(found) => {
                    tracing::debug!("{:?}: {} request(s) for {}", source.source(), found.len(), patron.key);
                    requests.extend(found);
                }
                Err(e) => {
                    tracing::warn!("⚠️ {:?} requests unavailable for {}: {}", source.source(), patron.key, e);
                }
            }
        }
        requests
    }

    /// ILS requests visible in `view`, plus the patron's own supplementary
    /// requests in the own view.
    pub async fn all(&self, patron: &Patron, view: View) -> Vec<Request> {
        let mut requests: Vec<Request> = patron.visible_requests(view).into_iter().cloned().collect();
        if view == View::Own {
            requests.extend(self.supplementary(patron).await);
        }
        requests
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRow {
    pub key: String,
    pub source: RequestSource,
    pub source_label: &'static str,
    pub title: String,
    pub author: Option<String>,
    pub status: String,
    pub ready: bool,
    pub pickup_library: Option<String>,
    pub pickup_label: Option<String>,
    pub placed_date: Option<DateTime<Utc>>,
    pub fill_by_date: Option<DateTime<Utc>>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub queue_position: Option<u32>,
    pub cdl_waitlist_position: Option<String>,
    pub cancellable: bool,
    pub modifiable: bool,
    pub pickup_options: Vec<String>,
    pub borrower: Option<String>,
    pub manage_url: Option<String>,
}

pub fn rows(
    patron: &Patron,
    mut requests: Vec<Request>,
    view: View,
    sort: SortField,
    pickup: &PickupLibraries,
) -> Vec<RequestRow> {
    sort_by(&mut requests, sort);
    requests
        .into_iter()
        .map(|r| RequestRow {
            source_label: r.source.label(),
            pickup_label: r.pickup_library.as_deref().map(|code| pickup.label(code).to_string()),
            cdl_waitlist_position: r.cdl_waitlist_position(),
            cancellable: r.cancellable(),
            modifiable: r.modifiable(),
            pickup_options: r.pickup_options(pickup),
            borrower: match view {
                View::Group => patron
                    .group
                    .as_ref()
                    .and_then(|g| g.member_name(&r.patron_key))
                    .map(str::to_string),
                View::Own => None,
            },
            key: r.key,
            source: r.source,
            title: r.title,
            author: r.author,
            status: r.status,
            ready: r.ready,
            pickup_library: r.pickup_library,
            placed_date: r.placed_date,
            fill_by_date: r.fill_by_date,
            expiration_date: r.expiration_date,
            queue_position: r.queue_position,
            manage_url: r.manage_url,
        })
        .collect()
}

pub async fn list(
    service: &PortalService,
    patron_key: &str,
    view: View,
    sort: SortField,
) -> Result<Vec<RequestRow>> {
    let patron = service.patron(patron_key).await?;
    let requests = service.request_aggregator().all(&patron, view).await;
    let pickup = service.ils().pickup_libraries().await?;
    Ok(rows(&patron, requests, view, sort, &pickup))
}

fn find<'a>(patron: &'a Patron, key: &str) -> Result<&'a Request> {
    patron.find_request(key).ok_or_else(|| PortalError::NotFound {
        what: "request".to_string(),
        key: key.to_string(),
    })
}

pub async fn cancel(service: &PortalService, patron_key: &str, request_key: &str) -> Result<Flash> {
    let patron = service.patron(patron_key).await?;
    let request = find(&patron, request_key)?;
    if !request.cancellable() {
        return Ok(Flash::alert(format!(
            "Sorry! \"{}\" cannot be canceled here.",
            request.title
        )));
    }

    match service.ils().cancel_request(&patron, request).await {
        Ok(()) => {
            tracing::info!("Canceled request {} for {}", request.key, patron.key);
            Ok(Flash::success(format!("Success! \"{}\" was canceled.", request.title)))
        }
        Err(e) => {
            tracing::warn!("Cancel of {} for {} failed: {}", request.key, patron.key, e);
            Ok(Flash::alert(format!(
                "Sorry! Something went wrong and \"{}\" was not canceled.",
                request.title
            )))
        }
    }
}

/// Changes the pickup library and/or the not-needed-after date. Both are
/// checked before either is sent to the ILS.
pub async fn update(
    service: &PortalService,
    patron_key: &str,
    request_key: &str,
    pickup: Option<&str>,
    not_needed_after: Option<NaiveDate>,
) -> Result<Flash> {
    let patron = service.patron(patron_key).await?;
    let request = find(&patron, request_key)?;
    let today = Utc::now().date_naive();

    if pickup.is_none() && not_needed_after.is_none() {
        return Ok(Flash::notice("Nothing to update."));
    }
    if !request.modifiable() {
        return Ok(Flash::alert(format!(
            "Sorry! \"{}\" cannot be changed.",
            request.title
        )));
    }

    let pickup = pickup.filter(|code| Some(*code) != request.pickup_library.as_deref());
    if let Some(code) = pickup {
        let libraries = service.ils().pickup_libraries().await?;
        if !request.pickup_allowed(&libraries, code) {
            return Ok(Flash::from_error(&PortalError::PickupNotAllowed {
                library: libraries.label(code).to_string(),
            }));
        }
    }
    if let Some(date) = not_needed_after {
        if date <= today {
            return Ok(Flash::alert("The \"not needed after\" date must be in the future."));
        }
    }

    if let Some(code) = pickup {
        if let Err(e) = service.ils().change_pickup_library(request, code).await {
            tracing::warn!("Pickup change of {} for {} failed: {}", request.key, patron.key, e);
            return Ok(Flash::alert(format!(
                "Sorry! Something went wrong and \"{}\" was not updated.",
                request.title
            )));
        }
    }
    if let Some(date) = not_needed_after {
        if let Err(e) = service.ils().change_not_needed_after(request, date).await {
            tracing::warn!(
                "Not-needed-after change of {} for {} failed: {}",
                request.key,
                patron.key,
                e
            );
            // the pickup change above has already been applied
            return Ok(Flash::alert(match pickup {
                Some(_) => format!(
                    "The pickup library for \"{}\" was changed, but the \"not needed after\" date was not updated.",
                    request.title
                ),
                None => format!(
                    "Sorry! Something went wrong and \"{}\" was not updated.",
                    request.title
                ),
            }));
        }
    }

    tracing::info!("Updated request {} for {}", request.key, patron.key);
    Ok(Flash::success(format!("Success! \"{}\" was updated.", request.title)))
}
