use crate::adapters::http::{build_client, date_at, error_message, read_json, str_at};
use crate::config::toml_config::IlliadConfig;
use crate::domain::patron::Patron;
use crate::domain::ports::RequestSourceClient;
use crate::domain::request::{Request, RequestSource};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

const READY_STATUS: &str = "Customer Notified via E-Mail";

/// Statuses of transactions that are finished, cancelled or already
/// showing up as ILS checkouts.
const HIDDEN_STATUSES: &[&str] = &[
    "Request Finished",
    "Cancelled by ILL Staff",
    "Cancelled by Customer",
    "Checked Out to Customer",
    "Delivered to Web",
];

pub struct IlliadClient {
    config: IlliadConfig,
    client: Client,
}

impl IlliadClient {
    pub fn new(config: IlliadConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: build_client(Some(10))?,
        })
    }
}

#[async_trait]
impl RequestSourceClient for IlliadClient {
    fn source(&self) -> RequestSource {
        RequestSource::Illiad
    }

    async fn requests_for(&self, patron: &Patron) -> Result<Vec<Request>> {
        let Some(username) = patron.username.as_deref() else {
            return Ok(Vec::new());
        };

        let url = format!(
            "{}/ILLiadWebPlatform/Transaction/UserRequests/{}",
            self.config.base_url.trim_end_matches('/'),
            username
        );
        let response = self
            .client
            .get(url)
            .header("ApiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;
        let (status, body) = read_json(response).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(PortalError::ils(
                error_message(&body).unwrap_or_else(|| format!("ILLiad returned {}", status)),
            ));
        }

        Ok(parse_transactions(&body, &patron.key, self.config.manage_url.as_deref()))
    }
}

pub fn parse_transactions(body: &Value, patron_key: &str, manage_url: Option<&str>) -> Vec<Request> {
    body.as_array()
        .into_iter()
        .flatten()
        .filter(|t| {
            let status = str_at(t, "/TransactionStatus").unwrap_or_default();
            !HIDDEN_STATUSES.contains(&status.as_str())
        })
        .map(|t| {
            let status = str_at(t, "/TransactionStatus").unwrap_or_default();
            let mut request = Request::new(
                str_at(t, "/TransactionNumber").unwrap_or_default(),
                RequestSource::Illiad,
                title(t),
            );
            request.patron_key = patron_key.to_string();
            request.author = str_at(t, "/PhotoArticleAuthor").or_else(|| str_at(t, "/LoanAuthor"));
            request.call_number = str_at(t, "/CallNumber");
            request.ready = status == READY_STATUS;
            request.status = if request.ready {
                "Ready for pickup".to_string()
            } else {
                status
            };
            request.pickup_library = str_at(t, "/ItemInfo4");
            request.placed_date = date_at(t, "/CreationDate");
            request.fill_by_date = date_at(t, "/NotWantedAfter");
            request.manage_url = manage_url.map(str::to_string);
            request
        })
        .collect()
}

/// Scans show the article and journal; loans show the book title.
fn title(transaction: &Value) -> String {
    let is_scan = str_at(transaction, "/RequestType").as_deref() == Some("Article");
    if is_scan {
        let article = str_at(transaction, "/PhotoArticleTitle").unwrap_or_default();
        return match str_at(transaction, "/PhotoJournalTitle") {
            Some(journal) if !article.is_empty() => format!("{} / {}", article, journal),
            Some(journal) => journal,
            None => article,
        };
    }
    str_at(transaction, "/LoanTitle").unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transactions() {
        let body = json!([
            {"TransactionNumber": 101, "RequestType": "Loan", "LoanTitle": "Borrowed Book",
             "LoanAuthor": "Writer", "TransactionStatus": "Customer Notified via E-Mail",
             "CreationDate": "2024-04-01T10:15:00.123", "ItemInfo4": "GREEN"},
            {"TransactionNumber": 102, "RequestType": "Article", "PhotoArticleTitle": "On Tides",
             "PhotoJournalTitle": "Ocean Review", "PhotoArticleAuthor": "Sea, A.",
             "TransactionStatus": "Awaiting Copyright Clearance"},
            {"TransactionNumber": 103, "RequestType": "Loan", "LoanTitle": "Returned",
             "TransactionStatus": "Request Finished"},
            {"TransactionNumber": 104, "RequestType": "Loan", "LoanTitle": "Cancelled",
             "TransactionStatus": "Cancelled by Customer"}
        ]);

        let requests = parse_transactions(&body, "p1", Some("https://illiad.example.edu"));
        assert_eq!(requests.len(), 2);

        assert_eq!(requests[0].key, "101");
        assert!(requests[0].ready_for_pickup());
        assert_eq!(requests[0].status, "Ready for pickup");
        assert_eq!(requests[0].pickup_library.as_deref(), Some("GREEN"));
        assert!(requests[0].placed_date.is_some());

        assert_eq!(requests[1].title, "On Tides / Ocean Review");
        assert_eq!(requests[1].author.as_deref(), Some("Sea, A."));
        assert!(!requests[1].ready_for_pickup());
    }
}
