use anyhow::Result;
use httpmock::prelude::*;
use patron_portal::adapters::{BorrowDirectClient, IlliadClient, ReshareClient};
use patron_portal::config::toml_config::{BorrowDirectConfig, IlliadConfig, ReshareConfig};
use patron_portal::domain::ports::RequestSourceClient;
use patron_portal::domain::{Patron, RequestSource, View};
use patron_portal::RequestAggregator;
use serde_json::json;
use std::sync::Arc;

fn patron() -> Patron {
    let mut patron = Patron::new("p1", "Pat", "Ron");
    patron.barcode = Some("25500001".to_string());
    patron.username = Some("patron".to_string());
    patron
}

fn borrow_direct(server: &MockServer) -> BorrowDirectClient {
    BorrowDirectClient::new(BorrowDirectConfig {
        enabled: true,
        base_url: server.base_url(),
        api_key: "bd-key".to_string(),
        library_symbol: "STANFORD".to_string(),
        partnership_id: "BD".to_string(),
        manage_url: None,
    })
    .unwrap()
}

fn reshare(server: &MockServer) -> ReshareClient {
    ReshareClient::new(ReshareConfig {
        enabled: true,
        base_url: server.base_url(),
        tenant: "sul".to_string(),
        username: "reshare".to_string(),
        password: "secret".to_string(),
        manage_url: Some("https://borrowdirect.example.org".to_string()),
    })
    .unwrap()
}

fn illiad(server: &MockServer) -> IlliadClient {
    IlliadClient::new(IlliadConfig {
        enabled: true,
        base_url: server.base_url(),
        api_key: "illiad-key".to_string(),
        manage_url: None,
    })
    .unwrap()
}

#[tokio::test]
async fn test_borrow_direct_open_requests() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/portal-service/user/authentication")
                .json_body_partial(r#"{"PatronId": "25500001", "LibrarySymbol": "STANFORD"}"#);
            then.status(200).json_body(json!({"AuthorizationId": "aid-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/portal-service/request/query/my")
                .query_param("aid", "aid-1");
            then.status(200).json_body(json!([
                {"RequestNumber": "BD-1", "Title": "In Transit", "RequestStatus": "ENTERED",
                 "PickupLocation": "Green Library", "RequestDate": "2024-04-01"},
                {"RequestNumber": "BD-2", "Title": "Already Here", "RequestStatus": "ON_LOAN"}
            ]));
        })
        .await;

    let requests = borrow_direct(&server).requests_for(&patron()).await?;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].key, "BD-1");
    assert_eq!(requests[0].source, RequestSource::BorrowDirect);
    assert_eq!(requests[0].patron_key, "p1");
    Ok(())
}

#[tokio::test]
async fn test_borrow_direct_not_found_means_no_requests() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/portal-service/user/authentication");
            then.status(200).json_body(json!({"AuthorizationId": "aid-1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/portal-service/request/query/my");
            then.status(404).json_body(json!({"Problem": {"Message": "No requests"}}));
        })
        .await;

    assert!(borrow_direct(&server).requests_for(&patron()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reshare_keeps_open_requester_records() -> Result<()> {
    let server = MockServer::start_async().await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST).path("/authn/login").header("X-Okapi-Tenant", "sul");
            then.status(201).header("x-okapi-token", "rs-tok");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rs/patronrequests")
                .query_param("term", "25500001")
                .header("X-Okapi-Token", "rs-tok");
            then.status(200).json_body(json!([
                {"hrid": "RS-1", "title": "Arrived", "isRequester": true,
                 "state": {"code": "REQ_RECEIVED"}, "pickupLocation": "Green Library"},
                {"hrid": "RS-2", "title": "Finished", "isRequester": true,
                 "state": {"code": "REQ_REQUEST_COMPLETE"}},
                {"hrid": "RS-3", "title": "Lending Side", "isRequester": false,
                 "state": {"code": "RES_NEW_AWAIT_PULL_SLIP"}}
            ]));
        })
        .await;

    let client = reshare(&server);
    let requests = client.requests_for(&patron()).await?;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].key, "RS-1");
    assert!(requests[0].ready);
    assert_eq!(requests[0].manage_url.as_deref(), Some("https://borrowdirect.example.org"));

    client.requests_for(&patron()).await?;
    login.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn test_illiad_requires_username() -> Result<()> {
    let server = MockServer::start_async().await;
    let lookup = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/ILLiadWebPlatform/Transaction/UserRequests/patron")
                .header("ApiKey", "illiad-key");
            then.status(200).json_body(json!([
                {"TransactionNumber": 101, "RequestType": "Article", "TransactionStatus": "Awaiting Copyright Clearance",
                 "PhotoArticleTitle": "On Things", "PhotoJournalTitle": "Journal of Stuff"},
                {"TransactionNumber": 102, "RequestType": "Loan", "TransactionStatus": "Customer Notified via E-Mail",
                 "LoanTitle": "Ready Book", "ItemInfo4": "GREEN"},
                {"TransactionNumber": 103, "RequestType": "Loan", "TransactionStatus": "Request Finished",
                 "LoanTitle": "Old Book"}
            ]));
        })
        .await;

    let client = illiad(&server);
    let requests = client.requests_for(&patron()).await?;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].title, "On Things / Journal of Stuff");
    assert!(requests[1].ready);
    assert_eq!(requests[1].pickup_library.as_deref(), Some("GREEN"));

    let mut anonymous = patron();
    anonymous.username = None;
    assert!(client.requests_for(&anonymous).await?.is_empty());
    lookup.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test]
async fn test_aggregator_skips_failing_sources() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/portal-service/user/authentication");
            then.status(500).body("Relais is down");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ILLiadWebPlatform/Transaction/UserRequests/patron");
            then.status(200).json_body(json!([
                {"TransactionNumber": 201, "RequestType": "Loan", "TransactionStatus": "In Transit",
                 "LoanTitle": "Coming Soon"}
            ]));
        })
        .await;

    let sources: Vec<Arc<dyn RequestSourceClient>> = vec![
        Arc::new(borrow_direct(&server)),
        Arc::new(illiad(&server)),
    ];
    let aggregator = RequestAggregator::new(sources);
    let patron = patron();

    let own = aggregator.all(&patron, View::Own).await;
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].source, RequestSource::Illiad);

    // supplementary requests belong to the patron alone
    assert!(aggregator.all(&patron, View::Group).await.is_empty());
    Ok(())
}
