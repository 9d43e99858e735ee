//! Integration tests for the order table client.

mod common;

use chrono::{TimeZone, Utc};
use common::fast_transport;
use nukigata_core::{LookupKey, NukigataError, OrderTable, Sighting, TokenProvider};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const TABLE_PATH: &str = "/app1/TableJuchu";

fn table_for(mock_server: &MockServer) -> OrderTable {
    OrderTable::new(
        fast_transport(),
        TokenProvider::static_token("pat-test"),
        "app1",
        "TableJuchu",
    )
    .with_base_url(mock_server.uri())
}

fn records(ids: &[&str]) -> serde_json::Value {
    let records: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| serde_json::json!({ "id": id, "fields": { "Book": "Ta" } }))
        .collect();
    serde_json::Value::Array(records)
}

/// Answers a PATCH by echoing the records it was sent.
struct EchoPatch;

impl Respond for EchoPatch {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null);
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "records": body["records"] }))
    }
}

#[tokio::test]
async fn test_list_records_follows_offset() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(query_param("offset", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": records(&["rec3"])
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(header("authorization", "Bearer pat-test"))
        .and(query_param("filterByFormula", "AND({Book}='Ta',{WorkCord}=9892)"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": records(&["rec1", "rec2"]),
            "offset": "page2"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    let table = table_for(&mock_server);
    let key = LookupKey::new("Ta", "9892").unwrap();
    let ids = table.find_record_ids(&key).await.unwrap();
    assert_eq!(ids, vec!["rec1", "rec2", "rec3"]);
}

#[tokio::test]
async fn test_list_records_stops_at_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": records(&["rec1", "rec2", "rec3"]),
            "offset": "more"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let table = table_for(&mock_server);
    let key = LookupKey::new("Ta", "1").unwrap();
    let found = table.list_records(&key, 2).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[1].id, "rec2");
    assert_eq!(found[0].field_text("Book").as_deref(), Some("Ta"));
}

#[tokio::test]
async fn test_repeated_offset_ends_paging() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": records(&["rec1"]),
            "offset": "same"
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let table = table_for(&mock_server);
    let key = LookupKey::new("Ta", "1").unwrap();
    let ids = table.find_record_ids(&key).await.unwrap();
    assert_eq!(ids, vec!["rec1", "rec1"]);
}

#[tokio::test]
async fn test_update_location_patches_in_chunks_of_ten() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .and(body_string_contains("\"Location\":\"R-05\""))
        .and(body_string_contains("\"LastSeen\":\"2024-05-01T09:30:00Z\""))
        .respond_with(EchoPatch)
        .expect(3)
        .mount(&mock_server)
        .await;

    let ids: Vec<String> = (0..23).map(|i| format!("rec{}", i)).collect();
    let table = table_for(&mock_server);
    let updated = table
        .update_location(&ids, "R-05", Some("2024-05-01T09:30:00Z"))
        .await
        .unwrap();
    assert_eq!(updated, 23);

    let sizes: Vec<usize> = mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| {
            let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
            body["records"].as_array().unwrap().len()
        })
        .collect();
    assert_eq!(sizes, vec![10, 10, 3]);
}

#[tokio::test]
async fn test_update_location_with_no_ids_sends_nothing() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .respond_with(EchoPatch)
        .expect(0)
        .mount(&mock_server)
        .await;

    let table = table_for(&mock_server);
    assert_eq!(table.update_location(&[], "R-01", None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_apply_sightings_dedupes_and_reports_skips() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(query_param("filterByFormula", "AND({Book}='Ta',{WorkCord}=1)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": records(&["recA", "recB"])
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("filterByFormula", "AND({Book}='Ta',{WorkCord}=2)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": []
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(query_param("filterByFormula", "AND({Book}='Ta',{WorkCord}=3)"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_string(r#"{"error":{"type":"INVALID_FILTER_BY_FORMULA"}}"#),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .respond_with(EchoPatch)
        .expect(1)
        .mount(&mock_server)
        .await;

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
    let sighting = |wc: &str| Sighting::new(LookupKey::new("Ta", wc).unwrap(), "R-05", at);
    let sightings = vec![
        sighting("1"),
        sighting("1.0"),
        sighting("2"),
        sighting("3"),
        Sighting::new(LookupKey::new("Ta", "4").unwrap(), "  ", at),
    ];

    let table = table_for(&mock_server);
    let summary = table.apply_sightings(&sightings).await.unwrap();

    assert_eq!(summary.updated_records, 2);
    assert_eq!(summary.skipped.len(), 2);
    assert!(summary.skipped[0].starts_with("{Ta/2}: 0 matches"));
    assert!(summary.skipped[0].contains("AND({Book}='Ta',{WorkCord}=2)"));
    assert!(summary.skipped[1].starts_with("{Ta/3}: ERROR"));
    assert!(summary.skipped[1].contains("422"));
}

#[tokio::test]
async fn test_list_error_is_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("AUTHENTICATION_REQUIRED"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let table = table_for(&mock_server);
    let key = LookupKey::new("Ta", "1").unwrap();
    match table.list_records(&key, 10).await {
        Err(NukigataError::Upstream {
            service, status, ..
        }) => {
            assert_eq!(service, "orders");
            assert_eq!(status, 401);
        }
        other => panic!("expected Upstream error, got {:?}", other),
    }
}
