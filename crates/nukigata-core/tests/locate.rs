//! Integration tests for the two-rule drawing search.
//!
//! A stateful wiremock responder plays the file store: it parses the `q`
//! parameter (parent, folder filter, name alternatives) and answers from an
//! in-memory folder tree.

mod common;

use common::{mock_config, mock_service, mount_token_endpoint};
use nukigata_core::{LookupKey, MatchRule, NukigataError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const FOLDER: &str = "application/vnd.google-apps.folder";

#[derive(Clone)]
struct Node {
    id: &'static str,
    name: &'static str,
    parent: &'static str,
    mime_type: &'static str,
}

fn folder(id: &'static str, name: &'static str, parent: &'static str) -> Node {
    Node {
        id,
        name,
        parent,
        mime_type: FOLDER,
    }
}

fn file(id: &'static str, name: &'static str, parent: &'static str) -> Node {
    let mime_type = match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        _ => "image/jpeg",
    };
    Node {
        id,
        name,
        parent,
        mime_type,
    }
}

/// In-memory folder tree answering listing queries.
struct FakeDrive {
    nodes: Vec<Node>,
    /// Listing inside this folder fails with 403.
    failing_parent: Option<&'static str>,
}

impl FakeDrive {
    fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            failing_parent: None,
        }
    }
}

fn parent_of(q: &str) -> String {
    let end = q.find("' in parents").unwrap_or(0);
    let start = q[..end].rfind('\'').map(|i| i + 1).unwrap_or(0);
    q[start..end].to_string()
}

fn names_in(q: &str) -> Vec<String> {
    q.split("name='")
        .skip(1)
        .filter_map(|rest| rest.split('\'').next())
        .map(str::to_string)
        .collect()
}

impl Respond for FakeDrive {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let q = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "q")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();

        let parent = parent_of(&q);
        if self.failing_parent == Some(parent.as_str()) {
            return ResponseTemplate::new(403).set_body_string("insufficient permissions");
        }

        let folders_only = q.contains(&format!("mimeType='{}'", FOLDER));
        let names = names_in(&q);

        let files: Vec<serde_json::Value> = self
            .nodes
            .iter()
            .filter(|n| n.parent == parent)
            .filter(|n| !folders_only || n.mime_type == FOLDER)
            .filter(|n| names.is_empty() || names.iter().any(|name| name == n.name))
            .map(|n| serde_json::json!({ "id": n.id, "name": n.name, "mimeType": n.mime_type }))
            .collect();

        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": files }))
    }
}

async fn start(drive: FakeDrive) -> MockServer {
    let mock_server = MockServer::start().await;
    mount_token_endpoint(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(drive)
        .mount(&mock_server)
        .await;
    mock_server
}

async fn listing_queries(mock_server: &MockServer) -> Vec<String> {
    mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/files")
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "q")
                .map(|(_, v)| v.into_owned())
        })
        .collect()
}

#[tokio::test]
async fn test_image_ranked_before_pdf() {
    let mock_server = start(FakeDrive::new(vec![
        folder("bookA", "BookA", "root"),
        file("f-pdf", "123.pdf", "bookA"),
        file("f-png", "123.png", "bookA"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server).with_root_folder("root"));
    let key = LookupKey::new("BookA", "123").unwrap();
    let result = service.locate(&key).await.unwrap();

    assert!(result.found);
    assert_eq!(result.rule, Some(MatchRule::BookFolder));
    let names: Vec<&str> = result.candidates.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["123.png", "123.pdf"]);
    assert_eq!(result.best().unwrap().id, "f-png");
    assert_eq!(result.folders_visited, 1);

    // The direct search inside the book folder runs once.
    let direct = listing_queries(&mock_server)
        .await
        .into_iter()
        .filter(|q| q.contains("'bookA' in parents") && q.contains("name='123.png'"))
        .count();
    assert_eq!(direct, 1);
}

#[tokio::test]
async fn test_legacy_name_found_when_no_book_folder() {
    let mock_server = start(FakeDrive::new(vec![
        folder("sub", "sub", "root"),
        file("legacy", "BookA-123.jpg", "sub"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "123").unwrap();
    let result = service.locate_in(&key, "root").await.unwrap();

    assert!(result.found);
    assert_eq!(result.rule, Some(MatchRule::LegacyName));
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].id, "legacy");
    assert_eq!(result.folders_visited, 2);
}

#[tokio::test]
async fn test_legacy_search_after_empty_book_folder() {
    let mock_server = start(FakeDrive::new(vec![
        folder("bookA", "BookA", "root"),
        folder("old", "old", "root"),
        file("other", "999.png", "bookA"),
        file("legacy", "BookA-123.pdf", "old"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "123").unwrap();
    let result = service.locate_in(&key, "root").await.unwrap();

    assert!(result.found);
    assert_eq!(result.rule, Some(MatchRule::LegacyName));
    assert_eq!(result.candidates[0].name, "BookA-123.pdf");
    // bookA for the current layout, then root, bookA and old for the legacy one.
    assert_eq!(result.folders_visited, 4);
}

#[tokio::test]
async fn test_not_found_is_not_an_error() {
    let mock_server = start(FakeDrive::new(vec![
        folder("bookA", "BookA", "root"),
        file("f1", "124.png", "bookA"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "123").unwrap();
    let result = service.locate_in(&key, "root").await.unwrap();

    assert!(!result.found);
    assert!(result.candidates.is_empty());
    assert_eq!(result.rule, None);
    assert!(result.best().is_none());
}

#[tokio::test]
async fn test_first_listed_book_folder_wins() {
    let mock_server = start(FakeDrive::new(vec![
        folder("bookA-1", "BookA", "root"),
        folder("bookA-2", "BookA", "root"),
        file("in-first", "123.jpg", "bookA-1"),
        file("in-second", "123.jpeg", "bookA-2"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "123").unwrap();
    let result = service.locate_in(&key, "root").await.unwrap();

    let ids: Vec<&str> = result.candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["in-first"]);
}

#[tokio::test]
async fn test_shallowest_folder_with_a_match_ends_search() {
    let mock_server = start(FakeDrive::new(vec![
        folder("bookA", "BookA", "root"),
        folder("y2019", "2019", "bookA"),
        folder("y2020", "2020", "bookA"),
        folder("q1", "q1", "y2019"),
        file("deep-png", "123.png", "q1"),
        file("shallow-pdf", "123.pdf", "y2020"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "123").unwrap();
    let result = service.locate_in(&key, "root").await.unwrap();

    assert_eq!(result.rule, Some(MatchRule::BookFolder));
    let ids: Vec<&str> = result.candidates.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["shallow-pdf"]);
    assert_eq!(result.folders_visited, 3);
}

#[tokio::test]
async fn test_folder_budget_bounds_search() {
    let mock_server = start(FakeDrive::new(vec![
        folder("bookA", "BookA", "root"),
        folder("sub", "sub", "bookA"),
        file("f1", "123.png", "sub"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server).with_max_folders(1));
    let key = LookupKey::new("BookA", "123").unwrap();
    let result = service.locate_in(&key, "root").await.unwrap();

    assert!(!result.found);
    assert_eq!(result.folders_visited, 2);
}

#[tokio::test]
async fn test_spreadsheet_style_workcode_is_normalized() {
    let mock_server = start(FakeDrive::new(vec![
        folder("bookA", "BookA", "root"),
        file("f1", "6521.jpg", "bookA"),
    ]))
    .await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "6521.0").unwrap();
    let result = service.locate_in(&key, "root").await.unwrap();

    assert!(result.found);
    assert_eq!(result.candidates[0].name, "6521.jpg");
}

#[tokio::test]
async fn test_listing_failure_carries_query() {
    let mut drive = FakeDrive::new(vec![folder("bookA", "BookA", "root")]);
    drive.failing_parent = Some("bookA");
    let mock_server = start(drive).await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "123").unwrap();

    match service.locate_in(&key, "root").await {
        Err(NukigataError::Lookup { query, message }) => {
            assert!(query.contains("'bookA' in parents"));
            assert!(message.contains("403"));
        }
        other => panic!("expected Lookup error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_token_reused_across_lookups() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.once",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(wiremock::matchers::header("authorization", "Bearer ya29.once"))
        .respond_with(FakeDrive::new(vec![
            folder("bookA", "BookA", "root"),
            file("f1", "1.png", "bookA"),
        ]))
        .mount(&mock_server)
        .await;

    let service = mock_service(mock_config(&mock_server));
    for wc in ["1", "2"] {
        let key = LookupKey::new("BookA", wc).unwrap();
        service.locate_in(&key, "root").await.unwrap();
    }
}

#[tokio::test]
async fn test_empty_root_is_config_error() {
    let mock_server = start(FakeDrive::new(Vec::new())).await;

    let service = mock_service(mock_config(&mock_server));
    let key = LookupKey::new("BookA", "1").unwrap();
    assert!(matches!(
        service.locate_in(&key, " ").await,
        Err(NukigataError::Config { .. })
    ));
}
