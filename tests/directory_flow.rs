//! Integration tests for member orchestration using wiremock.
//!
//! Each test mounts the Brivo endpoints one operation touches and uses
//! `expect(n)` to pin down which calls happen and which must not:
//!
//! - create-user: new member, existing member reset, name conflict,
//!   duplicate member id, card validation, partial failure
//! - suspend/resume with and without the name guard
//! - bulk removal of credentials and groups
//! - delete-user confirmation

use std::time::Duration as StdDuration;

use brivo_bulk::api::BrivoApi;
use brivo_bulk::auth::{Credentials, TokenState};
use brivo_bulk::batch::BatchConfig;
use brivo_bulk::client::Endpoints;
use brivo_bulk::directory::{CreateUserRequest, SuspendRequest};
use brivo_bulk::error::BrivoError;
use brivo_bulk::users::RemoteId;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper: a BrivoApi with a valid token and no inter-batch pause.
fn mock_api(server: &MockServer) -> BrivoApi {
    let token = TokenState {
        access_token: "mock-token".to_string(),
        refresh_token: "mock-refresh".to_string(),
        expires_after: Utc::now() + Duration::hours(1),
    };
    BrivoApi::with_endpoints(
        Credentials::new("key", "cid", "secret", "http://localhost/cb"),
        Some(token),
        Endpoints::with_base_url(&server.uri()),
    )
    .with_batch_config(BatchConfig::new(5, StdDuration::ZERO))
}

async fn mount_member_field(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/api/custom-fields"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 3, "fieldName": "Department", "fieldType": "text"},
                {"id": 7, "fieldName": "Member ID", "fieldType": "text"}
            ]
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_member_lookup(server: &MockServer, member_id: &str, users: Value) {
    Mock::given(method("GET"))
        .and(path("/v1/api/users"))
        .and(query_param("filter", format!("cf_7__eq:{member_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": users })))
        .mount(server)
        .await;
}

async fn mount_forbidden(server: &MockServer, verb: &str, url_path: &str) {
    Mock::given(method(verb))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

fn test_user() -> Value {
    json!({"id": 16, "firstName": "Test", "lastName": "User", "suspended": false})
}

// ── create_user ────────────────────────────────────────────────────────

#[tokio::test]
async fn create_user_for_unknown_member_creates_and_assigns_everything() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "999999", json!([])).await;

    Mock::given(method("POST"))
        .and(path("/v1/api/users"))
        .and(body_json(json!({"firstName": "Test", "lastName": "User"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_user()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/api/users/16/custom-fields/7"))
        .and(body_json(json!({"value": "999999"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // Two distinct names miss the cache concurrently, so each lists groups.
    Mock::given(method("GET"))
        .and(path("/v1/api/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "111", "name": "Group1"},
                {"id": "222", "name": "Group2"},
                {"id": "333", "name": "Other"}
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/api/users/16/groups"))
        .and(body_json(json!({"addGroups": ["111", "222"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/api/credentials"))
        .and(query_param(
            "filter",
            "reference_id__eq:999;facility_code__eq:123",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 555, "referenceId": "999", "facilityCode": 123}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/api/users/16/credentials/555"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // A new user has nothing to clean up.
    mount_forbidden(&server, "GET", "/v1/api/users/16/groups").await;
    mount_forbidden(&server, "GET", "/v1/api/users/16/credentials").await;

    let request = CreateUserRequest::new("Test", "User", "999999")
        .with_groups(["Group1", "group2"])
        .with_card("123", "999");
    let user_id = api.create_user(&request).await.unwrap();

    assert_eq!(user_id, RemoteId::Number(16));
    assert_eq!(api.cache().cached_member_id_field(), Some(RemoteId::Number(7)));
}

#[tokio::test]
async fn create_user_resets_existing_member_with_same_name() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([test_user()])).await;
    mount_forbidden(&server, "POST", "/v1/api/users").await;

    Mock::given(method("GET"))
        .and(path("/v1/api/users/16/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 444, "name": "Old Group"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/api/users/16/groups"))
        .and(body_json(json!({"removeGroups": [444]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/api/users/16/credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1}, {"id": 2}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path_regex(r"^/v1/api/users/16/credentials/\d+$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/api/users/16/custom-fields/7"))
        .and(body_json(json!({"value": "42"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // No groups requested: no group listing and no assignment call.
    mount_forbidden(&server, "GET", "/v1/api/groups").await;

    let request = CreateUserRequest::new("Test", "User", "42");
    let user_id = api.create_user(&request).await.unwrap();
    assert_eq!(user_id, RemoteId::Number(16));
}

#[tokio::test]
async fn create_user_refuses_member_id_owned_by_someone_else() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(
        &server,
        "42",
        json!([{"id": 16, "firstName": "Other", "lastName": "Person"}]),
    )
    .await;

    mount_forbidden(&server, "POST", "/v1/api/users").await;
    mount_forbidden(&server, "GET", "/v1/api/users/16/groups").await;
    mount_forbidden(&server, "GET", "/v1/api/users/16/credentials").await;
    mount_forbidden(&server, "PUT", "/v1/api/users/16/custom-fields/7").await;

    let request = CreateUserRequest::new("Test", "User", "42").with_groups(["Group1"]);
    let err = api.create_user(&request).await.unwrap_err();

    assert!(matches!(err, BrivoError::Conflict(_)), "got {err:?}");
    assert!(err.to_string().contains("already exists"), "got: {err}");
}

#[tokio::test]
async fn create_user_stops_on_duplicate_member_id() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(
        &server,
        "42",
        json!([test_user(), {"id": 17, "firstName": "Test", "lastName": "User"}]),
    )
    .await;
    mount_forbidden(&server, "POST", "/v1/api/users").await;

    let err = api
        .create_user(&CreateUserRequest::new("Test", "User", "42"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, BrivoError::DuplicateMember { count: 2, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn create_user_with_half_a_card_sends_nothing() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    let mut request = CreateUserRequest::new("Test", "User", "42");
    request.card_number = Some("999".to_string());
    let err = api.create_user(&request).await.unwrap_err();

    assert!(matches!(err, BrivoError::Usage(_)), "got {err:?}");
    assert!(
        server.received_requests().await.unwrap().is_empty(),
        "card validation must run before any request"
    );
}

#[tokio::test]
async fn create_user_does_not_roll_back_member_id_when_groups_fail() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([])).await;

    Mock::given(method("POST"))
        .and(path("/v1/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_user()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/api/users/16/custom-fields/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/api/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    mount_forbidden(&server, "POST", "/v1/api/users/16/groups").await;
    mount_forbidden(&server, "DELETE", "/v1/api/users/16").await;

    let request = CreateUserRequest::new("Test", "User", "42").with_groups(["Missing"]);
    let err = api.create_user(&request).await.unwrap_err();

    assert!(matches!(err, BrivoError::NotFound(_)), "got {err:?}");
    assert!(err.to_string().contains("Group Missing not found"), "got: {err}");
}

#[tokio::test]
async fn create_user_reports_unknown_card() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([])).await;

    Mock::given(method("POST"))
        .and(path("/v1/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(test_user()))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/v1/api/users/16/custom-fields/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/api/credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let request = CreateUserRequest::new("Test", "User", "42").with_card("123", "404");
    let err = api.create_user(&request).await.unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("reference ID 404"), "got: {msg}");
    assert!(msg.contains("facility 123"), "got: {msg}");
}

// ── toggle_member_suspend ──────────────────────────────────────────────

#[tokio::test]
async fn suspend_with_mismatched_name_is_refused() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([test_user()])).await;
    mount_forbidden(&server, "PUT", "/v1/api/users/16/suspended").await;

    let request = SuspendRequest::new("42", true).expecting_name("Tes", "Use");
    let err = api.toggle_member_suspend(&request).await.unwrap_err();

    assert!(matches!(err, BrivoError::Conflict(_)), "got {err:?}");
    assert!(err.to_string().contains("Refusing"), "got: {err}");
}

#[tokio::test]
async fn suspend_with_first_name_only_is_refused() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([test_user()])).await;
    mount_forbidden(&server, "PUT", "/v1/api/users/16/suspended").await;

    // Correct first name, but the pair as a whole does not match.
    let mut request = SuspendRequest::new("42", true);
    request.first_name = Some("Test".to_string());
    let err = api.toggle_member_suspend(&request).await.unwrap_err();

    assert!(matches!(err, BrivoError::Conflict(_)), "got {err:?}");
    assert!(err.to_string().contains("Refusing"), "got: {err}");
}

#[tokio::test]
async fn suspend_with_matching_name_sets_flag() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([test_user()])).await;

    Mock::given(method("PUT"))
        .and(path("/v1/api/users/16/suspended"))
        .and(body_json(json!({"suspended": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"suspended": true})))
        .expect(1)
        .mount(&server)
        .await;

    let request = SuspendRequest::new("42", true).expecting_name("Test", "User");
    let response = api.toggle_member_suspend(&request).await.unwrap();
    assert_eq!(response, json!({"suspended": true}));
}

#[tokio::test]
async fn resume_without_names_clears_flag() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([test_user()])).await;

    Mock::given(method("PUT"))
        .and(path("/v1/api/users/16/suspended"))
        .and(body_json(json!({"suspended": false})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = api
        .toggle_member_suspend(&SuspendRequest::new("42", false))
        .await
        .unwrap();
    assert_eq!(response, json!({}));
}

#[tokio::test]
async fn suspend_unknown_member_is_user_not_found() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    mount_member_lookup(&server, "42", json!([])).await;

    let err = api
        .toggle_member_suspend(&SuspendRequest::new("42", true))
        .await
        .unwrap_err();
    assert!(err.is_user_not_found(), "got {err:?}");
}

// ── Member id lookup ───────────────────────────────────────────────────

#[tokio::test]
async fn member_id_with_reserved_characters_stays_in_the_filter() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    mount_member_field(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/api/users"))
        .and(query_param("filter", "cf_7__eq:A#1&x=y"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [test_user()]})))
        .expect(1)
        .mount(&server)
        .await;

    let user = api.find_user_by_member_id("A#1&x=y").await.unwrap();
    assert_eq!(user.id, RemoteId::Number(16));

    let requests = server.received_requests().await.unwrap();
    let lookup = requests
        .iter()
        .find(|request| request.url.path() == "/v1/api/users")
        .expect("lookup request should be recorded");
    let pairs: Vec<(String, String)> = lookup
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(
        pairs,
        vec![("filter".to_string(), "cf_7__eq:A#1&x=y".to_string())],
        "the member id must not leak into other query parameters"
    );
}

// ── Bulk removal ───────────────────────────────────────────────────────

#[tokio::test]
async fn remove_all_credentials_lists_once_and_deletes_each() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    Mock::given(method("GET"))
        .and(path("/v1/api/users/16/credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 1}, {"id": 2}, {"id": 3}, {"id": 4},
                {"id": 5}, {"id": 6}, {"id": "seven"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path_regex(r"^/v1/api/users/16/credentials/[^/]+$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(7)
        .mount(&server)
        .await;

    let removed = api
        .remove_all_credentials_from_user(&RemoteId::Number(16))
        .await
        .unwrap();
    assert_eq!(removed, 7);
}

#[tokio::test]
async fn remove_all_credentials_propagates_delete_failure() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    Mock::given(method("GET"))
        .and(path("/v1/api/users/16/credentials"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": 1}, {"id": 2}]})),
        )
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v1/api/users/16/credentials/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/v1/api/users/16/credentials/2"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "gone"})))
        .mount(&server)
        .await;

    let err = api
        .remove_all_credentials_from_user(&RemoteId::Number(16))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn list_all_user_credentials_returns_ids() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    Mock::given(method("GET"))
        .and(path("/v1/api/users/16/credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 10, "referenceId": "999", "facilityCode": 123},
            {"id": "abc"}
        ])))
        .mount(&server)
        .await;

    let ids = api
        .list_all_user_credentials(&RemoteId::Number(16))
        .await
        .unwrap();
    assert_eq!(ids, vec![RemoteId::Number(10), RemoteId::from("abc")]);
}

#[tokio::test]
async fn remove_all_groups_sends_one_removal() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    Mock::given(method("GET"))
        .and(path("/v1/api/users/16/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 111, "name": "G1"}, {"id": "222", "name": "G2"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/api/users/16/groups"))
        .and(body_json(json!({"removeGroups": [111, "222"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let removed = api
        .remove_all_groups_from_user(&RemoteId::Number(16))
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn remove_all_groups_skips_call_when_user_has_none() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    Mock::given(method("GET"))
        .and(path("/v1/api/users/16/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;
    mount_forbidden(&server, "POST", "/v1/api/users/16/groups").await;

    let removed = api
        .remove_all_groups_from_user(&RemoteId::Number(16))
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

// ── delete_user ────────────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_delete_sends_one_request() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    Mock::given(method("DELETE"))
        .and(path("/v1/api/users/16"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let response = api.delete_user(&RemoteId::Number(16), true).await.unwrap();
    assert_eq!(response, json!({}));
}

#[tokio::test]
async fn unconfirmed_delete_sends_nothing() {
    let server = MockServer::start().await;
    let api = mock_api(&server);

    let err = api
        .delete_user(&RemoteId::Number(16), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BrivoError::Usage(_)), "got {err:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}
