//! Integration tests against a mocked FHIR store.

use std::sync::Arc;
use std::time::Duration;

use mediator_core::{MediatorError, ResourceType};
use mediator_fhir::{CallbackResolver, FhirClient, SubscriptionManager};
use serde_json::json;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Arc<FhirClient> {
    Arc::new(
        FhirClient::new(&server.uri(), "interop", "secret", Duration::from_secs(2)).unwrap(),
    )
}

#[tokio::test]
async fn create_subscription_posts_resource_with_basic_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Subscription"))
        .and(basic_auth("interop", "secret"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resourceType": "Subscription",
            "id": "p-123",
            "status": "requested",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = SubscriptionManager::new(client(&server));
    let created = manager
        .create("p-123", "https://callback.example/hook")
        .await
        .unwrap();
    assert_eq!(created["id"], "p-123");
}

#[tokio::test]
async fn delete_subscription_tolerates_absent_id() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/Subscription/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let manager = SubscriptionManager::new(client(&server));
    manager.delete("gone").await.unwrap();
}

#[tokio::test]
async fn resolver_returns_endpoint_resource() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Organization"))
        .and(query_param("identifier", "test-org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "total": 1,
            "entry": [{ "resource": {
                "resourceType": "Organization",
                "identifier": [{ "system": "official", "value": "test-org" }],
                "endpoint": [{
                    "reference": "Endpoint/e-1",
                    "identifier": { "system": "official", "value": "test-endpoint" },
                }],
            }}],
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/Endpoint"))
        .and(query_param("identifier", "test-endpoint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "total": 1,
            "entry": [{ "resource": {
                "resourceType": "Endpoint",
                "identifier": [{ "system": "official", "value": "test-endpoint" }],
                "address": "https://interop.example/callback",
            }}],
        })))
        .mount(&server)
        .await;

    let resolver = CallbackResolver::new(client(&server));
    let address = resolver.resolve_callback_address("test-org").await.unwrap();
    assert_eq!(address, "https://interop.example/callback");
}

#[tokio::test]
async fn resolver_fails_with_missing_endpoint_when_org_has_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "total": 1,
            "entry": [{ "resource": {
                "resourceType": "Organization",
                "identifier": [{ "system": "official", "value": "test-org" }],
            }}],
        })))
        .mount(&server)
        .await;

    let resolver = CallbackResolver::new(client(&server));
    let err = resolver
        .resolve_callback_endpoint("test-org")
        .await
        .unwrap_err();
    assert!(matches!(err, MediatorError::MissingEndpoint { .. }));
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn resolver_reports_unknown_organization_as_missing_reference() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "total": 0,
            "entry": [],
        })))
        .mount(&server)
        .await;

    let resolver = CallbackResolver::new(client(&server));
    let err = resolver
        .resolve_callback_endpoint("nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, MediatorError::MissingReference { .. }));
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn search_parses_bundle_total_and_entries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Patient"))
        .and(query_param("identifier", "p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resourceType": "Bundle",
            "total": 1,
            "entry": [{ "resource": { "resourceType": "Patient", "id": "abc" } }],
        })))
        .mount(&server)
        .await;

    let bundle = client(&server)
        .search(ResourceType::Patient, "p-1")
        .await
        .unwrap();
    assert_eq!(bundle.total, 1);
    assert_eq!(bundle.first_resource().unwrap()["id"], "abc");
}

#[tokio::test]
async fn store_rejection_surfaces_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Subscription"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "resourceType": "OperationOutcome",
        })))
        .mount(&server)
        .await;

    let manager = SubscriptionManager::new(client(&server));
    let err = manager
        .create("p-123", "https://callback.example/hook")
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 422);
    assert!(!err.is_retryable());
}
