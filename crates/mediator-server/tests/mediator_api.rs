//! End-to-end tests for the HTTP surface: the axum app wired against
//! wiremock stand-ins for the FHIR store, CHT, and OpenMRS.

use assert_json_diff::assert_json_include;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use mediator_server::config::{AppConfig, RemoteConfig};
use mediator_server::{AppState, build_router};
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn remote(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        url: server.uri(),
        username: "interop-client".into(),
        password: "interop-password".into(),
        timeout_ms: 2_000,
    }
}

async fn app(fhir: &MockServer, cht: &MockServer, openmrs: &MockServer) -> Router {
    let mut config = AppConfig::default();
    config.fhir = remote(fhir);
    config.cht = remote(cht);
    config.openmrs = remote(openmrs);
    config.sync.retry.max_attempts = 2;
    config.sync.retry.base_delay_ms = 1;

    let (_tx, rx) = watch::channel(false);
    let state = AppState::from_config(&config, rx).unwrap();
    build_router(state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bundle(resources: &[Value]) -> Value {
    json!({
        "resourceType": "Bundle",
        "total": resources.len(),
        "entry": resources.iter().map(|r| json!({ "resource": r })).collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn health_reports_success() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;
    let app = app(&fhir, &cht, &openmrs).await;

    let request = Request::builder()
        .uri("/mediator/")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "success" }));
}

#[tokio::test]
async fn endpoint_registration_relays_store_response() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    let endpoint = json!({
        "resourceType": "Endpoint",
        "identifier": [{ "system": "official", "value": "ep-callback" }],
        "status": "active",
        "address": "https://callback.example/hook",
        "payloadType": [{ "text": "application/fhir+json" }],
        "connectionType": { "code": "hl7-fhir-rest" },
    });
    let stored = {
        let mut stored = endpoint.clone();
        stored["id"] = json!("srv-assigned-9");
        stored
    };
    Mock::given(method("POST"))
        .and(path("/Endpoint"))
        .respond_with(ResponseTemplate::new(201).set_body_json(&stored))
        .expect(1)
        .mount(&fhir)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let (status, body) = send(app, post_json("/mediator/endpoint", &endpoint)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "srv-assigned-9");
}

#[tokio::test]
async fn invalid_organization_is_rejected_before_any_store_write() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/Organization"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&fhir)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    // Missing name and carrying two endpoint references
    let organization = json!({
        "resourceType": "Organization",
        "identifier": [{ "system": "official", "value": "test-org" }],
        "endpoint": [
            { "identifier": { "value": "ep-1" } },
            { "identifier": { "value": "ep-2" } },
        ],
    });
    let (status, body) = send(app, post_json("/mediator/organization", &organization)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["resourceType"], "OperationOutcome");
    assert_eq!(body["issue"][0]["code"], "invariant");
}

#[tokio::test]
async fn service_request_registers_subscription_for_patient_encounters() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    let organization = json!({
        "resourceType": "Organization",
        "id": "org-1",
        "identifier": [{ "system": "official", "value": "test-org" }],
        "name": "Test Requesting Org",
        "endpoint": [{ "identifier": { "value": "ep-callback" } }],
    });
    Mock::given(method("GET"))
        .and(path("/Organization"))
        .and(query_param("identifier", "test-org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[organization])))
        .mount(&fhir)
        .await;

    let endpoint = json!({
        "resourceType": "Endpoint",
        "id": "ep-1",
        "identifier": [{ "system": "official", "value": "ep-callback" }],
        "status": "active",
        "address": "https://callback.example/hook",
        "payloadType": [{ "text": "application/fhir+json" }],
    });
    Mock::given(method("GET"))
        .and(path("/Endpoint"))
        .and(query_param("identifier", "ep-callback"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[endpoint])))
        .mount(&fhir)
        .await;

    Mock::given(method("POST"))
        .and(path("/Subscription"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resourceType": "Subscription",
            "id": "patient-42",
            "status": "requested",
            "criteria": "Encounter?identifier=patient-42",
        })))
        .expect(1)
        .mount(&fhir)
        .await;

    Mock::given(method("POST"))
        .and(path("/ServiceRequest"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resourceType": "ServiceRequest",
            "id": "sr-1",
        })))
        .expect(1)
        .mount(&fhir)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v2/records"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&cht)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let service_request = json!({
        "resourceType": "ServiceRequest",
        "status": "active",
        "intent": "order",
        "subject": { "reference": "Patient/patient-42" },
        "requester": { "reference": "Organization/test-org" },
    });
    let (status, body) = send(app, post_json("/mediator/service-request", &service_request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_json_include!(
        actual: body,
        expected: json!({
            "resourceType": "Subscription",
            "criteria": "Encounter?identifier=patient-42",
        })
    );
}

#[tokio::test]
async fn service_request_without_registered_endpoint_is_a_client_error() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    let organization = json!({
        "resourceType": "Organization",
        "id": "org-1",
        "identifier": [{ "system": "official", "value": "test-org" }],
        "name": "Org With No Endpoint",
    });
    Mock::given(method("GET"))
        .and(path("/Organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[organization])))
        .mount(&fhir)
        .await;
    Mock::given(method("POST"))
        .and(path("/Subscription"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&fhir)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let service_request = json!({
        "resourceType": "ServiceRequest",
        "status": "active",
        "intent": "order",
        "subject": { "reference": "Patient/patient-42" },
        "requester": { "reference": "Organization/test-org" },
    });
    let (status, body) = send(app, post_json("/mediator/service-request", &service_request)).await;

    // 400 with no endpoint attached, matching the resolver's contract
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["resourceType"], "OperationOutcome");
    assert!(
        body["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("no endpoint attached")
    );
}

#[tokio::test]
async fn subscription_callback_syncs_resource_to_openmrs() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    let patient = json!({
        "resourceType": "Patient",
        "id": "fhir-7",
        "identifier": [{ "system": "official", "value": "patient-42" }],
        "name": [{ "given": ["Atai"], "family": "Omoruyi" }],
        "gender": "male",
    });
    Mock::given(method("GET"))
        .and(path("/Patient"))
        .and(query_param("identifier", "patient-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[patient.clone()])))
        .mount(&fhir)
        .await;

    // OpenMRS has no copy yet: callback ends in a create.
    Mock::given(method("GET"))
        .and(path("/ws/fhir2/R4/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[])))
        .mount(&openmrs)
        .await;
    Mock::given(method("POST"))
        .and(path("/ws/fhir2/R4/Patient"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resourceType": "Patient",
            "id": "omrs-11",
        })))
        .expect(1)
        .mount(&openmrs)
        .await;
    // Pipeline writes the assigned OpenMRS id back onto the store copy.
    Mock::given(method("PUT"))
        .and(path("/Patient/fhir-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&patient))
        .mount(&fhir)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let (status, body) = send(app, post_json("/mediator/callback", &patient)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["summary"]["counts"]["Patient"]["created"], 1);
}

#[tokio::test]
async fn encounter_callback_retires_the_follow_up_subscription() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    let encounter = json!({
        "resourceType": "Encounter",
        "id": "enc-1",
        "identifier": [{
            "system": "official",
            "value": "5f0a7f2e-0f43-4a1e-9d2f-90b0a1a2b3c4",
        }],
        "status": "finished",
        "class": { "code": "AMB" },
        "type": [{ "text": "follow up" }],
        "subject": [{ "reference": "Patient/patient-42" }],
        "participant": [{ "type": [{ "text": "CHW" }] }],
    });
    Mock::given(method("GET"))
        .and(path("/Encounter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[encounter.clone()])))
        .mount(&fhir)
        .await;
    Mock::given(method("GET"))
        .and(path("/ws/fhir2/R4/Encounter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[])))
        .mount(&openmrs)
        .await;
    Mock::given(method("POST"))
        .and(path("/ws/fhir2/R4/Encounter"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resourceType": "Encounter",
            "id": "omrs-enc-1",
        })))
        .mount(&openmrs)
        .await;
    // Subscription id is the patient id; the callback retires it.
    Mock::given(method("DELETE"))
        .and(path("/Subscription/patient-42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fhir)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let (status, body) = send(app, post_json("/mediator/callback", &encounter)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["counts"]["Encounter"]["created"], 1);
}

#[tokio::test]
async fn explicit_sync_provisions_identifier_types_and_reports_counts() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    // Identifier types already exist; OpenMRS rejects the duplicates.
    Mock::given(method("POST"))
        .and(path("/ws/rest/v1/patientidentifiertype"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "Identifier type name already in use" }
        })))
        .expect(2)
        .mount(&openmrs)
        .await;

    let patient = json!({
        "resourceType": "Patient",
        "id": "fhir-7",
        "identifier": [{ "system": "official", "value": "patient-42" }],
        "name": [{ "given": ["Atai"], "family": "Omoruyi" }],
        "gender": "male",
    });
    for rt in ["Patient", "Encounter", "Observation"] {
        let body = if rt == "Patient" {
            bundle(&[patient.clone()])
        } else {
            bundle(&[])
        };
        Mock::given(method("GET"))
            .and(path(format!("/{rt}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&fhir)
            .await;
    }

    // OpenMRS already holds an identical copy (typed identifier included):
    // the run is a no-op.
    let existing = {
        let mut existing = patient.clone();
        existing["id"] = json!("omrs-11");
        existing["identifier"][0]["type"] = json!({ "text": "CHT Patient ID" });
        existing
    };
    Mock::given(method("GET"))
        .and(path("/ws/fhir2/R4/Patient"))
        .and(query_param("identifier", "patient-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[existing])))
        .mount(&openmrs)
        .await;
    Mock::given(method("POST"))
        .and(path("/ws/fhir2/R4/Patient"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&openmrs)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let request = Request::builder()
        .uri("/mediator/openmrs/sync")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["counts"]["Patient"]["skipped"], 1);
    assert_eq!(body["summary"]["counts"]["Patient"]["created"], 0);
}

#[tokio::test]
async fn identifier_type_provisioning_failure_aborts_the_sync() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    // A 500 from OpenMRS is a fault, not a duplicate: the sync must stop
    // before touching the FHIR store.
    Mock::given(method("POST"))
        .and(path("/ws/rest/v1/patientidentifiertype"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "Internal server error" }
        })))
        .expect(1)
        .mount(&openmrs)
        .await;
    Mock::given(method("GET"))
        .and(path("/Patient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[])))
        .expect(0)
        .mount(&fhir)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let request = Request::builder()
        .uri("/mediator/openmrs/sync")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["resourceType"], "OperationOutcome");
}

#[tokio::test]
async fn cht_person_webhook_lands_in_fhir_store() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/Patient"))
        .and(query_param("identifier", "p-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[])))
        .mount(&fhir)
        .await;
    Mock::given(method("POST"))
        .and(path("/Patient"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "resourceType": "Patient",
            "id": "fhir-1",
        })))
        .expect(1)
        .mount(&fhir)
        .await;

    let app = app(&fhir, &cht, &openmrs).await;
    let person = json!({
        "_id": "p-123",
        "name": "CHTOpenMRS Patient",
        "sex": "female",
        "date_of_birth": "1990-05-15",
    });
    let (status, body) = send(app, post_json("/mediator/cht/patient", &person)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["counts"]["Patient"]["created"], 1);
}

#[tokio::test]
async fn cht_record_webhook_creates_encounter_and_observations() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    for rt in ["Encounter", "Observation"] {
        Mock::given(method("GET"))
            .and(path(format!("/{rt}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[])))
            .mount(&fhir)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{rt}")))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "resourceType": rt, "id": "stored" })),
            )
            .mount(&fhir)
            .await;
    }

    let app = app(&fhir, &cht, &openmrs).await;
    let record = json!({
        "_id": "rec-0001",
        "form": "pnc_danger_sign_follow_up",
        "patient_id": "p-123",
        "fields": {
            "temperature": 37.5,
            "weight": 62.0,
            "notes": "seen at home",
        },
    });
    let (status, body) = send(app, post_json("/mediator/cht/record", &record)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["counts"]["Encounter"]["created"], 1);
    assert_eq!(body["summary"]["counts"]["Observation"]["created"], 2);
}

#[tokio::test]
async fn cht_record_redelivery_creates_nothing_new() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    let record = json!({
        "_id": "rec-0001",
        "form": "pnc_danger_sign_follow_up",
        "patient_id": "p-123",
        "fields": { "temperature": 37.5 },
    });
    // The identifiers are derived from the record, so both deliveries search
    // (and upsert) under the same keys.
    let encounter = mediator_cht::encounter_from_record(&record, "p-123").unwrap();
    let encounter_id = mediator_core::official_identifier(&encounter)
        .unwrap()
        .to_string();
    let observation = mediator_cht::observations_from_record(&record, "p-123", &encounter_id)
        .unwrap()
        .remove(0);
    let observation_id = mediator_core::official_identifier(&observation)
        .unwrap()
        .to_string();

    // The first delivery sees an empty store and creates both resources...
    Mock::given(method("GET"))
        .and(path("/Encounter"))
        .and(query_param("identifier", encounter_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[])))
        .up_to_n_times(1)
        .mount(&fhir)
        .await;
    Mock::given(method("GET"))
        .and(path("/Observation"))
        .and(query_param("identifier", observation_id.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[])))
        .up_to_n_times(1)
        .mount(&fhir)
        .await;
    // ...the second finds the copies the first one stored.
    let stored_encounter = {
        let mut stored = encounter.clone();
        stored["id"] = json!("enc-row-1");
        stored
    };
    let stored_observation = {
        let mut stored = observation.clone();
        stored["id"] = json!("obs-row-1");
        stored
    };
    Mock::given(method("GET"))
        .and(path("/Encounter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[stored_encounter])))
        .mount(&fhir)
        .await;
    Mock::given(method("GET"))
        .and(path("/Observation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bundle(&[stored_observation])))
        .mount(&fhir)
        .await;
    for rt in ["Encounter", "Observation"] {
        Mock::given(method("POST"))
            .and(path(format!("/{rt}")))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "resourceType": rt, "id": "stored" })),
            )
            .expect(1)
            .mount(&fhir)
            .await;
    }

    let app = app(&fhir, &cht, &openmrs).await;
    let (status, first) = send(app.clone(), post_json("/mediator/cht/record", &record)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["summary"]["counts"]["Encounter"]["created"], 1);
    assert_eq!(first["summary"]["counts"]["Observation"]["created"], 1);

    let (status, second) = send(app, post_json("/mediator/cht/record", &record)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["summary"]["counts"]["Encounter"]["created"], 0);
    assert_eq!(second["summary"]["counts"]["Encounter"]["skipped"], 1);
    assert_eq!(second["summary"]["counts"]["Observation"]["created"], 0);
    assert_eq!(second["summary"]["counts"]["Observation"]["skipped"], 1);
}

#[tokio::test]
async fn callback_without_official_identifier_is_rejected() {
    let fhir = MockServer::start().await;
    let cht = MockServer::start().await;
    let openmrs = MockServer::start().await;

    let app = app(&fhir, &cht, &openmrs).await;
    let payload = json!({ "resourceType": "Patient", "identifier": [] });
    let (status, body) = send(app, post_json("/mediator/callback", &payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["resourceType"], "OperationOutcome");
}
