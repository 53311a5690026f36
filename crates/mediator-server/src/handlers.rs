use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mediator_core::{MediatorError, ResourceType, split_reference};
use mediator_openmrs::{CHT_DOCUMENT_ID_TYPE, CHT_PATIENT_ID_TYPE};
use serde_json::{Value, json};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Liveness probe, also used by the OpenHIM heartbeat.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "success" }))
}

/// Explicit "sync now": push every synced collection into OpenMRS.
///
/// Identifier types are provisioned first so patient upserts can tag their
/// identifiers. Provisioning is idempotent from our side: OpenMRS answers
/// a duplicate name with 400 or 409, which means the type already exists.
/// Any other rejection (auth, server fault) aborts the sync.
pub async fn sync_openmrs(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    for name in [CHT_PATIENT_ID_TYPE, CHT_DOCUMENT_ID_TYPE] {
        match state.openmrs.create_identifier_type(name).await {
            Ok(_) => tracing::info!(name, "provisioned OpenMRS identifier type"),
            Err(MediatorError::UpstreamRejected {
                status: 400 | 409, ..
            }) => {
                tracing::debug!(name, "OpenMRS identifier type already present");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let summary = state
        .pipeline
        .sync_to_openmrs(state.shutdown.clone())
        .await?;
    Ok(Json(json!({ "status": "success", "summary": summary })))
}

/// Subscription callback from the FHIR store.
///
/// The store posts the matched resource; we re-read it by official identifier
/// and drive it through the same upsert pipeline as a full sync, so a callback
/// racing a sync run cannot create duplicates.
pub async fn subscription_callback(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let resource_type = require_resource_type(&payload)?;
    let identifier = mediator_core::official_identifier(&payload)?.to_string();

    let summary = state
        .pipeline
        .handle_callback(resource_type, &identifier)
        .await?;

    // An Encounter callback means the follow-up happened: the one-shot
    // subscription (its id is the patient id) has served its purpose.
    if resource_type == ResourceType::Encounter
        && let Some(patient_id) = encounter_patient_id(&payload)
    {
        if let Err(err) = state.subscriptions.delete(patient_id).await {
            tracing::warn!(patient_id, error = %err, "failed to retire subscription");
        }
    }

    Ok(Json(json!({ "status": "success", "summary": summary })))
}

/// Patient id from an Encounter's single-entry subject array.
fn encounter_patient_id(encounter: &Value) -> Option<&str> {
    let reference = encounter
        .pointer("/subject/0/reference")
        .and_then(Value::as_str)?;
    match split_reference(reference) {
        Some((ResourceType::Patient, id)) => Some(id),
        _ => None,
    }
}

/// Register a callback Endpoint in the FHIR store.
pub async fn create_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Response> {
    relay_create(&state, ResourceType::Endpoint, payload).await
}

/// Register a requesting Organization in the FHIR store.
pub async fn create_organization(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Response> {
    relay_create(&state, ResourceType::Organization, payload).await
}

/// Lost-to-follow-up request: a remote system asks to be told when a patient
/// next has an encounter.
///
/// The requester's Organization reference is resolved to its registered
/// Endpoint, and a rest-hook Subscription pointing at that address is created
/// in the FHIR store. The stored ServiceRequest keeps the audit trail; the
/// Subscription does the actual work.
pub async fn create_service_request(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    mediator_schema::ensure_valid(ResourceType::ServiceRequest, &payload)?;

    let patient_ref = require_str(&payload, "/subject/reference", "subject.reference")?;
    let (rt, patient_id) = split_reference(patient_ref).ok_or_else(|| {
        MediatorError::invalid_argument("subject.reference", json_type_name(&payload["subject"]))
    })?;
    if rt != ResourceType::Patient {
        return Err(MediatorError::invalid_resource_type(rt.as_str()).into());
    }

    let requester_ref = require_str(&payload, "/requester/reference", "requester.reference")?;
    let (rt, organization) = split_reference(requester_ref).ok_or_else(|| {
        MediatorError::invalid_argument(
            "requester.reference",
            json_type_name(&payload["requester"]),
        )
    })?;
    if rt != ResourceType::Organization {
        return Err(MediatorError::invalid_resource_type(rt.as_str()).into());
    }

    let callback = state.resolver.resolve_callback_address(organization).await?;
    let subscription = state.subscriptions.create(patient_id, &callback).await?;

    let (_, _stored) = state
        .fhir
        .create(ResourceType::ServiceRequest, &payload)
        .await?;

    // Raise a follow-up task for the CHW so the request shows up in CHT.
    let record = json!({
        "_meta": { "form": "interop_follow_up" },
        "patient_uuid": patient_id,
    });
    if let Err(err) = state.cht.create_record(&record).await {
        tracing::warn!(error = %err, patient_id, "failed to raise CHT follow-up task");
    }

    Ok(Json(subscription))
}

/// CHT webhook: a person document was created or updated.
pub async fn ingest_patient(
    State(state): State<AppState>,
    Json(person): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patient = mediator_cht::patient_from_person(&person)?;
    let summary = state
        .pipeline
        .ingest_to_fhir(ResourceType::Patient, patient)
        .await?;
    Ok(Json(json!({ "status": "success", "summary": summary })))
}

/// CHT webhook: a form submission arrived. Becomes one Encounter plus one
/// Observation per recorded value.
pub async fn ingest_record(
    State(state): State<AppState>,
    Json(record): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patient_id = record
        .pointer("/patient_id")
        .or_else(|| record.pointer("/fields/patient_uuid"))
        .and_then(Value::as_str)
        .ok_or_else(|| MediatorError::invalid_argument("patient_id", "undefined"))?
        .to_string();

    let encounter = mediator_cht::encounter_from_record(&record, &patient_id)?;
    let encounter_id = mediator_core::official_identifier(&encounter)?.to_string();
    let observations =
        mediator_cht::observations_from_record(&record, &patient_id, &encounter_id)?;

    let mut summary = state
        .pipeline
        .ingest_to_fhir(ResourceType::Encounter, encounter)
        .await?;
    for observation in observations {
        let obs_summary = state
            .pipeline
            .ingest_to_fhir(ResourceType::Observation, observation)
            .await?;
        for (rt, counts) in obs_summary.counts {
            let entry = summary.counts.entry(rt).or_default();
            entry.created += counts.created;
            entry.updated += counts.updated;
            entry.skipped += counts.skipped;
            entry.failed += counts.failed;
        }
    }
    Ok(Json(json!({ "status": "success", "summary": summary })))
}

/// Validate, store, and echo the remote's response verbatim. Validation
/// failures answer with the full per-field OperationOutcome rather than the
/// flattened error message.
async fn relay_create(
    state: &AppState,
    resource_type: ResourceType,
    payload: Value,
) -> ApiResult<Response> {
    let outcome = mediator_schema::validate(resource_type, &payload);
    if !outcome.valid {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(outcome.to_operation_outcome()),
        )
            .into_response());
    }
    let (status, body) = state.fhir.create(resource_type, &payload).await?;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::CREATED);
    Ok((status, Json(body)).into_response())
}

fn require_resource_type(payload: &Value) -> Result<ResourceType, ApiError> {
    let raw = payload
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            MediatorError::invalid_argument("resourceType", json_type_name(&payload["resourceType"]))
        })?;
    raw.parse::<ResourceType>()
        .map_err(|_| MediatorError::invalid_resource_type(raw).into())
}

fn require_str<'a>(payload: &'a Value, pointer: &str, name: &str) -> Result<&'a str, ApiError> {
    match payload.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => {
            Err(MediatorError::invalid_argument(name, "empty string").into())
        }
        other => Err(MediatorError::invalid_argument(
            name,
            other.map_or("undefined", json_type_name),
        )
        .into()),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
