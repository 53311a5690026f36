use mediator_core::{MediatorError, ResourceType, Result};
use serde_json::{Value, json};

/// Identifier type OpenMRS files the CHT correlation key under.
pub const CHT_PATIENT_ID_TYPE: &str = "CHT Patient ID";
/// Identifier type for CHT document ids carried alongside.
pub const CHT_DOCUMENT_ID_TYPE: &str = "CHT Document ID";

/// Adapt a canonical FHIR resource to the shape OpenMRS accepts.
///
/// The official identifier is preserved untouched; only OpenMRS-specific
/// decoration is added. Server-assigned fields from the FHIR store (`id`,
/// `meta`) are dropped so OpenMRS assigns its own.
pub fn to_openmrs(resource_type: ResourceType, payload: &Value) -> Result<Value> {
    match resource_type {
        ResourceType::Patient => patient_to_openmrs(payload),
        ResourceType::Encounter => encounter_to_openmrs(payload),
        ResourceType::Observation => Ok(strip_server_fields(payload)),
        other => Err(MediatorError::InvalidResourceType(format!(
            "{other} is not synced to OpenMRS"
        ))),
    }
}

fn strip_server_fields(payload: &Value) -> Value {
    let mut out = payload.clone();
    if let Some(obj) = out.as_object_mut() {
        obj.remove("id");
        obj.remove("meta");
    }
    out
}

fn patient_to_openmrs(payload: &Value) -> Result<Value> {
    let mut patient = strip_server_fields(payload);

    // OpenMRS needs each identifier tagged with a provisioned identifier type.
    let entries = patient
        .get_mut("identifier")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| {
            MediatorError::validation(
                "Patient",
                vec!["identifier: missing required array".to_string()],
            )
        })?;
    for entry in entries {
        if entry.get("type").is_none() {
            entry["type"] = json!({ "text": CHT_PATIENT_ID_TYPE });
        }
    }

    Ok(patient)
}

fn encounter_to_openmrs(payload: &Value) -> Result<Value> {
    let mut encounter = strip_server_fields(payload);

    // The canonical shape carries subject as a single-entry array; the OpenMRS
    // R4 module expects a bare reference object.
    if let Some(subject) = encounter
        .get("subject")
        .and_then(Value::as_array)
        .and_then(|subjects| subjects.first())
        .cloned()
    {
        encounter["subject"] = subject;
    }

    Ok(encounter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patient_identifiers_are_typed() {
        let patient = json!({
            "resourceType": "Patient",
            "id": "store-id",
            "meta": { "versionId": "1" },
            "identifier": [{ "system": "official", "value": "p-1" }],
            "name": [{ "given": ["Jane"], "family": "Doe" }],
            "gender": "female",
        });
        let out = to_openmrs(ResourceType::Patient, &patient).unwrap();
        assert_eq!(out["identifier"][0]["type"]["text"], CHT_PATIENT_ID_TYPE);
        assert_eq!(out["identifier"][0]["value"], "p-1");
        assert!(out.get("id").is_none());
        assert!(out.get("meta").is_none());
    }

    #[test]
    fn test_patient_without_identifier_fails() {
        let err = to_openmrs(ResourceType::Patient, &json!({ "resourceType": "Patient" }))
            .unwrap_err();
        assert!(matches!(err, MediatorError::Validation { .. }));
    }

    #[test]
    fn test_encounter_subject_array_collapses_to_reference() {
        let encounter = json!({
            "resourceType": "Encounter",
            "subject": [{ "reference": "Patient/p-1" }],
        });
        let out = to_openmrs(ResourceType::Encounter, &encounter).unwrap();
        assert_eq!(out["subject"]["reference"], "Patient/p-1");
    }

    #[test]
    fn test_observation_passes_through_minus_server_fields() {
        let observation = json!({
            "resourceType": "Observation",
            "id": "store-id",
            "status": "final",
            "code": { "text": "height" },
        });
        let out = to_openmrs(ResourceType::Observation, &observation).unwrap();
        assert!(out.get("id").is_none());
        assert_eq!(out["code"]["text"], "height");
    }

    #[test]
    fn test_unsupported_type_is_rejected() {
        let err = to_openmrs(ResourceType::Subscription, &json!({})).unwrap_err();
        assert!(matches!(err, MediatorError::InvalidResourceType(_)));
    }
}
