use mediator_core::{Identifier, MediatorError, ResourceType, Result, reference, time};
use mediator_schema::contract::VALID_GENDERS;
use serde_json::{Value, json};
use uuid::Uuid;

/// Map a CHT person document to a canonical FHIR Patient.
///
/// The CHT document id becomes the official identifier; system-internal ids
/// never cross the boundary as correlation keys.
pub fn patient_from_person(person: &Value) -> Result<Value> {
    let id = person
        .get("_id")
        .or_else(|| person.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| MediatorError::invalid_argument("person._id", "missing"))?;

    let name = person
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| MediatorError::invalid_argument("person.name", "missing"))?;

    let gender = person
        .get("sex")
        .or_else(|| person.get("gender"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    if !VALID_GENDERS.contains(&gender) {
        return Err(MediatorError::validation(
            "Patient",
            vec![format!("gender: '{gender}' is not one of {VALID_GENDERS:?}")],
        ));
    }

    let mut given: Vec<&str> = name.split_whitespace().collect();
    let family = if given.len() > 1 { given.pop() } else { None };

    let mut patient = json!({
        "resourceType": "Patient",
        "identifier": [Identifier::official(id)],
        "name": [{
            "given": given,
            "family": family.unwrap_or(""),
            "text": name,
        }],
        "gender": gender,
    });

    if let Some(phone) = person.get("phone").and_then(Value::as_str) {
        patient["telecom"] = json!([{ "system": "phone", "value": phone }]);
    }
    if let Some(dob) = person.get("date_of_birth").and_then(Value::as_str) {
        patient["birthDate"] = json!(dob);
    }

    Ok(patient)
}

/// The CHT document id of a record, the seed for every identifier the
/// record's resources carry. A re-delivered webhook carries the same id,
/// so it re-enters the keyed upsert instead of minting duplicates.
fn record_document_id(record: &Value) -> Result<&str> {
    record
        .get("_id")
        .or_else(|| record.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| MediatorError::invalid_argument("record._id", "missing"))
}

fn derived_uuid(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Map a CHT report record to a canonical FHIR Encounter for a patient.
///
/// The official identifier is a UUID derived from the record's document id,
/// never a random one: webhook deliveries are at-least-once, and only a
/// deterministic key makes the second delivery an update-or-skip.
pub fn encounter_from_record(record: &Value, patient_id: &str) -> Result<Value> {
    if patient_id.is_empty() {
        return Err(MediatorError::invalid_argument("patientId", "empty string"));
    }

    let record_id = record_document_id(record)?;
    let form = record
        .get("form")
        .and_then(Value::as_str)
        .unwrap_or("community-visit");

    let mut encounter = json!({
        "resourceType": "Encounter",
        "identifier": [Identifier::official(derived_uuid(record_id))],
        "status": "finished",
        "class": { "system": "http://terminology.hl7.org/CodeSystem/v3-ActCode", "code": "AMB" },
        "type": [{ "text": form }],
        "subject": [{ "reference": reference(ResourceType::Patient, patient_id) }],
        "participant": [{ "type": [{ "text": "Community Health Worker" }] }],
    });

    if let Some(reported) = record
        .get("reported_date")
        .and_then(Value::as_i64)
        .and_then(time::from_epoch_millis)
    {
        encounter["period"] = json!({ "start": time::format_fhir(reported) });
    }

    Ok(encounter)
}

/// Map the numeric fields of a CHT report to FHIR Observations tied to an
/// encounter. Non-numeric fields are skipped; they are report metadata.
///
/// Each observation's official identifier is derived from the record's
/// document id plus the field name, so re-delivery upserts the same set.
pub fn observations_from_record(
    record: &Value,
    patient_id: &str,
    encounter_id: &str,
) -> Result<Vec<Value>> {
    if patient_id.is_empty() {
        return Err(MediatorError::invalid_argument("patientId", "empty string"));
    }

    let record_id = record_document_id(record)?;
    let fields = record
        .get("fields")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let observations = fields
        .iter()
        .filter_map(|(key, value)| {
            let number = value.as_f64()?;
            Some(json!({
                "resourceType": "Observation",
                "identifier": [Identifier::official(derived_uuid(&format!("{record_id}/{key}")))],
                "status": "final",
                "code": { "text": key },
                "subject": { "reference": reference(ResourceType::Patient, patient_id) },
                "encounter": { "reference": reference(ResourceType::Encounter, encounter_id) },
                "valueQuantity": { "value": number },
            }))
        })
        .collect();

    Ok(observations)
}
