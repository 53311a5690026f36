use std::sync::OnceLock;

use mediator_core::{OFFICIAL_SYSTEM, ResourceType};
use serde_json::Value;
use uuid::Uuid;

use crate::outcome::{ValidationIssue, ValidationOutcome};

/// Gender codes accepted on a Patient.
pub const VALID_GENDERS: &[&str] = &["male", "female", "other", "unknown"];

/// Expected format of a leaf value.
#[derive(Debug, Clone, Copy)]
pub enum ValueFormat {
    /// Any non-empty string
    NonEmptyString,
    /// UUID-shaped string
    Uuid,
    /// One of a fixed set of codes
    Code(&'static [&'static str]),
}

impl ValueFormat {
    fn check(&self, value: &Value) -> Option<String> {
        let Some(s) = value.as_str() else {
            return Some("expected a string value".to_string());
        };
        match self {
            Self::NonEmptyString if s.is_empty() => Some("must not be empty".to_string()),
            Self::NonEmptyString => None,
            Self::Uuid => Uuid::parse_str(s)
                .is_err()
                .then(|| format!("'{s}' is not a valid UUID")),
            Self::Code(codes) => (!codes.contains(&s))
                .then(|| format!("'{s}' is not one of {codes:?}")),
        }
    }
}

/// One structural rule inside a resource contract.
#[derive(Debug, Clone, Copy)]
pub enum FieldRule {
    /// Field must be present with any value
    Present { path: &'static str },
    /// Field must be an array of exactly `len` entries
    Array { path: &'static str, len: usize },
    /// Field must be a string matching `format`
    String {
        path: &'static str,
        format: ValueFormat,
    },
    /// Field must be an identifier array of exactly one entry whose `system`
    /// matches and whose `value` matches `format`
    IdentifierArray {
        path: &'static str,
        system: &'static str,
        format: ValueFormat,
    },
    /// Field must be an identifier array with exactly one entry whose `system`
    /// matches; further entries under other systems are permitted. Patients
    /// accumulate downstream ids next to their official one.
    OfficialIdentifier {
        path: &'static str,
        system: &'static str,
        format: ValueFormat,
    },
}

impl FieldRule {
    fn evaluate(&self, payload: &Value, issues: &mut Vec<ValidationIssue>) {
        match self {
            Self::Present { path } => {
                if lookup(payload, path).is_none() {
                    issues.push(ValidationIssue::error(*path, "missing required field"));
                }
            }
            Self::Array { path, len } => match lookup(payload, path).and_then(Value::as_array) {
                None => issues.push(ValidationIssue::error(*path, "missing required array")),
                Some(entries) if entries.len() != *len => issues.push(ValidationIssue::error(
                    *path,
                    format!("expected exactly {len} entry(ies), found {}", entries.len()),
                )),
                Some(_) => {}
            },
            Self::String { path, format } => match lookup(payload, path) {
                None => issues.push(ValidationIssue::error(*path, "missing required field")),
                Some(value) => {
                    if let Some(problem) = format.check(value) {
                        issues.push(ValidationIssue::error(*path, problem));
                    }
                }
            },
            Self::IdentifierArray {
                path,
                system,
                format,
            } => match lookup(payload, path).and_then(Value::as_array) {
                None => issues.push(ValidationIssue::error(*path, "missing required array")),
                Some(entries) if entries.len() != 1 => issues.push(ValidationIssue::error(
                    *path,
                    format!("expected exactly 1 entry, found {}", entries.len()),
                )),
                Some(entries) => {
                    let entry = &entries[0];
                    match entry.get("system").and_then(Value::as_str) {
                        Some(s) if s == *system => {}
                        Some(s) => issues.push(ValidationIssue::error(
                            *path,
                            format!("identifier system must be '{system}', found '{s}'"),
                        )),
                        None => issues.push(ValidationIssue::error(
                            *path,
                            "identifier entry is missing 'system'",
                        )),
                    }
                    match entry.get("value") {
                        Some(value) => {
                            if let Some(problem) = format.check(value) {
                                issues.push(ValidationIssue::error(*path, problem));
                            }
                        }
                        None => issues.push(ValidationIssue::error(
                            *path,
                            "identifier entry is missing 'value'",
                        )),
                    }
                }
            },
            Self::OfficialIdentifier {
                path,
                system,
                format,
            } => match lookup(payload, path).and_then(Value::as_array) {
                None => issues.push(ValidationIssue::error(*path, "missing required array")),
                Some(entries) => {
                    let mut matching = entries.iter().filter(|entry| {
                        entry.get("system").and_then(Value::as_str) == Some(system)
                    });
                    match (matching.next(), matching.next()) {
                        (Some(entry), None) => match entry.get("value") {
                            Some(value) => {
                                if let Some(problem) = format.check(value) {
                                    issues.push(ValidationIssue::error(*path, problem));
                                }
                            }
                            None => issues.push(ValidationIssue::error(
                                *path,
                                "identifier entry is missing 'value'",
                            )),
                        },
                        (None, _) => issues.push(ValidationIssue::error(
                            *path,
                            format!("no identifier entry with system '{system}'"),
                        )),
                        (Some(_), Some(_)) => issues.push(ValidationIssue::error(
                            *path,
                            format!("more than one identifier entry with system '{system}'"),
                        )),
                    }
                }
            },
        }
    }
}

/// Structural contract for one resource type.
#[derive(Debug)]
pub struct ResourceContract {
    pub resource_type: ResourceType,
    pub rules: &'static [FieldRule],
}

impl ResourceContract {
    /// Apply every rule, collecting all issues. Fails fast in the sense of
    /// attempting no repair, not in the sense of stopping at the first issue.
    pub fn evaluate(&self, payload: &Value) -> ValidationOutcome {
        let mut issues = Vec::new();
        for rule in self.rules {
            rule.evaluate(payload, &mut issues);
        }
        ValidationOutcome::failed(issues)
    }
}

fn lookup<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    payload.get(path)
}

/// An Encounter carries exactly one official UUID identifier, one type, one
/// subject and one participant, plus status and class.
static ENCOUNTER: ResourceContract = ResourceContract {
    resource_type: ResourceType::Encounter,
    rules: &[
        FieldRule::IdentifierArray {
            path: "identifier",
            system: OFFICIAL_SYSTEM,
            format: ValueFormat::Uuid,
        },
        FieldRule::String {
            path: "status",
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::Present { path: "class" },
        FieldRule::Array {
            path: "type",
            len: 1,
        },
        FieldRule::Array {
            path: "subject",
            len: 1,
        },
        FieldRule::Array {
            path: "participant",
            len: 1,
        },
    ],
};

static PATIENT: ResourceContract = ResourceContract {
    resource_type: ResourceType::Patient,
    rules: &[
        FieldRule::OfficialIdentifier {
            path: "identifier",
            system: OFFICIAL_SYSTEM,
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::Present { path: "name" },
        FieldRule::String {
            path: "gender",
            format: ValueFormat::Code(VALID_GENDERS),
        },
    ],
};

static OBSERVATION: ResourceContract = ResourceContract {
    resource_type: ResourceType::Observation,
    rules: &[
        FieldRule::String {
            path: "status",
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::Present { path: "code" },
        FieldRule::Present { path: "subject" },
    ],
};

static ENDPOINT: ResourceContract = ResourceContract {
    resource_type: ResourceType::Endpoint,
    rules: &[
        FieldRule::IdentifierArray {
            path: "identifier",
            system: OFFICIAL_SYSTEM,
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::String {
            path: "status",
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::String {
            path: "address",
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::Present { path: "payloadType" },
    ],
};

/// An Organization owns exactly one endpoint reference.
static ORGANIZATION: ResourceContract = ResourceContract {
    resource_type: ResourceType::Organization,
    rules: &[
        FieldRule::IdentifierArray {
            path: "identifier",
            system: OFFICIAL_SYSTEM,
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::Present { path: "name" },
        FieldRule::Array {
            path: "endpoint",
            len: 1,
        },
    ],
};

static SERVICE_REQUEST: ResourceContract = ResourceContract {
    resource_type: ResourceType::ServiceRequest,
    rules: &[
        FieldRule::String {
            path: "status",
            format: ValueFormat::NonEmptyString,
        },
        FieldRule::Present { path: "intent" },
        FieldRule::Present { path: "subject" },
        FieldRule::Present { path: "requester" },
    ],
};

/// Look up the contract registered for a resource type.
pub fn contract_for(resource_type: ResourceType) -> Option<&'static ResourceContract> {
    static REGISTRY: OnceLock<Vec<&'static ResourceContract>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| {
            vec![
                &ENCOUNTER,
                &PATIENT,
                &OBSERVATION,
                &ENDPOINT,
                &ORGANIZATION,
                &SERVICE_REQUEST,
            ]
        })
        .iter()
        .find(|c| c.resource_type == resource_type)
        .copied()
}
