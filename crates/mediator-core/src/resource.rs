use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MediatorError, Result};

/// Identifier system marking the cross-system correlation key.
///
/// Correlation always flows through the official identifier, never through
/// system-internal row ids.
pub const OFFICIAL_SYSTEM: &str = "official";

/// Resource types the mediator knows how to move between systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Encounter,
    Observation,
    Subscription,
    Endpoint,
    Organization,
    ServiceRequest,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Encounter => "Encounter",
            Self::Observation => "Observation",
            Self::Subscription => "Subscription",
            Self::Endpoint => "Endpoint",
            Self::Organization => "Organization",
            Self::ServiceRequest => "ServiceRequest",
        }
    }

    /// Types the OpenMRS sync moves downstream.
    pub fn synced_to_openmrs() -> [ResourceType; 3] {
        [Self::Patient, Self::Encounter, Self::Observation]
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = MediatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Patient" => Ok(Self::Patient),
            "Encounter" => Ok(Self::Encounter),
            "Observation" => Ok(Self::Observation),
            "Subscription" => Ok(Self::Subscription),
            "Endpoint" => Ok(Self::Endpoint),
            "Organization" => Ok(Self::Organization),
            "ServiceRequest" => Ok(Self::ServiceRequest),
            other => Err(MediatorError::InvalidResourceType(other.to_string())),
        }
    }
}

/// A `{system, value}` identifier entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub system: String,
    pub value: String,
}

impl Identifier {
    pub fn official(value: impl Into<String>) -> Self {
        Self {
            system: OFFICIAL_SYSTEM.to_string(),
            value: value.into(),
        }
    }

    pub fn is_official(&self) -> bool {
        self.system == OFFICIAL_SYSTEM
    }
}

/// A FHIR search response: `total` plus an `entry` array of wrapped resources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Bundle {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    pub resource: Value,
}

impl Bundle {
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.entry.iter().map(|e| &e.resource)
    }

    pub fn into_resources(self) -> impl Iterator<Item = Value> {
        self.entry.into_iter().map(|e| e.resource)
    }

    pub fn first_resource(&self) -> Option<&Value> {
        self.entry.first().map(|e| &e.resource)
    }
}

/// Extract the single official identifier value from a resource payload.
///
/// Exactly one `system == "official"` entry is expected; absence or duplicates
/// are invariant violations.
pub fn official_identifier(payload: &Value) -> Result<&str> {
    let resource_type = payload
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    let entries = payload
        .get("identifier")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            MediatorError::validation(
                resource_type,
                vec!["identifier: missing required array".to_string()],
            )
        })?;

    let mut official = entries.iter().filter_map(|entry| {
        let system = entry.get("system").and_then(Value::as_str)?;
        let value = entry.get("value").and_then(Value::as_str)?;
        (system == OFFICIAL_SYSTEM).then_some(value)
    });

    match (official.next(), official.next()) {
        (Some(value), None) => Ok(value),
        (None, _) => Err(MediatorError::validation(
            resource_type,
            vec!["identifier: no entry with system 'official'".to_string()],
        )),
        (Some(_), Some(_)) => Err(MediatorError::validation(
            resource_type,
            vec!["identifier: more than one entry with system 'official'".to_string()],
        )),
    }
}

/// Build a `Type/id` reference string.
pub fn reference(resource_type: ResourceType, id: &str) -> String {
    format!("{resource_type}/{id}")
}

/// Split a `Type/id` reference into its parts.
pub fn split_reference(reference: &str) -> Option<(ResourceType, &str)> {
    let (rt, id) = reference.split_once('/')?;
    rt.parse().ok().map(|rt| (rt, id))
}
