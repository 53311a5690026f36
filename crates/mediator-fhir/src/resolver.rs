use std::sync::Arc;

use mediator_core::{MediatorError, ResourceType, Result};
use serde_json::Value;

use crate::client::FhirClient;

/// Resolves an Organization's registered callback Endpoint.
///
/// Used to route LTFU service requests to the correct external callback URL.
/// Every step is one synchronous round trip to the FHIR store; retry policy
/// belongs to the caller.
pub struct CallbackResolver {
    client: Arc<FhirClient>,
}

impl CallbackResolver {
    pub fn new(client: Arc<FhirClient>) -> Self {
        Self { client }
    }

    /// Look up the Organization by identifier, follow its single endpoint
    /// reference and return the concrete Endpoint resource.
    pub async fn resolve_callback_endpoint(&self, organization_identifier: &str) -> Result<Value> {
        let bundle = self
            .client
            .search(ResourceType::Organization, organization_identifier)
            .await?;
        let organization = bundle.first_resource().ok_or_else(|| {
            MediatorError::missing_reference("Organization", organization_identifier)
        })?;

        // Absent or empty endpoint array is a caller-visible 400, not a crash.
        let endpoint_ref = organization
            .get("endpoint")
            .and_then(Value::as_array)
            .and_then(|refs| refs.first())
            .ok_or_else(|| MediatorError::missing_endpoint(organization_identifier))?;

        let endpoint_identifier = endpoint_ref
            .get("identifier")
            .and_then(|id| id.get("value"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MediatorError::missing_reference("Organization", "endpoint.identifier.value")
            })?;

        let bundle = self
            .client
            .search(ResourceType::Endpoint, endpoint_identifier)
            .await?;
        bundle
            .first_resource()
            .cloned()
            .ok_or_else(|| MediatorError::not_found("Endpoint", endpoint_identifier))
    }

    /// Resolve the callback address itself, the URL the subscription channel
    /// will point at.
    pub async fn resolve_callback_address(&self, organization_identifier: &str) -> Result<String> {
        let endpoint = self
            .resolve_callback_endpoint(organization_identifier)
            .await?;
        endpoint
            .get("address")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| MediatorError::missing_reference("Endpoint", "address"))
    }
}
