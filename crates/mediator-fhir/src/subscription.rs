use std::sync::Arc;

use mediator_core::{MediatorError, ResourceType, Result};
use serde_json::{Value, json};

use crate::client::FhirClient;

fn received_type(value: &str) -> &'static str {
    if value.is_empty() { "empty string" } else { "string" }
}

/// Build the Subscription resource registering a rest-hook callback for a
/// patient's Encounters.
///
/// Pure and deterministic: the same `(patient_id, callback_url)` always yields
/// the same body. Server-assigned fields are added by the store on create.
pub fn subscription_resource(patient_id: &str, callback_url: &str) -> Result<Value> {
    if patient_id.is_empty() {
        return Err(MediatorError::invalid_argument(
            "patientId",
            received_type(patient_id),
        ));
    }
    if callback_url.is_empty() {
        return Err(MediatorError::invalid_argument(
            "callbackUrl",
            received_type(callback_url),
        ));
    }

    Ok(json!({
        "resourceType": "Subscription",
        "id": patient_id,
        "status": "requested",
        "reason": "Follow up request for patient",
        "criteria": format!("Encounter?identifier={patient_id}"),
        "channel": {
            "type": "rest-hook",
            "endpoint": callback_url,
            "payload": "application/fhir+json",
            "header": ["Content-Type: application/fhir+json"],
        },
    }))
}

/// Creates and deletes Subscription resources in the FHIR store.
///
/// The store is the single source of truth for subscription state; no local
/// copy is kept here.
pub struct SubscriptionManager {
    client: Arc<FhirClient>,
}

impl SubscriptionManager {
    pub fn new(client: Arc<FhirClient>) -> Self {
        Self { client }
    }

    /// Register a rest-hook subscription for a patient. Success is a 2xx
    /// creation response carrying the server-assigned id.
    pub async fn create(&self, patient_id: &str, callback_url: &str) -> Result<Value> {
        let resource = subscription_resource(patient_id, callback_url)?;
        let (status, body) = self
            .client
            .create(ResourceType::Subscription, &resource)
            .await?;
        tracing::info!(
            patient_id,
            callback_url,
            status,
            "subscription registered with FHIR store"
        );
        Ok(body)
    }

    /// Remove a subscription by id. A missing id on the store side is a no-op
    /// deletion target.
    pub async fn delete(&self, subscription_id: &str) -> Result<()> {
        self.client
            .delete(ResourceType::Subscription, subscription_id)
            .await?;
        tracing::info!(subscription_id, "subscription deleted");
        Ok(())
    }
}
