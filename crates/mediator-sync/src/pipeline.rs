use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use mediator_core::{Bundle, MediatorError, RemoteSystem, ResourceType, Result};
use mediator_fhir::FhirClient;
use mediator_openmrs::OpenMrsClient;
use serde_json::{Value, json};
use tokio::sync::{Mutex, watch};

use crate::item::SyncItem;
use crate::retry::{RetryPolicy, with_retry};
use crate::summary::{SyncOutcome, SyncSummary};

/// Which downstream system an item's upsert lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    FhirStore,
    OpenMrs,
}

/// The downstream surface an upsert needs: keyed search, create, update.
#[async_trait]
pub trait UpsertStore: Send + Sync {
    fn system(&self) -> RemoteSystem;
    async fn search(&self, resource_type: ResourceType, identifier: &str) -> Result<Bundle>;
    async fn create(&self, resource_type: ResourceType, body: &Value) -> Result<(u16, Value)>;
    async fn update(&self, resource_type: ResourceType, id: &str, body: &Value) -> Result<Value>;
}

#[async_trait]
impl UpsertStore for FhirClient {
    fn system(&self) -> RemoteSystem {
        RemoteSystem::Fhir
    }
    async fn search(&self, resource_type: ResourceType, identifier: &str) -> Result<Bundle> {
        FhirClient::search(self, resource_type, identifier).await
    }
    async fn create(&self, resource_type: ResourceType, body: &Value) -> Result<(u16, Value)> {
        FhirClient::create(self, resource_type, body).await
    }
    async fn update(&self, resource_type: ResourceType, id: &str, body: &Value) -> Result<Value> {
        FhirClient::update(self, resource_type, id, body).await
    }
}

#[async_trait]
impl UpsertStore for OpenMrsClient {
    fn system(&self) -> RemoteSystem {
        RemoteSystem::OpenMrs
    }
    async fn search(&self, resource_type: ResourceType, identifier: &str) -> Result<Bundle> {
        OpenMrsClient::search(self, resource_type, identifier).await
    }
    async fn create(&self, resource_type: ResourceType, body: &Value) -> Result<(u16, Value)> {
        OpenMrsClient::create(self, resource_type, body).await
    }
    async fn update(&self, resource_type: ResourceType, id: &str, body: &Value) -> Result<Value> {
        OpenMrsClient::update(self, resource_type, id, body).await
    }
}

/// Orchestrates end-to-end propagation of changed resources.
///
/// Both entry points, the explicit "sync now" call and the subscription
/// callback, re-enter the same idempotent pipeline: either may race the other
/// without creating duplicates, since every upsert is keyed by official
/// identifier.
pub struct SyncPipeline {
    fhir: Arc<FhirClient>,
    openmrs: Arc<OpenMrsClient>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl SyncPipeline {
    pub fn new(
        fhir: Arc<FhirClient>,
        openmrs: Arc<OpenMrsClient>,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            fhir,
            openmrs,
            concurrency: concurrency.max(1),
            retry,
        }
    }

    /// A cancellation receiver that never fires, for one-shot entry points.
    pub fn never_cancelled() -> watch::Receiver<bool> {
        // Dropping the sender is fine: the batch only ever borrows the value.
        let (_tx, rx) = watch::channel(false);
        rx
    }

    /// Explicit "sync now": walk the FHIR store's synced collections and
    /// upsert every resource into OpenMRS.
    pub async fn sync_to_openmrs(&self, cancel: watch::Receiver<bool>) -> Result<SyncSummary> {
        let mut items = Vec::new();
        let mut malformed = Vec::new();

        for resource_type in ResourceType::synced_to_openmrs() {
            let bundle = self.fhir.search_all(resource_type).await?;
            for resource in bundle.into_resources() {
                match SyncItem::new(resource_type, resource) {
                    Ok(item) => items.push(item),
                    Err(err) => {
                        tracing::warn!(
                            resource_type = %resource_type,
                            error = %err,
                            "resource skipped: no usable official identifier"
                        );
                        malformed.push(resource_type);
                    }
                }
            }
        }

        let mut summary = self.run_batch(items, SyncTarget::OpenMrs, cancel).await;
        for resource_type in malformed {
            summary.record(resource_type, SyncOutcome::Failed);
        }
        Ok(summary)
    }

    /// Subscription callback: the FHIR store notified us that a matching
    /// resource was created. Resolve it by identifier and drive it through
    /// the same pipeline.
    pub async fn handle_callback(
        &self,
        resource_type: ResourceType,
        identifier: &str,
    ) -> Result<SyncSummary> {
        let bundle = self.fhir.search(resource_type, identifier).await?;
        let resource = bundle
            .first_resource()
            .cloned()
            .ok_or_else(|| MediatorError::not_found(resource_type.as_str(), identifier))?;
        let item = SyncItem::new(resource_type, resource)?;
        Ok(self
            .run_batch(vec![item], SyncTarget::OpenMrs, Self::never_cancelled())
            .await)
    }

    /// Upsert one canonical resource into the FHIR store, the ingestion path
    /// for CHT webhooks.
    pub async fn ingest_to_fhir(&self, resource_type: ResourceType, payload: Value) -> Result<SyncSummary> {
        let item = SyncItem::new(resource_type, payload)?;
        Ok(self
            .run_batch(vec![item], SyncTarget::FhirStore, Self::never_cancelled())
            .await)
    }

    /// Run a batch of items with bounded concurrency.
    ///
    /// Items are independent (distinct official identifiers, idempotent
    /// upserts), so no cross-item ordering is provided. The batch can be
    /// cancelled between items, never mid-item.
    pub async fn run_batch(
        &self,
        items: Vec<SyncItem>,
        target: SyncTarget,
        cancel: watch::Receiver<bool>,
    ) -> SyncSummary {
        let summary = Arc::new(Mutex::new(SyncSummary::new()));

        futures_util::stream::iter(items)
            .for_each_concurrent(self.concurrency, |mut item| {
                let summary = Arc::clone(&summary);
                let cancel = cancel.clone();
                async move {
                    let resource_type = item.resource_type;
                    let outcome = if *cancel.borrow() {
                        item.fail("batch cancelled");
                        SyncOutcome::Failed
                    } else {
                        self.process_item(&mut item, target).await
                    };
                    summary.lock().await.record(resource_type, outcome);
                }
            })
            .await;

        let summary = summary.lock().await.clone();
        tracing::info!(
            target = ?target,
            created = summary.created(),
            updated = summary.updated(),
            skipped = summary.skipped(),
            failed = summary.failed(),
            "sync batch finished"
        );
        summary
    }

    /// Drive one item through validate → transform → upsert. Steps within an
    /// item are strictly sequential; a failure at any step marks the item
    /// failed without a partial write.
    async fn process_item(&self, item: &mut SyncItem, target: SyncTarget) -> SyncOutcome {
        if let Err(err) = mediator_schema::ensure_valid(item.resource_type, item.payload()) {
            tracing::warn!(
                resource_type = %item.resource_type,
                identifier = %item.identifier,
                error = %err,
                "validation failed, item aborted"
            );
            item.fail(err.to_string());
            return SyncOutcome::Failed;
        }
        item.mark_validated();

        if target == SyncTarget::OpenMrs {
            match mediator_openmrs::to_openmrs(item.resource_type, item.payload()) {
                Ok(transformed) => item.mark_transformed(transformed),
                Err(err) => {
                    item.fail(err.to_string());
                    return SyncOutcome::Failed;
                }
            }
        }

        let store: &dyn UpsertStore = match target {
            SyncTarget::FhirStore => self.fhir.as_ref(),
            SyncTarget::OpenMrs => self.openmrs.as_ref(),
        };

        let step = format!("upsert {} '{}'", item.resource_type, item.identifier);
        let upserted = with_retry(&self.retry, &step, || self.upsert(store, item)).await;

        match upserted {
            Ok(outcome) => {
                item.mark_upserted();
                outcome
            }
            Err(err) => {
                tracing::warn!(
                    system = %store.system(),
                    resource_type = %item.resource_type,
                    identifier = %item.identifier,
                    error = %err,
                    "upsert failed"
                );
                item.fail(err.to_string());
                SyncOutcome::Failed
            }
        }
    }

    /// Create-if-absent, update-if-present, keyed by official identifier.
    async fn upsert(&self, store: &dyn UpsertStore, item: &SyncItem) -> Result<SyncOutcome> {
        let bundle = store.search(item.resource_type, &item.identifier).await?;

        match bundle.entry.len() {
            0 => {
                let (_, created) = store.create(item.resource_type, item.payload()).await?;
                if item.resource_type == ResourceType::Patient
                    && store.system() == RemoteSystem::OpenMrs
                {
                    self.write_back_openmrs_id(&item.identifier, &created).await;
                }
                Ok(SyncOutcome::Created)
            }
            1 => {
                let existing = &bundle.entry[0].resource;
                if is_subset(item.payload(), existing) {
                    return Ok(SyncOutcome::Skipped);
                }
                let id = existing
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        MediatorError::missing_reference(item.resource_type.as_str(), "id")
                    })?;
                let mut body = item.payload().clone();
                body["id"] = json!(id);
                store.update(item.resource_type, id, &body).await?;
                Ok(SyncOutcome::Updated)
            }
            n => Err(MediatorError::conflict(
                item.resource_type.as_str(),
                &item.identifier,
                n as u64,
            )),
        }
    }

    /// Record the OpenMRS-assigned patient id back on the FHIR store Patient,
    /// so later lookups can correlate both ids. Failure here only logs: the
    /// patient itself synced, and the next run will try again.
    async fn write_back_openmrs_id(&self, identifier: &str, created: &Value) {
        let Some(openmrs_id) = created.get("id").and_then(Value::as_str) else {
            return;
        };

        let result: Result<()> = async {
            let bundle = self.fhir.search(ResourceType::Patient, identifier).await?;
            let Some(patient) = bundle.first_resource() else {
                return Ok(());
            };
            let mut patient = patient.clone();
            let entries = patient
                .get_mut("identifier")
                .and_then(Value::as_array_mut)
                .ok_or_else(|| MediatorError::missing_reference("Patient", "identifier"))?;
            let already_there = entries.iter().any(|entry| {
                entry.get("value").and_then(Value::as_str) == Some(openmrs_id)
            });
            if !already_there {
                entries.push(json!({ "system": "openmrs", "value": openmrs_id }));
                let id = patient
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| MediatorError::missing_reference("Patient", "id"))?
                    .to_string();
                self.fhir
                    .update(ResourceType::Patient, &id, &patient)
                    .await?;
            }
            Ok(())
        }
        .await;

        if let Err(err) = result {
            tracing::warn!(
                identifier,
                openmrs_id,
                error = %err,
                "could not write OpenMRS id back to FHIR store"
            );
        }
    }
}

/// Structural subset comparison driving the update-or-skip decision: the
/// downstream copy is current when every field we would write already holds
/// the same value. Server-assigned fields are ignored.
fn is_subset(new: &Value, existing: &Value) -> bool {
    match (new, existing) {
        (Value::Object(new_map), Value::Object(existing_map)) => {
            new_map.iter().all(|(key, value)| {
                if key == "id" || key == "meta" {
                    return true;
                }
                existing_map
                    .get(key)
                    .is_some_and(|existing_value| is_subset(value, existing_value))
            })
        }
        (Value::Array(new_arr), Value::Array(existing_arr)) => {
            new_arr.len() == existing_arr.len()
                && new_arr
                    .iter()
                    .zip(existing_arr)
                    .all(|(a, b)| is_subset(a, b))
        }
        (a, b) => a == b,
    }
}
