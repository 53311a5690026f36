use std::sync::Arc;

use mediator_cht::ChtClient;
use mediator_fhir::{CallbackResolver, FhirClient, SubscriptionManager};
use mediator_openmrs::OpenMrsClient;
use mediator_sync::SyncPipeline;
use tokio::sync::watch;

use crate::config::AppConfig;

/// Shared handle passed to every request handler.
///
/// Everything here is cheap to clone: the clients are Arc'd and the watch
/// receiver is a reference-counted subscription to the shutdown signal.
#[derive(Clone)]
pub struct AppState {
    pub fhir: Arc<FhirClient>,
    pub cht: Arc<ChtClient>,
    pub openmrs: Arc<OpenMrsClient>,
    pub pipeline: Arc<SyncPipeline>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub resolver: Arc<CallbackResolver>,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn from_config(
        config: &AppConfig,
        shutdown: watch::Receiver<bool>,
    ) -> mediator_core::Result<Self> {
        let fhir = Arc::new(FhirClient::new(
            &config.fhir.url,
            config.fhir.username.clone(),
            config.fhir.password.clone(),
            config.fhir.timeout(),
        )?);
        let cht = Arc::new(ChtClient::new(
            &config.cht.url,
            config.cht.username.clone(),
            config.cht.password.clone(),
            config.cht.timeout(),
        )?);
        let openmrs = Arc::new(OpenMrsClient::new(
            &config.openmrs.url,
            config.openmrs.username.clone(),
            config.openmrs.password.clone(),
            config.openmrs.timeout(),
        )?);
        let pipeline = Arc::new(SyncPipeline::new(
            Arc::clone(&fhir),
            Arc::clone(&openmrs),
            config.sync.concurrency,
            config.sync.retry.clone(),
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(Arc::clone(&fhir)));
        let resolver = Arc::new(CallbackResolver::new(Arc::clone(&fhir)));
        Ok(Self {
            fhir,
            cht,
            openmrs,
            pipeline,
            subscriptions,
            resolver,
            shutdown,
        })
    }
}
