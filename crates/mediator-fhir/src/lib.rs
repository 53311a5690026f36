//! FHIR store access for the mediator.
//!
//! The store is the single source of truth for resource and subscription
//! state; nothing here keeps a local cache that could drift.

pub mod client;
pub mod resolver;
pub mod subscription;

pub use client::FhirClient;
pub use resolver::CallbackResolver;
pub use subscription::{SubscriptionManager, subscription_resource};
