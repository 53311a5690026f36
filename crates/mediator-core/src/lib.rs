//! Core types shared by every mediator crate: the FHIR resource model as the
//! mediator sees it, the official-identifier correlation key, and the error
//! type all pipeline steps report through.

pub mod error;
pub mod resource;
pub mod time;

pub use error::{MediatorError, RemoteSystem, Result};
pub use resource::{
    Bundle, BundleEntry, Identifier, OFFICIAL_SYSTEM, ResourceType, official_identifier,
    reference, split_reference,
};
