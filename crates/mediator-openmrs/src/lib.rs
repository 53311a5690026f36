//! OpenMRS side of the mediator: the REST client for the OpenMRS fhir2 R4
//! surface plus identifier-type provisioning, and the transforms adapting
//! canonical FHIR resources to what OpenMRS accepts.

pub mod client;
pub mod transform;

pub use client::OpenMrsClient;
pub use transform::{CHT_DOCUMENT_ID_TYPE, CHT_PATIENT_ID_TYPE, to_openmrs};
