//! CHT side of the mediator: the REST client for the CHT API and the
//! transforms turning CHT documents into canonical FHIR resources.

pub mod client;
pub mod transform;

pub use client::ChtClient;
pub use transform::{encounter_from_record, observations_from_record, patient_from_person};
