//! Resource validation for the mediator.
//!
//! Each resource type the mediator moves between systems has a declarative
//! [`ResourceContract`]: required fields, array-length constraints and value
//! formats. The evaluator applies a contract uniformly and reports every
//! failing field, not just the first one. Validation is a pure check; no side
//! effect happens before a payload has passed it.

pub mod contract;
pub mod outcome;

pub use contract::{FieldRule, ResourceContract, ValueFormat, contract_for};
pub use outcome::{IssueSeverity, ValidationIssue, ValidationOutcome};

use mediator_core::{MediatorError, ResourceType, Result};
use serde_json::Value;

/// Validate a payload against the contract for its resource type.
///
/// Resource types without a registered contract pass trivially; the store's
/// own validation still applies on write.
pub fn validate(resource_type: ResourceType, payload: &Value) -> ValidationOutcome {
    match contract_for(resource_type) {
        Some(contract) => contract.evaluate(payload),
        None => ValidationOutcome::success(),
    }
}

/// Validate and convert a failed outcome into a [`MediatorError`].
pub fn ensure_valid(resource_type: ResourceType, payload: &Value) -> Result<()> {
    let outcome = validate(resource_type, payload);
    if outcome.valid {
        Ok(())
    } else {
        tracing::debug!(
            resource_type = %resource_type,
            issues = outcome.issues.len(),
            "resource failed validation"
        );
        Err(MediatorError::validation(
            resource_type.as_str(),
            outcome
                .issues
                .into_iter()
                .map(|issue| issue.describe())
                .collect(),
        ))
    }
}
