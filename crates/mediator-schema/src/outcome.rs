use serde_json::Value;

/// Validation outcome with detailed information.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Whether the resource is valid
    pub valid: bool,
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    pub fn success() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn failed(issues: Vec<ValidationIssue>) -> Self {
        Self {
            valid: issues.is_empty(),
            issues,
        }
    }

    /// Convert to FHIR OperationOutcome JSON.
    pub fn to_operation_outcome(&self) -> Value {
        serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": self.issues.iter().map(|i| {
                serde_json::json!({
                    "severity": i.severity.as_str(),
                    "code": i.code,
                    "diagnostics": i.diagnostics,
                    "location": [i.location],
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// Single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Issue code, FHIR issue-type vocabulary
    pub code: &'static str,
    pub diagnostics: String,
    /// Field path the issue applies to
    pub location: String,
}

impl ValidationIssue {
    pub fn error(location: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Error,
            code: "invariant",
            diagnostics: diagnostics.into(),
            location: location.into(),
        }
    }

    /// `location: diagnostics`, the form error messages carry.
    pub fn describe(&self) -> String {
        format!("{}: {}", self.location, self.diagnostics)
    }
}

/// Issue severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}
