use thiserror::Error;

/// The three remote systems the mediator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteSystem {
    Fhir,
    Cht,
    OpenMrs,
}

impl std::fmt::Display for RemoteSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fhir => write!(f, "FHIR store"),
            Self::Cht => write!(f, "CHT"),
            Self::OpenMrs => write!(f, "OpenMRS"),
        }
    }
}

/// Error type for all mediator operations.
///
/// Validation and argument errors are resolved at the boundary and never reach
/// a downstream write; upstream errors carry the system and pipeline step they
/// occurred in so callers can decide whether to retry.
#[derive(Debug, Error)]
pub enum MediatorError {
    #[error("Invalid FHIR resource type: {0}")]
    InvalidResourceType(String),

    #[error("Validation failed for {resource_type}: {}", issues.join("; "))]
    Validation {
        resource_type: String,
        issues: Vec<String>,
    },

    #[error("Invalid '{name}' was expecting type of 'string' but received '{received}'")]
    InvalidArgument { name: String, received: String },

    #[error("Organization '{organization}' has no endpoint attached")]
    MissingEndpoint { organization: String },

    #[error("Missing reference '{reference}' on {resource_type}")]
    MissingReference {
        resource_type: String,
        reference: String,
    },

    #[error("Resource not found: {resource_type} with identifier '{identifier}'")]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error(
        "Upsert conflict: {count} {resource_type} resources share identifier '{identifier}'"
    )]
    ConflictOnUpsert {
        resource_type: String,
        identifier: String,
        count: u64,
    },

    #[error("{system} unavailable during {step}: {message}")]
    UpstreamUnavailable {
        system: RemoteSystem,
        step: String,
        message: String,
    },

    #[error("{system} timed out during {step}")]
    UpstreamTimeout { system: RemoteSystem, step: String },

    #[error("{system} rejected {step}: HTTP {status}: {body}")]
    UpstreamRejected {
        system: RemoteSystem,
        step: String,
        status: u16,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl MediatorError {
    pub fn invalid_resource_type(raw: impl Into<String>) -> Self {
        Self::InvalidResourceType(raw.into())
    }

    pub fn validation(resource_type: impl Into<String>, issues: Vec<String>) -> Self {
        Self::Validation {
            resource_type: resource_type.into(),
            issues,
        }
    }

    pub fn invalid_argument(name: impl Into<String>, received: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            received: received.into(),
        }
    }

    pub fn missing_endpoint(organization: impl Into<String>) -> Self {
        Self::MissingEndpoint {
            organization: organization.into(),
        }
    }

    pub fn missing_reference(
        resource_type: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self::MissingReference {
            resource_type: resource_type.into(),
            reference: reference.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    pub fn conflict(
        resource_type: impl Into<String>,
        identifier: impl Into<String>,
        count: u64,
    ) -> Self {
        Self::ConflictOnUpsert {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
            count,
        }
    }

    pub fn upstream(
        system: RemoteSystem,
        step: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::UpstreamUnavailable {
            system,
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn timeout(system: RemoteSystem, step: impl Into<String>) -> Self {
        Self::UpstreamTimeout {
            system,
            step: step.into(),
        }
    }

    pub fn rejected(
        system: RemoteSystem,
        step: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::UpstreamRejected {
            system,
            step: step.into(),
            status,
            body: body.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// HTTP status the mediator surface reports for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidResourceType(_)
            | Self::Validation { .. }
            | Self::InvalidArgument { .. }
            | Self::MissingEndpoint { .. }
            | Self::MissingReference { .. }
            | Self::Json(_)
            | Self::Url(_) => 400,
            Self::NotFound { .. } => 404,
            Self::ConflictOnUpsert { .. } => 409,
            Self::UpstreamUnavailable { .. } => 502,
            Self::UpstreamTimeout { .. } => 504,
            Self::UpstreamRejected { status, .. } => *status,
            Self::Configuration(_) => 500,
        }
    }

    /// Whether a retry with backoff could succeed.
    ///
    /// Validation, argument and conflict errors are deterministic; only
    /// network-level upstream failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::UpstreamTimeout { .. }
        )
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

/// Convenience result type for mediator operations.
pub type Result<T> = std::result::Result<T, MediatorError>;
