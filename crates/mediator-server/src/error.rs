use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mediator_core::MediatorError;
use serde_json::{Value, json};

/// HTTP-facing wrapper around [`MediatorError`].
///
/// Every failure leaves the mediator as a FHIR `OperationOutcome` so CHT and
/// other callers get a uniform error body regardless of which internal step
/// failed.
#[derive(Debug)]
pub struct ApiError(pub MediatorError);

impl From<MediatorError> for ApiError {
    fn from(err: MediatorError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn severity(&self) -> &'static str {
        if self.0.is_client_error() { "error" } else { "fatal" }
    }

    fn issue_code(&self) -> &'static str {
        match &self.0 {
            MediatorError::Validation { .. }
            | MediatorError::InvalidArgument { .. }
            | MediatorError::InvalidResourceType(_) => "invariant",
            MediatorError::NotFound { .. }
            | MediatorError::MissingEndpoint { .. }
            | MediatorError::MissingReference { .. } => "not-found",
            MediatorError::ConflictOnUpsert { .. } => "conflict",
            MediatorError::UpstreamTimeout { .. } => "timeout",
            _ => "exception",
        }
    }

    pub fn operation_outcome(&self) -> Value {
        json!({
            "resourceType": "OperationOutcome",
            "issue": [{
                "severity": self.severity(),
                "code": self.issue_code(),
                "diagnostics": self.0.to_string(),
            }]
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        (status, Json(self.operation_outcome())).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mediator_core::RemoteSystem;

    #[test]
    fn test_validation_error_maps_to_400_outcome() {
        let err = ApiError(MediatorError::validation(
            "Encounter",
            vec!["status is required".into()],
        ));
        assert_eq!(err.0.http_status(), 400);
        let outcome = err.operation_outcome();
        assert_eq!(outcome["resourceType"], "OperationOutcome");
        assert_eq!(outcome["issue"][0]["code"], "invariant");
        assert_eq!(outcome["issue"][0]["severity"], "error");
    }

    #[test]
    fn test_timeout_maps_to_504_with_fatal_severity() {
        let err = ApiError(MediatorError::timeout(RemoteSystem::OpenMrs, "upsert"));
        assert_eq!(err.0.http_status(), 504);
        let outcome = err.operation_outcome();
        assert_eq!(outcome["issue"][0]["code"], "timeout");
        assert_eq!(outcome["issue"][0]["severity"], "fatal");
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = ApiError(MediatorError::conflict("Patient", "abc", 2));
        assert_eq!(err.0.http_status(), 409);
        assert_eq!(err.operation_outcome()["issue"][0]["code"], "conflict");
    }
}
