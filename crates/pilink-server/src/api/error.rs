//! API error types and response handling.
//!
//! Every failure is answered with the same JSON body as a successful
//! mutating call (`success` + `message`), extended with a machine-readable
//! error code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pilink_core::PilinkError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Notification text.
        message: String,
    },

    /// 409 Conflict - Valid request in the wrong state (no selection, no session).
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Notification text.
        message: String,
    },

    /// 500 Internal Server Error - Configuration or I/O failure on the server.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Notification text.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 502 Bad Gateway - The peer did not connect or lacks the command endpoint.
    BadGateway {
        /// Machine-readable error code.
        error_code: String,
        /// Notification text.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 503 Service Unavailable - Bluetooth LE is missing or off.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Notification text.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },
}

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": false,
    "error": "NO_CONNECTION",
    "message": "None of the devices is connected. Please pair the Pi with your device and try again",
    "details": null
}))]
pub struct ErrorResponse {
    /// Always `false`.
    #[schema(example = false)]
    pub success: bool,

    /// Machine-readable error code (e.g., "NO_CONNECTION").
    #[schema(example = "NO_CONNECTION")]
    pub error: String,

    /// Notification text to show the user.
    #[schema(example = "Please select a device to connect first")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<String>,
}

impl ApiError {
    /// Notification text.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Conflict { message, .. }
            | Self::InternalError { message, .. }
            | Self::BadGateway { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }

    /// Replace the notification text, keeping status and code.
    #[must_use]
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        match &mut self {
            Self::BadRequest { message, .. }
            | Self::Conflict { message, .. }
            | Self::InternalError { message, .. }
            | Self::BadGateway { message, .. }
            | Self::ServiceUnavailable { message, .. } => *message = text,
        }
        self
    }

    fn parts(self) -> (StatusCode, ErrorResponse) {
        let (status, error, message, details) = match self {
            Self::BadRequest {
                error_code,
                message,
            } => (StatusCode::BAD_REQUEST, error_code, message, None),
            Self::Conflict {
                error_code,
                message,
            } => (StatusCode::CONFLICT, error_code, message, None),
            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, error_code, message, details)
            }
            Self::BadGateway {
                error_code,
                message,
                details,
            } => (StatusCode::BAD_GATEWAY, error_code, message, details),
            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => (StatusCode::SERVICE_UNAVAILABLE, error_code, message, details),
        };

        (
            status,
            ErrorResponse {
                success: false,
                error,
                message,
                details,
            },
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::BadGateway { message, .. } => write!(f, "Bad Gateway: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from pilink_core errors.
impl From<PilinkError> for ApiError {
    fn from(err: PilinkError) -> Self {
        if err.is_user_error() {
            tracing::debug!(error = %err, "Request rejected");
        } else {
            tracing::warn!(error = %err, "Request failed");
        }

        let error_code = err.error_code().to_string();
        let message = err.user_message();
        let details = Some(err.to_string());

        match err.http_status_code() {
            400 => Self::BadRequest {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
            },
            502 => Self::BadGateway {
                error_code,
                message,
                details,
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_connection_maps_to_conflict() {
        let err = ApiError::from(PilinkError::NoConnection);
        let (status, body) = err.parts();

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(!body.success);
        assert_eq!(body.error, "NO_CONNECTION");
        assert!(body.message.starts_with("None of the devices is connected"));
    }

    #[test]
    fn test_platform_unavailable_maps_to_503() {
        let err = ApiError::from(PilinkError::PlatformUnavailable("no adapter".into()));
        let (status, body) = err.parts();

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body.message,
            "Bluetooth LE is not available on this device at this moment."
        );
        assert!(body.details.unwrap().contains("no adapter"));
    }

    #[test]
    fn test_with_message_keeps_status() {
        let err = ApiError::from(PilinkError::WriteSubmissionFailed("busy".into()))
            .with_message("Unable to send wifi signal");
        let (status, body) = err.parts();

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error, "WRITE_SUBMISSION_FAILED");
        assert_eq!(body.message, "Unable to send wifi signal");
    }

    #[test]
    fn test_config_failure_maps_to_500() {
        let err = ApiError::from(PilinkError::ConfigValidationError("port: must be > 0".into()));
        let (status, body) = err.parts();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "CONFIG_VALIDATION_ERROR");
        assert!(body.details.unwrap().contains("port"));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            success: false,
            error: "OUT_OF_RANGE".to_string(),
            message: "Please select a device to connect first".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("OUT_OF_RANGE"));
    }
}
