//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for request handling. Each
//! variant maps to a specific HTTP status code and a JSON body of the
//! shape `{ "error": "<message>" }`. The admission-related bodies are
//! fixed strings so that clients can match on them.
//!
//! The remaining types cover the other failure domains:
//! [`AdmissionError`] (the admission machinery itself failed),
//! [`TransportError`] (one push connection failed) and [`ConfigError`]
//! (startup-fatal configuration problems).

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::admission::DenyReason;
use crate::domain::MatchId;

/// Body returned for a rate-limit denial.
pub const TOO_MANY_REQUESTS_BODY: &str = "Too many requests.";
/// Body returned for a forbidden denial.
pub const FORBIDDEN_BODY: &str = "Forbidden.";
/// Body returned when admission could not be evaluated.
pub const UNAVAILABLE_BODY: &str = "Service Unavailable";

/// Structured JSON error response body.
///
/// ```json
/// { "error": "Too many requests." }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// Server-side error enum with HTTP status code mapping.
///
/// | Variant                | HTTP Status |
/// |------------------------|-------------|
/// | `InvalidRequest`       | 400         |
/// | `AdmissionDenied` (forbidden) | 403  |
/// | `MatchNotFound`        | 404         |
/// | `AdmissionDenied` (rate limit) | 429 |
/// | `Persistence`/`Internal` | 500       |
/// | `AdmissionUnavailable`/`ShuttingDown` | 503 |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Match with the given ID does not exist.
    #[error("match not found: {0}")]
    MatchNotFound(MatchId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The admission gate denied the caller.
    #[error("admission denied: {0}")]
    AdmissionDenied(DenyReason),

    /// The admission gate could not reach a decision. Always fail-closed.
    #[error("admission unavailable: {0}")]
    AdmissionUnavailable(#[from] AdmissionError),

    /// The live subsystem is shutting down and no longer accepts work.
    #[error("service is shutting down")]
    ShuttingDown,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MatchNotFound(_) => StatusCode::NOT_FOUND,
            Self::AdmissionDenied(reason) if reason.is_rate_limit() => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::AdmissionDenied(_) => StatusCode::FORBIDDEN,
            Self::AdmissionUnavailable(_) | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::Persistence(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the response body.
    ///
    /// Admission outcomes never leak which rule fired or why evaluation
    /// failed.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::AdmissionDenied(reason) if reason.is_rate_limit() => {
                TOO_MANY_REQUESTS_BODY.to_string()
            }
            Self::AdmissionDenied(_) => FORBIDDEN_BODY.to_string(),
            Self::AdmissionUnavailable(_) | Self::ShuttingDown => UNAVAILABLE_BODY.to_string(),
            Self::Persistence(_) | Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            Self::Persistence(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "request failed");
            }
            Self::AdmissionUnavailable(_) => {
                tracing::error!(error = %self, "admission evaluation failed, failing closed");
            }
            _ => {}
        }

        let status = self.status_code();
        let body = ErrorResponse {
            error: self.public_message(),
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;

        if let Self::AdmissionDenied(DenyReason::RateLimit { retry_after_ms }) = self {
            let secs = retry_after_ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Failure of the admission machinery itself (not a denial).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The caller could not be identified, so no rate window applies.
    #[error("caller identity could not be determined")]
    MissingIdentity,

    /// The rate window store reached its bound and nothing was expired.
    #[error("rate window store exhausted ({capacity} identities tracked)")]
    WindowStoreExhausted {
        /// Configured bound on tracked identities.
        capacity: usize,
    },

    /// The client classifier failed.
    #[error("client classification failed: {0}")]
    Classifier(String),
}

/// Failure delivering to a single push connection.
///
/// Always handled locally by evicting that connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The outbound queue is full (slow consumer).
    #[error("outbound queue full")]
    QueueFull,

    /// The connection is no longer accepting frames.
    #[error("connection closed")]
    Closed,

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    Send(String),
}

/// Startup-time configuration failure. Fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to a value that cannot be used.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Admission is required by the deployment but no key is configured.
    #[error("ADMISSION_KEY is required (ADMISSION_REQUIRED=true) but not set")]
    MissingAdmissionKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{BotCategory, ForbiddenRule};

    #[test]
    fn admission_statuses() {
        let rate = GatewayError::AdmissionDenied(DenyReason::RateLimit { retry_after_ms: 1 });
        assert_eq!(rate.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rate.public_message(), "Too many requests.");

        let forbidden =
            GatewayError::AdmissionDenied(DenyReason::Forbidden(ForbiddenRule::Bot(BotCategory::Tool)));
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(forbidden.public_message(), "Forbidden.");

        let unavailable = GatewayError::from(AdmissionError::MissingIdentity);
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(unavailable.public_message(), "Service Unavailable");
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response =
            GatewayError::AdmissionDenied(DenyReason::RateLimit { retry_after_ms: 1500 })
                .into_response();
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("2")
        );
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let err = GatewayError::Persistence("connection refused to 10.0.0.3".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("10.0.0.3"));
    }

    #[test]
    fn not_found_message() {
        let err = GatewayError::MatchNotFound(MatchId::new(9));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "match not found: 9");
    }
}
