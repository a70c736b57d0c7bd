//! Error responses for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors returned by the gateway's handlers.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No verifier credential is configured.
    #[error("intent verification is not configured on this gateway")]
    VerifierNotConfigured,

    /// A settlement operation failed.
    #[error(transparent)]
    Settlement(#[from] p2pay::Error),
}

impl GatewayError {
    /// The status code reported for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        use p2pay::Error;
        match self {
            Self::VerifierNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::Settlement(
                Error::InvalidAddress(_)
                | Error::InvalidAmount(_)
                | Error::NoRpcEndpoint(_)
                | Error::MalformedChallengeBody(_),
            ) => StatusCode::BAD_REQUEST,
            Self::Settlement(Error::VerificationFailed(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Settlement(Error::Http { .. } | Error::Rpc(_)) => StatusCode::BAD_GATEWAY,
            Self::Settlement(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::warn!(%status, error = %self, "request failed");
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::VerifierNotConfigured.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::from(p2pay::Error::InvalidAddress("alice.eth".to_owned())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::from(p2pay::Error::VerificationFailed("no".to_owned())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            GatewayError::from(p2pay::Error::Rpc("down".to_owned())).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
