use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of a single call to the CRM GraphQL endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrmError {
    /// Endpoint URL or token missing.
    #[error("Twenty API URL or Token is not configured: {0}")]
    Configuration(String),
    /// Application-level errors reported in the GraphQL `errors` array.
    #[error("GraphQL Error: {0}")]
    GraphQl(String),
    /// HTTP 4xx.
    #[error("API Request Failed: Client Error (Status: {status}): {body}")]
    Client { status: u16, body: String },
    /// HTTP 5xx.
    #[error("API Request Failed with status {status}")]
    Server { status: u16 },
    /// Connection could not be established or was dropped.
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// 2xx response whose body could not be understood.
    #[error("Invalid response from Twenty API: {0}")]
    InvalidResponse(String),
    /// Retry ceiling reached on a retryable failure.
    #[error("API Request Failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<CrmError> },
}

impl CrmError {
    /// True for failures assumed transient: server errors, network failures and timeouts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrmError::Server { .. } | CrmError::Network(_) | CrmError::Timeout(_)
        )
    }

    /// Unwraps `Exhausted` down to the failure that caused it.
    pub fn root(&self) -> &CrmError {
        match self {
            CrmError::Exhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized access: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    json!({ "error": format!("Unauthorized: {}", msg) }),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error", "message": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CrmError> for AppError {
    fn from(err: CrmError) -> Self {
        AppError::Internal(err.to_string())
    }
}
