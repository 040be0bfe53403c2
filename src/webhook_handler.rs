use crate::config::Config;
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::webhook_models::{SmartleadWebhookPayload, WebhookResponse};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

/// Header carrying the shared webhook secret.
pub const SECRET_HEADER: &str = "x-smartlead-secret";

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    pub secret: Option<String>,
}

/// SmartLead Webhook Handler
///
/// Validates the shared secret, then mirrors the lead event into Twenty.
/// Every partial failure inside the sync is logged and still acknowledged
/// with 200. Only an undecodable body or a failed lookup reaches the 500 path.
/// The body is read regardless of its content type.
///
/// Authentication: `x-smartlead-secret` header or `secret` query parameter
/// must match SMARTLEAD_WEBHOOK_SECRET when it is configured.
pub async fn smartlead_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    tracing::info!("Received SmartLead webhook");

    // 1. Validate webhook secret (if configured) before looking at the body
    validate_webhook_secret(&state.config, &headers, query.secret.as_deref())?;

    let payload = SmartleadWebhookPayload::from_body(&body)
        .map_err(|e| AppError::Internal(format!("Invalid JSON body: {}", e)))?;
    tracing::debug!(
        "SmartLead payload: {}",
        serde_json::to_string(&payload).unwrap_or_default()
    );

    // 2. Acknowledge incomplete events so SmartLead does not retry bad data
    let Some(lead) = payload.lead_fields() else {
        tracing::warn!("Missing lead_data or email. Cannot process further.");
        return Ok((
            StatusCode::OK,
            Json(WebhookResponse {
                success: true,
                message: "Webhook acknowledged, but missing essential lead_data or email."
                    .to_string(),
            }),
        ));
    };

    // 3. Mirror into the CRM
    let report = state.sync.process(&payload, &lead).await?;

    let failures = report.failures();
    if !failures.is_empty() {
        tracing::warn!(
            "{} step(s) failed for lead {}: {:?}",
            failures.len(),
            lead.email,
            failures
        );
    }

    tracing::info!("Processing complete, sending 200");
    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            success: true,
            message: "Webhook processed successfully".to_string(),
        }),
    ))
}

/// Validate the shared secret from the header, falling back to the query parameter.
fn validate_webhook_secret(
    config: &Config,
    headers: &HeaderMap,
    query_secret: Option<&str>,
) -> Result<(), AppError> {
    // If no secret is configured, skip validation (warn was already logged at startup)
    let Some(ref expected_secret) = config.webhook_secret else {
        return Ok(());
    };

    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .or(query_secret);

    match provided {
        Some(secret) if constant_time_compare(secret, expected_secret) => {
            tracing::debug!("Webhook secret validated");
            Ok(())
        }
        _ => {
            tracing::warn!("Invalid webhook secret received");
            Err(AppError::Unauthorized("Invalid secret".to_string()))
        }
    }
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config_with_secret(secret: Option<&str>) -> Config {
        Config {
            webhook_secret: secret.map(str::to_string),
            ..Config::default()
        }
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("s3cret", "s3cret"));
        assert!(!constant_time_compare("s3cret", "s3creT"));
        assert!(!constant_time_compare("s3cret", "s3cret!"));
    }

    #[test]
    fn test_no_secret_configured_skips_validation() {
        let config = config_with_secret(None);
        assert!(validate_webhook_secret(&config, &HeaderMap::new(), None).is_ok());
    }

    #[test]
    fn test_secret_from_header_or_query() {
        let config = config_with_secret(Some("s3cret"));

        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(validate_webhook_secret(&config, &headers, None).is_ok());

        assert!(validate_webhook_secret(&config, &HeaderMap::new(), Some("s3cret")).is_ok());
    }

    #[test]
    fn test_empty_header_falls_back_to_query() {
        let config = config_with_secret(Some("s3cret"));

        let mut headers = HeaderMap::new();
        headers.insert(SECRET_HEADER, HeaderValue::from_static(""));
        assert!(validate_webhook_secret(&config, &headers, Some("s3cret")).is_ok());
        assert!(matches!(
            validate_webhook_secret(&config, &headers, None),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_missing_or_wrong_secret_is_unauthorized() {
        let config = config_with_secret(Some("s3cret"));

        assert!(matches!(
            validate_webhook_secret(&config, &HeaderMap::new(), None),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            validate_webhook_secret(&config, &HeaderMap::new(), Some("wrong")),
            Err(AppError::Unauthorized(_))
        ));
    }
}
