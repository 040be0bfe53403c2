use crate::config::Config;
use crate::errors::CrmError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Attempt ceiling, backoff base and per-request timeout for CRM calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_backoff_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt: 200ms, 400ms, 800ms ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1_u32 << exponent)
    }
}

/// Suspends the current request between retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Result of one request/response exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(Value),
    Retryable(CrmError),
    Fatal(CrmError),
}

/// Classifies a completed HTTP exchange.
///
/// GraphQL `errors` win over the status code, then 5xx is retryable, 4xx is
/// fatal, and only a 2xx without errors yields the `data` payload.
pub fn classify_response(status: u16, body: &str) -> AttemptOutcome {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(messages) = parsed.as_ref().and_then(graphql_error_messages) {
        return AttemptOutcome::Fatal(CrmError::GraphQl(messages));
    }

    if status >= 500 {
        return AttemptOutcome::Retryable(CrmError::Server { status });
    }

    if status >= 400 {
        return AttemptOutcome::Fatal(CrmError::Client {
            status,
            body: body.chars().take(500).collect(),
        });
    }

    if !(200..300).contains(&status) {
        return AttemptOutcome::Fatal(CrmError::InvalidResponse(format!(
            "unexpected status {}",
            status
        )));
    }

    match parsed {
        Some(mut value) => AttemptOutcome::Success(
            value
                .get_mut("data")
                .map(Value::take)
                .unwrap_or(Value::Null),
        ),
        None => AttemptOutcome::Fatal(CrmError::InvalidResponse(
            "response body is not valid JSON".to_string(),
        )),
    }
}

/// Classifies a failure that happened before a full response was read.
pub fn classify_transport_error(err: &reqwest::Error) -> AttemptOutcome {
    if err.is_builder() {
        AttemptOutcome::Fatal(CrmError::Configuration(format!(
            "invalid request: {}",
            err
        )))
    } else if err.is_timeout() {
        AttemptOutcome::Retryable(CrmError::Timeout(err.to_string()))
    } else {
        AttemptOutcome::Retryable(CrmError::Network(err.to_string()))
    }
}

fn graphql_error_messages(body: &Value) -> Option<String> {
    let errors = body.get("errors").filter(|e| !e.is_null())?;

    let messages = match errors.as_array() {
        Some(list) => list
            .iter()
            .map(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| e.to_string())
            })
            .collect::<Vec<_>>()
            .join("; "),
        None => errors.to_string(),
    };

    Some(messages)
}

fn query_preview(query: &str) -> String {
    query.trim().chars().take(100).collect()
}

/// Operation-agnostic GraphQL caller with bearer auth and bounded retry.
#[derive(Clone)]
pub struct GraphqlClient {
    client: reqwest::Client,
    endpoint: Option<String>,
    token: Option<String>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl GraphqlClient {
    /// Creates a client from the loaded configuration.
    ///
    /// A missing URL or token is not an error here; every `call` will fail
    /// with [`CrmError::Configuration`] instead.
    pub fn new(config: &Config) -> Result<Self, CrmError> {
        Self::with_parts(
            config.twenty_api_url.clone(),
            config.twenty_api_token.clone(),
            RetryPolicy::from_config(config),
            Arc::new(TokioSleeper),
        )
    }

    pub fn with_parts(
        endpoint: Option<String>,
        token: Option<String>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, CrmError> {
        let client = reqwest::Client::builder()
            .timeout(policy.request_timeout)
            .build()
            .map_err(|e| {
                CrmError::Configuration(format!("Failed to create Twenty client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            token,
            policy,
            sleeper,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes a query or mutation and returns its `data` payload.
    pub async fn call(&self, query: &str, variables: Value) -> Result<Value, CrmError> {
        let (endpoint, token) = match (self.endpoint.as_deref(), self.token.as_deref()) {
            (Some(endpoint), Some(token)) => (endpoint, token),
            (endpoint, token) => {
                if endpoint.is_none() {
                    tracing::error!("TWENTY_API_URL is not set");
                }
                if token.is_none() {
                    tracing::error!("TWENTY_API_TOKEN is not set");
                }
                return Err(CrmError::Configuration(
                    "TWENTY_API_URL and TWENTY_API_TOKEN are required".to_string(),
                ));
            }
        };

        let body = json!({
            "query": query,
            "variables": variables,
        });
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(
                attempt,
                max_attempts,
                "Calling Twenty API at {}: {}...",
                endpoint,
                query_preview(query)
            );

            match self.send_once(endpoint, token, &body).await {
                AttemptOutcome::Success(data) => {
                    tracing::debug!(attempt, "Twenty API call successful");
                    return Ok(data);
                }
                AttemptOutcome::Fatal(err) => {
                    tracing::error!(attempt, error = %err, "Non-retryable Twenty API error");
                    return Err(err);
                }
                AttemptOutcome::Retryable(err) => {
                    if attempt >= max_attempts {
                        tracing::error!(
                            attempt,
                            error = %err,
                            "Max retries reached. Failing operation."
                        );
                        return Err(CrmError::Exhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable Twenty API error, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once(&self, endpoint: &str, token: &str, body: &Value) -> AttemptOutcome {
        let response = match self
            .client
            .post(endpoint)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(text) => classify_response(status, &text),
            Err(e) => classify_transport_error(&e),
        }
    }
}
