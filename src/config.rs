use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub twenty_api_url: Option<String>,
    pub twenty_api_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub llm_api_key: Option<String>,
    pub llm_model_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3002,
            twenty_api_url: None,
            twenty_api_token: None,
            webhook_secret: None,
            request_timeout_secs: 15,
            max_attempts: 3,
            initial_backoff_ms: 200,
            llm_api_key: None,
            llm_model_name: None,
        }
    }
}

/// Reads an optional variable, treating blank values as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", name, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let config = Self {
            port: parsed_var("PORT", defaults.port)
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            twenty_api_url: optional_var("TWENTY_API_URL")
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("TWENTY_API_URL must start with http:// or https://");
                    }
                    Ok(url)
                })
                .transpose()?,
            twenty_api_token: optional_var("TWENTY_API_TOKEN"),
            webhook_secret: optional_var("SMARTLEAD_WEBHOOK_SECRET"),
            request_timeout_secs: parsed_var(
                "TWENTY_API_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            max_attempts: parsed_var("TWENTY_API_MAX_ATTEMPTS", defaults.max_attempts)
                .and_then(|attempts| {
                    if attempts == 0 {
                        anyhow::bail!("TWENTY_API_MAX_ATTEMPTS must be at least 1");
                    }
                    Ok(attempts)
                })?,
            initial_backoff_ms: parsed_var(
                "TWENTY_API_INITIAL_BACKOFF_MS",
                defaults.initial_backoff_ms,
            )?,
            llm_api_key: optional_var("OPENROUTER_API_KEY"),
            llm_model_name: optional_var("LLM_MODEL_NAME"),
        };

        // Never log secret values, only whether they are present
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Server Port: {}", config.port);
        match config.twenty_api_url {
            Some(ref url) => tracing::debug!("Twenty API URL: {}", url),
            None => tracing::warn!("TWENTY_API_URL is not set; CRM calls will fail"),
        }
        if config.twenty_api_token.is_none() {
            tracing::warn!("TWENTY_API_TOKEN is not set; CRM calls will fail");
        }
        if config.webhook_secret.is_none() {
            tracing::warn!("SMARTLEAD_WEBHOOK_SECRET is not set. Webhook validation disabled.");
        }
        if config.llm_api_key.is_none() || config.llm_model_name.is_none() {
            tracing::debug!("LLM categorization credentials not configured");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_retry_contract() {
        let config = Config::default();
        assert_eq!(config.port, 3002);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff_ms, 200);
        assert_eq!(config.request_timeout_secs, 15);
        assert!(config.webhook_secret.is_none());
    }
}
