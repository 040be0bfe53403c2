use smartlead_twenty_bridge::config::Config;
use smartlead_twenty_bridge::graphql_client::GraphqlClient;
use smartlead_twenty_bridge::handlers::{self, AppState};
use smartlead_twenty_bridge::sync::{EventClassifier, LeadSync};
use smartlead_twenty_bridge::twenty::TwentyCrm;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, builds the Twenty client and
/// the sync pipeline, then serves the webhook endpoint.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smartlead_twenty_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let client = GraphqlClient::new(&config)?;
    tracing::info!(
        max_attempts = client.policy().max_attempts,
        "Twenty GraphQL client initialized"
    );

    let sync = LeadSync::new(Arc::new(TwentyCrm::new(client)), EventClassifier::default());

    let app_state = Arc::new(AppState {
        config: config.clone(),
        sync,
    });

    // Routes, per-IP rate limiter on the webhook, request tracing
    let app = handlers::router(app_state)?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("SmartLead-Twenty Integration Service listening on {}", addr);
    tracing::info!("Webhook endpoint available at: http://{}/webhooks/smartlead", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
