mod api;
mod config;
mod handler;
mod secret;
mod update;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::ApiClient;
use crate::config::Config;
use crate::handler::AppState;
use crate::secret::SecretToken;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config file; environment variables take precedence.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref());

    let default_filter = match &config {
        Ok(c) if c.debug => "info,story_sweeper=debug",
        _ => "info",
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config.context("error loading config")?;

    info!("Configuration loaded successfully");
    info!("  Webhook URL: {}", config.bot_url);
    info!("  Listen address: {}", config.listen_addr());
    info!("  Debug dump: {}", config.debug);
    info!("  Secret source: {}", config.secret_rng);

    if config.secret_rng == secret::SecretRng::TimeSeeded {
        warn!("Secret token uses a time-seeded generator; prefer SECRET_RNG=os");
    }

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    let api = ApiClient::new(config.base_url.clone())?;
    let secret = SecretToken::generate(config.secret_rng);

    let registration = webhook::register(&api, &config.bot_url, &secret).await?;

    let addr = config.listen_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            registration.release().await;
            return Err(e).with_context(|| format!("Failed to bind to {}", addr));
        }
    };

    let state = Arc::new(AppState::new(api, secret));
    let app = handler::router(state, config.debug);

    info!("Serving at {} for {}", addr, registration.url());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error running the webhook");

    info!("Server stopped, removing webhook");
    registration.release().await;

    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
