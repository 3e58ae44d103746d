//! Trivida billing HTTP server
//!
//! Axum server exposing premium checkout, payment status polling,
//! receipts and the CinetPay notification webhook.

mod auth;
mod config;
mod error;
mod handlers;
mod middleware;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use billing_core::{BillingStore, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let sandbox = config.validate()?;

    if sandbox.is_some() {
        tracing::warn!("⚠ CinetPay sandbox mode: webhook payloads are trusted without provider verification");
        tracing::warn!("  APP_ENV={}", config.app_env.as_str());
    }

    if config.cinetpay.is_configured() {
        tracing::info!("✓ CinetPay configured");
    } else {
        tracing::warn!("⚠ CinetPay not configured - checkout links disabled");
        tracing::warn!("  Set CINETPAY_SITE_ID and CINETPAY_API_KEY in .env");
    }

    if config.trust_proxy {
        tracing::info!("Client addresses read from X-Forwarded-For (TRUST_PROXY=1)");
    }

    if config.cinetpay_secret_key.is_none() {
        tracing::warn!("⚠ CINETPAY_SECRET_KEY not set - x-token verification disabled");
    }

    let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
    let addr = config.bind_addr.clone();
    let state = AppState::build(config, sandbox, store)?;
    middleware::start_cleanup_task(state.webhook_limiter.clone(), Duration::from_secs(60));
    let app = routes::build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 billing server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                                - Health check");
    tracing::info!("  POST /billing/subscriptions/initiate         - Start premium checkout");
    tracing::info!("  POST /billing/mobile-money/initiate          - Legacy one-month payment");
    tracing::info!("  GET  /billing/mobile-money/status/:requestId - Poll payment status");
    tracing::info!("  POST /billing/cinetpay/webhook               - Provider notification");
    tracing::info!("  GET  /billing/receipts                       - List receipts");
    tracing::info!("  GET  /billing/receipts/:id.(csv|pdf)         - Download receipt");
    tracing::info!("  GET  /billing/entitlement                    - Current plan");
    tracing::info!("");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
