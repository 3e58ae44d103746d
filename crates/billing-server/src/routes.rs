//! Router Assembly

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_auth;
use crate::handlers;
use crate::middleware::{request_id, webhook_guard};
use crate::state::AppState;

/// Build the full application router
pub fn build_app(state: AppState) -> Router {
    let authed = Router::new()
        .route("/billing/subscriptions/initiate", post(handlers::initiate_subscription))
        .route("/billing/mobile-money/initiate", post(handlers::initiate_mobile_money))
        .route("/billing/mobile-money/status/{request_id}", get(handlers::payment_status))
        .route("/billing/receipts", get(handlers::list_receipts))
        .route("/billing/receipts/{file}", get(handlers::download_receipt))
        .route("/billing/entitlement", get(handlers::entitlement))
        .route_layer(from_fn_with_state(state.auth.clone(), require_auth));

    let webhook = Router::new()
        .route("/billing/cinetpay/webhook", post(handlers::cinetpay_webhook))
        .route_layer(from_fn_with_state(state.clone(), webhook_guard));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .merge(authed)
        .merge(webhook)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(request_id))
}
