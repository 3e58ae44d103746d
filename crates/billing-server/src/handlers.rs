//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{FromRequest, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use billing_core::{store::MAX_RECEIPT_PAGE, IntentStatus, Plan, Receipt};
use billing_payments::{
    decode_body, normalize, receipt as render, CheckoutResponse, LegacyPaymentRequest, LegacyPaymentResponse,
    SubscriptionRequest,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::middleware::RequestId;
use crate::state::AppState;

/// JSON body extractor that rejects with the error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub cinetpay_configured: bool,
    pub sandbox: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub request_id: String,
    pub status: IntentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_transaction_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptList {
    pub items: Vec<Receipt>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementResponse {
    pub plan: Plan,
    pub premium: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_until: Option<DateTime<Utc>>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        cinetpay_configured: state.checkout.has_gateway(),
        sandbox: state.reconciler.mode().is_sandbox(),
    })
}

/// Start a premium subscription checkout
pub async fn initiate_subscription(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    ApiJson(request): ApiJson<SubscriptionRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let response = state.checkout.initiate(&user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Legacy one-month direct operator payment
pub async fn initiate_mobile_money(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    ApiJson(request): ApiJson<LegacyPaymentRequest>,
) -> Result<(StatusCode, Json<LegacyPaymentResponse>), ApiError> {
    let response = state.checkout.initiate_legacy(&user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Poll an intent's status; other users' intents are reported as missing
pub async fn payment_status(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(request_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let intent = state
        .store
        .find_intent_for_user(&request_id, &user_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found("Payment request not found"))?;

    Ok(Json(StatusResponse {
        request_id: intent.request_id,
        status: intent.status,
        operator_transaction_id: intent.operator_transaction_id,
    }))
}

/// CinetPay notification endpoint.
///
/// Answers `{ok:true}` whenever a reference was present, including when
/// processing failed; failures are logged.
pub async fn cinetpay_webhook(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let raw = decode_body(&body, content_type)?;
    let event = normalize(raw)?;

    let token = headers.get("x-token").and_then(|v| v.to_str().ok());
    if let Err(e) = state.reconciler.authenticate(&event.raw, token) {
        tracing::warn!(request_id = %request_id, reference = %event.reference, error = %e, "Webhook token rejected");
        return Err(e.into());
    }

    let reference = event.reference.clone();
    match state.reconciler.reconcile(event, Utc::now()).await {
        Ok(report) => {
            tracing::debug!(
                request_id = %request_id,
                reference = %reference,
                outcome = %report.outcome,
                status = ?report.status,
                duplicate = report.duplicate,
                "Webhook processed"
            );
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, reference = %reference, error = %e, "Webhook processing failed");
        }
    }

    Ok(Json(json!({ "ok": true })))
}

/// List the caller's receipts, newest first
pub async fn list_receipts(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    query: Result<Query<ReceiptQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<ReceiptList>, ApiError> {
    let Query(query) = query?;
    let limit = match query.limit {
        None => 10,
        Some(n) if (1..=MAX_RECEIPT_PAGE).contains(&n) => n,
        Some(_) => {
            return Err(ApiError::validation(format!("limit must be between 1 and {MAX_RECEIPT_PAGE}")));
        }
    };

    let items = state.store.list_receipts(&user_id, limit).await.map_err(ApiError::from)?;
    Ok(Json(ReceiptList { items }))
}

/// Download a receipt as `<id>.csv` or `<id>.pdf`
pub async fn download_receipt(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::not_found("Receipt not found");

    let (id, extension) = file.rsplit_once('.').ok_or_else(not_found)?;
    if extension != "csv" && extension != "pdf" {
        return Err(not_found());
    }
    let id = uuid::Uuid::parse_str(id).map_err(|_| not_found())?;

    let receipt = state
        .store
        .get_receipt(id, &user_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(not_found)?;

    let disposition = format!("attachment; filename=\"{}\"", render::file_name(&receipt, extension));
    let response = if extension == "csv" {
        let csv = render::render_csv(&receipt)?;
        (
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()), (header::CONTENT_DISPOSITION, disposition)],
            csv,
        )
            .into_response()
    } else {
        (
            [(header::CONTENT_TYPE, "application/pdf".to_string()), (header::CONTENT_DISPOSITION, disposition)],
            render::render_pdf(&receipt),
        )
            .into_response()
    };

    Ok(response)
}

/// Current entitlement for the caller
pub async fn entitlement(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<EntitlementResponse>, ApiError> {
    let now = Utc::now();
    let user = state.store.ensure_user(&user_id, now).await.map_err(ApiError::from)?;

    Ok(Json(EntitlementResponse {
        plan: user.plan,
        premium: user.is_premium(now),
        trial_ends_at: user.trial_ends_at,
        premium_until: user.premium_until,
    }))
}

/// Unknown routes
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route not found")
}
