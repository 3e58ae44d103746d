//! API Error Envelope
//!
//! Every failure renders as `{code, message, details?, requestId?}`. The
//! request id is filled in by the request-id middleware on the way out.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use billing_core::BillingError;
use billing_payments::PaymentError;
use serde::Serialize;
use serde_json::Value;

/// Serialized error body
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// HTTP-facing error
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "Too many requests")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
            details: self.details,
            request_id: None,
        };

        let mut response = (self.status, Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match &err {
            BillingError::Validation(msg) => ApiError::validation(msg.clone()),
            BillingError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            BillingError::Conflict(_) | BillingError::ProviderTimeout(_) | BillingError::Unsupported(_) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", err.user_message())
            }
            BillingError::Provider { status, message } => {
                let status = status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::CONFLICT);
                ApiError::new(status, "CONFLICT", err.user_message())
                    .with_details(serde_json::json!({ "provider": message }))
            }
            _ => {
                tracing::error!(error = %err, "Unhandled billing error");
                ApiError::internal()
            }
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Billing(e) => e.into(),
            PaymentError::PriceMismatch { .. } | PaymentError::MissingReference | PaymentError::WebhookParse(_) => {
                ApiError::bad_request(err.user_message())
            }
            PaymentError::WebhookSignature(_) => ApiError::forbidden(err.user_message()),
            PaymentError::Config(_) | PaymentError::Render(_) => {
                tracing::error!(error = %err, "Payment error");
                ApiError::internal()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_status_forwarded() {
        let err: ApiError = BillingError::Provider { status: Some(502), message: "bad gateway".into() }.into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "CONFLICT");

        let err: ApiError = BillingError::Provider { status: Some(200), message: "no url".into() }.into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_payment_error_mapping() {
        let err: ApiError = PaymentError::MissingReference.into();
        assert_eq!((err.status, err.code), (StatusCode::BAD_REQUEST, "BAD_REQUEST"));

        let err: ApiError = PaymentError::WebhookSignature("x".into()).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let err: ApiError = PaymentError::Billing(BillingError::Storage("disk".into())).into();
        assert_eq!(err.code, "INTERNAL_ERROR");
        assert_eq!(err.message, "Internal server error");
    }
}
