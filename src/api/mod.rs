//! HTTP API.
//!
//! Every handler returns JSON; failures render as
//! `{"success": false, "error": ..., "details": ...}` via [`ApiError`].

pub mod alerts;
pub mod email;
pub mod knowledge;
pub mod learning;
pub mod settings;
pub mod status;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{DatabaseError, PipelineError};
use crate::pipeline::EmailPipeline;
use crate::store::Database;
use crate::store::models::TransitionError;

/// Which inference backends are wired in, for status reporting.
#[derive(Debug, Clone, Default)]
pub struct ProviderInfo {
    /// Configured selection label (`auto`, `anthropic`, ...).
    pub selection: String,
    /// Model names in failover order. Empty means rule-based only.
    pub chain: Vec<String>,
}

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Database>,
    pub pipeline: Arc<EmailPipeline>,
    pub providers: ProviderInfo,
}

impl AppState {
    pub fn new(store: Arc<dyn Database>, pipeline: Arc<EmailPipeline>, providers: ProviderInfo) -> Self {
        Self {
            store,
            pipeline,
            providers,
        }
    }
}

/// Build the full router.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .merge(status::routes())
        .merge(email::routes())
        .merge(alerts::routes())
        .merge(knowledge::routes())
        .merge(learning::routes())
        .merge(settings::routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

// ── Errors ──────────────────────────────────────────────────────────

/// Error response with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{entity} not found: {id}"))
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, error = %self.error, "Request failed");
        }
        let body = json!({
            "success": false,
            "error": self.error,
            "details": self.details,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match &e {
            DatabaseError::NotFound { .. } => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            DatabaseError::Constraint(_) => Self::new(StatusCode::CONFLICT, e.to_string()),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
                .with_details(json!(e.to_string())),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::InvalidInput(msg) => Self::bad_request(msg),
            PipelineError::Persistence(db) => db.into(),
            PipelineError::ChannelFetch(reason) => {
                Self::new(StatusCode::BAD_GATEWAY, "Mailbox fetch failed").with_details(json!(reason))
            }
            PipelineError::TransportDisabled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, PipelineError::TransportDisabled.to_string())
            }
            PipelineError::ConnectivityCheck(reason) => {
                Self::new(StatusCode::BAD_GATEWAY, "Mail server check failed").with_details(json!(reason))
            }
        }
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        Self::new(StatusCode::CONFLICT, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid JSON body").with_details(json!({
            "reason": rejection.body_text(),
            "status": rejection.status().as_u16(),
        }))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `Json` body extractor whose rejections render as [`ApiError`].
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_status_codes() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (PipelineError::InvalidInput("x".into()).into(), StatusCode::BAD_REQUEST),
            (PipelineError::TransportDisabled.into(), StatusCode::SERVICE_UNAVAILABLE),
            (PipelineError::ChannelFetch("down".into()).into(), StatusCode::BAD_GATEWAY),
            (PipelineError::ConnectivityCheck("refused".into()).into(), StatusCode::BAD_GATEWAY),
            (
                DatabaseError::NotFound {
                    entity: "alert".into(),
                    id: "a1".into(),
                }
                .into(),
                StatusCode::NOT_FOUND,
            ),
            (DatabaseError::Query("boom".into()).into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected);
        }
    }
}
