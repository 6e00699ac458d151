#![allow(clippy::result_large_err)] // Server helpers return AppError for consistent diagnostics.

use super::{TransformationHook, TransformationRequest};
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Extension},
    http::{header, HeaderValue, Response, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::util::MapResponseLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

/// Listener settings for the hook endpoint.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind: String,
    pub max_body_bytes: usize,
}

/// Start the hook listener and block until the server terminates.
pub async fn serve_hook(
    hook: Arc<TransformationHook>,
    settings: ServerSettings,
) -> Result<(), AppError> {
    serve_hook_internal(hook, settings, None).await
}

/// Start the hook listener and notify once the bind address is known (test helper).
pub async fn serve_hook_with_ready_notifier(
    hook: Arc<TransformationHook>,
    settings: ServerSettings,
    ready_notifier: oneshot::Sender<SocketAddr>,
) -> Result<(), AppError> {
    serve_hook_internal(hook, settings, Some(ready_notifier)).await
}

/// Routes served by `splicer serve`.
pub fn router(hook: Arc<TransformationHook>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/transform", post(handle_transform))
        .route("/healthz", get(|| async { "ok" }))
        .layer(Extension(hook))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(MapResponseLayer::new(|mut response: Response<Body>| {
            if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
                let body = json!({
                    "error": {
                        "code": "SPL-HOOK-413",
                        "message": "payload too large"
                    }
                })
                .to_string();
                *response.body_mut() = Body::from(body);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
            }
            response
        }))
}

async fn serve_hook_internal(
    hook: Arc<TransformationHook>,
    settings: ServerSettings,
    ready_notifier: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let bind_addr: SocketAddr = settings.bind.parse().map_err(|err| {
        AppError::new(
            ErrorCategory::ConfigurationError,
            format!("invalid hook bind address {}: {}", settings.bind, err),
        )
        .with_code("SPL-HOOK-001")
    })?;
    let listener = TcpListener::bind(bind_addr).await.map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to bind hook listener {}: {}", bind_addr, err),
        )
    })?;
    let local_addr = listener.local_addr().map_err(|err| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to determine hook listener address: {}", err),
        )
    })?;
    if let Some(tx) = ready_notifier {
        let _ = tx.send(local_addr);
    }
    info!("transformation hook listening on {}", local_addr);
    axum::serve(listener, router(hook, settings.max_body_bytes).into_make_service())
        .await
        .map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("hook server terminated: {}", err),
            )
        })
}

async fn handle_transform(
    Extension(hook): Extension<Arc<TransformationHook>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, HookRejection> {
    let request: TransformationRequest = serde_json::from_slice(&body).map_err(|err| {
        tracing::warn!("rejected transformation request: {}", err);
        HookRejection::bad_request("invalid transformation request payload")
    })?;
    let response = hook.handle(request).await;
    let encoded = serde_json::to_value(&response).map_err(|err| {
        tracing::error!("failed to encode transformation response: {}", err);
        HookRejection::internal()
    })?;
    Ok(Json(encoded))
}

struct HookRejection {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
}

impl HookRejection {
    fn bad_request(message: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "SPL-HOOK-400",
            message,
        }
    }

    fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "SPL-HOOK-500",
            message: "internal error",
        }
    }
}

impl IntoResponse for HookRejection {
    fn into_response(self) -> axum::response::Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}
