use crate::errors::AppError;
use crate::handlers::{self, AppState};
use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorError,
    GovernorLayer,
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

/// Turns a handler panic into the generic internal-error body.
fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    AppError::InternalError("Request handler panicked".to_string()).into_response()
}

/// Renders rate limiter rejections as JSON, keeping its retry headers.
fn rate_limit_response(error: GovernorError) -> Response {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut response = AppError::TooManyRequests(wait_time).into_response();
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
        }
        GovernorError::UnableToExtractKey => {
            AppError::InternalError("Unable to extract client address".to_string())
                .into_response()
        }
        GovernorError::Other { code, msg, .. } => (
            code,
            Json(json!({ "error": msg.unwrap_or_else(|| "Request rejected".to_string()) })),
        )
            .into_response(),
    }
}

/// Builds the HTTP application.
///
/// `rate_limit` enables per-IP throttling on `/diagnostico`. Without a proxy
/// header the key is the peer address, which in-process tests do not have.
/// `/health` is never throttled. Body size is enforced by the handler after
/// authorization.
pub fn build_router(state: Arc<AppState>, rate_limit: bool) -> anyhow::Result<Router> {
    let mut protected: Router<Arc<AppState>> =
        Router::new().route("/diagnostico", post(handlers::diagnostico));

    if rate_limit {
        // One request replenished per second per IP, burst of 10
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(1)
                .burst_size(10)
                .key_extractor(SmartIpKeyExtractor)
                .error_handler(rate_limit_response)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
        );
        protected = protected.layer(GovernorLayer {
            config: governor_conf,
        });
    }

    Ok(Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response)),
        )
        .layer(CorsLayer::permissive()))
}
