//! HTTP surface of the intake service

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{IntakeService, SubmitError};

pub struct AppState {
    pub intake: IntakeService,
}

/// Form fields posted by the message page
#[derive(Debug, Default, Deserialize)]
pub struct SubmitForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub message: String,
}

/// Build the intake router
pub fn router(intake: IntakeService) -> Router {
    let state = Arc::new(AppState { intake });

    Router::new()
        .route("/", post(submit_message))
        .route("/message", post(submit_message))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the intake router on `bind` until `shutdown` resolves
pub async fn serve<F>(bind: &str, intake: IntakeService, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("HTTP intake listening on {}", listener.local_addr()?);
    tracing::info!("Relaying to ingest server at {}", intake.relay().addr());

    axum::serve(listener, router(intake))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Accept a submitted message and relay it
pub async fn submit_message(
    State(state): State<Arc<AppState>>,
    form: Result<Form<SubmitForm>, FormRejection>,
) -> Result<Html<&'static str>, SubmitError> {
    let Form(form) = form.map_err(|rejection| {
        tracing::debug!("Rejected form body: {}", rejection);
        SubmitError::InvalidInput
    })?;

    state.intake.submit(&form.username, &form.message).await?;
    Ok(Html("Message sent!"))
}

/// Health check endpoint (liveness)
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "msgrelay-intake",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// Bodies are fixed strings; submitted content is never echoed back
impl IntoResponse for SubmitError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            SubmitError::InvalidInput => (StatusCode::BAD_REQUEST, "Invalid input"),
            SubmitError::RelayUnavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to send message")
            }
        };

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::RelayClient;
    use std::time::Duration;

    fn state_for(addr: &str) -> State<Arc<AppState>> {
        let relay = RelayClient::new(addr, Duration::from_millis(500), Duration::from_millis(500));
        State(Arc::new(AppState {
            intake: IntakeService::new(relay),
        }))
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let form = Form(SubmitForm {
            username: "alice".to_string(),
            message: String::new(),
        });

        let response = submit_message(state_for("127.0.0.1:9"), Ok(form)).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_server_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let form = Form(SubmitForm {
            username: "alice".to_string(),
            message: "secret words".to_string(),
        });

        let response = submit_message(state_for(&addr), Ok(form)).await.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Failed to send message");
    }

    #[tokio::test]
    async fn test_valid_form_is_ok() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let form = Form(SubmitForm {
            username: "alice".to_string(),
            message: "hi".to_string(),
        });

        let response = submit_message(state_for(&addr), Ok(form)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/html"), "got {:?}", content_type);
        drop(listener);
    }
}
