//! Plain-HTTP process endpoints: `/health` for container orchestration.

use std::time::{SystemTime, UNIX_EPOCH};

use {
    axum::{Json, Router, response::IntoResponse, routing::get},
    tokio_util::sync::CancellationToken,
    tracing::info,
};

pub const SERVICE_NAME: &str = "sesh";

/// Build the router (shared between production startup and tests).
pub fn build_app() -> Router {
    Router::new().route("/health", get(health_handler))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": epoch_secs(),
        "service": SERVICE_NAME,
    }))
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Serve the endpoints until `cancel` fires.
pub async fn serve(port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health endpoint listening");
    axum::serve(listener, build_app())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{
            body::Body,
            http::{Request, StatusCode},
        },
        tower::ServiceExt,
    };

    #[tokio::test]
    async fn health_reports_status_timestamp_service() {
        let app = build_app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], SERVICE_NAME);
        assert!(json["timestamp"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let app = build_app();
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
