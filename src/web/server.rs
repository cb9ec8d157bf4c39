use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::{api, AppState};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::health_check))
        .route("/api/panel", get(api::get_panel))
        .route("/api/controls", get(api::get_controls))
        // Control endpoints
        .route("/api/control/start", post(api::post_start))
        .route("/api/control/stop", post(api::post_stop))
        .route("/api/control/restart", post(api::post_restart))
        // Settings endpoints
        .route("/api/settings", get(api::get_settings).put(api::put_settings))
        .route("/api/preferences", put(api::put_preferences))
        .route("/api/credentials", put(api::put_credentials))
        .layer(cors)
        .with_state(state)
}

pub async fn start_panel_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Control panel server starting on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{PaperAgentFactory, SimulatedFeed};
    use crate::config::{Credentials, Settings};
    use crate::panel::{ControlPanel, Session};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state(credentials: Credentials) -> AppState {
        let factory = PaperAgentFactory::new(Arc::new(SimulatedFeed::new(7)), dec!(1000000));
        AppState::new(
            Session::new(Settings::default(), credentials),
            ControlPanel::new(Arc::new(factory)),
            Duration::ZERO,
        )
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state(Credentials::default()));
        let (status, body) = call(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_start_without_credentials_is_rejected() {
        let app = router(state(Credentials::default()));
        let (status, body) = call(&app, Method::POST, "/api/control/start", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["notice"]["kind"], "error");
        assert_eq!(body["view"]["status"]["state"], "uninitialized");
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let app = router(state(Credentials::default()));

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/credentials",
            Some(serde_json::json!({
                "exchange_access_key": "access",
                "exchange_secret_key": "secret",
                "model_api_key": "sk-model"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, Method::POST, "/api/control/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice"]["message"], "Agent has been started!");
        assert_eq!(body["view"]["controls"]["stop_enabled"], true);
        assert_eq!(body["view"]["controls"]["start_enabled"], false);

        let (status, _) = call(&app, Method::POST, "/api/control/start", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, Method::GET, "/api/controls", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["restart_enabled"], true);

        let (status, body) = call(&app, Method::POST, "/api/control/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["controls"]["stop_enabled"], false);
        assert_eq!(body["view"]["status"]["run_state"], "Stopped");
    }

    #[tokio::test]
    async fn test_settings_roundtrip_through_form() {
        let app = router(state(Credentials::default()));

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/settings",
            Some(serde_json::json!({
                "interval_minutes": " 10 ",
                "max_trading_count": "4",
                "max_investment": "200000"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notice"]["kind"], "info");

        let (_, body) = call(&app, Method::GET, "/api/settings", None).await;
        assert_eq!(body["settings"]["interval_minutes"], 10);
        assert_eq!(body["form"]["max_investment"], "200000");

        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/settings",
            Some(serde_json::json!({
                "interval_minutes": "-1",
                "max_trading_count": "4",
                "max_investment": "200000"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["view"]["settings"]["interval_minutes"], 10);
    }

    #[tokio::test]
    async fn test_preferences() {
        let app = router(state(Credentials::default()));
        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/preferences",
            Some(serde_json::json!({ "risk_level": "Aggressive", "model": "gpt-4o" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["view"]["settings"]["risk_level"], "Aggressive");
        assert_eq!(body["view"]["settings"]["model"], "gpt-4o");
    }
}
