use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Local;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::AppState;
use crate::config::{Credentials, SettingsForm};
use crate::panel::{render, Notice, Preferences, Session};

#[derive(Debug, Clone, Copy)]
enum ControlAction {
    Start,
    Stop,
    Restart,
}

async fn respond(notice: Notice, session: &Session) -> Response {
    let view = render(session, Local::now().naive_local()).await;
    let code = if notice.is_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (code, Json(json!({ "notice": notice, "view": view }))).into_response()
}

async fn control(state: AppState, action: ControlAction) -> Response {
    let mut session = state.session.lock().await;
    debug!("Control action requested: {:?}", action);

    let notice = match action {
        ControlAction::Start => state.panel.start(&mut session).await,
        ControlAction::Stop => state.panel.stop(&mut session).await,
        ControlAction::Restart => state.panel.restart(&mut session).await,
    };

    // Give the agent a moment to publish its new status before re-reading it.
    if !notice.is_error() && !state.settle_delay.is_zero() {
        tokio::time::sleep(state.settle_delay).await;
    }

    respond(notice, &session).await
}

// === Panel Data Endpoints ===

pub async fn get_panel(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(render(&session, Local::now().naive_local()).await)
}

pub async fn get_controls(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(session.controls())
}

// === Control Endpoints ===

pub async fn post_start(State(state): State<AppState>) -> impl IntoResponse {
    control(state, ControlAction::Start).await
}

pub async fn post_stop(State(state): State<AppState>) -> impl IntoResponse {
    control(state, ControlAction::Stop).await
}

pub async fn post_restart(State(state): State<AppState>) -> impl IntoResponse {
    control(state, ControlAction::Restart).await
}

// === Settings Endpoints ===

pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({
        "settings": session.settings,
        "form": SettingsForm::from_settings(&session.settings),
    }))
}

pub async fn put_settings(
    State(state): State<AppState>,
    Json(form): Json<SettingsForm>,
) -> impl IntoResponse {
    let mut session = state.session.lock().await;
    let notice = state.panel.apply_settings(&mut session, &form).await;
    respond(notice, &session).await
}

pub async fn put_preferences(
    State(state): State<AppState>,
    Json(preferences): Json<Preferences>,
) -> impl IntoResponse {
    let mut session = state.session.lock().await;
    let notice = state.panel.set_preferences(&mut session, preferences);
    respond(notice, &session).await
}

pub async fn put_credentials(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> impl IntoResponse {
    let mut session = state.session.lock().await;
    let notice = state.panel.set_credentials(&mut session, credentials);
    respond(notice, &session).await
}

// === Health Check ===

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
