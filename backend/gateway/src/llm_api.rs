//! Chat endpoints mounted under `/llm`.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use chatitp_core::ChatMessage;

use crate::auth::RequireUser;
use crate::error::ApiError;
use crate::server::GatewayState;

const INVALID_REQUEST: &str = "Invalid request";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub system_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeWithMessagesRequest {
    pub messages: Option<Vec<ChatMessage>>,
    pub is_loading_session: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub user_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSessionRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSessionRequest {
    pub session_id: Option<String>,
}

pub fn router() -> Router<GatewayState> {
    Router::new()
        .route("/initialize", post(initialize))
        .route("/initialize-with-messages", post(initialize_with_messages))
        .route("/generate", post(generate))
        .route("/save-session", post(save_session))
        .route("/load-session", post(load_session))
        .route("/sessions", get(list_sessions))
        .route("/clear-session", post(clear_session))
        .route("/messages", get(messages))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!(error = %rejection, "Rejected request body");
        ApiError::bad_request(INVALID_REQUEST)
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn initialize(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    payload: Result<Json<InitializeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let system_prompt = non_blank(body(payload)?.system_prompt)
        .ok_or_else(|| ApiError::bad_request(INVALID_REQUEST))?;
    state
        .engine
        .initialize(&user, &system_prompt)
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to initialize."))?;
    Ok(Json(json!({ "success": true })))
}

pub async fn initialize_with_messages(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    payload: Result<Json<InitializeWithMessagesRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = body(payload)?;
    let messages = request
        .messages
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::bad_request("Invalid request. Messages array is required."))?;
    state
        .engine
        .initialize_with_messages(&user, messages, request.is_loading_session.unwrap_or(true))
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to initialize with messages."))?;
    Ok(Json(json!({ "success": true })))
}

pub async fn generate(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let user_prompt = non_blank(body(payload)?.user_prompt)
        .ok_or_else(|| ApiError::bad_request(INVALID_REQUEST))?;
    let output = state
        .engine
        .generate(&user_prompt, &user)
        .await
        .map_err(|e| ApiError::from_chat(e, "Prediction failed."))?;
    Ok(Json(json!({
        "success": true,
        "type": output.kind,
        "content": output.content,
    })))
}

pub async fn save_session(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    payload: Result<Json<SaveSessionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    // The body is optional here.
    let request = payload.map(|Json(b)| b).unwrap_or_default();
    let session_id = state
        .engine
        .save_chat_session(&user, non_blank(request.session_id))
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to save session."))?;
    Ok(Json(json!({ "success": true, "sessionId": session_id })))
}

pub async fn load_session(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
    payload: Result<Json<LoadSessionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let session_id = non_blank(body(payload)?.session_id)
        .ok_or_else(|| ApiError::bad_request(INVALID_REQUEST))?;
    let messages = state
        .engine
        .load_chat_session(&user, &session_id)
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to load session."))?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}

pub async fn list_sessions(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>, ApiError> {
    let sessions = state
        .engine
        .list_sessions(&user)
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to fetch sessions."))?;
    Ok(Json(json!({ "success": true, "sessions": sessions })))
}

pub async fn clear_session(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>, ApiError> {
    state
        .engine
        .clear_session(&user)
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to clear session."))?;
    Ok(Json(json!({ "success": true })))
}

pub async fn messages(
    State(state): State<GatewayState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>, ApiError> {
    let messages = state
        .engine
        .messages(&user)
        .await
        .map_err(|e| ApiError::from_chat(e, "Failed to fetch messages."))?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}
