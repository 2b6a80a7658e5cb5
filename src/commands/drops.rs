use log::info;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::models::farming::{FarmingConfigPatch, GameRef};
use crate::models::settings::{AppState, SettingsPatch};
use crate::services::credentials_service::RefreshOutcome;

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

pub async fn start_farming(state: &mut AppState, game: GameRef) -> Result<Value, String> {
    let name = game.name.clone();
    state.farming.start(game).await.map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "message": format!("Farming started: {}", name) }))
}

pub async fn stop_farming(state: &mut AppState) -> Result<Value, String> {
    let summary = state.farming.stop(false).await.map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "message": "Farming stopped", "summary": summary }))
}

pub fn get_farming_status(state: &AppState) -> Result<Value, String> {
    to_value(state.farming.status())
}

pub async fn get_queue_status(state: &AppState) -> Result<Value, String> {
    let queue = state.farming.queue().await.map_err(|e| e.to_string())?;
    Ok(json!({ "queue": queue }))
}

pub async fn cancel_queued(state: &mut AppState, drop_id: &str) -> Result<Value, String> {
    let removed = state
        .farming
        .cancel_queued(drop_id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({ "success": removed }))
}

pub async fn get_farming_config(state: &AppState) -> Result<Value, String> {
    to_value(state.farming.config().await.map_err(|e| e.to_string())?)
}

pub async fn set_farming_config(
    state: &mut AppState,
    patch: FarmingConfigPatch,
) -> Result<Value, String> {
    let config = state
        .farming
        .set_config(&patch)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "config": config }))
}

pub async fn check_now(state: &mut AppState) -> Result<Value, String> {
    let result = state.detector.check_for_new_drops(&mut state.farming).await;
    to_value(result)
}

pub async fn get_headers_status(state: &AppState) -> Result<Value, String> {
    to_value(state.credentials.status().await.map_err(|e| e.to_string())?)
}

pub async fn capture_headers(
    state: &mut AppState,
    headers: HashMap<String, String>,
) -> Result<Value, String> {
    let stored = state
        .credentials
        .capture(&headers)
        .await
        .map_err(|e| e.to_string())?;
    let status = state.credentials.status().await.map_err(|e| e.to_string())?;
    Ok(json!({ "success": stored, "status": status }))
}

/// Shared by the control command and the periodic refresh tick.
pub async fn request_token_refresh(state: &AppState) -> Result<RefreshOutcome, String> {
    let outcome = state.credentials.refresh().await.map_err(|e| e.to_string())?;
    if outcome == RefreshOutcome::RefreshRequested {
        state.notifications.token_refresh().await;
    }
    Ok(outcome)
}

pub async fn refresh_token(state: &mut AppState) -> Result<Value, String> {
    let outcome = request_token_refresh(state).await?;
    Ok(json!({ "success": true, "result": outcome }))
}

pub async fn get_status(state: &AppState) -> Result<Value, String> {
    match state.api.current_user().await {
        Ok(user) => Ok(json!({ "is_authenticated": true, "user": user })),
        Err(e) => {
            info!("Auth check failed: {}", e);
            Ok(json!({ "is_authenticated": false, "user": null, "message": e.to_string() }))
        }
    }
}

pub async fn search_games(state: &AppState, query: &str) -> Result<Value, String> {
    if query.trim().is_empty() {
        return Ok(json!({ "games": [] }));
    }
    let games = state
        .api
        .search_games(query.trim())
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({ "games": games }))
}

pub async fn get_settings(state: &AppState) -> Result<Value, String> {
    to_value(state.store.settings().await.map_err(|e| e.to_string())?)
}

pub async fn update_settings(state: &mut AppState, patch: SettingsPatch) -> Result<Value, String> {
    let settings = state
        .store
        .update_settings(&patch)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({ "success": true, "settings": settings }))
}

pub async fn get_history(state: &AppState) -> Result<Value, String> {
    let history = state.store.history().await.map_err(|e| e.to_string())?;
    Ok(json!({ "history": history }))
}

pub async fn clear_history(state: &mut AppState) -> Result<Value, String> {
    state.store.clear_history().await.map_err(|e| e.to_string())?;
    Ok(json!({ "success": true }))
}

pub async fn test_telegram(state: &AppState) -> Result<Value, String> {
    match state.notifications.telegram_test().await {
        Ok(true) => Ok(json!({ "success": true, "message": "Test message sent" })),
        Ok(false) => Err("Telegram is not configured".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn get_notifications(state: &AppState) -> Result<Value, String> {
    Ok(json!({ "notifications": state.feed.recent() }))
}
