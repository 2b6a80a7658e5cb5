//! Control surface: request/response messages handled by the scheduler task.

pub mod drops;

use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};

use crate::models::farming::{FarmingConfigPatch, GameRef};
use crate::models::settings::{AppState, SettingsPatch};

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub enum Command {
    StartFarm(GameRef),
    StopFarm,
    FarmStatus,
    QueueStatus,
    CancelQueued(String),
    GetFarmingConfig,
    SetFarmingConfig(FarmingConfigPatch),
    CheckNow,
    HeadersStatus,
    CaptureHeaders(HashMap<String, String>),
    RefreshToken,
    AuthStatus,
    SearchGames(String),
    GetSettings,
    UpdateSettings(SettingsPatch),
    GetHistory,
    ClearHistory,
    TestTelegram,
    Notifications,
}

#[derive(Debug)]
pub struct ControlRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Value>,
}

/// Cloneable client side of the control channel.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn channel() -> (ControlHandle, mpsc::Receiver<ControlRequest>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (ControlHandle { tx }, rx)
    }

    /// None when the scheduler is gone.
    pub async fn send(&self, command: Command) -> Option<Value> {
        let (reply, response) = oneshot::channel();
        self.tx.send(ControlRequest { command, reply }).await.ok()?;
        response.await.ok()
    }
}

pub fn failure(message: impl Into<String>) -> Value {
    json!({ "success": false, "message": message.into() })
}

/// Run one command against the state. Failures become `{success:false, message}`.
pub async fn dispatch(state: &mut AppState, command: Command) -> Value {
    let result = match command {
        Command::StartFarm(game) => drops::start_farming(state, game).await,
        Command::StopFarm => drops::stop_farming(state).await,
        Command::FarmStatus => drops::get_farming_status(state),
        Command::QueueStatus => drops::get_queue_status(state).await,
        Command::CancelQueued(drop_id) => drops::cancel_queued(state, &drop_id).await,
        Command::GetFarmingConfig => drops::get_farming_config(state).await,
        Command::SetFarmingConfig(patch) => drops::set_farming_config(state, patch).await,
        Command::CheckNow => drops::check_now(state).await,
        Command::HeadersStatus => drops::get_headers_status(state).await,
        Command::CaptureHeaders(headers) => drops::capture_headers(state, headers).await,
        Command::RefreshToken => drops::refresh_token(state).await,
        Command::AuthStatus => drops::get_status(state).await,
        Command::SearchGames(query) => drops::search_games(state, &query).await,
        Command::GetSettings => drops::get_settings(state).await,
        Command::UpdateSettings(patch) => drops::update_settings(state, patch).await,
        Command::GetHistory => drops::get_history(state).await,
        Command::ClearHistory => drops::clear_history(state).await,
        Command::TestTelegram => drops::test_telegram(state).await,
        Command::Notifications => drops::get_notifications(state),
    };

    result.unwrap_or_else(failure)
}
