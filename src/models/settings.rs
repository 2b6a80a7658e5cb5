use crate::services::credentials_service::CredentialService;
use crate::services::detector_service::DropDetector;
use crate::services::farming_service::FarmingService;
use crate::services::notification_service::{DesktopFeed, Notifications};
use crate::services::store_service::Store;
use crate::services::telegram_service::MessageSink;
use crate::services::twitch_api::RemoteApi;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub const APP_NAME: &str = "drops-monitor";
pub const DEFAULT_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";

/// Daemon configuration file, loaded through confy.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AppConfig {
    /// Where the durable state lives. Defaults to the local data dir.
    pub data_dir: Option<PathBuf>,
    pub control_addr: String,
    pub log_level: String,
    pub diagnostics: bool,
    pub client_id: String,
    /// Session token used until one is captured from headers.
    pub auth_token: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            control_addr: "127.0.0.1:7878".to_string(),
            log_level: "info".to_string(),
            diagnostics: true,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            auth_token: None,
        }
    }
}

impl AppConfig {
    pub fn resolved_data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_NAME),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SelectedGame {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl SelectedGame {
    /// Name used by the fuzzy matcher.
    pub fn match_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Id match, or case-insensitive substring of the name in either direction.
    #[default]
    IdOrName,
    IdOnly,
}

pub const DEFAULT_CHECK_INTERVAL: u64 = 15;

/// Runtime settings kept in the durable store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MonitorSettings {
    pub selected_games: Vec<SelectedGame>,
    pub check_interval: u64,
    pub monitoring_enabled: bool,
    pub auto_refresh_token: bool,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub game_match_mode: MatchMode,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            selected_games: Vec::new(),
            check_interval: DEFAULT_CHECK_INTERVAL,
            monitoring_enabled: true,
            auto_refresh_token: true,
            telegram_bot_token: None,
            telegram_chat_id: None,
            game_match_mode: MatchMode::IdOrName,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SettingsPatch {
    pub selected_games: Option<Vec<SelectedGame>>,
    pub check_interval: Option<u64>,
    pub monitoring_enabled: Option<bool>,
    pub auto_refresh_token: Option<bool>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub game_match_mode: Option<MatchMode>,
}

impl SettingsPatch {
    /// Whether applying this patch changes the detector cadence.
    pub fn touches_schedule(&self) -> bool {
        self.check_interval.is_some() || self.monitoring_enabled.is_some()
    }
}

/// Everything the scheduler owns. Only the scheduler task touches it.
pub struct AppState {
    pub store: Store,
    pub api: Arc<dyn RemoteApi>,
    pub credentials: CredentialService,
    pub notifications: Notifications,
    pub feed: Arc<DesktopFeed>,
    pub farming: FarmingService,
    pub detector: DropDetector,
}

impl AppState {
    pub fn new(api: Arc<dyn RemoteApi>, store: Store, messenger: Arc<dyn MessageSink>) -> Self {
        let feed = Arc::new(DesktopFeed::new());
        let notifications = Notifications::new(feed.clone(), messenger);
        let credentials = CredentialService::new(store.clone());

        Self {
            farming: FarmingService::new(api.clone(), store.clone(), notifications.clone()),
            detector: DropDetector::new(
                api.clone(),
                store.clone(),
                notifications.clone(),
                credentials.clone(),
            ),
            store,
            api,
            credentials,
            notifications,
            feed,
        }
    }
}
