//! Durable key/value state that survives restarts.
//!
//! Every key is stored independently as one JSON document. `Store` layers the
//! typed accessors and the size caps on top of any [`StateStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::farming::{FarmingConfig, FarmingSession, FarmingStatus, HistoryEntry, QueueEntry};
use crate::models::settings::{MatchMode, MonitorSettings, SelectedGame, SettingsPatch};

pub const HISTORY_CAP: usize = 50;
pub const NOTIFIED_CAP: usize = 100;

pub type StoreResult<T> = Result<T, StoreError>;

/// Names of the persisted keys.
pub struct StoreKey;

impl StoreKey {
    pub const SELECTED_GAMES: &'static str = "selected_games";
    pub const NOTIFIED_DROPS: &'static str = "notified_drops";
    pub const DROP_HISTORY: &'static str = "drop_history";
    pub const DROP_QUEUE: &'static str = "drop_queue";
    pub const FARMING_STATE: &'static str = "farming_state";
    pub const FARMING_CONFIG: &'static str = "farming_config";
    pub const MONITORING_ENABLED: &'static str = "monitoring_enabled";
    pub const CHECK_INTERVAL: &'static str = "check_interval";
    pub const TWITCH_HEADERS: &'static str = "twitch_headers";
    pub const TWITCH_HEADERS_TIMESTAMP: &'static str = "twitch_headers_timestamp";
    pub const TELEGRAM_BOT_TOKEN: &'static str = "telegram_bot_token";
    pub const TELEGRAM_CHAT_ID: &'static str = "telegram_chat_id";
    pub const AUTO_REFRESH_TOKEN: &'static str = "auto_refresh_token";
    pub const GAME_MATCH_MODE: &'static str = "game_match_mode";
    pub const DEVICE_ID: &'static str = "device_id";
}

/// Raw persistence backend. `set` returns only once the value is durable.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// One `<key>.json` file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn open(dir: PathBuf) -> StoreResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        let bytes = serde_json::to_vec_pretty(&value)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.values.lock().await.remove(key);
        Ok(())
    }
}

/// Typed view over a [`StateStore`].
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn StateStore>,
}

impl Store {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self { inner }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Read a key, treating a malformed value as absent.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let Some(value) = self.inner.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                warn!("⚠️ Ignoring malformed value for '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    pub async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.inner.set(key, serde_json::to_value(value)?).await
    }

    pub async fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key).await
    }

    // Farming session

    pub async fn farming_session(&self) -> StoreResult<FarmingSession> {
        Ok(self.read(StoreKey::FARMING_STATE).await?.unwrap_or_default())
    }

    pub async fn save_farming_session(&self, session: &FarmingSession) -> StoreResult<()> {
        self.write(StoreKey::FARMING_STATE, session).await
    }

    pub async fn farming_config(&self) -> StoreResult<FarmingConfig> {
        Ok(self.read(StoreKey::FARMING_CONFIG).await?.unwrap_or_default())
    }

    pub async fn save_farming_config(&self, config: &FarmingConfig) -> StoreResult<()> {
        self.write(StoreKey::FARMING_CONFIG, config).await
    }

    // Queue

    pub async fn queue(&self) -> StoreResult<Vec<QueueEntry>> {
        Ok(self.read(StoreKey::DROP_QUEUE).await?.unwrap_or_default())
    }

    pub async fn save_queue(&self, queue: &[QueueEntry]) -> StoreResult<()> {
        self.write(StoreKey::DROP_QUEUE, queue).await
    }

    // History

    pub async fn history(&self) -> StoreResult<Vec<HistoryEntry>> {
        Ok(self.read(StoreKey::DROP_HISTORY).await?.unwrap_or_default())
    }

    /// Insert newest-first and keep only the most recent entries.
    pub async fn push_history(&self, entry: HistoryEntry) -> StoreResult<()> {
        let mut history = self.history().await?;
        history.retain(|h| h.id != entry.id);
        history.insert(0, entry);
        history.truncate(HISTORY_CAP);
        self.write(StoreKey::DROP_HISTORY, &history).await
    }

    /// Returns false when no entry has that id.
    pub async fn set_history_status(&self, drop_id: &str, status: FarmingStatus) -> StoreResult<bool> {
        let mut history = self.history().await?;
        let Some(entry) = history.iter_mut().find(|h| h.id == drop_id) else {
            return Ok(false);
        };
        entry.farming_status = status;
        self.write(StoreKey::DROP_HISTORY, &history).await?;
        Ok(true)
    }

    pub async fn clear_history(&self) -> StoreResult<()> {
        self.write(StoreKey::DROP_HISTORY, &Vec::<HistoryEntry>::new()).await?;
        self.write(StoreKey::NOTIFIED_DROPS, &Vec::<String>::new()).await
    }

    // Notified set

    pub async fn notified(&self) -> StoreResult<Vec<String>> {
        Ok(self.read(StoreKey::NOTIFIED_DROPS).await?.unwrap_or_default())
    }

    /// Append an id once, trimming the oldest beyond the cap.
    pub async fn mark_notified(&self, drop_id: &str) -> StoreResult<()> {
        let mut notified = self.notified().await?;
        if notified.iter().any(|id| id == drop_id) {
            return Ok(());
        }
        notified.push(drop_id.to_string());
        if notified.len() > NOTIFIED_CAP {
            let excess = notified.len() - NOTIFIED_CAP;
            notified.drain(..excess);
        }
        self.write(StoreKey::NOTIFIED_DROPS, &notified).await
    }

    // Credential blob

    pub async fn headers(&self) -> StoreResult<HashMap<String, String>> {
        Ok(self.read(StoreKey::TWITCH_HEADERS).await?.unwrap_or_default())
    }

    pub async fn headers_captured_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        self.read(StoreKey::TWITCH_HEADERS_TIMESTAMP).await
    }

    pub async fn save_headers(
        &self,
        headers: &HashMap<String, String>,
        captured_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.write(StoreKey::TWITCH_HEADERS, headers).await?;
        self.write(StoreKey::TWITCH_HEADERS_TIMESTAMP, &captured_at).await
    }

    // Settings

    pub async fn settings(&self) -> StoreResult<MonitorSettings> {
        let defaults = MonitorSettings::default();
        Ok(MonitorSettings {
            selected_games: self
                .read::<Vec<SelectedGame>>(StoreKey::SELECTED_GAMES)
                .await?
                .unwrap_or(defaults.selected_games),
            check_interval: self
                .read::<u64>(StoreKey::CHECK_INTERVAL)
                .await?
                .unwrap_or(defaults.check_interval)
                .max(1),
            monitoring_enabled: self
                .read(StoreKey::MONITORING_ENABLED)
                .await?
                .unwrap_or(defaults.monitoring_enabled),
            auto_refresh_token: self
                .read(StoreKey::AUTO_REFRESH_TOKEN)
                .await?
                .unwrap_or(defaults.auto_refresh_token),
            telegram_bot_token: self.read(StoreKey::TELEGRAM_BOT_TOKEN).await?,
            telegram_chat_id: self.read(StoreKey::TELEGRAM_CHAT_ID).await?,
            game_match_mode: self
                .read::<MatchMode>(StoreKey::GAME_MATCH_MODE)
                .await?
                .unwrap_or(defaults.game_match_mode),
        })
    }

    /// Write the fields present in the patch; empty Telegram strings clear the value.
    pub async fn update_settings(&self, patch: &SettingsPatch) -> StoreResult<MonitorSettings> {
        if let Some(games) = &patch.selected_games {
            self.write(StoreKey::SELECTED_GAMES, games).await?;
        }
        if let Some(interval) = patch.check_interval {
            self.write(StoreKey::CHECK_INTERVAL, &interval.max(1)).await?;
        }
        if let Some(enabled) = patch.monitoring_enabled {
            self.write(StoreKey::MONITORING_ENABLED, &enabled).await?;
        }
        if let Some(enabled) = patch.auto_refresh_token {
            self.write(StoreKey::AUTO_REFRESH_TOKEN, &enabled).await?;
        }
        if let Some(mode) = patch.game_match_mode {
            self.write(StoreKey::GAME_MATCH_MODE, &mode).await?;
        }
        for (key, value) in [
            (StoreKey::TELEGRAM_BOT_TOKEN, &patch.telegram_bot_token),
            (StoreKey::TELEGRAM_CHAT_ID, &patch.telegram_chat_id),
        ] {
            match value.as_deref().map(str::trim) {
                Some("") => self.remove(key).await?,
                Some(v) => self.write(key, v).await?,
                None => {}
            }
        }
        self.settings().await
    }

    pub async fn device_id(&self) -> StoreResult<String> {
        if let Some(id) = self.read::<String>(StoreKey::DEVICE_ID).await? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string().replace('-', "");
        self.write(StoreKey::DEVICE_ID, &id).await?;
        Ok(id)
    }
}
