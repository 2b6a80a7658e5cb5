//! Fakes shared by the service tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{ApiError, ApiResult};
use crate::models::drops::{
    CampaignDetails, CampaignGame, CampaignListing, CampaignStatus, ChannelPointsContext,
    CurrentUser, DropCampaign, DropClaimResult, GameSearchResult, InventoryCampaign, InventoryDrop,
    InventoryGame, PointsClaimResult, Streamer, StreamerStatus, WatchEvent,
};
use crate::models::farming::{FarmingStatus, HistoryEntry, QueueEntry};
use crate::models::settings::{SelectedGame, SettingsPatch};
use crate::services::credentials_service::CredentialService;
use crate::services::detector_service::DropDetector;
use crate::services::farming_service::FarmingService;
use crate::services::notification_service::{Notification, NotificationSink, Notifications};
use crate::services::store_service::Store;
use crate::services::telegram_service::MessageSink;
use crate::services::twitch_api::RemoteApi;
use crate::utils::slug::game_to_slug;

struct MockState {
    user: Option<CurrentUser>,
    unauthenticated: bool,
    campaigns: Result<Vec<DropCampaign>, String>,
    streams: HashMap<String, Vec<Streamer>>,
    streamer_status: StreamerStatus,
    inventory: Result<Vec<InventoryCampaign>, String>,
    claim_errors: HashMap<String, String>,
    claims: Vec<String>,
    points_claim: Option<String>,
    points_earned: Option<i64>,
    watch_ok: bool,
    watch_events: usize,
    search_results: Vec<GameSearchResult>,
    tracking_error: Option<String>,
    details_error: Option<String>,
}

/// Scripted [`RemoteApi`]. Defaults to a logged-in user with nothing live.
pub struct MockApi {
    state: Mutex<MockState>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState {
                user: Some(CurrentUser {
                    id: "777".into(),
                    login: "viewer".into(),
                    display_name: Some("Viewer".into()),
                }),
                unauthenticated: false,
                campaigns: Ok(Vec::new()),
                streams: HashMap::new(),
                streamer_status: StreamerStatus {
                    online: true,
                    correct_game: true,
                    current_game: None,
                },
                inventory: Ok(Vec::new()),
                claim_errors: HashMap::new(),
                claims: Vec::new(),
                points_claim: None,
                points_earned: None,
                watch_ok: true,
                watch_events: 0,
                search_results: Vec::new(),
                tracking_error: None,
                details_error: None,
            }),
        }
    }
}

impl MockApi {
    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    fn guard(&self) -> ApiResult<()> {
        if self.with(|s| s.unauthenticated) {
            Err(ApiError::Unauthenticated)
        } else {
            Ok(())
        }
    }

    pub fn set_user(&self, user: Option<CurrentUser>) {
        self.with(|s| s.user = user);
    }

    pub fn set_unauthenticated(&self) {
        self.with(|s| s.unauthenticated = true);
    }

    pub fn set_campaigns(&self, campaigns: Vec<DropCampaign>) {
        self.with(|s| s.campaigns = Ok(campaigns));
    }

    pub fn fail_campaigns(&self, message: &str) {
        self.with(|s| s.campaigns = Err(message.to_string()));
    }

    pub fn set_streams(&self, slug: &str, streams: Vec<Streamer>) {
        self.with(|s| s.streams.insert(slug.to_string(), streams));
    }

    pub fn set_streamer_status(&self, status: StreamerStatus) {
        self.with(|s| s.streamer_status = status);
    }

    pub fn set_inventory(&self, inventory: Result<Vec<InventoryCampaign>, String>) {
        self.with(|s| s.inventory = inventory);
    }

    pub fn fail_claim(&self, instance_id: &str, message: &str) {
        self.with(|s| s.claim_errors.insert(instance_id.to_string(), message.to_string()));
    }

    pub fn claims(&self) -> Vec<String> {
        self.with(|s| s.claims.clone())
    }

    pub fn set_points_claim(&self, claim_id: Option<&str>, earned: Option<i64>) {
        self.with(|s| {
            s.points_claim = claim_id.map(|c| c.to_string());
            s.points_earned = earned;
        });
    }

    pub fn set_watch_ok(&self, ok: bool) {
        self.with(|s| s.watch_ok = ok);
    }

    pub fn watch_events(&self) -> usize {
        self.with(|s| s.watch_events)
    }

    pub fn fail_tracking(&self, message: &str) {
        self.with(|s| s.tracking_error = Some(message.to_string()));
    }

    pub fn fail_details(&self, message: &str) {
        self.with(|s| s.details_error = Some(message.to_string()));
    }

    pub fn set_search_results(&self, results: Vec<GameSearchResult>) {
        self.with(|s| s.search_results = results);
    }
}

#[async_trait]
impl RemoteApi for MockApi {
    async fn current_user(&self) -> ApiResult<CurrentUser> {
        self.guard()?;
        self.with(|s| s.user.clone())
            .ok_or_else(|| ApiError::Remote("No current user".into()))
    }

    async fn drop_campaigns(&self) -> ApiResult<CampaignListing> {
        self.guard()?;
        self.with(|s| s.campaigns.clone())
            .map(|campaigns| CampaignListing {
                campaigns,
                user_id: Some("777".into()),
            })
            .map_err(ApiError::Remote)
    }

    async fn drop_details(&self, _drop_id: &str, _user_id: &str) -> ApiResult<CampaignDetails> {
        self.guard()?;
        match self.with(|s| s.details_error.clone()) {
            Some(message) => Err(ApiError::Remote(message)),
            None => Ok(CampaignDetails::default()),
        }
    }

    async fn search_games(&self, _query: &str) -> ApiResult<Vec<GameSearchResult>> {
        self.guard()?;
        Ok(self.with(|s| s.search_results.clone()))
    }

    async fn streams_with_drops(&self, game_slug: &str) -> ApiResult<Vec<Streamer>> {
        self.guard()?;
        Ok(self.with(|s| s.streams.get(game_slug).cloned().unwrap_or_default()))
    }

    async fn streamer_status(&self, _login: &str, _expected_game: &str) -> ApiResult<StreamerStatus> {
        self.guard()?;
        Ok(self.with(|s| s.streamer_status.clone()))
    }

    async fn drops_inventory(&self) -> ApiResult<Vec<InventoryCampaign>> {
        self.guard()?;
        self.with(|s| s.inventory.clone()).map_err(ApiError::Remote)
    }

    async fn claim_drop(&self, drop_instance_id: &str) -> ApiResult<DropClaimResult> {
        self.guard()?;
        self.with(|s| match s.claim_errors.get(drop_instance_id) {
            Some(message) => Err(ApiError::Remote(message.clone())),
            None => {
                s.claims.push(drop_instance_id.to_string());
                Ok(DropClaimResult {
                    status: Some("ELIGIBLE_FOR_ALL".into()),
                    is_user_account_connected: Some(true),
                })
            }
        })
    }

    async fn channel_points(&self, _login: &str) -> ApiResult<ChannelPointsContext> {
        self.guard()?;
        Ok(self.with(|s| ChannelPointsContext {
            channel_id: "chan".into(),
            balance: 1000,
            available_claim: s.points_claim.clone(),
        }))
    }

    async fn claim_channel_points(
        &self,
        _claim_id: &str,
        _channel_id: &str,
    ) -> ApiResult<PointsClaimResult> {
        self.guard()?;
        Ok(self.with(|s| PointsClaimResult {
            points_earned: s.points_earned,
            current_points: None,
        }))
    }

    async fn tracking_url(&self, _login: &str) -> ApiResult<String> {
        match self.with(|s| s.tracking_error.clone()) {
            Some(message) => Err(ApiError::Remote(message)),
            None => Ok("https://spade.test/track".into()),
        }
    }

    async fn send_watch_event(&self, _event: &WatchEvent) -> ApiResult<bool> {
        Ok(self.with(|s| {
            s.watch_events += 1;
            s.watch_ok
        }))
    }
}

/// Notification sink that remembers everything.
#[derive(Default)]
pub struct RecordingSink {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn count_titles(&self, needle: &str) -> usize {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.title.contains(needle))
            .count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: &Notification) {
        self.seen.lock().unwrap().push(notification.clone());
    }
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingMessenger {
    async fn send(&self, text: &str, _photo_url: Option<&str>) -> ApiResult<bool> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(true)
    }
}

/// One in-memory world: store, scripted API and recording sinks.
pub struct Harness {
    pub api: Arc<MockApi>,
    pub store: Store,
    pub sink: Arc<RecordingSink>,
    pub messenger: Arc<RecordingMessenger>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            api: Arc::new(MockApi::default()),
            store: Store::in_memory(),
            sink: Arc::new(RecordingSink::default()),
            messenger: Arc::new(RecordingMessenger::default()),
        }
    }

    pub fn notifications(&self) -> Notifications {
        Notifications::new(self.sink.clone(), self.messenger.clone())
    }

    pub fn credentials(&self) -> CredentialService {
        CredentialService::new(self.store.clone())
    }

    pub fn farming(&self) -> FarmingService {
        FarmingService::new(self.api.clone(), self.store.clone(), self.notifications())
    }

    pub fn detector(&self) -> DropDetector {
        DropDetector::new(
            self.api.clone(),
            self.store.clone(),
            self.notifications(),
            self.credentials(),
        )
    }

    pub fn queue_entry(&self, drop_id: &str, game_name: &str) -> QueueEntry {
        QueueEntry {
            drop_id: drop_id.to_string(),
            game_id: format!("id-{}", drop_id),
            game_name: game_name.to_string(),
            game_slug: game_to_slug(game_name),
            box_art_url: None,
            added_at: Utc::now(),
        }
    }

    pub async fn seed_history(&self, drop_id: &str, status: FarmingStatus) {
        self.store
            .push_history(HistoryEntry {
                id: drop_id.to_string(),
                game_id: None,
                game_name: "Game".into(),
                box_art_url: None,
                campaign_name: "Campaign".into(),
                status: "ACTIVE".into(),
                owner: None,
                start_at: None,
                end_at: None,
                rewards: vec![],
                found_at: Utc::now(),
                farming_status: status,
            })
            .await
            .unwrap();
    }

    pub async fn history_status(&self, drop_id: &str) -> Option<FarmingStatus> {
        self.store
            .history()
            .await
            .unwrap()
            .into_iter()
            .find(|h| h.id == drop_id)
            .map(|h| h.farming_status)
    }

    pub async fn select_games(&self, games: Vec<SelectedGame>) {
        self.store
            .update_settings(&SettingsPatch {
                selected_games: Some(games),
                ..Default::default()
            })
            .await
            .unwrap();
    }
}

pub fn streamer(login: &str, viewers: i64) -> Streamer {
    Streamer {
        channel_id: format!("ch-{}", login),
        login: login.to_string(),
        display_name: login.to_uppercase(),
        broadcast_id: format!("b-{}", login),
        viewers,
    }
}

pub fn campaign(id: &str, game_id: &str, game_name: &str, status: CampaignStatus) -> DropCampaign {
    DropCampaign {
        id: id.to_string(),
        name: format!("{} drops", game_name),
        status,
        game: Some(CampaignGame {
            id: game_id.to_string(),
            name: Some(game_name.to_lowercase()),
            display_name: Some(game_name.to_string()),
            slug: Some(game_to_slug(game_name)),
            box_art_url: Some("https://art.test/box.jpg".into()),
        }),
        owner_name: Some("Publisher".into()),
        start_at: None,
        end_at: None,
        time_based_drops: vec![],
    }
}

pub fn inventory_campaign(slug: &str, drops: Vec<InventoryDrop>) -> InventoryCampaign {
    InventoryCampaign {
        id: format!("inv-{}", slug),
        name: "In progress".into(),
        game: Some(InventoryGame {
            id: None,
            name: None,
            slug: Some(slug.to_string()),
        }),
        time_based_drops: drops,
    }
}
