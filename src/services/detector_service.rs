use chrono::Utc;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::drops::{CampaignGame, CampaignStatus, DropCampaign};
use crate::models::farming::{HistoryEntry, QueueEntry};
use crate::models::settings::{MatchMode, SelectedGame};
use crate::services::credentials_service::CredentialService;
use crate::services::farming_service::FarmingService;
use crate::services::notification_service::Notifications;
use crate::services::store_service::Store;
use crate::services::twitch_api::RemoteApi;

/// Outcome of one detection pass. Failures are folded into `message`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub checked: bool,
    pub found: usize,
    pub message: String,
    pub needs_headers: bool,
    pub new_drops: Vec<DropCampaign>,
}

impl CheckResult {
    fn nothing(message: impl Into<String>) -> Self {
        Self {
            checked: true,
            found: 0,
            message: message.into(),
            needs_headers: false,
            new_drops: Vec::new(),
        }
    }
}

/// Decides whether a campaign's game is one the user selected.
///
/// Name matching is loose on purpose: provider names and the names users pick
/// drift apart ("Rainbow Six" vs "Tom Clancy's Rainbow Six Siege").
pub struct GameMatcher {
    mode: MatchMode,
    ids: Vec<String>,
    names: Vec<String>,
}

impl GameMatcher {
    pub fn new(mode: MatchMode, selected: &[SelectedGame]) -> Self {
        Self {
            mode,
            ids: selected.iter().map(|g| g.id.clone()).collect(),
            names: selected
                .iter()
                .filter_map(|g| g.match_name())
                .map(str::to_lowercase)
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, game: &CampaignGame) -> bool {
        if !game.id.is_empty() && self.ids.contains(&game.id) {
            return true;
        }
        if self.mode == MatchMode::IdOnly {
            return false;
        }

        let Some(name) = game.label().map(str::to_lowercase).filter(|n| !n.is_empty()) else {
            return false;
        };
        self.names
            .iter()
            .any(|selected| name.contains(selected.as_str()) || selected.contains(name.as_str()))
    }
}

/// Campaigns that match a selected game, are not expired and were never notified.
pub fn select_new_drops<'a>(
    campaigns: &'a [DropCampaign],
    notified: &[String],
    matcher: &GameMatcher,
) -> Vec<&'a DropCampaign> {
    campaigns
        .iter()
        .filter(|campaign| {
            let Some(game) = campaign.game.as_ref() else {
                return false;
            };
            if !matcher.matches(game) {
                return false;
            }
            if campaign.status == CampaignStatus::Expired {
                debug!("Skipped expired campaign {}", campaign.name);
                return false;
            }
            !notified.contains(&campaign.id)
        })
        .collect()
}

pub struct DropDetector {
    api: Arc<dyn RemoteApi>,
    store: Store,
    notifier: Notifications,
    credentials: CredentialService,
}

impl DropDetector {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        store: Store,
        notifier: Notifications,
        credentials: CredentialService,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            credentials,
        }
    }

    /// One detection pass. Never fails; problems end up in the result message.
    pub async fn check_for_new_drops(&self, farming: &mut FarmingService) -> CheckResult {
        info!("=== Checking drops === {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

        let needs_headers = match self.credentials.status().await {
            Ok(status) if !status.has_credential => {
                warn!("⚠️ No Client-Integrity captured, trying anyway");
                true
            }
            Ok(status) => {
                if status.is_expired {
                    warn!("⚠️ Client-Integrity may be expired, trying anyway");
                }
                false
            }
            Err(e) => {
                warn!("⚠️ Could not read headers status: {}", e);
                false
            }
        };

        let mut result = self.run_check(farming).await;
        result.needs_headers |= needs_headers;
        result
    }

    async fn run_check(&self, farming: &mut FarmingService) -> CheckResult {
        let settings = match self.store.settings().await {
            Ok(settings) => settings,
            Err(e) => return CheckResult::nothing(format!("Failed to read settings: {}", e)),
        };
        if settings.selected_games.is_empty() {
            debug!("No games selected for monitoring");
            return CheckResult::nothing("No games selected");
        }

        let listing = match self.api.drop_campaigns().await {
            Ok(listing) => listing,
            Err(ApiError::Unauthenticated) => {
                let mut result = CheckResult::nothing("Not logged in: capture Twitch headers first");
                result.needs_headers = true;
                return result;
            }
            Err(e) => {
                warn!("Failed to get drops: {}", e);
                return CheckResult::nothing(format!("Failed to fetch drops: {}", e));
            }
        };
        debug!("Total campaigns from Twitch: {}", listing.campaigns.len());

        let notified = match self.store.notified().await {
            Ok(notified) => notified,
            Err(e) => return CheckResult::nothing(format!("Failed to read notified drops: {}", e)),
        };

        let matcher = GameMatcher::new(settings.game_match_mode, &settings.selected_games);
        let new_drops: Vec<DropCampaign> = select_new_drops(&listing.campaigns, &notified, &matcher)
            .into_iter()
            .cloned()
            .collect();

        if new_drops.is_empty() {
            info!("No new drops found for selected games");
            return CheckResult::nothing("No new drops");
        }
        info!("🎉 Found {} new drops!", new_drops.len());

        let auto_start = match self.store.farming_config().await {
            Ok(config) => config.auto_start_farming,
            Err(e) => {
                warn!("⚠️ Could not read farming config: {}", e);
                false
            }
        };

        for campaign in &new_drops {
            let details = match &listing.user_id {
                Some(user_id) => match self.api.drop_details(&campaign.id, user_id).await {
                    Ok(details) => Some(details),
                    Err(e) => {
                        debug!("No details for {}: {}", campaign.id, e);
                        None
                    }
                },
                None => None,
            };

            self.notifier.new_drop(campaign, details.as_ref()).await;

            let entry = HistoryEntry::from_campaign(campaign, details.as_ref(), Utc::now());
            if let Err(e) = self.store.push_history(entry).await {
                warn!("⚠️ Failed to record {} in history: {}", campaign.id, e);
            }
            if let Err(e) = self.store.mark_notified(&campaign.id).await {
                warn!("⚠️ Failed to mark {} as notified: {}", campaign.id, e);
            }

            if auto_start && campaign.status == CampaignStatus::Active {
                if let Some(entry) = QueueEntry::from_campaign(campaign) {
                    if let Err(e) = farming.enqueue(entry).await {
                        warn!("⚠️ Failed to queue {}: {}", campaign.id, e);
                    }
                }
            }
        }

        CheckResult {
            checked: true,
            found: new_drops.len(),
            message: format!("Found {} new drops!", new_drops.len()),
            needs_headers: false,
            new_drops,
        }
    }
}
