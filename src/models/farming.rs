use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::drops::{CampaignDetails, DropCampaign, RewardTier, Streamer};

/// Where the orchestrator currently is in a farming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FarmPhase {
    #[default]
    Idle,
    Selecting,
    Watching,
    Reconciling,
}

/// Game a session farms. The slug is what inventory campaigns are matched on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetGame {
    pub id: String,
    pub name: String,
    pub slug: String,
}

/// Caller-supplied game for `start`. The slug is derived from the name when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub drop_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmingConfig {
    pub auto_claim_drops: bool,
    pub auto_claim_points: bool,
    pub auto_start_farming: bool,
}

impl Default for FarmingConfig {
    fn default() -> Self {
        Self {
            auto_claim_drops: true,
            auto_claim_points: true,
            auto_start_farming: false,
        }
    }
}

/// Partial update of [`FarmingConfig`]; unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FarmingConfigPatch {
    pub auto_claim_drops: Option<bool>,
    pub auto_claim_points: Option<bool>,
    pub auto_start_farming: Option<bool>,
}

impl FarmingConfig {
    pub fn merge(&self, patch: &FarmingConfigPatch) -> FarmingConfig {
        FarmingConfig {
            auto_claim_drops: patch.auto_claim_drops.unwrap_or(self.auto_claim_drops),
            auto_claim_points: patch.auto_claim_points.unwrap_or(self.auto_claim_points),
            auto_start_farming: patch.auto_start_farming.unwrap_or(self.auto_start_farming),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropProgressEntry {
    pub id: String,
    pub name: String,
    pub current_minutes: i64,
    pub required_minutes: i64,
    pub percent: i64,
    pub claimed: bool,
}

/// Rounded completion percentage; 0 when nothing is required.
pub fn progress_percent(current_minutes: i64, required_minutes: i64) -> i64 {
    if required_minutes <= 0 {
        return 0;
    }
    (100.0 * current_minutes as f64 / required_minutes as f64).round() as i64
}

/// The single in-progress farming session, persisted after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FarmingSession {
    pub active: bool,
    pub game: Option<TargetGame>,
    pub current_drop_id: Option<String>,
    pub user_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub phase: FarmPhase,

    pub current_streamer: Option<Streamer>,
    pub tracking_url: Option<String>,
    pub claimed_drops: u32,
    pub claimed_points: i64,
    pub heartbeat_count: u32,
    pub total_watch_minutes: i64,
    pub last_heartbeat_ok: Option<bool>,

    pub drops_progress: Vec<DropProgressEntry>,
    pub campaign_not_found_count: u32,

    pub config: Option<FarmingConfig>,
}

impl FarmingSession {
    pub fn game_name(&self) -> &str {
        self.game.as_ref().map(|g| g.name.as_str()).unwrap_or("")
    }

    /// Minutes elapsed since the session started, rounded to the nearest minute.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        self.started_at
            .map(|started| {
                let millis = (now - started).num_milliseconds().max(0);
                (millis as f64 / 60_000.0).round() as i64
            })
            .unwrap_or(0)
    }

    pub fn config(&self) -> FarmingConfig {
        self.config.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FarmingStatus {
    #[default]
    Idle,
    Queued,
    Farming,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub drop_id: String,
    pub game_id: String,
    pub game_name: String,
    pub game_slug: String,
    pub box_art_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn game_ref(&self) -> GameRef {
        GameRef {
            id: self.game_id.clone(),
            name: self.game_name.clone(),
            slug: Some(self.game_slug.clone()),
            drop_id: Some(self.drop_id.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    pub name: String,
    pub required_minutes: i64,
}

impl From<&RewardTier> for RewardSnapshot {
    fn from(tier: &RewardTier) -> Self {
        Self {
            name: tier.name.clone(),
            required_minutes: tier.required_minutes_watched,
        }
    }
}

/// One discovered campaign the user was told about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub game_id: Option<String>,
    pub game_name: String,
    pub box_art_url: Option<String>,
    pub campaign_name: String,
    pub status: String,
    pub owner: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rewards: Vec<RewardSnapshot>,
    pub found_at: DateTime<Utc>,
    #[serde(default)]
    pub farming_status: FarmingStatus,
}

impl HistoryEntry {
    /// Snapshot a campaign, preferring detail timestamps and rewards when fetched.
    pub fn from_campaign(
        campaign: &DropCampaign,
        details: Option<&CampaignDetails>,
        found_at: DateTime<Utc>,
    ) -> Self {
        let game = campaign.game.as_ref();
        let rewards = match details {
            Some(d) if !d.time_based_drops.is_empty() => &d.time_based_drops,
            _ => &campaign.time_based_drops,
        };

        Self {
            id: campaign.id.clone(),
            game_id: game.map(|g| g.id.clone()),
            game_name: game
                .and_then(|g| g.label())
                .unwrap_or("Unknown")
                .to_string(),
            box_art_url: game.and_then(|g| g.box_art_url.clone()),
            campaign_name: campaign.name.clone(),
            status: campaign.status.as_str().to_string(),
            owner: campaign.owner_name.clone(),
            start_at: details.and_then(|d| d.start_at).or(campaign.start_at),
            end_at: details.and_then(|d| d.end_at).or(campaign.end_at),
            rewards: rewards.iter().map(RewardSnapshot::from).collect(),
            found_at,
            farming_status: FarmingStatus::Idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FarmOutcome {
    Stopped,
    Completed,
    Abandoned,
}

/// Final numbers reported when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmSummary {
    pub game_name: String,
    pub drop_id: Option<String>,
    pub total_watch_minutes: i64,
    pub claimed_drops: u32,
    pub claimed_points: i64,
    pub heartbeat_count: u32,
    pub outcome: FarmOutcome,
}
