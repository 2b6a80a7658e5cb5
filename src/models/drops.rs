use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Active,
    Upcoming,
    Expired,
    #[serde(other)]
    Unknown,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Upcoming => "UPCOMING",
            CampaignStatus::Expired => "EXPIRED",
            CampaignStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Game as reported on a campaign listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignGame {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub slug: Option<String>,
    pub box_art_url: Option<String>,
}

impl CampaignGame {
    /// Display name, falling back to the internal name.
    pub fn label(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardTier {
    pub id: String,
    pub name: String,
    pub required_minutes_watched: i64,
}

/// One drop campaign from the dashboard listing (read-only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropCampaign {
    pub id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub game: Option<CampaignGame>,
    pub owner_name: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_based_drops: Vec<RewardTier>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignListing {
    pub campaigns: Vec<DropCampaign>,
    pub user_id: Option<String>,
}

/// Extended campaign details, fetched best-effort for notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignDetails {
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_based_drops: Vec<RewardTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub login: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSearchResult {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub box_art_url: Option<String>,
}

/// A live channel eligible for drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Streamer {
    pub channel_id: String,
    pub login: String,
    pub display_name: String,
    pub broadcast_id: String,
    pub viewers: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamerStatus {
    pub online: bool,
    pub correct_game: bool,
    pub current_game: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryGame {
    pub id: Option<String>,
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// Per-user state of a time-based drop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropSelfState {
    pub current_minutes_watched: i64,
    pub is_claimed: bool,
    pub drop_instance_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryDrop {
    pub id: String,
    pub name: Option<String>,
    pub required_minutes_watched: i64,
    #[serde(default)]
    pub benefit_names: Vec<String>,
    pub end_at: Option<DateTime<Utc>>,
    pub is_enabled: Option<bool>,
    /// `Some(false)` when the drop is locked behind another drop.
    pub preconditions_met: Option<bool>,
    pub self_state: Option<DropSelfState>,
}

impl InventoryDrop {
    /// Benefit names joined, or the drop name, or a generic label.
    pub fn display_name(&self) -> String {
        let benefits: Vec<&str> = self
            .benefit_names
            .iter()
            .map(|b| b.as_str())
            .filter(|b| !b.is_empty())
            .collect();
        if !benefits.is_empty() {
            return benefits.join(", ");
        }
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "Drop".to_string(),
        }
    }
}

/// A campaign in progress as seen from the user's inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryCampaign {
    pub id: String,
    pub name: String,
    pub game: Option<InventoryGame>,
    #[serde(default)]
    pub time_based_drops: Vec<InventoryDrop>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropClaimResult {
    pub status: Option<String>,
    pub is_user_account_connected: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPointsContext {
    pub channel_id: String,
    pub balance: i64,
    /// Claim id of the bonus chest, when one is waiting.
    pub available_claim: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointsClaimResult {
    /// Amount awarded by this claim, when the response reports it.
    pub points_earned: Option<i64>,
    pub current_points: Option<i64>,
}

/// Everything one minute-watched signal needs.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub tracking_url: String,
    pub channel_id: String,
    pub channel_login: String,
    pub broadcast_id: String,
    pub user_id: String,
}
