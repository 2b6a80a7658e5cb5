//! User-visible notifications.
//!
//! Everything goes to the desktop feed. New drops and claimed drops are also
//! mirrored to the messaging sink when one is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::ApiResult;
use crate::models::drops::{CampaignDetails, CampaignStatus, DropCampaign};
use crate::services::telegram_service::{escape_html, MessageSink};

const MAX_FEED: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewDrop,
    DropClaimed,
    FarmAutoStarted,
    CampaignLost,
    GameCompleted,
    QueueCompleted,
    TokenRefresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub icon_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            icon_url: None,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification);
}

/// Keeps the most recent notifications in memory for a tray or UI to poll.
#[derive(Default)]
pub struct DesktopFeed {
    recent: Mutex<VecDeque<Notification>>,
}

impl DesktopFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        match self.recent.lock() {
            Ok(recent) => recent.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for DesktopFeed {
    async fn notify(&self, notification: &Notification) {
        info!("🔔 {} | {}", notification.title, notification.message.replace('\n', " | "));
        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() >= MAX_FEED {
                recent.pop_front();
            }
            recent.push_back(notification.clone());
        }
    }
}

fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%d.%m.%Y %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Telegram text for a newly discovered campaign.
pub(crate) fn new_drop_message(campaign: &DropCampaign, details: Option<&CampaignDetails>) -> String {
    let game = campaign
        .game
        .as_ref()
        .and_then(|g| g.label())
        .unwrap_or("Unknown");
    let (emoji, status) = match campaign.status {
        CampaignStatus::Active => ("🟢", "Active"),
        _ => ("🟡", "Upcoming"),
    };

    let mut message = format!("🎮 <b>TWITCH DROP - {}</b>\n", escape_html(game));
    message.push_str(&format!("{} <b>Status:</b> {}\n", emoji, status));
    message.push_str(&format!(
        "🏢 <b>Organizer:</b> {}\n",
        escape_html(campaign.owner_name.as_deref().unwrap_or("Unknown"))
    ));
    message.push_str(&format!("📦 <b>Campaign:</b> {}\n", escape_html(&campaign.name)));

    if let Some(details) = details {
        message.push_str(&format!("📅 Start: {}\n", format_date(details.start_at)));
        message.push_str(&format!("📅 End: {}\n", format_date(details.end_at)));
        if !details.time_based_drops.is_empty() {
            message.push_str("\n<b>Rewards:</b>\n");
            for reward in &details.time_based_drops {
                message.push_str(&format!(
                    "🎁 {} - {} min.\n",
                    escape_html(&reward.name),
                    reward.required_minutes_watched
                ));
            }
        }
    }

    message
}

/// Fan-out over the desktop feed and the optional messaging sink.
#[derive(Clone)]
pub struct Notifications {
    desktop: Arc<dyn NotificationSink>,
    messenger: Arc<dyn MessageSink>,
}

impl Notifications {
    pub fn new(desktop: Arc<dyn NotificationSink>, messenger: Arc<dyn MessageSink>) -> Self {
        Self { desktop, messenger }
    }

    async fn message(&self, text: &str, photo_url: Option<&str>) {
        if let Err(e) = self.messenger.send(text, photo_url).await {
            warn!("⚠️ Telegram notification failed: {}", e);
        }
    }

    pub async fn new_drop(&self, campaign: &DropCampaign, details: Option<&CampaignDetails>) {
        let game = campaign.game.as_ref();
        let status = match campaign.status {
            CampaignStatus::Active => "Active",
            _ => "Upcoming",
        };

        let mut notification = Notification::new(
            NotificationKind::NewDrop,
            format!("🎮 New Drop: {}", game.and_then(|g| g.label()).unwrap_or("Unknown")),
            format!("{}\n{}", campaign.name, status),
        );
        let box_art = game.and_then(|g| g.box_art_url.clone());
        notification.icon_url = box_art.clone();
        self.desktop.notify(&notification).await;

        self.message(&new_drop_message(campaign, details), box_art.as_deref())
            .await;
    }

    pub async fn drop_claimed(&self, reward_name: &str, game_name: &str) {
        self.desktop
            .notify(&Notification::new(
                NotificationKind::DropClaimed,
                "🎁 Drop claimed!",
                format!("{}\n{}", reward_name, game_name),
            ))
            .await;

        let text = format!(
            "🎁 <b>Drop claimed!</b>\n\n🎮 {}\n📦 {}",
            escape_html(game_name),
            escape_html(reward_name)
        );
        self.message(&text, None).await;
    }

    pub async fn farm_auto_started(&self, game_name: &str) {
        self.desktop
            .notify(&Notification::new(
                NotificationKind::FarmAutoStarted,
                "🚀 Auto-farm started",
                format!("Farming: {}", game_name),
            ))
            .await;
    }

    pub async fn campaign_lost(&self, game_name: &str) {
        self.desktop
            .notify(&Notification::new(
                NotificationKind::CampaignLost,
                "⚠️ Campaign not found",
                format!("{}\nDrops are no longer available. Switching...", game_name),
            ))
            .await;
    }

    pub async fn game_completed(&self, game_name: &str) {
        self.desktop
            .notify(&Notification::new(
                NotificationKind::GameCompleted,
                "✅ All drops claimed!",
                format!("{}\nSwitching to the next one...", game_name),
            ))
            .await;
    }

    pub async fn queue_completed(&self) {
        self.desktop
            .notify(&Notification::new(
                NotificationKind::QueueCompleted,
                "🎊 Farming finished!",
                "Every drop in the queue has been claimed",
            ))
            .await;
    }

    pub async fn token_refresh(&self) {
        self.desktop
            .notify(&Notification::new(
                NotificationKind::TokenRefresh,
                "🔑 Refresh Twitch headers",
                "Open twitch.tv/drops/campaigns so fresh headers can be captured",
            ))
            .await;
    }

    /// Sends a test message straight to the messaging sink.
    pub async fn telegram_test(&self) -> ApiResult<bool> {
        self.messenger
            .send("✅ <b>Drops monitor</b>\nTelegram notifications are working!", None)
            .await
    }
}
