//! FIFO queue of drops to farm, one at a time.
//!
//! The head entry is the one being farmed. It stays in the queue until its
//! session ends, so the stored queue always reflects what is left to do.

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;

use crate::error::{FarmError, StoreError};
use crate::models::drops::DropCampaign;
use crate::models::farming::{FarmingStatus, QueueEntry};
use crate::services::farming_service::FarmingService;
use crate::utils::slug::game_to_slug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    QueueEmpty,
    AlreadyFarming,
    Started { drop_id: String, game_name: String },
    /// Every remaining entry failed to start and was dropped.
    Failed { message: String },
}

impl QueueEntry {
    /// Queue entry for a discovered campaign, or None when it has no game.
    pub fn from_campaign(campaign: &DropCampaign) -> Option<QueueEntry> {
        let game = campaign.game.as_ref()?;
        let name = game.label().unwrap_or_default().to_string();
        let slug = game
            .slug
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| game_to_slug(&name));

        Some(QueueEntry {
            drop_id: campaign.id.clone(),
            game_id: game.id.clone(),
            game_name: name,
            game_slug: slug,
            box_art_url: game.box_art_url.clone(),
            added_at: Utc::now(),
        })
    }
}

impl FarmingService {
    pub async fn queue(&self) -> Result<Vec<QueueEntry>, StoreError> {
        self.store.queue().await
    }

    /// Append a drop unless already queued. Starts it right away when idle.
    pub async fn enqueue(&mut self, entry: QueueEntry) -> Result<bool, FarmError> {
        let mut queue = self.store.queue().await?;
        if queue.iter().any(|q| q.drop_id == entry.drop_id) {
            return Ok(false);
        }

        info!("📋 Queued {} ({})", entry.game_name, entry.drop_id);
        let drop_id = entry.drop_id.clone();
        queue.push(entry);
        self.store.save_queue(&queue).await?;
        self.store.set_history_status(&drop_id, FarmingStatus::Queued).await?;

        if !self.is_active() {
            let outcome = self.advance().await;
            info!("📋 Queue advance: {:?}", outcome);
        }
        Ok(true)
    }

    /// Start the head of the queue, dropping entries that fail to start.
    pub async fn advance(&mut self) -> AdvanceOutcome {
        if self.is_active() {
            return AdvanceOutcome::AlreadyFarming;
        }

        let mut last_error = None;
        loop {
            let queue = match self.store.queue().await {
                Ok(queue) => queue,
                Err(e) => return AdvanceOutcome::Failed { message: e.to_string() },
            };
            let Some(head) = queue.first().cloned() else {
                info!("📭 Queue is empty");
                return match last_error {
                    Some(message) => AdvanceOutcome::Failed { message },
                    None => AdvanceOutcome::QueueEmpty,
                };
            };

            info!("🎮 Processing next in queue: {}", head.game_name);
            self.set_history_status(&head.drop_id, FarmingStatus::Farming).await;

            match self.start(head.game_ref()).await {
                Ok(()) => {
                    self.notifier.farm_auto_started(&head.game_name).await;
                    return AdvanceOutcome::Started {
                        drop_id: head.drop_id,
                        game_name: head.game_name,
                    };
                }
                Err(e) => {
                    warn!("❌ Failed to start {}: {}", head.game_name, e);
                    if let Err(e) = self.remove_from_queue(&head.drop_id).await {
                        return AdvanceOutcome::Failed { message: e.to_string() };
                    }
                    self.set_history_status(&head.drop_id, FarmingStatus::Idle).await;
                    last_error = Some(e.to_string());
                }
            }
        }
    }

    pub async fn remove_from_queue(&self, drop_id: &str) -> Result<(), StoreError> {
        let mut queue = self.store.queue().await?;
        let before = queue.len();
        queue.retain(|q| q.drop_id != drop_id);
        if queue.len() != before {
            self.store.save_queue(&queue).await?;
            info!("🗑️ Removed from queue: {}", drop_id);
        }
        Ok(())
    }

    /// Cancel a queued drop. Cancelling the one being farmed stops its session
    /// and moves on to the next entry.
    pub async fn cancel_queued(&mut self, drop_id: &str) -> Result<bool, FarmError> {
        if self.is_active() && self.session.current_drop_id.as_deref() == Some(drop_id) {
            self.stop(false).await?;
            if !self.store.queue().await?.is_empty() {
                self.request_advance();
            }
            return Ok(true);
        }

        let queue = self.store.queue().await?;
        if !queue.iter().any(|q| q.drop_id == drop_id) {
            return Ok(false);
        }
        self.remove_from_queue(drop_id).await?;
        self.store.set_history_status(drop_id, FarmingStatus::Idle).await?;
        Ok(true)
    }

    async fn set_history_status(&self, drop_id: &str, status: FarmingStatus) {
        if let Err(e) = self.store.set_history_status(drop_id, status).await {
            warn!("⚠️ Failed to update history for {}: {}", drop_id, e);
        }
    }
}
