//! Farming orchestrator.
//!
//! Owns the single farming session: picks a streamer, sends minute-watched
//! heartbeats, reconciles progress against the drops inventory, claims what
//! is ready and hands off to the next queue entry when a game is done.
//!
//! The service never runs its own timers. The scheduler reads [`TickPlan`]
//! after every call and (re)arms the periodic ticks from it. Every session
//! mutation is persisted before the call returns.

use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FarmError, StoreError};
use crate::models::drops::WatchEvent;
use crate::models::farming::{
    progress_percent, DropProgressEntry, FarmOutcome, FarmPhase, FarmSummary, FarmingConfig,
    FarmingConfigPatch, FarmingSession, FarmingStatus, GameRef, TargetGame,
};
use crate::services::notification_service::Notifications;
use crate::services::store_service::Store;
use crate::services::twitch_api::RemoteApi;
use crate::utils::slug::game_to_slug;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const POINTS_INTERVAL: Duration = Duration::from_secs(2 * 60);
pub const POINTS_REARM_DELAY: Duration = Duration::from_secs(6);
pub const ADVANCE_DELAY: Duration = Duration::from_secs(5);

/// Consecutive reconciliation passes without the target campaign before giving up.
pub const CAMPAIGN_MISS_LIMIT: u32 = 3;
/// Credited when a bonus claim does not report the awarded amount.
pub const BONUS_POINTS: i64 = 50;

const SKIPPED_DROP_STATUSES: [&str; 4] = ["EXPIRED", "UNAVAILABLE", "LOCKED", "INACTIVE"];

/// Delay before the first tick of each periodic task after (re)arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmDelays {
    pub heartbeat: Duration,
    pub reconcile: Duration,
    pub points: Duration,
}

impl ArmDelays {
    pub const FRESH: ArmDelays = ArmDelays {
        heartbeat: Duration::from_secs(3),
        reconcile: Duration::from_secs(60),
        points: Duration::from_secs(30),
    };

    pub const RESTORED: ArmDelays = ArmDelays {
        heartbeat: Duration::from_secs(6),
        reconcile: Duration::from_secs(30),
        points: Duration::from_secs(18),
    };
}

/// What the scheduler should have armed for the farming ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    /// Changes whenever a session starts, is restored or ends.
    pub generation: u64,
    pub active: bool,
    pub points_enabled: bool,
    pub delays: ArmDelays,
    /// Points collection was re-enabled live and should fire soon.
    pub rearm_points: bool,
    /// A finished session asked for the next queue entry.
    pub advance_requested: bool,
}

pub struct FarmingService {
    pub(crate) api: Arc<dyn RemoteApi>,
    pub(crate) store: Store,
    pub(crate) notifier: Notifications,
    pub(crate) session: FarmingSession,
    generation: u64,
    arm_delays: ArmDelays,
    rearm_points: bool,
    pending_advance: bool,
}

impl FarmingService {
    pub fn new(api: Arc<dyn RemoteApi>, store: Store, notifier: Notifications) -> Self {
        Self {
            api,
            store,
            notifier,
            session: FarmingSession::default(),
            generation: 0,
            arm_delays: ArmDelays::FRESH,
            rearm_points: false,
            pending_advance: false,
        }
    }

    pub fn session(&self) -> &FarmingSession {
        &self.session
    }

    pub fn is_active(&self) -> bool {
        self.session.active
    }

    /// Snapshot for status queries, with watch time computed from now.
    pub fn status(&self) -> FarmingSession {
        let mut snapshot = self.session.clone();
        if snapshot.active {
            snapshot.total_watch_minutes = snapshot.elapsed_minutes(Utc::now());
        }
        snapshot
    }

    /// Current plan for the scheduler. One-shot requests are consumed.
    pub fn tick_plan(&mut self) -> TickPlan {
        TickPlan {
            generation: self.generation,
            active: self.session.active,
            points_enabled: self.session.active && self.session.config().auto_claim_points,
            delays: self.arm_delays,
            rearm_points: std::mem::take(&mut self.rearm_points),
            advance_requested: std::mem::take(&mut self.pending_advance),
        }
    }

    pub(crate) fn request_advance(&mut self) {
        self.pending_advance = true;
    }

    async fn persist(&self) -> Result<(), StoreError> {
        self.store.save_farming_session(&self.session).await
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            error!("❌ Failed to persist farming session: {}", e);
        }
    }

    /// Start farming a game, replacing any active session.
    pub async fn start(&mut self, game: GameRef) -> Result<(), FarmError> {
        if self.session.active {
            info!("⏹️ Replacing active session for {}", self.session.game_name());
            self.stop(false).await?;
        }

        let user = self
            .api
            .current_user()
            .await
            .map_err(|e| FarmError::NoUser(e.to_string()))?;
        let config = self.store.farming_config().await?;

        let slug = game
            .slug
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| game_to_slug(&game.name));
        info!("🎮 Starting farming for {} ({})", game.name, slug);

        self.session = FarmingSession {
            active: true,
            game: Some(TargetGame {
                id: game.id,
                name: game.name,
                slug,
            }),
            current_drop_id: game.drop_id,
            user_id: Some(user.id),
            started_at: Some(Utc::now()),
            phase: FarmPhase::Selecting,
            config: Some(config),
            ..Default::default()
        };
        self.persist().await?;

        if let Err(e) = self.select_streamer().await {
            warn!("❌ Could not start farming: {}", e);
            self.session = FarmingSession::default();
            self.persist().await?;
            return Err(e);
        }

        self.generation += 1;
        self.arm_delays = ArmDelays::FRESH;
        self.persist().await?;
        debug!("📋 Farming config: {:?}", config);
        Ok(())
    }

    /// Pick the most watched drops-enabled stream for the target game.
    async fn select_streamer(&mut self) -> Result<(), FarmError> {
        let Some(game) = self.session.game.clone() else {
            return Err(FarmError::NotActive);
        };
        self.session.phase = FarmPhase::Selecting;
        info!("🔍 Finding streamer for {}", game.name);

        let mut streamers = self.api.streams_with_drops(&game.slug).await?;
        // Stable: equal viewer counts keep provider order.
        streamers.sort_by(|a, b| b.viewers.cmp(&a.viewers));

        let Some(streamer) = streamers.into_iter().next() else {
            self.session.current_streamer = None;
            self.session.tracking_url = None;
            self.persist().await?;
            return Err(FarmError::NoStreamerAvailable(game.name));
        };

        let tracking_url = self
            .api
            .tracking_url(&streamer.login)
            .await
            .map_err(|e| FarmError::TrackingUnavailable(e.to_string()))?;

        info!(
            "📺 Watching {} ({} viewers)",
            streamer.display_name, streamer.viewers
        );
        self.session.current_streamer = Some(streamer);
        self.session.tracking_url = Some(tracking_url);
        self.session.phase = FarmPhase::Watching;
        self.persist().await?;
        Ok(())
    }

    /// Keep the current streamer if it is live on the target game, else pick another.
    async fn ensure_streamer(&mut self) {
        if let Some(streamer) = self.session.current_streamer.clone() {
            match self
                .api
                .streamer_status(&streamer.login, self.session.game_name())
                .await
            {
                Ok(status) if status.online && status.correct_game => return,
                Ok(status) => info!(
                    "⚠️ {} is offline or switched game ({})",
                    streamer.login,
                    status.current_game.unwrap_or_default()
                ),
                Err(e) => warn!("⚠️ Could not verify {}: {}", streamer.login, e),
            }
        }

        if let Err(e) = self.select_streamer().await {
            warn!("⚠️ Streamer re-selection failed, retrying next pass: {}", e);
            if self.session.active {
                self.session.phase = FarmPhase::Watching;
            }
        }
    }

    /// One minute-watched signal. The next tick is the retry.
    pub async fn heartbeat(&mut self) {
        if !self.session.active {
            return;
        }

        let event = match (
            &self.session.current_streamer,
            &self.session.tracking_url,
            &self.session.user_id,
        ) {
            (Some(streamer), Some(url), Some(user_id)) => Some(WatchEvent {
                tracking_url: url.clone(),
                channel_id: streamer.channel_id.clone(),
                channel_login: streamer.login.clone(),
                broadcast_id: streamer.broadcast_id.clone(),
                user_id: user_id.clone(),
            }),
            _ => None,
        };

        if let Some(event) = event {
            let ok = match self.api.send_watch_event(&event).await {
                Ok(ok) => ok,
                Err(e) => {
                    warn!("❌ Watch event failed for {}: {}", event.channel_login, e);
                    false
                }
            };
            if !self.session.active {
                return;
            }

            self.session.last_heartbeat_ok = Some(ok);
            if ok {
                self.session.heartbeat_count += 1;
                debug!(
                    "📡 Watch #{} sent to {}",
                    self.session.heartbeat_count, event.channel_login
                );
            }
        }

        self.session.total_watch_minutes = self.session.elapsed_minutes(Utc::now());
        self.persist_logged().await;
    }

    /// Verify the streamer, then reconcile progress and claim what is ready.
    pub async fn reconcile(&mut self) {
        if !self.session.active {
            return;
        }
        info!("🔄 Checking farming status for {}", self.session.game_name());

        self.ensure_streamer().await;
        if !self.session.active {
            return;
        }

        self.session.phase = FarmPhase::Reconciling;
        self.check_and_claim_drops().await;

        if self.session.active {
            self.session.phase = FarmPhase::Watching;
            self.persist_logged().await;
        }
    }

    async fn check_and_claim_drops(&mut self) {
        let config = self.session.config();
        let inventory = match self.api.drops_inventory().await {
            Ok(inventory) => inventory,
            Err(e) => {
                warn!("⚠️ Failed to get drops inventory: {}", e);
                return;
            }
        };
        if !self.session.active {
            return;
        }

        let target = self
            .session
            .game
            .as_ref()
            .map(|g| g.slug.to_lowercase())
            .unwrap_or_default();
        let game_name = self.session.game_name().to_string();
        let now = Utc::now();

        let mut found = false;
        let mut progress = Vec::new();

        for campaign in &inventory {
            let slug = campaign
                .game
                .as_ref()
                .and_then(|g| g.slug.as_deref())
                .map(str::to_lowercase);
            if slug.as_deref() != Some(target.as_str()) {
                continue;
            }
            found = true;

            for drop in &campaign.time_based_drops {
                let name = drop.display_name();
                let state = drop.self_state.clone().unwrap_or_default();

                if let Some(status) = state.status.as_deref().map(str::to_uppercase) {
                    if SKIPPED_DROP_STATUSES.contains(&status.as_str()) {
                        debug!("⚠️ Skipping {} (status {})", name, status);
                        continue;
                    }
                }
                if drop.preconditions_met == Some(false) {
                    debug!("⚠️ Skipping locked drop {}", name);
                    continue;
                }
                if drop.end_at.is_some_and(|end| end < now) {
                    debug!("⚠️ Skipping expired drop {}", name);
                    continue;
                }
                if drop.is_enabled == Some(false) {
                    debug!("⚠️ Skipping disabled drop {}", name);
                    continue;
                }

                let current = state.current_minutes_watched;
                let required = drop.required_minutes_watched;
                let mut entry = DropProgressEntry {
                    id: drop.id.clone(),
                    name,
                    current_minutes: current,
                    required_minutes: required,
                    percent: progress_percent(current, required),
                    claimed: state.is_claimed,
                };

                if !entry.claimed && required > 0 {
                    debug!("📊 {}: {}/{} min ({}%)", entry.name, current, required, entry.percent);
                }

                if !entry.claimed && required > 0 && current >= required && config.auto_claim_drops {
                    match state.drop_instance_id.as_deref() {
                        Some(instance_id) => {
                            info!("🎁 Claiming drop: {}", entry.name);
                            match self.api.claim_drop(instance_id).await {
                                Ok(_) => {
                                    info!("✅ Claimed: {}", entry.name);
                                    entry.claimed = true;
                                    self.session.claimed_drops += 1;
                                    self.notifier.drop_claimed(&entry.name, &game_name).await;
                                }
                                Err(e) if e.is_unavailable() => {
                                    info!("⚠️ Drop no longer available: {}", entry.name);
                                }
                                Err(e) => warn!("❌ Claim failed for {}: {}", entry.name, e),
                            }
                        }
                        None => debug!("No drop instance yet for {}", entry.name),
                    }
                }

                progress.push(entry);
            }
        }

        self.session.drops_progress = progress;

        if !found {
            self.session.campaign_not_found_count += 1;
            warn!(
                "⚠️ Campaign not found for {} (attempt {})",
                game_name, self.session.campaign_not_found_count
            );
            if self.session.campaign_not_found_count >= CAMPAIGN_MISS_LIMIT {
                self.abandon().await;
            } else {
                self.persist_logged().await;
            }
            return;
        }

        self.session.campaign_not_found_count = 0;
        self.persist_logged().await;

        let progress = &self.session.drops_progress;
        if !progress.is_empty() && progress.iter().all(|d| d.claimed) {
            self.complete().await;
        }
    }

    async fn mark_current(&self, status: FarmingStatus) {
        if let Some(drop_id) = &self.session.current_drop_id {
            if let Err(e) = self.store.set_history_status(drop_id, status).await {
                warn!("⚠️ Failed to update history for {}: {}", drop_id, e);
            }
        }
    }

    async fn queue_is_empty(&self) -> bool {
        match self.store.queue().await {
            Ok(queue) => queue.is_empty(),
            Err(e) => {
                warn!("⚠️ Failed to read queue: {}", e);
                true
            }
        }
    }

    /// The target campaign is gone: close the session and move on.
    async fn abandon(&mut self) {
        let game_name = self.session.game_name().to_string();
        error!("❌ Campaign for {} missing after {} checks, stopping", game_name, CAMPAIGN_MISS_LIMIT);

        self.mark_current(FarmingStatus::Completed).await;
        self.notifier.campaign_lost(&game_name).await;
        if let Err(e) = self.end_session(true, FarmOutcome::Abandoned).await {
            error!("❌ Failed to stop session: {}", e);
        }

        if !self.queue_is_empty().await {
            self.request_advance();
        }
    }

    /// Every tracked reward is claimed.
    async fn complete(&mut self) {
        let game_name = self.session.game_name().to_string();
        info!("🎉 All drops claimed for {}", game_name);

        self.mark_current(FarmingStatus::Completed).await;
        self.notifier.game_completed(&game_name).await;
        if let Err(e) = self.end_session(true, FarmOutcome::Completed).await {
            error!("❌ Failed to stop session: {}", e);
        }

        if self.queue_is_empty().await {
            info!("📭 Queue is empty, farming completed");
            self.notifier.queue_completed().await;
        } else {
            info!("📋 Processing next drop in queue shortly");
            self.request_advance();
        }
    }

    /// Collect the channel-points bonus chest if one is waiting.
    pub async fn points_tick(&mut self) {
        if !self.session.active || !self.session.config().auto_claim_points {
            return;
        }
        let Some(streamer) = self.session.current_streamer.clone() else {
            return;
        };

        let context = match self.api.channel_points(&streamer.login).await {
            Ok(context) => context,
            Err(e) => {
                debug!("Failed to get channel points for {}: {}", streamer.login, e);
                return;
            }
        };
        debug!(
            "💰 Balance on {}: {}, claim available: {}",
            streamer.login,
            context.balance,
            context.available_claim.is_some()
        );

        let Some(claim_id) = context.available_claim else {
            return;
        };
        let channel_id = if context.channel_id.is_empty() {
            streamer.channel_id.clone()
        } else {
            context.channel_id
        };

        match self.api.claim_channel_points(&claim_id, &channel_id).await {
            Ok(result) => {
                if !self.session.active {
                    return;
                }
                let earned = result.points_earned.filter(|p| *p > 0).unwrap_or(BONUS_POINTS);
                self.session.claimed_points += earned;
                info!(
                    "✅ +{} points claimed on {} (total {})",
                    earned, streamer.login, self.session.claimed_points
                );
                self.persist_logged().await;
            }
            Err(e) => warn!("⚠️ Failed to claim points on {}: {}", streamer.login, e),
        }
    }

    /// Stop the active session. `switch_to_next` keeps the history status as is.
    pub async fn stop(&mut self, switch_to_next: bool) -> Result<FarmSummary, FarmError> {
        self.end_session(switch_to_next, FarmOutcome::Stopped).await
    }

    async fn end_session(
        &mut self,
        switch_to_next: bool,
        outcome: FarmOutcome,
    ) -> Result<FarmSummary, FarmError> {
        if !self.session.active {
            return Err(FarmError::NotActive);
        }
        info!("⏹️ Stopping farming for {}", self.session.game_name());

        let summary = FarmSummary {
            game_name: self.session.game_name().to_string(),
            drop_id: self.session.current_drop_id.clone(),
            total_watch_minutes: self.session.elapsed_minutes(Utc::now()),
            claimed_drops: self.session.claimed_drops,
            claimed_points: self.session.claimed_points,
            heartbeat_count: self.session.heartbeat_count,
            outcome,
        };

        if let Some(drop_id) = &summary.drop_id {
            self.remove_from_queue(drop_id).await?;
            if !switch_to_next {
                self.store.set_history_status(drop_id, FarmingStatus::Idle).await?;
            }
        }

        self.session = FarmingSession::default();
        self.generation += 1;
        self.persist().await?;

        info!(
            "📊 {}: {} min, {} drops, {} points, {} heartbeats",
            summary.game_name,
            summary.total_watch_minutes,
            summary.claimed_drops,
            summary.claimed_points,
            summary.heartbeat_count
        );
        Ok(summary)
    }

    /// Resume a session persisted by a previous run. Returns whether one was resumed.
    pub async fn restore(&mut self) -> Result<bool, FarmError> {
        let saved = self.store.farming_session().await?;
        if !saved.active {
            if !self.store.queue().await?.is_empty() {
                info!("📋 Resuming queue left by the previous run");
                self.request_advance();
            }
            return Ok(false);
        }

        info!("🔄 Restoring farming state for {}", saved.game_name());
        self.session = saved;
        self.generation += 1;
        self.arm_delays = ArmDelays::RESTORED;

        self.ensure_streamer().await;
        if self.session.active {
            self.session.phase = FarmPhase::Watching;
        }
        self.persist().await?;
        Ok(true)
    }

    pub async fn config(&self) -> Result<FarmingConfig, StoreError> {
        self.store.farming_config().await
    }

    /// Persist a partial config. A live session picks it up in its snapshot.
    pub async fn set_config(&mut self, patch: &FarmingConfigPatch) -> Result<FarmingConfig, StoreError> {
        let config = self.store.farming_config().await?.merge(patch);
        self.store.save_farming_config(&config).await?;

        if self.session.active {
            self.session.config = Some(self.session.config().merge(patch));
            if patch.auto_claim_points == Some(true) {
                self.rearm_points = true;
            }
            self.persist().await?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::drops::{DropSelfState, InventoryDrop, StreamerStatus};
    use crate::models::farming::QueueEntry;
    use crate::services::test_support::{inventory_campaign, streamer, Harness};

    fn ready_drop(id: &str, current: i64, required: i64) -> InventoryDrop {
        InventoryDrop {
            id: id.to_string(),
            name: Some(format!("Reward {}", id)),
            required_minutes_watched: required,
            self_state: Some(DropSelfState {
                current_minutes_watched: current,
                is_claimed: false,
                drop_instance_id: Some(format!("inst-{}", id)),
                status: None,
            }),
            ..Default::default()
        }
    }

    fn game(name: &str) -> GameRef {
        GameRef {
            id: "509658".into(),
            name: name.into(),
            slug: None,
            drop_id: Some("drop-1".into()),
        }
    }

    #[tokio::test]
    async fn test_start_picks_highest_viewer_count() {
        let h = Harness::new();
        h.api.set_streams(
            "bloodhunt",
            vec![streamer("small", 10), streamer("big", 500), streamer("big2", 500)],
        );
        let mut farming = h.farming();

        farming.start(game("Bloodhunt")).await.unwrap();

        let session = farming.session();
        assert!(session.active);
        assert_eq!(session.phase, FarmPhase::Watching);
        assert_eq!(session.current_streamer.as_ref().unwrap().login, "big");
        assert_eq!(session.game.as_ref().unwrap().slug, "bloodhunt");
        assert!(session.tracking_url.is_some());
        assert_eq!(h.store.farming_session().await.unwrap(), *session);

        let plan = farming.tick_plan();
        assert!(plan.active);
        assert!(plan.points_enabled);
        assert_eq!(plan.delays, ArmDelays::FRESH);
    }

    #[tokio::test]
    async fn test_start_without_user_fails() {
        let h = Harness::new();
        h.api.set_user(None);
        let mut farming = h.farming();

        let err = farming.start(game("Bloodhunt")).await.unwrap_err();
        assert!(matches!(err, FarmError::NoUser(_)));
        assert!(!farming.is_active());
    }

    #[tokio::test]
    async fn test_start_without_streamer_tears_down() {
        let h = Harness::new();
        let mut farming = h.farming();

        let err = farming.start(game("Bloodhunt")).await.unwrap_err();
        assert!(matches!(err, FarmError::NoStreamerAvailable(_)));
        assert!(!farming.is_active());
        assert!(!h.store.farming_session().await.unwrap().active);
    }

    #[tokio::test]
    async fn test_start_without_tracking_endpoint_tears_down() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.fail_tracking("channel page unreachable");
        let mut farming = h.farming();

        let err = farming.start(game("Bloodhunt")).await.unwrap_err();
        assert!(matches!(err, FarmError::TrackingUnavailable(_)));
        assert!(!farming.is_active());
        assert!(!farming.tick_plan().active);
        assert!(!h.store.farming_session().await.unwrap().active);
    }

    #[tokio::test]
    async fn test_restore_idle_with_queue_requests_advance() {
        let h = Harness::new();
        h.store
            .save_queue(&[h.queue_entry("drop-2", "Bloodhunt")])
            .await
            .unwrap();
        let mut farming = h.farming();

        assert!(!farming.restore().await.unwrap());
        let plan = farming.tick_plan();
        assert!(!plan.active);
        assert!(plan.advance_requested);
    }

    #[tokio::test]
    async fn test_start_replaces_active_session() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_streams("valorant", vec![streamer("beta", 10)]);
        let mut farming = h.farming();

        farming.start(game("Bloodhunt")).await.unwrap();
        let first = farming.tick_plan().generation;
        farming.start(game("Valorant")).await.unwrap();
        let second = farming.tick_plan();

        assert!(second.generation > first);
        assert_eq!(farming.session().game_name(), "Valorant");

        farming.stop(false).await.unwrap();
        let stopped = farming.tick_plan();
        assert!(!stopped.active);
        assert!(!stopped.points_enabled);
        assert!(stopped.generation > second.generation);
    }

    #[tokio::test]
    async fn test_heartbeat_counts_only_successes() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.heartbeat().await;
        h.api.set_watch_ok(false);
        farming.heartbeat().await;

        assert_eq!(farming.session().heartbeat_count, 1);
        assert_eq!(farming.session().last_heartbeat_ok, Some(false));
        assert_eq!(h.api.watch_events(), 2);
    }

    #[tokio::test]
    async fn test_heartbeat_ignored_when_inactive() {
        let h = Harness::new();
        let mut farming = h.farming();
        farming.heartbeat().await;
        assert_eq!(h.api.watch_events(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_claims_ready_drops_and_records_progress() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![inventory_campaign(
            "bloodhunt",
            vec![ready_drop("a", 60, 60), ready_drop("b", 30, 60)],
        )]));
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;

        let session = farming.session();
        assert!(session.active);
        assert_eq!(session.claimed_drops, 1);
        assert_eq!(session.drops_progress.len(), 2);
        assert!(session.drops_progress[0].claimed);
        assert_eq!(session.drops_progress[1].percent, 50);
        assert_eq!(h.api.claims(), vec!["inst-a".to_string()]);
        assert_eq!(h.sink.count_titles("Drop claimed"), 1);
    }

    #[tokio::test]
    async fn test_reconcile_skips_excluded_rewards() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);

        let mut locked = ready_drop("locked", 60, 60);
        locked.preconditions_met = Some(false);
        let mut disabled = ready_drop("disabled", 60, 60);
        disabled.is_enabled = Some(false);
        let mut expired = ready_drop("expired", 60, 60);
        expired.end_at = Some(Utc::now() - chrono::Duration::hours(1));
        let mut unavailable = ready_drop("status", 60, 60);
        if let Some(state) = unavailable.self_state.as_mut() {
            state.status = Some("unavailable".into());
        }
        let zero = ready_drop("zero", 0, 0);

        h.api.set_inventory(Ok(vec![inventory_campaign(
            "bloodhunt",
            vec![locked, disabled, expired, unavailable, zero],
        )]));
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;

        let session = farming.session();
        assert_eq!(session.drops_progress.len(), 1);
        assert_eq!(session.drops_progress[0].id, "zero");
        assert_eq!(session.drops_progress[0].percent, 0);
        assert!(h.api.claims().is_empty());
        assert!(session.active);
    }

    #[tokio::test]
    async fn test_unavailable_claim_is_soft_skip() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![inventory_campaign(
            "bloodhunt",
            vec![ready_drop("a", 60, 60)],
        )]));
        h.api.fail_claim("inst-a", "DROP_INSTANCE_NO_LONGER_AVAILABLE");
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;

        let session = farming.session();
        assert!(session.active);
        assert_eq!(session.claimed_drops, 0);
        assert!(!session.drops_progress[0].claimed);
    }

    #[tokio::test]
    async fn test_auto_claim_disabled_leaves_rewards() {
        let h = Harness::new();
        h.store
            .save_farming_config(&FarmingConfig {
                auto_claim_drops: false,
                ..Default::default()
            })
            .await
            .unwrap();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![inventory_campaign(
            "bloodhunt",
            vec![ready_drop("a", 60, 60)],
        )]));
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;
        assert!(h.api.claims().is_empty());
        assert!(farming.is_active());
    }

    #[tokio::test]
    async fn test_campaign_missing_threshold() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![]));
        h.store
            .save_queue(&[
                h.queue_entry("drop-1", "Bloodhunt"),
                h.queue_entry("drop-2", "Valorant"),
            ])
            .await
            .unwrap();
        h.seed_history("drop-1", FarmingStatus::Farming).await;
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;
        farming.reconcile().await;
        assert!(farming.is_active());
        assert_eq!(farming.session().campaign_not_found_count, 2);
        assert!(!farming.tick_plan().advance_requested);

        farming.reconcile().await;
        assert!(!farming.is_active());
        assert_eq!(h.sink.count_titles("Campaign not found"), 1);
        assert_eq!(h.history_status("drop-1").await, Some(FarmingStatus::Completed));

        let queue = h.store.queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].drop_id, "drop-2");
        assert!(farming.tick_plan().advance_requested);
    }

    #[tokio::test]
    async fn test_inventory_failure_is_not_a_miss() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![]));
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;
        assert_eq!(farming.session().campaign_not_found_count, 1);

        h.api.set_inventory(Err("service error".into()));
        farming.reconcile().await;
        farming.reconcile().await;
        assert!(farming.is_active());
        assert_eq!(farming.session().campaign_not_found_count, 1);

        h.api.set_inventory(Ok(vec![]));
        farming.reconcile().await;
        assert!(farming.is_active());
        assert_eq!(farming.session().campaign_not_found_count, 2);
    }

    #[tokio::test]
    async fn test_campaign_reappearing_resets_miss_counter() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![]));
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;
        farming.reconcile().await;
        h.api.set_inventory(Ok(vec![inventory_campaign(
            "Bloodhunt",
            vec![ready_drop("a", 10, 60)],
        )]));
        farming.reconcile().await;

        assert!(farming.is_active());
        assert_eq!(farming.session().campaign_not_found_count, 0);
    }

    #[tokio::test]
    async fn test_completion_removes_drop_and_notifies_queue_done() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![inventory_campaign(
            "bloodhunt",
            vec![ready_drop("a", 60, 60)],
        )]));
        h.store.save_queue(&[h.queue_entry("drop-1", "Bloodhunt")]).await.unwrap();
        h.seed_history("drop-1", FarmingStatus::Farming).await;
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;

        assert!(!farming.is_active());
        assert!(h.store.queue().await.unwrap().is_empty());
        assert_eq!(h.history_status("drop-1").await, Some(FarmingStatus::Completed));
        assert_eq!(h.sink.count_titles("All drops claimed"), 1);
        assert_eq!(h.sink.count_titles("Farming finished"), 1);
        assert!(!farming.tick_plan().advance_requested);
    }

    #[tokio::test]
    async fn test_completion_with_queue_requests_advance() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        let mut claimed = ready_drop("a", 60, 60);
        if let Some(state) = claimed.self_state.as_mut() {
            state.is_claimed = true;
        }
        h.api.set_inventory(Ok(vec![inventory_campaign("bloodhunt", vec![claimed])]));
        h.store
            .save_queue(&[
                h.queue_entry("drop-1", "Bloodhunt"),
                h.queue_entry("drop-2", "Valorant"),
            ])
            .await
            .unwrap();
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        farming.reconcile().await;

        assert!(!farming.is_active());
        assert_eq!(h.store.queue().await.unwrap().len(), 1);
        assert!(farming.tick_plan().advance_requested);
    }

    #[tokio::test]
    async fn test_reconcile_reselects_offline_streamer() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.api.set_inventory(Ok(vec![inventory_campaign(
            "bloodhunt",
            vec![ready_drop("a", 1, 60)],
        )]));
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        h.api.set_streamer_status(StreamerStatus::default());
        h.api.set_streams("bloodhunt", vec![streamer("gamma", 99)]);
        farming.reconcile().await;

        assert!(farming.is_active());
        assert_eq!(farming.session().current_streamer.as_ref().unwrap().login, "gamma");
    }

    #[tokio::test]
    async fn test_points_use_awarded_amount_or_fallback() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        h.api.set_points_claim(Some("claim-1"), Some(70));
        farming.points_tick().await;
        h.api.set_points_claim(Some("claim-2"), None);
        farming.points_tick().await;
        h.api.set_points_claim(None, None);
        farming.points_tick().await;

        assert_eq!(farming.session().claimed_points, 70 + BONUS_POINTS);
    }

    #[tokio::test]
    async fn test_stop_resets_history_unless_switching() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        h.store.save_queue(&[h.queue_entry("drop-1", "Bloodhunt")]).await.unwrap();
        h.seed_history("drop-1", FarmingStatus::Farming).await;
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();

        let summary = farming.stop(false).await.unwrap();

        assert_eq!(summary.game_name, "Bloodhunt");
        assert_eq!(summary.outcome, FarmOutcome::Stopped);
        assert_eq!(h.history_status("drop-1").await, Some(FarmingStatus::Idle));
        assert!(h.store.queue().await.unwrap().is_empty());
        assert_eq!(h.store.farming_session().await.unwrap(), FarmingSession::default());
        assert!(matches!(farming.stop(false).await, Err(FarmError::NotActive)));
    }

    #[tokio::test]
    async fn test_restore_keeps_verified_streamer() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        let mut first = h.farming();
        first.start(game("Bloodhunt")).await.unwrap();

        h.api.set_streams("bloodhunt", vec![streamer("other", 1000)]);
        let mut restored = h.farming();
        assert!(restored.restore().await.unwrap());

        assert!(restored.is_active());
        assert_eq!(restored.session().current_streamer.as_ref().unwrap().login, "alpha");
        let plan = restored.tick_plan();
        assert!(plan.active);
        assert_eq!(plan.delays, ArmDelays::RESTORED);
    }

    #[tokio::test]
    async fn test_restore_reselects_when_verification_fails() {
        let h = Harness::new();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        let mut first = h.farming();
        first.start(game("Bloodhunt")).await.unwrap();

        h.api.set_streamer_status(StreamerStatus::default());
        h.api.set_streams("bloodhunt", vec![streamer("other", 1000)]);
        let mut restored = h.farming();
        restored.restore().await.unwrap();

        assert_eq!(restored.session().current_streamer.as_ref().unwrap().login, "other");
    }

    #[tokio::test]
    async fn test_restore_without_active_session() {
        let h = Harness::new();
        let mut farming = h.farming();
        assert!(!farming.restore().await.unwrap());
        assert!(!farming.tick_plan().active);
    }

    #[tokio::test]
    async fn test_set_config_live_updates_snapshot() {
        let h = Harness::new();
        h.store
            .save_farming_config(&FarmingConfig {
                auto_claim_points: false,
                ..Default::default()
            })
            .await
            .unwrap();
        h.api.set_streams("bloodhunt", vec![streamer("alpha", 10)]);
        let mut farming = h.farming();
        farming.start(game("Bloodhunt")).await.unwrap();
        assert!(!farming.tick_plan().points_enabled);

        let config = farming
            .set_config(&FarmingConfigPatch {
                auto_claim_points: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(config.auto_claim_points);
        let plan = farming.tick_plan();
        assert!(plan.points_enabled);
        assert!(plan.rearm_points);
        assert!(!farming.tick_plan().rearm_points);
    }

    #[test]
    fn test_queue_entry_game_ref_keeps_slug() {
        let entry = QueueEntry {
            drop_id: "d".into(),
            game_id: "1".into(),
            game_name: "Tom Clancy's".into(),
            game_slug: "custom-slug".into(),
            box_art_url: None,
            added_at: Utc::now(),
        };
        assert_eq!(entry.game_ref().slug.as_deref(), Some("custom-slug"));
    }
}
