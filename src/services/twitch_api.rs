use async_trait::async_trait;

use crate::error::ApiResult;
use crate::models::drops::{
    CampaignDetails, CampaignListing, ChannelPointsContext, CurrentUser, DropClaimResult,
    GameSearchResult, InventoryCampaign, PointsClaimResult, Streamer, StreamerStatus, WatchEvent,
};

/// Calls the detector and the orchestrator make against the platform.
///
/// Every call resolves to a result; callers recover failures locally.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn current_user(&self) -> ApiResult<CurrentUser>;

    async fn drop_campaigns(&self) -> ApiResult<CampaignListing>;

    async fn drop_details(&self, drop_id: &str, user_id: &str) -> ApiResult<CampaignDetails>;

    async fn search_games(&self, query: &str) -> ApiResult<Vec<GameSearchResult>>;

    /// Live drops-enabled streams for a game directory slug, in provider order.
    async fn streams_with_drops(&self, game_slug: &str) -> ApiResult<Vec<Streamer>>;

    async fn streamer_status(&self, login: &str, expected_game: &str) -> ApiResult<StreamerStatus>;

    async fn drops_inventory(&self) -> ApiResult<Vec<InventoryCampaign>>;

    async fn claim_drop(&self, drop_instance_id: &str) -> ApiResult<DropClaimResult>;

    async fn channel_points(&self, login: &str) -> ApiResult<ChannelPointsContext>;

    async fn claim_channel_points(
        &self,
        claim_id: &str,
        channel_id: &str,
    ) -> ApiResult<PointsClaimResult>;

    /// Endpoint that accepts minute-watched events for a channel.
    async fn tracking_url(&self, login: &str) -> ApiResult<String>;

    /// True when the tracking endpoint accepted the event.
    async fn send_watch_event(&self, event: &WatchEvent) -> ApiResult<bool>;
}
