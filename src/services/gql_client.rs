use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::models::drops::{
    CampaignDetails, CampaignGame, CampaignListing, CampaignStatus, ChannelPointsContext,
    CurrentUser, DropCampaign, DropClaimResult, DropSelfState, GameSearchResult, InventoryCampaign,
    InventoryDrop, InventoryGame, PointsClaimResult, RewardTier, Streamer, StreamerStatus,
    WatchEvent,
};
use crate::services::store_service::Store;
use crate::services::twitch_api::RemoteApi;

const GQL_URL: &str = "https://gql.twitch.tv/gql";
pub const FALLBACK_TRACKING_URL: &str = "https://spade.twitch.tv/track";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Captured header name -> outgoing header name.
const FORWARDED_HEADERS: [(&str, &str); 3] = [
    ("client-integrity", "Client-Integrity"),
    ("client-session-id", "Client-Session-Id"),
    ("client-version", "Client-Version"),
];

mod hashes {
    pub const CURRENT_USER: &str =
        "6b5b63a013cf66a995d61f71a508ab5c8e4473350c5d4136f846ba65e8101e95";
    pub const DROPS_DASHBOARD: &str =
        "5a4da2ab3d5b47c9f9ce864e727b2cb346af1e3ea8b897fe8f704a97ff017619";
    pub const CAMPAIGN_DETAILS: &str =
        "039277bf98f3130929262cc7c6efd9c141ca3749cb6dca442fc8ead9a53f77c1";
    pub const SEARCH: &str = "6ea6e6f66006485e41dbe3ebd69d5674c5b22896ce7b595d7fce6411a3790138";
    pub const DIRECTORY_GAME: &str =
        "98a996c3c3ebb1ba4fd65d6671c6028d7ee8d615cb540b0731b3db2a911d3649";
    pub const STREAM_INFO: &str =
        "198492e0857f6aedead9665c81c5a06d67b25b58034649687124083ff288597d";
    pub const INVENTORY: &str = "d86775d0ef16a63a33ad52e80eaff963b2d5b72fada7c991504a57496e1d8e4b";
    pub const CLAIM_DROP: &str =
        "a455deea71bdc9015b78eb49f4acfbce8baa7ccbedd28e549bb025bd0f751930";
    pub const POINTS_CONTEXT: &str =
        "374314de591e69925fce3ddc2bcf085796f56ebb8cad67a0daa3165c03adc345";
    pub const CLAIM_POINTS: &str =
        "46aaeebe02c99afdf4fc97c7c0cba964124bf6b0af229395f1f6d1feed05b3d0";
}

lazy_static! {
    static ref SPADE_PATTERN: Regex =
        Regex::new(r#""spade_?url":\s*"(https://video-edge-[.\w\-/]+\.ts(?:\?[^"]*)?)"#).unwrap();
    static ref SETTINGS_PATTERN: Regex =
        Regex::new(r#"src="(https://[\w.]+/config/settings\.[0-9a-f]{32}\.js)"#).unwrap();
}

/// GraphQL client for the platform, authenticated with the captured headers.
pub struct GqlClient {
    client: Client,
    store: Store,
    client_id: String,
    seed_token: Option<String>,
}

impl GqlClient {
    pub fn new(store: Store, client_id: String, seed_token: Option<String>) -> ApiResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            store,
            client_id,
            seed_token: seed_token.filter(|t| !t.is_empty()),
        })
    }

    /// Token from the captured authorization header, else the configured seed.
    async fn auth_token(&self) -> Option<String> {
        let captured = match self.store.headers().await {
            Ok(headers) => headers.get("authorization").cloned(),
            Err(e) => {
                warn!("⚠️ Could not read captured headers: {}", e);
                None
            }
        };

        captured
            .map(|value| {
                value
                    .trim()
                    .trim_start_matches("OAuth ")
                    .trim_start_matches("Bearer ")
                    .to_string()
            })
            .filter(|t| !t.is_empty())
            .or_else(|| self.seed_token.clone())
    }

    /// Run one persisted query and return the first element of the batch response.
    async fn persisted(&self, operation: &str, hash: &str, variables: Value) -> ApiResult<Value> {
        let token = self.auth_token().await.ok_or(ApiError::Unauthenticated)?;

        let mut request = self
            .client
            .post(GQL_URL)
            .header("Client-ID", &self.client_id)
            .header("Authorization", format!("OAuth {}", token));

        match self.store.device_id().await {
            Ok(device_id) => request = request.header("X-Device-Id", device_id),
            Err(e) => warn!("⚠️ No device id available: {}", e),
        }

        if let Ok(captured) = self.store.headers().await {
            for (captured_name, header_name) in FORWARDED_HEADERS {
                if let Some(value) = captured.get(captured_name) {
                    request = request.header(header_name, value);
                }
            }
        }

        let body = json!([{
            "operationName": operation,
            "variables": variables,
            "extensions": {
                "persistedQuery": {
                    "version": 1,
                    "sha256Hash": hash
                }
            }
        }]);

        debug!("[GQL] {}", operation);
        let response: Value = request.json(&body).send().await?.json().await?;

        Ok(match response {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        })
    }
}

/// Error carried by a GQL response, or the given fallback.
fn remote_error(response: &Value, fallback: &str) -> ApiError {
    let message = response["errors"][0]["message"]
        .as_str()
        .or_else(|| response["error"]["message"].as_str())
        .unwrap_or(fallback);
    ApiError::Remote(message.to_string())
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value[key].as_str().map(|s| s.to_string())
}

fn date_field(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    value[key]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn id_field(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn parse_reward_tiers(value: &Value) -> Vec<RewardTier> {
    value
        .as_array()
        .map(|drops| {
            drops
                .iter()
                .map(|d| RewardTier {
                    id: id_field(d, "id"),
                    name: str_field(d, "name").unwrap_or_default(),
                    required_minutes_watched: d["requiredMinutesWatched"].as_i64().unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_campaign(value: &Value) -> Option<DropCampaign> {
    let id = value["id"].as_str()?.to_string();
    let status = serde_json::from_value(value["status"].clone()).unwrap_or(CampaignStatus::Unknown);
    let game = value["game"].as_object().map(|_| {
        let game = &value["game"];
        CampaignGame {
            id: id_field(game, "id"),
            name: str_field(game, "name"),
            display_name: str_field(game, "displayName"),
            slug: str_field(game, "slug"),
            box_art_url: str_field(game, "boxArtURL"),
        }
    });

    Some(DropCampaign {
        id,
        name: str_field(value, "name").unwrap_or_default(),
        status,
        game,
        owner_name: str_field(&value["owner"], "name"),
        start_at: date_field(value, "startAt"),
        end_at: date_field(value, "endAt"),
        time_based_drops: parse_reward_tiers(&value["timeBasedDrops"]),
    })
}

pub(crate) fn parse_campaign_listing(response: &Value) -> CampaignListing {
    let data = &response["data"];
    let user = if data["currentUser"].is_object() {
        &data["currentUser"]
    } else {
        &data["viewer"]
    };

    let raw = if user["dropCampaigns"].is_array() {
        &user["dropCampaigns"]
    } else {
        &user["rewardCampaigns"]
    };

    CampaignListing {
        campaigns: raw
            .as_array()
            .map(|items| items.iter().filter_map(parse_campaign).collect())
            .unwrap_or_default(),
        user_id: user["id"].as_str().map(|s| s.to_string()),
    }
}

pub(crate) fn parse_streams(response: &Value) -> Vec<Streamer> {
    let Some(edges) = response["data"]["game"]["streams"]["edges"].as_array() else {
        return Vec::new();
    };

    edges
        .iter()
        .filter_map(|edge| {
            let node = &edge["node"];
            let broadcaster = &node["broadcaster"];
            let login = broadcaster["login"].as_str().filter(|l| !l.is_empty())?;
            Some(Streamer {
                channel_id: id_field(broadcaster, "id"),
                login: login.to_string(),
                display_name: str_field(broadcaster, "displayName").unwrap_or_else(|| login.to_string()),
                broadcast_id: id_field(node, "id"),
                viewers: node["viewersCount"].as_i64().unwrap_or(0),
            })
        })
        .collect()
}

fn parse_inventory_drop(value: &Value) -> InventoryDrop {
    let benefit_names = value["benefitEdges"]
        .as_array()
        .map(|edges| {
            edges
                .iter()
                .filter_map(|e| e["benefit"]["name"].as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let self_state = value["self"].as_object().map(|_| {
        let state = &value["self"];
        DropSelfState {
            current_minutes_watched: state["currentMinutesWatched"].as_i64().unwrap_or(0),
            is_claimed: state["isClaimed"].as_bool().unwrap_or(false),
            drop_instance_id: str_field(state, "dropInstanceID"),
            status: str_field(state, "status"),
        }
    });

    InventoryDrop {
        id: id_field(value, "id"),
        name: str_field(value, "name"),
        required_minutes_watched: value["requiredMinutesWatched"].as_i64().unwrap_or(0),
        benefit_names,
        end_at: date_field(value, "endAt"),
        is_enabled: value["isEnabled"].as_bool(),
        preconditions_met: value["preconditions"]["isMet"].as_bool(),
        self_state,
    }
}

pub(crate) fn parse_inventory(response: &Value) -> ApiResult<Vec<InventoryCampaign>> {
    let inventory = &response["data"]["currentUser"]["inventory"];
    if !inventory.is_object() {
        return Err(remote_error(response, "No inventory"));
    }

    Ok(inventory["dropCampaignsInProgress"]
        .as_array()
        .map(|campaigns| {
            campaigns
                .iter()
                .map(|c| InventoryCampaign {
                    id: id_field(c, "id"),
                    name: str_field(c, "name").unwrap_or_default(),
                    game: c["game"].as_object().map(|_| InventoryGame {
                        id: str_field(&c["game"], "id"),
                        name: str_field(&c["game"], "name"),
                        slug: str_field(&c["game"], "slug"),
                    }),
                    time_based_drops: c["timeBasedDrops"]
                        .as_array()
                        .map(|drops| drops.iter().map(parse_inventory_drop).collect())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default())
}

#[async_trait]
impl RemoteApi for GqlClient {
    async fn current_user(&self) -> ApiResult<CurrentUser> {
        let response = self
            .persisted("CoreActionsCurrentUser", hashes::CURRENT_USER, json!({}))
            .await?;
        let user = &response["data"]["currentUser"];
        let id = user["id"].as_str().ok_or_else(|| remote_error(&response, "No current user"))?;

        Ok(CurrentUser {
            id: id.to_string(),
            login: str_field(user, "login").unwrap_or_default(),
            display_name: str_field(user, "displayName"),
        })
    }

    async fn drop_campaigns(&self) -> ApiResult<CampaignListing> {
        let response = self
            .persisted(
                "ViewerDropsDashboard",
                hashes::DROPS_DASHBOARD,
                json!({ "fetchRewardCampaigns": true }),
            )
            .await?;

        if response["data"].is_null() {
            return Err(remote_error(&response, "No drop campaigns"));
        }
        Ok(parse_campaign_listing(&response))
    }

    async fn drop_details(&self, drop_id: &str, user_id: &str) -> ApiResult<CampaignDetails> {
        let response = self
            .persisted(
                "DropCampaignDetails",
                hashes::CAMPAIGN_DETAILS,
                json!({ "dropID": drop_id, "channelLogin": user_id }),
            )
            .await?;

        let campaign = &response["data"]["user"]["dropCampaign"];
        if !campaign.is_object() {
            return Err(ApiError::Decode("campaign details missing".to_string()));
        }

        Ok(CampaignDetails {
            start_at: date_field(campaign, "startAt"),
            end_at: date_field(campaign, "endAt"),
            time_based_drops: parse_reward_tiers(&campaign["timeBasedDrops"]),
        })
    }

    async fn search_games(&self, query: &str) -> ApiResult<Vec<GameSearchResult>> {
        let response = self
            .persisted(
                "SearchResultsPage_SearchResults",
                hashes::SEARCH,
                json!({
                    "query": query,
                    "options": { "targets": [{ "index": "CATEGORY" }] }
                }),
            )
            .await?;

        let games = response["data"]["searchFor"]["categories"]["edges"]
            .as_array()
            .map(|edges| {
                edges
                    .iter()
                    .map(|edge| {
                        let node = &edge["node"];
                        let name = str_field(node, "name").unwrap_or_default();
                        GameSearchResult {
                            id: id_field(node, "id"),
                            display_name: str_field(node, "displayName").unwrap_or_else(|| name.clone()),
                            name,
                            box_art_url: str_field(node, "boxArtURL"),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(games)
    }

    async fn streams_with_drops(&self, game_slug: &str) -> ApiResult<Vec<Streamer>> {
        let response = self
            .persisted(
                "DirectoryPage_Game",
                hashes::DIRECTORY_GAME,
                json!({
                    "limit": 30,
                    "slug": game_slug,
                    "imageWidth": 50,
                    "options": {
                        "sort": "VIEWER_COUNT",
                        "systemFilters": ["DROPS_ENABLED"],
                        "tags": [],
                        "broadcasterLanguages": [],
                        "freeformTags": null,
                        "includeRestricted": ["SUB_ONLY_LIVE"],
                        "recommendationsContext": { "platform": "web" }
                    },
                    "sortTypeIsRecency": false,
                    "includeCostreaming": false
                }),
            )
            .await?;

        Ok(parse_streams(&response))
    }

    async fn streamer_status(&self, login: &str, expected_game: &str) -> ApiResult<StreamerStatus> {
        let response = self
            .persisted(
                "VideoPlayerStreamInfoOverlayChannel",
                hashes::STREAM_INFO,
                json!({ "channel": login }),
            )
            .await?;

        let user = &response["data"]["user"];
        if !user.is_object() || !user["stream"].is_object() {
            return Ok(StreamerStatus::default());
        }

        let current_game = user["broadcastSettings"]["game"]["name"]
            .as_str()
            .unwrap_or("")
            .to_string();
        Ok(StreamerStatus {
            online: true,
            correct_game: current_game.to_lowercase() == expected_game.to_lowercase(),
            current_game: Some(current_game),
        })
    }

    async fn drops_inventory(&self) -> ApiResult<Vec<InventoryCampaign>> {
        let response = self
            .persisted(
                "Inventory",
                hashes::INVENTORY,
                json!({ "fetchRewardCampaigns": false }),
            )
            .await?;
        parse_inventory(&response)
    }

    async fn claim_drop(&self, drop_instance_id: &str) -> ApiResult<DropClaimResult> {
        let response = self
            .persisted(
                "DropsPage_ClaimDropRewards",
                hashes::CLAIM_DROP,
                json!({ "input": { "dropInstanceID": drop_instance_id } }),
            )
            .await?;

        let result = &response["data"]["claimDropRewards"];
        if !result.is_object() {
            return Err(remote_error(&response, "Unknown error"));
        }

        Ok(DropClaimResult {
            status: str_field(result, "status"),
            is_user_account_connected: result["isUserAccountConnected"].as_bool(),
        })
    }

    async fn channel_points(&self, login: &str) -> ApiResult<ChannelPointsContext> {
        let response = self
            .persisted(
                "ChannelPointsContext",
                hashes::POINTS_CONTEXT,
                json!({ "channelLogin": login }),
            )
            .await?;

        let channel = &response["data"]["community"]["channel"];
        if !channel.is_object() {
            return Err(remote_error(&response, "Channel not found"));
        }
        let points = &channel["self"]["communityPoints"];
        if !points.is_object() {
            return Err(ApiError::Remote("No points data".to_string()));
        }

        Ok(ChannelPointsContext {
            channel_id: id_field(channel, "id"),
            balance: points["balance"].as_i64().unwrap_or(0),
            available_claim: str_field(&points["availableClaim"], "id"),
        })
    }

    async fn claim_channel_points(
        &self,
        claim_id: &str,
        channel_id: &str,
    ) -> ApiResult<PointsClaimResult> {
        let response = self
            .persisted(
                "ClaimCommunityPoints",
                hashes::CLAIM_POINTS,
                json!({ "input": { "claimID": claim_id, "channelID": channel_id } }),
            )
            .await?;

        let result = &response["data"]["claimCommunityPoints"];
        if !result.is_object() {
            return Err(remote_error(&response, "Unknown error"));
        }
        if let Some(code) = result["error"]["code"].as_str() {
            return Err(ApiError::Remote(code.to_string()));
        }

        Ok(PointsClaimResult {
            points_earned: result["claim"]["pointsEarnedTotal"].as_i64(),
            current_points: result["currentPoints"].as_i64(),
        })
    }

    async fn tracking_url(&self, login: &str) -> ApiResult<String> {
        let html = self
            .client
            .get(format!("https://www.twitch.tv/{}", login))
            .send()
            .await?
            .text()
            .await?;

        if let Some(url) = SPADE_PATTERN.captures(&html).and_then(|c| c.get(1)) {
            return Ok(url.as_str().to_string());
        }

        if let Some(settings_url) = SETTINGS_PATTERN.captures(&html).and_then(|c| c.get(1)) {
            match self.client.get(settings_url.as_str()).send().await {
                Ok(response) => {
                    let settings_js = response.text().await?;
                    if let Some(url) = SPADE_PATTERN.captures(&settings_js).and_then(|c| c.get(1)) {
                        return Ok(url.as_str().to_string());
                    }
                }
                Err(e) => debug!("[GQL] settings script fetch failed: {}", e),
            }
        }

        debug!("[GQL] No spade_url on {}'s page, using {}", login, FALLBACK_TRACKING_URL);
        Ok(FALLBACK_TRACKING_URL.to_string())
    }

    async fn send_watch_event(&self, event: &WatchEvent) -> ApiResult<bool> {
        if event.channel_id.is_empty()
            || event.channel_login.is_empty()
            || event.broadcast_id.is_empty()
            || event.user_id.is_empty()
        {
            warn!("⚠️ Missing fields for watch event on {}", event.channel_login);
            return Ok(false);
        }

        let encoded = encode_watch_payload(event)?;
        let response = self
            .client
            .post(&event.tracking_url)
            .header("Origin", "https://www.twitch.tv")
            .header("Referer", format!("https://www.twitch.tv/{}", event.channel_login))
            .form(&[("data", encoded)])
            .send()
            .await?;

        let status = response.status().as_u16();
        debug!("[GQL] watch event for {} returned {}", event.channel_login, status);
        Ok(status == 200 || status == 204)
    }
}

/// Minified minute-watched event, base64 encoded for the form body.
pub(crate) fn encode_watch_payload(event: &WatchEvent) -> ApiResult<String> {
    let payload = json!([{
        "event": "minute-watched",
        "properties": {
            "broadcast_id": event.broadcast_id,
            "channel_id": event.channel_id,
            "channel": event.channel_login,
            "hidden": false,
            "live": true,
            "location": "channel",
            "logged_in": true,
            "muted": false,
            "player": "site",
            "user_id": event.user_id
        }
    }]);

    let payload_str =
        serde_json::to_string(&payload).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(general_purpose::STANDARD.encode(payload_str.as_bytes()))
}
