use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::StoreError;
use crate::services::store_service::Store;

/// Header names worth keeping from a captured request.
pub const CAPTURED_HEADERS: [&str; 4] = [
    "client-integrity",
    "client-session-id",
    "client-version",
    "authorization",
];

pub const CREDENTIAL_WINDOW_HOURS: i64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadersStatus {
    pub has_credential: bool,
    pub is_expired: bool,
    pub age_minutes: Option<i64>,
    pub captured_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Disabled,
    StillValid,
    RefreshRequested,
}

/// Tracks the passively captured integrity credential and its freshness.
#[derive(Clone)]
pub struct CredentialService {
    store: Store,
}

impl CredentialService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Merge a capture into the stored blob. Ignored without an integrity value.
    /// Returns whether anything was stored.
    pub async fn capture(&self, raw: &HashMap<String, String>) -> Result<bool, StoreError> {
        self.capture_at(raw, Utc::now()).await
    }

    pub async fn capture_at(
        &self,
        raw: &HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let captured: HashMap<String, String> = raw
            .iter()
            .map(|(name, value)| (name.to_lowercase(), value.trim().to_string()))
            .filter(|(name, value)| CAPTURED_HEADERS.contains(&name.as_str()) && !value.is_empty())
            .collect();

        if !captured.contains_key("client-integrity") {
            debug!("[Credentials] Capture without client-integrity ignored");
            return Ok(false);
        }

        let mut headers = self.store.headers().await?;
        headers.extend(captured);
        self.store.save_headers(&headers, now).await?;

        info!("🔑 Captured headers: {:?}", headers.keys().collect::<Vec<_>>());
        Ok(true)
    }

    pub async fn status(&self) -> Result<HeadersStatus, StoreError> {
        self.status_at(Utc::now()).await
    }

    pub async fn status_at(&self, now: DateTime<Utc>) -> Result<HeadersStatus, StoreError> {
        let headers = self.store.headers().await?;
        let captured_at = self.store.headers_captured_at().await?;

        let age = captured_at.map(|at| now - at);
        let is_expired = match age {
            Some(age) => age > Duration::hours(CREDENTIAL_WINDOW_HOURS),
            None => true,
        };

        let mut captured_keys: Vec<String> = headers.keys().cloned().collect();
        captured_keys.sort();

        Ok(HeadersStatus {
            has_credential: headers.contains_key("client-integrity"),
            is_expired,
            age_minutes: age.map(|a| a.num_minutes()),
            captured_keys,
        })
    }

    /// Decide whether a fresh capture is needed. The caller asks the user for it.
    pub async fn refresh(&self) -> Result<RefreshOutcome, StoreError> {
        if !self.store.settings().await?.auto_refresh_token {
            return Ok(RefreshOutcome::Disabled);
        }

        let status = self.status().await?;
        if status.has_credential && !status.is_expired {
            return Ok(RefreshOutcome::StillValid);
        }

        info!("🔄 Credential missing or stale, requesting a refresh");
        Ok(RefreshOutcome::RefreshRequested)
    }
}
