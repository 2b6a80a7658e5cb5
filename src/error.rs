//! Error types shared by the services.

use thiserror::Error;

/// Failure of a single remote call. Always recovered locally by the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable session credential, the call was not attempted.
    #[error("not authenticated")]
    Unauthenticated,

    /// Transport failure talking to the remote endpoint.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with an error payload.
    #[error("{0}")]
    Remote(String),

    /// The payload did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the remote reports the reward as no longer claimable.
    pub fn is_unavailable(&self) -> bool {
        let message = self.to_string().to_lowercase().replace('_', " ");
        message.contains("no longer available") || message.contains("unavailable")
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors that end a farming operation early.
#[derive(Debug, Error)]
pub enum FarmError {
    #[error("could not resolve the current user: {0}")]
    NoUser(String),

    #[error("no live streamer with drops for {0}")]
    NoStreamerAvailable(String),

    #[error("could not resolve tracking endpoint: {0}")]
    TrackingUnavailable(String),

    #[error("no farming session is active")]
    NotActive,

    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
