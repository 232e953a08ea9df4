//! Calendar server access
//!
//! Calendars accept digests for aggregation and later hand out the proof
//! that links a commitment to a block.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use ots_core::Timestamp;

use crate::{ClientError, Result};

/// Media type of serialized timestamps
pub const ACCEPT_HEADER: &str = "application/vnd.opentimestamps.v1";

/// Calendar responses larger than this are rejected.
pub const MAX_RESPONSE_SIZE: usize = 10_000;

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Submit `digest`; the returned timestamp is rooted at `digest`.
    async fn submit(&self, calendar: &str, digest: &[u8]) -> Result<Timestamp>;

    /// Fetch the proof for `commitment`, rooted at `commitment`.
    ///
    /// Fails with [`ClientError::NotFound`] while the calendar has nothing
    /// to add yet.
    async fn get_timestamp(&self, calendar: &str, commitment: &[u8]) -> Result<Timestamp>;
}

/// HTTP calendar client
pub struct HttpCalendar {
    http: reqwest::Client,
}

impl HttpCalendar {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ots-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    async fn read_timestamp(response: reqwest::Response, msg: &[u8]) -> Result<Timestamp> {
        let url = response.url().to_string();
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(url));
        }
        if !status.is_success() {
            return Err(ClientError::Network(format!("{} returned {}", url, status)));
        }
        if response
            .content_length()
            .map_or(false, |len| len > MAX_RESPONSE_SIZE as u64)
        {
            return Err(ClientError::Network(format!(
                "{} response exceeds {} bytes",
                url, MAX_RESPONSE_SIZE
            )));
        }

        let body = read_capped(response, MAX_RESPONSE_SIZE).await?;
        debug!(url = %url, bytes = body.len(), "Calendar response");
        Ok(Timestamp::from_bytes(&body, msg)?)
    }
}

async fn read_capped(mut response: reqwest::Response, cap: usize) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_reqwest)? {
        if body.len() + chunk.len() > cap {
            return Err(ClientError::Network(format!(
                "response exceeds {} bytes",
                cap
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub(crate) fn map_reqwest(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Network(err.to_string())
    }
}

#[async_trait]
impl CalendarClient for HttpCalendar {
    async fn submit(&self, calendar: &str, digest: &[u8]) -> Result<Timestamp> {
        let url = format!("{}/digest", calendar.trim_end_matches('/'));
        debug!(url = %url, digest = %hex::encode(digest), "Submitting digest");
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .body(digest.to_vec())
            .send()
            .await
            .map_err(map_reqwest)?;
        Self::read_timestamp(response, digest).await
    }

    async fn get_timestamp(&self, calendar: &str, commitment: &[u8]) -> Result<Timestamp> {
        let url = format!(
            "{}/timestamp/{}",
            calendar.trim_end_matches('/'),
            hex::encode(commitment)
        );
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await
            .map_err(map_reqwest)?;
        Self::read_timestamp(response, commitment).await
    }
}
