//! Block header lookup through an Esplora block explorer

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use ots_core::BlockHeader;
use ots_types::Chain;

use crate::calendar::map_reqwest;
use crate::{ClientError, Result};

#[async_trait]
pub trait BlockHeaderSource: Send + Sync {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader>;
}

#[derive(Debug, Deserialize)]
struct EsploraBlock {
    merkle_root: String,
    timestamp: u64,
}

/// Esplora REST client (`/block-height/{h}`, `/block/{hash}`)
pub struct EsploraExplorer {
    http: reqwest::Client,
    bitcoin_url: String,
    litecoin_url: Option<String>,
}

impl EsploraExplorer {
    pub fn new(bitcoin_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            bitcoin_url: bitcoin_url.into(),
            litecoin_url: None,
        })
    }

    pub fn with_litecoin(mut self, url: impl Into<String>) -> Self {
        self.litecoin_url = Some(url.into());
        self
    }

    fn base_url(&self, chain: Chain) -> Result<&str> {
        let url = match chain {
            Chain::Bitcoin => Some(self.bitcoin_url.as_str()),
            Chain::Litecoin => self.litecoin_url.as_deref(),
        };
        url.map(|u| u.trim_end_matches('/'))
            .ok_or_else(|| ClientError::Config(format!("No block explorer configured for {}", chain)))
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.http.get(url).send().await.map_err(map_reqwest)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ClientError::Network(format!("{} returned {}", url, status)));
        }
        Ok(response)
    }
}

#[async_trait]
impl BlockHeaderSource for EsploraExplorer {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader> {
        let base = self.base_url(chain)?;

        let hash = self
            .get(&format!("{}/block-height/{}", base, height))
            .await?
            .text()
            .await
            .map_err(map_reqwest)?;
        let hash = hash.trim();

        let block: EsploraBlock = self
            .get(&format!("{}/block/{}", base, hash))
            .await?
            .json()
            .await
            .map_err(map_reqwest)?;
        debug!(%chain, height, hash, "Fetched block header");

        Ok(BlockHeader {
            merkle_root: merkle_root_internal(&block.merkle_root)?,
            time: block.timestamp,
        })
    }
}

/// Explorers display hashes byte-reversed.
fn merkle_root_internal(displayed: &str) -> Result<Vec<u8>> {
    let mut bytes = hex::decode(displayed)
        .map_err(|e| ClientError::Network(format!("Invalid merkle root {}: {}", displayed, e)))?;
    bytes.reverse();
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merkle_root_reversed() {
        // Block 358391
        let displayed = "007ee445d23ad061af4a36b809501fab1ac4f2d7e7a739817dd0cbb7ec661b8a";
        let internal = merkle_root_internal(displayed).unwrap();
        assert_eq!(internal[0], 0x8a);
        assert_eq!(internal[31], 0x00);
        assert!(merkle_root_internal("zz").is_err());
    }

    #[test]
    fn test_litecoin_requires_url() {
        let explorer = EsploraExplorer::new("https://blockstream.info/api/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(explorer.base_url(Chain::Bitcoin).unwrap(), "https://blockstream.info/api");
        assert!(matches!(
            explorer.base_url(Chain::Litecoin),
            Err(ClientError::Config(_))
        ));

        let explorer = explorer.with_litecoin("https://litecoinspace.org/api");
        assert!(explorer.base_url(Chain::Litecoin).is_ok());
    }
}
