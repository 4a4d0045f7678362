//! Algod REST connector.
//!
//! Talks to the `v2` endpoints of an Algorand node. Blocks are always requested in their
//! JSON encoding.

use async_trait::async_trait;
use http::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::{
    algod::response::{AlgodBlock, BlockResponse, NodeStatusResponse},
    chain::{
        client::{ChainClient, ChainStatus},
        error::ChainClientError,
    },
};

/// Header carrying the algod api token.
pub const ALGOD_TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Round-addressed client for an algod node.
#[derive(Debug, Clone)]
pub struct AlgodConnector {
    url: Url,
    client: reqwest::Client,
}

impl AlgodConnector {
    /// Returns a new AlgodConnector, no request is sent.
    pub fn new(url: Url, api_token: Option<String>) -> Result<Self, ChainClientError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = api_token {
            headers.insert(ALGOD_TOKEN_HEADER, HeaderValue::from_str(&token)?);
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(AlgodConnector {
            url: with_trailing_slash(url),
            client,
        })
    }

    /// Returns the base url of the node.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the node status.
    ///
    /// algod reference: `GET /v2/status`
    pub async fn get_status(&self) -> Result<NodeStatusResponse, ChainClientError> {
        self.get_json("v2/status").await
    }

    /// Returns the block for the given round.
    ///
    /// algod reference: `GET /v2/blocks/{round}?format=json`
    pub async fn get_block(&self, round: u64) -> Result<AlgodBlock, ChainClientError> {
        let path = format!("v2/blocks/{round}?format=json");
        match self.get_json::<BlockResponse>(&path).await {
            Err(ChainClientError::NotFound(_)) => Err(ChainClientError::NotFound(round)),
            result => result.map(|response| response.block),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainClientError> {
        let url = self.url.join(path)?;
        debug!(%url, "algod request");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ChainClientError::NotFound(0));
        }
        if status.is_server_error() {
            return Err(ChainClientError::network(format!(
                "algod returned {status}: {}",
                response.text().await.unwrap_or_default()
            )));
        }
        if !status.is_success() {
            return Err(ChainClientError::InvalidResponse(format!(
                "algod returned {status}: {}",
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ChainClient for AlgodConnector {
    type Block = AlgodBlock;

    async fn status(&self) -> Result<ChainStatus, ChainClientError> {
        Ok(ChainStatus {
            last_height: self.get_status().await?.last_round,
        })
    }

    async fn block_by_number(&self, height: u64) -> Result<AlgodBlock, ChainClientError> {
        self.get_block(height).await
    }
}

/// Tests connection with the algod node and returns its url.
pub async fn test_node_and_return_url(
    url: &Url,
    api_token: Option<String>,
) -> Result<Url, ChainClientError> {
    let connector = AlgodConnector::new(url.clone(), api_token)?;
    let status = connector.get_status().await?;
    debug!(last_round = status.last_round, "algod node reachable");
    Ok(connector.url)
}

/// `Url::join` replaces the last path segment unless the base ends with a slash.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
