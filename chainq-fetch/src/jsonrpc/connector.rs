//! JsonRPC client implementation.
//!
//! Only the hash-addressed `chain_*`, `state_*` and `system_*` calls used by the native family
//! are exposed.

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::jsonrpc::{
    error::JsonRpcConnectorError,
    response::{HeaderResponse, RuntimeVersionResponse, SignedBlockResponse},
};

#[derive(Serialize, Debug)]
struct RpcRequest<T> {
    jsonrpc: String,
    method: String,
    params: T,
    id: i32,
}

#[derive(Deserialize, Debug)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// Json RPC error object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    /// Error Code.
    pub code: i64,
    /// Error Message.
    pub message: String,
    /// Error Data.
    pub data: Option<Value>,
}

/// JsonRPC Client config data.
#[derive(Debug, Clone)]
pub struct JsonRpcConnector {
    url: Url,
    id_counter: Arc<AtomicI32>,
    client: reqwest::Client,
}

impl JsonRpcConnector {
    /// Returns a new JsonRpcConnector instance, no request is sent.
    pub fn new(url: Url) -> Result<Self, JsonRpcConnectorError> {
        Ok(Self {
            url,
            id_counter: Arc::new(AtomicI32::new(0)),
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Returns the url of the node.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends a jsonRPC request and returns the response.
    ///
    /// A `null` result is returned as `None`, callers decide whether that means "not found".
    async fn send_request<T: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: T,
    ) -> Result<Option<R>, JsonRpcConnectorError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        };
        debug!(method, id, "jsonrpc request");

        let response = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body_bytes = response.bytes().await?;
        if !status.is_success() && body_bytes.is_empty() {
            return Err(JsonRpcConnectorError::new(format!(
                "Error: Node returned {status} with an empty body for {method}"
            )));
        }

        let response: RpcResponse<R> = serde_json::from_slice(&body_bytes)?;
        match response.error {
            Some(error) => Err(JsonRpcConnectorError::RpcError(error)),
            None => Ok(response.result),
        }
    }

    /// Returns the hash of the block at `number`, `None` if the node does not know it.
    ///
    /// substrate reference: `chain_getBlockHash`
    pub async fn get_block_hash(
        &self,
        number: u64,
    ) -> Result<Option<String>, JsonRpcConnectorError> {
        self.send_request("chain_getBlockHash", json!([number]))
            .await
    }

    /// Returns the hash of the last finalized block.
    ///
    /// substrate reference: `chain_getFinalizedHead`
    pub async fn get_finalized_head(&self) -> Result<String, JsonRpcConnectorError> {
        self.send_request::<_, String>("chain_getFinalizedHead", json!([]))
            .await?
            .ok_or_else(|| JsonRpcConnectorError::new("Empty finalized head response"))
    }

    /// Returns the header of the block with `hash`, `None` if unknown.
    ///
    /// substrate reference: `chain_getHeader`
    pub async fn get_header(
        &self,
        hash: &str,
    ) -> Result<Option<HeaderResponse>, JsonRpcConnectorError> {
        self.send_request("chain_getHeader", json!([hash])).await
    }

    /// Returns the block with `hash`, `None` if unknown.
    ///
    /// substrate reference: `chain_getBlock`
    pub async fn get_block(
        &self,
        hash: &str,
    ) -> Result<Option<SignedBlockResponse>, JsonRpcConnectorError> {
        self.send_request("chain_getBlock", json!([hash])).await
    }

    /// Returns the runtime version at `at`, or at the best block if `None`.
    ///
    /// substrate reference: `state_getRuntimeVersion`
    pub async fn get_runtime_version(
        &self,
        at: Option<&str>,
    ) -> Result<RuntimeVersionResponse, JsonRpcConnectorError> {
        self.send_request::<_, RuntimeVersionResponse>("state_getRuntimeVersion", json!([at]))
            .await?
            .ok_or_else(|| JsonRpcConnectorError::new("Empty runtime version response"))
    }

    /// Returns the hex-encoded SCALE runtime metadata at `at`.
    ///
    /// substrate reference: `state_getMetadata`
    pub async fn get_metadata(&self, at: Option<&str>) -> Result<String, JsonRpcConnectorError> {
        self.send_request::<_, String>("state_getMetadata", json!([at]))
            .await?
            .ok_or_else(|| JsonRpcConnectorError::new("Empty metadata response"))
    }

    /// Returns the chain name.
    ///
    /// substrate reference: `system_chain`
    pub async fn system_chain(&self) -> Result<String, JsonRpcConnectorError> {
        self.send_request::<_, String>("system_chain", json!([]))
            .await?
            .ok_or_else(|| JsonRpcConnectorError::new("Empty system_chain response"))
    }
}

/// Tests connection with the node and returns its url.
pub async fn test_node_and_return_url(url: &Url) -> Result<Url, JsonRpcConnectorError> {
    let connector = JsonRpcConnector::new(url.clone())?;
    let chain = connector.system_chain().await?;
    debug!(%chain, "jsonrpc node reachable");
    Ok(connector.url)
}
