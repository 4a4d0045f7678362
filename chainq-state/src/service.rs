//! Chain api service, the entry point of chainq-state.

use std::sync::Arc;

use chainq_fetch::{
    algod::connector::{self as algod, AlgodConnector},
    jsonrpc::connector::{self as jsonrpc, JsonRpcConnector},
};
use tokio::sync::{watch, RwLock};
use tracing::{error, info};

use crate::{
    adapter::AlgorandAdapter,
    config::{ApiServiceConfig, ChainFamily},
    error::ApiServiceError,
    patched::PatchedApi,
    pipeline::fetch::BlockFetchPipeline,
    rpc::ChainApi,
    status::ConnectionState,
    substrate::SubstrateApi,
    types::{BlockHash, RuntimeVersion},
};

/// Identity of the network an [`ApiService`] is connected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMetadata {
    /// Chain name.
    pub chain: String,
    /// Runtime spec name.
    pub spec_name: String,
    /// Genesis identity reported by the node.
    pub genesis_hash: String,
}

/// Owns the [`ChainApi`] of the configured chain family.
///
/// Verifies the genesis identity on startup and republishes the connection state of the api.
pub struct ApiService {
    api: Arc<dyn ChainApi>,
    config: ApiServiceConfig,
    metadata: NetworkMetadata,
    current_runtime: RwLock<Option<RuntimeVersion>>,
    notifier: Arc<watch::Sender<ConnectionState>>,
    republish_handle: Option<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for ApiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiService")
            .field("family", &self.api.family())
            .field("config", &self.config)
            .field("metadata", &self.metadata)
            .field("status", &self.status())
            .finish()
    }
}

impl ApiService {
    /// Builds the api of the configured chain family and initializes the service.
    pub async fn spawn(config: ApiServiceConfig) -> Result<Self, ApiServiceError> {
        info!(
            family = %config.chain_family,
            endpoint = %config.endpoint,
            "Launching ApiService.."
        );
        let api: Arc<dyn ChainApi> = match config.chain_family {
            ChainFamily::Algorand => {
                let token = Some(config.api_token.clone());
                let url = algod::test_node_and_return_url(&config.endpoint, token.clone()).await?;
                info!(%url, "Connected to algod node");
                Arc::new(AlgorandAdapter::new(AlgodConnector::new(url, token)?))
            }
            ChainFamily::Substrate => {
                let url = jsonrpc::test_node_and_return_url(&config.endpoint).await?;
                info!(%url, "Connected to substrate node");
                Arc::new(SubstrateApi::new(JsonRpcConnector::new(url)?))
            }
        };
        Self::init(config, api).await
    }

    /// Connects `api`, checks its genesis identity against `config` and starts republishing
    /// its connection state.
    ///
    /// Fails [`ApiServiceError::GenesisMismatch`] if an expected genesis hash is configured
    /// and differs from the one reported by the node, the api is disconnected in that case.
    pub async fn init(
        config: ApiServiceConfig,
        api: Arc<dyn ChainApi>,
    ) -> Result<Self, ApiServiceError> {
        api.connect().await?;

        let (notifier, _) = watch::channel(api.connection_state());
        let notifier = Arc::new(notifier);
        let republish_handle = Some(republish(
            api.subscribe_connection(),
            Arc::clone(&notifier),
        ));
        let mut service = ApiService {
            api,
            config,
            metadata: NetworkMetadata {
                chain: String::new(),
                spec_name: String::new(),
                genesis_hash: String::new(),
            },
            current_runtime: RwLock::new(None),
            notifier,
            republish_handle,
        };

        let genesis_hash = service.api.genesis_hash().await?;
        if let Some(expected) = service.config.genesis_hash.clone() {
            if expected != genesis_hash {
                let err = ApiServiceError::GenesisMismatch {
                    expected,
                    actual: genesis_hash,
                };
                error!("{err}");
                service.close().await;
                return Err(err);
            }
        }

        let chain = service.api.chain_name().await?;
        let runtime_version = service.api.runtime_version(None).await?;
        service.metadata = NetworkMetadata {
            chain,
            spec_name: runtime_version.spec_name.clone(),
            genesis_hash,
        };
        *service.current_runtime.write().await = Some(runtime_version);

        info!(
            chain = %service.metadata.chain,
            spec_name = %service.metadata.spec_name,
            genesis_hash = %service.metadata.genesis_hash,
            "ApiService ready"
        );
        Ok(service)
    }

    /// Returns the chain api.
    pub fn api(&self) -> Arc<dyn ChainApi> {
        Arc::clone(&self.api)
    }

    /// Returns a block fetch pipeline sized by the configured fetch concurrency.
    pub fn pipeline(&self) -> BlockFetchPipeline {
        BlockFetchPipeline::new(self.config.fetch_concurrency)
    }

    /// Returns the service config.
    pub fn config(&self) -> &ApiServiceConfig {
        &self.config
    }

    /// Returns the identity of the connected network.
    pub fn network_metadata(&self) -> &NetworkMetadata {
        &self.metadata
    }

    /// Returns the connection state of the api.
    pub fn status(&self) -> ConnectionState {
        *self.notifier.borrow()
    }

    /// Returns a receiver notified on connection state changes.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.notifier.subscribe()
    }

    /// Returns a view of the api bound to `hash`.
    ///
    /// The runtime version is resolved at `parent_hash` if given, otherwise the last resolved
    /// runtime version is reused.
    pub async fn get_patched_api(
        &self,
        hash: BlockHash,
        parent_hash: Option<BlockHash>,
    ) -> Result<PatchedApi, ApiServiceError> {
        let runtime_version = match parent_hash {
            Some(parent_hash) => {
                let version = self.api.runtime_version(Some(parent_hash)).await?;
                *self.current_runtime.write().await = Some(version.clone());
                version
            }
            None => {
                let current = self.current_runtime.read().await.clone();
                match current {
                    Some(version) => version,
                    None => self.api.runtime_version(None).await?,
                }
            }
        };
        Ok(PatchedApi::new(self.api(), hash, runtime_version))
    }

    /// Disconnects the api and stops republishing its state.
    pub async fn close(&mut self) {
        if let Some(handle) = self.republish_handle.take() {
            handle.abort();
        }
        self.api.disconnect().await;
        self.notifier.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for ApiService {
    fn drop(&mut self) {
        if let Some(handle) = self.republish_handle.take() {
            handle.abort();
        }
    }
}

fn republish(
    mut receiver: watch::Receiver<ConnectionState>,
    notifier: Arc<watch::Sender<ConnectionState>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while receiver.changed().await.is_ok() {
            let state = *receiver.borrow_and_update();
            notifier.send_replace(state);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chainq_testutils::MockAlgod;
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::error::ApiError;

    fn config(genesis_hash: Option<&str>) -> ApiServiceConfig {
        ApiServiceConfig::new(
            ChainFamily::Algorand,
            Url::parse("http://127.0.0.1:4001").unwrap(),
            genesis_hash.map(str::to_string),
            None,
            None,
        )
    }

    fn adapter(client: MockAlgod) -> Arc<AlgorandAdapter<MockAlgod>> {
        Arc::new(AlgorandAdapter::new(client))
    }

    #[tokio::test]
    async fn init_stores_network_metadata() {
        let client = MockAlgod::new(10);
        let genesis = client.prev_of(1);
        let service = ApiService::init(config(None), adapter(client)).await.unwrap();

        let metadata = service.network_metadata();
        assert_eq!(metadata.chain, "algorand");
        assert_eq!(metadata.spec_name, "mainnet-1.0");
        assert_eq!(metadata.genesis_hash, genesis);
        assert_eq!(service.status(), ConnectionState::Active);
    }

    #[tokio::test]
    async fn matching_genesis_is_accepted() {
        let client = MockAlgod::new(10).with_first_prev("0xAA");
        assert!(ApiService::init(config(Some("0xAA")), adapter(client))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn genesis_mismatch_aborts_startup() {
        let api = adapter(MockAlgod::new(10).with_first_prev("0xBB"));
        match ApiService::init(config(Some("0xAA")), api.clone()).await {
            Err(ApiServiceError::GenesisMismatch { expected, actual }) => {
                assert_eq!(expected, "0xAA");
                assert_eq!(actual, "0xBB");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(api.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unreachable_node_fails_startup() {
        let client = MockAlgod::new(10);
        client.fail_status(true);
        assert!(matches!(
            ApiService::init(config(None), adapter(client)).await,
            Err(ApiServiceError::ApiError(ApiError::NetworkError(_)))
        ));
    }

    #[tokio::test]
    async fn connection_state_is_republished() {
        let api = adapter(MockAlgod::new(10));
        let service = ApiService::init(config(None), api.clone()).await.unwrap();
        let mut receiver = service.subscribe_connection();

        api.disconnect().await;
        tokio::time::timeout(
            Duration::from_secs(5),
            receiver.wait_for(|state| *state == ConnectionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(service.status(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_disconnects_the_api() {
        let api = adapter(MockAlgod::new(10));
        let mut service = ApiService::init(config(None), api.clone()).await.unwrap();
        service.close().await;
        assert_eq!(service.status(), ConnectionState::Disconnected);
        assert_eq!(api.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn patched_api_rebinds_historic_params() {
        let service = ApiService::init(config(None), adapter(MockAlgod::new(10)))
            .await
            .unwrap();
        let head = service.api().finalized_head().await.unwrap();
        let parent = service.api().header(head).await.unwrap().parent_hash;

        let patched = service.get_patched_api(head, Some(parent)).await.unwrap();
        assert_eq!(patched.runtime_version().spec_version, 1);

        let header = patched
            .call("chain_getHeader", vec![json!(BlockHash::ZERO)])
            .await
            .unwrap();
        assert_eq!(header["number"], 10);
        let header = patched.call("chain_getHeader", vec![]).await.unwrap();
        assert_eq!(header["hash"], json!(head));

        assert_eq!(patched.header().await.unwrap().number, 10);
        assert!(patched.events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn patched_api_rejects_methods_without_historic_param() {
        let service = ApiService::init(config(None), adapter(MockAlgod::new(10)))
            .await
            .unwrap();
        let head = service.api().finalized_head().await.unwrap();
        let patched = service.get_patched_api(head, None).await.unwrap();

        for method in ["chain_getBlockHash", "system_chain", "chain_getFinalizedHead"] {
            assert!(matches!(
                patched.call(method, vec![json!(1)]).await,
                Err(ApiError::UnsupportedMethod(name)) if name == method
            ));
        }
        assert!(matches!(
            patched.call("state_getStorage", vec![]).await,
            Err(ApiError::UnsupportedMethod(_))
        ));
    }
}
