//! Chainq daemon config.

use chainq_state::{
    config::{ApiServiceConfig, ChainFamily, DEFAULT_FETCH_CONCURRENCY},
    pipeline::FilterSpec,
};
use url::Url;

use crate::error::IndexerError;

/// Node connection settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Chain family of the node (algorand, substrate or polkadot).
    pub family: String,
    /// Node endpoint.
    pub endpoint: String,
    /// Expected genesis hash, startup fails if the node reports a different one.
    pub genesis_hash: Option<String>,
    /// Algod api token.
    pub api_token: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            family: "substrate".to_string(),
            endpoint: "http://127.0.0.1:9933".to_string(),
            genesis_hash: None,
            api_token: None,
        }
    }
}

/// Config information required for chainqd.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Node connection settings.
    pub network: NetworkConfig,
    /// First height to fetch.
    pub start_height: u64,
    /// Last height to fetch.
    ///
    /// If unset the indexer follows the finalized head until shut down.
    pub end_height: Option<u64>,
    /// Number of heights fetched per batch.
    pub batch_size: u64,
    /// Max number of concurrent block requests.
    pub fetch_concurrency: usize,
    /// Delay between finalized head polls once the indexer has caught up, in ms.
    pub poll_interval_ms: u64,
    /// Block filter.
    pub block_filter: Option<FilterSpec>,
    /// Extrinsic filters, any match keeps an extrinsic.
    pub call_filters: Vec<FilterSpec>,
    /// Event filters, any match keeps an event.
    pub event_filters: Vec<FilterSpec>,
}

impl IndexerConfig {
    /// Performs checks on config data.
    ///
    /// - Checks the chain family is known and the endpoint is a valid url.
    /// - Checks batch size and fetch concurrency are non zero.
    /// - Checks the height range is not inverted.
    pub(crate) fn check_config(&self) -> Result<(), IndexerError> {
        self.get_family()?;
        self.get_endpoint()?;
        if self.batch_size == 0 {
            return Err(IndexerError::ConfigError(
                "batch_size must be greater than 0.".to_string(),
            ));
        }
        if self.fetch_concurrency == 0 {
            return Err(IndexerError::ConfigError(
                "fetch_concurrency must be greater than 0.".to_string(),
            ));
        }
        if let Some(end_height) = self.end_height {
            if self.start_height > end_height {
                return Err(IndexerError::ConfigError(format!(
                    "start_height {} is above end_height {end_height}.",
                    self.start_height
                )));
            }
        }
        Ok(())
    }

    /// Returns the chain family of the configured node.
    pub fn get_family(&self) -> Result<ChainFamily, IndexerError> {
        self.network
            .family
            .parse()
            .map_err(IndexerError::ConfigError)
    }

    /// Returns the endpoint of the configured node.
    pub fn get_endpoint(&self) -> Result<Url, IndexerError> {
        Url::parse(&self.network.endpoint).map_err(|e| {
            IndexerError::ConfigError(format!(
                "Invalid endpoint {:?}: {e}",
                self.network.endpoint
            ))
        })
    }

    /// Builds the config of the [`ApiService`](chainq_state::service::ApiService).
    pub fn api_service_config(&self) -> Result<ApiServiceConfig, IndexerError> {
        Ok(ApiServiceConfig::new(
            self.get_family()?,
            self.get_endpoint()?,
            self.network.genesis_hash.clone(),
            self.network.api_token.clone(),
            Some(self.fetch_concurrency),
        ))
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            start_height: 1,
            end_height: None,
            batch_size: 100,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            poll_interval_ms: 6000,
            block_filter: None,
            call_filters: Vec::new(),
            event_filters: Vec::new(),
        }
    }
}

/// Attempts to load config data from a toml file at the specified path else returns a default config.
///
/// A file that fails to parse is reported on stderr and replaced by the default config.
pub fn load_config(file_path: &std::path::PathBuf) -> IndexerConfig {
    if let Ok(contents) = std::fs::read_to_string(file_path) {
        toml::from_str::<IndexerConfig>(&contents).unwrap_or_else(|e| {
            eprintln!("Could not parse config file, using default config: {e}");
            IndexerConfig::default()
        })
    } else {
        eprintln!("Could not find config file at given path, using default config.");
        IndexerConfig::default()
    }
}
