//! Holds config data for chainq-state services.

use std::{fmt, str::FromStr};

use url::Url;

/// Default algod api token, as shipped with local sandbox nodes.
pub const DEFAULT_API_TOKEN: &str =
    "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Default number of blocks fetched concurrently.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 16;

/// Chain family served by an [`ApiService`](crate::service::ApiService).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Round-addressed chain, served through the [`AlgorandAdapter`](crate::adapter::AlgorandAdapter).
    Algorand,
    /// Hash-addressed chain, served natively by [`SubstrateApi`](crate::substrate::SubstrateApi).
    #[default]
    #[serde(alias = "polkadot")]
    Substrate,
}

impl FromStr for ChainFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "algorand" => Ok(ChainFamily::Algorand),
            "substrate" | "polkadot" => Ok(ChainFamily::Substrate),
            other => Err(format!("Unknown chain family: {other}")),
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFamily::Algorand => f.write_str("algorand"),
            ChainFamily::Substrate => f.write_str("substrate"),
        }
    }
}

/// Holds config data for [`ApiService`](crate::service::ApiService).
#[derive(Debug, Clone)]
pub struct ApiServiceConfig {
    /// Chain family of the node.
    pub chain_family: ChainFamily,
    /// Node endpoint.
    pub endpoint: Url,
    /// Expected genesis hash, checked on startup if set.
    pub genesis_hash: Option<String>,
    /// Algod api token, unused by the substrate family.
    pub api_token: String,
    /// Max number of concurrent block requests.
    pub fetch_concurrency: usize,
}

impl ApiServiceConfig {
    /// Returns a new instance of [`ApiServiceConfig`].
    pub fn new(
        chain_family: ChainFamily,
        endpoint: Url,
        genesis_hash: Option<String>,
        api_token: Option<String>,
        fetch_concurrency: Option<usize>,
    ) -> Self {
        ApiServiceConfig {
            chain_family,
            endpoint,
            genesis_hash,
            api_token: api_token.unwrap_or(DEFAULT_API_TOKEN.to_string()),
            fetch_concurrency: fetch_concurrency.unwrap_or(DEFAULT_FETCH_CONCURRENCY).max(1),
        }
    }
}
