//! Tests the algod connector and the algorand adapter against a mocked algod REST api.

use std::sync::Arc;

use chainq_fetch::{
    algod::connector::{AlgodConnector, ALGOD_TOKEN_HEADER},
    chain::{client::ChainClient, error::ChainClientError},
};
use chainq_state::{
    config::{ApiServiceConfig, ChainFamily},
    error::{ApiError, ApiServiceError},
    pipeline::BlockFetchPipeline,
    rpc::ChainApi,
    service::ApiService,
};
use chainq_testutils::{algod_block_json, algod_status_json, mock_prev, TESTNET_GENESIS_HASH};
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use url::Url;

const TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

async fn mock_status(server: &mut ServerGuard, last_round: u64) -> Mock {
    server
        .mock("GET", "/v2/status")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(algod_status_json(last_round).to_string())
        .create_async()
        .await
}

async fn mock_blocks(server: &mut ServerGuard, rounds: std::ops::RangeInclusive<u64>) -> Vec<Mock> {
    let mut mocks = Vec::new();
    for round in rounds {
        let mock = server
            .mock("GET", format!("/v2/blocks/{round}").as_str())
            .match_query(Matcher::UrlEncoded("format".into(), "json".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(algod_block_json(round, TESTNET_GENESIS_HASH).to_string())
            .create_async()
            .await;
        mocks.push(mock);
    }
    mocks
}

fn connector(server: &ServerGuard) -> AlgodConnector {
    AlgodConnector::new(Url::parse(&server.url()).unwrap(), Some(TOKEN.to_string())).unwrap()
}

fn service_config(server: &ServerGuard, genesis_hash: Option<String>) -> ApiServiceConfig {
    ApiServiceConfig::new(
        ChainFamily::Algorand,
        Url::parse(&server.url()).unwrap(),
        genesis_hash,
        Some(TOKEN.to_string()),
        Some(4),
    )
}

#[tokio::test]
async fn status_request_carries_the_api_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v2/status")
        .match_header(ALGOD_TOKEN_HEADER, TOKEN)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(algod_status_json(42).to_string())
        .expect(1)
        .create_async()
        .await;

    let status = connector(&server).status().await.unwrap();
    assert_eq!(status.last_height, 42);
    mock.assert_async().await;
}

#[tokio::test]
async fn block_is_fetched_by_round() {
    let mut server = Server::new_async().await;
    let _mocks = mock_blocks(&mut server, 5..=5).await;

    let block = connector(&server).block_by_number(5).await.unwrap();
    assert_eq!(block.round, 5);
    assert_eq!(block.prev, mock_prev(5));
    assert_eq!(block.genesis_hash, TESTNET_GENESIS_HASH);
}

#[tokio::test]
async fn unknown_round_is_not_found() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/blocks/9")
        .match_query(Matcher::Any)
        .with_status(404)
        .with_body(json!({ "message": "ledger does not have entry 9" }).to_string())
        .create_async()
        .await;

    let result = connector(&server).block_by_number(9).await;
    assert!(matches!(result, Err(ChainClientError::NotFound(9))));
}

#[tokio::test]
async fn server_error_is_a_network_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/status")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let result = connector(&server).status().await;
    assert!(matches!(result, Err(ChainClientError::NetworkError(_))));
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v2/status")
        .with_status(200)
        .with_body("{\"last-round\": \"soon\"}")
        .create_async()
        .await;

    let result = connector(&server).status().await;
    assert!(matches!(result, Err(ChainClientError::SerdeJsonError(_))));
}

#[tokio::test]
async fn service_serves_algod_through_the_hash_api() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server, 5).await;
    let _blocks = mock_blocks(&mut server, 1..=5).await;

    let service = ApiService::spawn(service_config(&server, Some(mock_prev(1))))
        .await
        .unwrap();
    assert_eq!(service.network_metadata().chain, "algorand");
    let api = service.api();

    let head = api.finalized_head().await.unwrap();
    let header = api.header(head).await.unwrap();
    assert_eq!(header.number, 5);
    assert_eq!(api.block(head).await.unwrap().number(), 5);

    let by_name = api
        .call("chain_getHeader", vec![json!(head)])
        .await
        .unwrap();
    assert_eq!(by_name["number"], 5);
    assert_eq!(by_name["parentHash"], json!(header.parent_hash));

    let pipeline = service.pipeline();
    assert_eq!(pipeline.concurrency(), 4);
    let blocks = pipeline
        .fetch_range(api.as_ref(), 1, 5)
        .await
        .unwrap();
    let numbers: Vec<u64> = blocks.iter().map(|b| b.number()).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert_eq!(blocks[4].hash(), head);
}

#[tokio::test]
async fn service_rejects_foreign_network() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server, 5).await;
    let _blocks = mock_blocks(&mut server, 1..=1).await;

    match ApiService::spawn(service_config(&server, Some("wrong-genesis".to_string()))).await {
        Err(ApiServiceError::GenesisMismatch { expected, actual }) => {
            assert_eq!(expected, "wrong-genesis");
            assert_eq!(actual, mock_prev(1));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn missing_round_fails_the_batch() {
    let mut server = Server::new_async().await;
    let _status = mock_status(&mut server, 5).await;
    let _blocks = mock_blocks(&mut server, 1..=3).await;
    let _missing = server
        .mock("GET", "/v2/blocks/4")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let service = ApiService::spawn(service_config(&server, None))
        .await
        .unwrap();
    let api: Arc<dyn ChainApi> = service.api();
    let result = BlockFetchPipeline::default()
        .fetch_range(api.as_ref(), 1, 4)
        .await;
    assert!(matches!(
        result,
        Err(chainq_state::error::FetchError::Block {
            height: 4,
            source: ApiError::NotFound(4)
        })
    ));
}

#[tokio::test]
async fn unreachable_node_fails_on_startup() {
    let config = ApiServiceConfig::new(
        ChainFamily::Algorand,
        Url::parse("http://127.0.0.1:1").unwrap(),
        None,
        Some(TOKEN.to_string()),
        None,
    );
    assert!(matches!(
        ApiService::spawn(config).await,
        Err(ApiServiceError::ChainClientError(
            ChainClientError::NetworkError(_)
        ))
    ));
}
