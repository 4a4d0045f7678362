//! Chainq indexer implementation.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chainq_state::{
    pipeline::{
        filter_block, filter_events, filter_extrinsics, wrap_events, wrap_extrinsics,
        IndexedBlock, WrappedEvent, WrappedExtrinsic,
    },
    rpc::ChainApi as _,
    service::ApiService,
    types::BlockNumber,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{config::IndexerConfig, error::IndexerError};

/// Output of one fetched batch, after filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBatch {
    /// First height of the batch.
    pub start: BlockNumber,
    /// Last height of the batch.
    pub end: BlockNumber,
    /// Blocks kept by the block filter.
    pub blocks: Vec<IndexedBlock>,
    /// Extrinsics of the kept blocks matching the call filters.
    pub extrinsics: Vec<WrappedExtrinsic>,
    /// Events of the kept blocks matching the event filters.
    pub events: Vec<WrappedEvent>,
}

/// Chainq indexer.
///
/// Fetches `start_height..=end_height` in batches through the [`ApiService`], following the
/// finalized head when no end height is configured.
pub struct Indexer {
    /// Indexer configuration data.
    config: IndexerConfig,
    /// Chain api service.
    service: ApiService,
    /// Next height to fetch.
    next_height: Arc<AtomicU64>,
    /// Online status of the indexer.
    online: Arc<AtomicBool>,
    /// Receiver of indexed batches.
    sink: Option<mpsc::Sender<IndexedBatch>>,
}

impl Indexer {
    /// Starts Indexer service.
    ///
    /// Runs until the configured range is fetched, a batch fails or Ctrl-C is received.
    pub async fn start(config: IndexerConfig) -> Result<(), IndexerError> {
        let online = Arc::new(AtomicBool::new(true));
        set_ctrlc(online.clone());
        info!("Connecting to chain node..");
        let indexer = Indexer::new(config, online).await?;
        indexer.serve().await?.await?
    }

    /// Creates a new Indexer, connecting to the configured node.
    pub async fn new(config: IndexerConfig, online: Arc<AtomicBool>) -> Result<Self, IndexerError> {
        config.check_config()?;
        let service = ApiService::spawn(config.api_service_config()?).await?;
        Self::from_service(config, service, online)
    }

    /// Creates a new Indexer over an already initialized `service`.
    pub fn from_service(
        config: IndexerConfig,
        service: ApiService,
        online: Arc<AtomicBool>,
    ) -> Result<Self, IndexerError> {
        config.check_config()?;
        Ok(Indexer {
            next_height: Arc::new(AtomicU64::new(config.start_height)),
            config,
            service,
            online,
            sink: None,
        })
    }

    /// Sends every indexed batch to `sink`.
    ///
    /// The indexer shuts down once the receiving half is dropped.
    pub fn with_sink(mut self, sink: mpsc::Sender<IndexedBatch>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns a handle to the next height the indexer will fetch.
    pub fn progress(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.next_height)
    }

    /// Starts Indexer Service and returns its JoinHandle
    pub async fn serve(
        mut self,
    ) -> Result<tokio::task::JoinHandle<Result<(), IndexerError>>, IndexerError> {
        Ok(tokio::task::spawn(async move {
            let result = self.run().await;
            if let Err(e) = &result {
                error!("Indexer stopped: {e}");
            }
            self.service.close().await;
            result
        }))
    }

    async fn run(&mut self) -> Result<(), IndexerError> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let api = self.service.api();
        let pipeline = self.service.pipeline();

        loop {
            if !self.check_online() {
                info!("Stop requested, shutting down block fetching..");
                return Ok(());
            }

            let start = self.next_height.load(Ordering::SeqCst);
            let target = match self.config.end_height {
                Some(end) if start > end => {
                    info!(end_height = end, "Reached end height.");
                    return Ok(());
                }
                Some(end) => end,
                None => {
                    let head = api.finalized_head().await?;
                    api.header(head).await?.number
                }
            };
            if start > target {
                tokio::time::sleep(poll_interval).await;
                continue;
            }

            let end = target.min(start.saturating_add(self.config.batch_size - 1));
            let blocks = pipeline
                .fetch_indexed_range(api.as_ref(), start, end)
                .await?;
            let batch = process_batch(&self.config, start, end, blocks);
            info!(
                start,
                end,
                blocks = batch.blocks.len(),
                extrinsics = batch.extrinsics.len(),
                events = batch.events.len(),
                "Indexed batch"
            );

            if let Some(sink) = &self.sink {
                if sink.send(batch).await.is_err() {
                    warn!("Batch receiver dropped, shutting down..");
                    return Ok(());
                }
            }
            self.next_height.store(end.saturating_add(1), Ordering::SeqCst);
            if end == BlockNumber::MAX {
                info!("Reached the last block number.");
                return Ok(());
            }
        }
    }

    /// Check the online status on the indexer.
    fn check_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Applies the block, call and event filters of `config` to a fetched batch.
pub fn process_batch(
    config: &IndexerConfig,
    start: BlockNumber,
    end: BlockNumber,
    blocks: Vec<IndexedBlock>,
) -> IndexedBatch {
    let blocks: Vec<IndexedBlock> = blocks
        .into_iter()
        .filter_map(|block| filter_block(block, config.block_filter.as_ref()))
        .collect();
    let extrinsics = filter_extrinsics(
        blocks.iter().flat_map(wrap_extrinsics).collect(),
        &config.call_filters,
    );
    let events = filter_events(
        blocks.iter().flat_map(wrap_events).collect(),
        &config.event_filters,
    );
    IndexedBatch {
        start,
        end,
        blocks,
        extrinsics,
        events,
    }
}

fn set_ctrlc(online: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C.");
                online.store(false, Ordering::SeqCst);
            }
            Err(e) => error!("Unable to listen for Ctrl-C: {e}"),
        }
    });
}

#[cfg(test)]
mod tests {
    use chainq_state::{
        adapter::AlgorandAdapter,
        error::{ApiError, FetchError},
        pipeline::{wrap_block, FilterSpec, SpecVersionRange},
        types::{
            Block, BlockHash, Digest, Event, EventRecord, Extrinsic, Header, Phase, SignedBlock,
        },
    };
    use chainq_testutils::{MockAlgod, MockFailure};
    use serde_json::json;

    use super::*;

    fn bounded(start_height: u64, end_height: Option<u64>, batch_size: u64) -> IndexerConfig {
        let mut config = IndexerConfig {
            start_height,
            end_height,
            batch_size,
            poll_interval_ms: 10,
            ..Default::default()
        };
        config.network.family = "algorand".to_string();
        config.network.endpoint = "http://127.0.0.1:4001".to_string();
        config
    }

    async fn indexer(config: IndexerConfig, client: Arc<MockAlgod>) -> (Indexer, Arc<AtomicBool>) {
        let service = ApiService::init(
            config.api_service_config().unwrap(),
            Arc::new(AlgorandAdapter::new(client)),
        )
        .await
        .unwrap();
        let online = Arc::new(AtomicBool::new(true));
        let indexer = Indexer::from_service(config, service, online.clone()).unwrap();
        (indexer, online)
    }

    fn numbers(batch: &IndexedBatch) -> Vec<u64> {
        batch.blocks.iter().map(IndexedBlock::number).collect()
    }

    #[tokio::test]
    async fn fetches_the_configured_range_in_batches() {
        let client = Arc::new(MockAlgod::new(30));
        let (indexer, _online) = indexer(bounded(1, Some(10), 4), client.clone()).await;
        let progress = indexer.progress();
        let (sender, mut receiver) = mpsc::channel(8);

        let handle = indexer.with_sink(sender).serve().await.unwrap();
        handle.await.unwrap().unwrap();

        let mut batches = Vec::new();
        while let Some(batch) = receiver.recv().await {
            batches.push(batch);
        }
        assert_eq!(batches.len(), 3);
        assert_eq!(numbers(&batches[0]), vec![1, 2, 3, 4]);
        assert_eq!(numbers(&batches[2]), vec![9, 10]);
        assert_eq!((batches[2].start, batches[2].end), (9, 10));
        assert_eq!(progress.load(Ordering::SeqCst), 11);
        assert_eq!(client.fetch_count(11), 0);
    }

    #[tokio::test]
    async fn follows_the_finalized_head() {
        let client = Arc::new(MockAlgod::new(5));
        let (indexer, online) = indexer(bounded(1, None, 10), client.clone()).await;
        let (sender, mut receiver) = mpsc::channel(8);
        let handle = indexer.with_sink(sender).serve().await.unwrap();

        let batch = receiver.recv().await.unwrap();
        assert_eq!(numbers(&batch), vec![1, 2, 3, 4, 5]);

        client.set_last_round(8);
        let batch = receiver.recv().await.unwrap();
        assert_eq!(numbers(&batch), vec![6, 7, 8]);

        online.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn failed_batch_stops_the_indexer() {
        let client = Arc::new(MockAlgod::new(30));
        client.fail_round(6, MockFailure::Network);
        let (indexer, _online) = indexer(bounded(1, Some(10), 4), client).await;
        let progress = indexer.progress();

        let result = indexer.serve().await.unwrap().await.unwrap();
        assert!(matches!(
            result,
            Err(IndexerError::FetchError(FetchError::Block {
                height: 6,
                source: ApiError::NetworkError(_)
            }))
        ));
        assert_eq!(progress.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn stops_after_the_last_block_number() {
        let client = Arc::new(MockAlgod::new(u64::MAX));
        let (indexer, _online) =
            indexer(bounded(u64::MAX - 2, Some(u64::MAX), 10), client.clone()).await;
        let progress = indexer.progress();
        let (sender, mut receiver) = mpsc::channel(8);

        let handle = indexer.with_sink(sender).serve().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        let batch = receiver.recv().await.unwrap();
        assert_eq!(numbers(&batch), vec![u64::MAX - 2, u64::MAX - 1, u64::MAX]);
        assert!(receiver.recv().await.is_none());
        assert_eq!(progress.load(Ordering::SeqCst), u64::MAX);
    }

    #[tokio::test]
    async fn block_filter_drops_other_spec_versions() {
        let mut config = bounded(1, Some(3), 10);
        config.block_filter = Some(FilterSpec {
            spec_version: Some(SpecVersionRange(Some(2), None)),
            ..Default::default()
        });
        let (indexer, _online) = indexer(config, Arc::new(MockAlgod::new(30))).await;
        let (sender, mut receiver) = mpsc::channel(8);
        indexer
            .with_sink(sender)
            .serve()
            .await
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        let batch = receiver.recv().await.unwrap();
        assert!(batch.blocks.is_empty());
        assert_eq!((batch.start, batch.end), (1, 3));
    }

    fn record(phase: Phase, section: &str, method: &str) -> EventRecord {
        EventRecord {
            phase,
            event: Event {
                section: section.to_string(),
                method: method.to_string(),
                data: Vec::new(),
            },
            topics: Vec::new(),
        }
    }

    fn indexed(number: u64, spec_version: u32) -> IndexedBlock {
        let block = SignedBlock {
            block: Block {
                header: Header {
                    hash: BlockHash([number as u8; 32]),
                    number,
                    parent_hash: BlockHash::ZERO,
                    digest: Digest::default(),
                },
                extrinsics: vec![
                    Extrinsic::call("timestamp", "set", vec![json!(1_000)]),
                    Extrinsic::call("balances", "transfer", vec![]),
                ],
            },
            justifications: None,
        };
        let events = vec![
            record(Phase::ApplyExtrinsic(0), "system", "ExtrinsicSuccess"),
            record(Phase::ApplyExtrinsic(1), "balances", "Transfer"),
            record(Phase::ApplyExtrinsic(1), "system", "ExtrinsicSuccess"),
        ];
        wrap_block(block, events, spec_version).unwrap()
    }

    #[test]
    fn process_batch_applies_every_filter() {
        let mut config = bounded(1, Some(2), 10);
        config.block_filter = Some(FilterSpec {
            spec_version: Some(SpecVersionRange(None, Some(5))),
            ..Default::default()
        });
        config.call_filters = vec![FilterSpec {
            module: Some("balances".to_string()),
            success: Some(true),
            ..Default::default()
        }];
        config.event_filters = vec![FilterSpec {
            method: Some("Transfer".to_string()),
            ..Default::default()
        }];

        let batch = process_batch(&config, 1, 2, vec![indexed(1, 4), indexed(2, 6)]);
        assert_eq!(numbers(&batch), vec![1]);
        assert_eq!(batch.extrinsics.len(), 1);
        assert_eq!(batch.extrinsics[0].extrinsic.method, "transfer");
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].extrinsic_idx, Some(1));
    }

    #[test]
    fn process_batch_without_filters_keeps_everything() {
        let config = bounded(1, Some(2), 10);
        let batch = process_batch(&config, 1, 2, vec![indexed(1, 4), indexed(2, 6)]);
        assert_eq!(batch.blocks.len(), 2);
        assert_eq!(batch.extrinsics.len(), 4);
        assert_eq!(batch.events.len(), 6);
    }
}
