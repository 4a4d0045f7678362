//! Concurrent, order-preserving block fetching.

use futures::{stream, StreamExt as _, TryStreamExt as _};
use tracing::{debug, error};

use crate::{
    config::DEFAULT_FETCH_CONCURRENCY,
    error::{ApiError, FetchError},
    pipeline::wrap::{wrap_block, IndexedBlock},
    rpc::{ChainApi, RpcMethod},
    types::{BlockNumber, SignedBlock},
};

/// Fetches batches of blocks with bounded concurrency.
///
/// Output order always matches request order. The first failure aborts the batch, no
/// partial result is returned.
#[derive(Debug, Clone, Copy)]
pub struct BlockFetchPipeline {
    concurrency: usize,
}

impl Default for BlockFetchPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_CONCURRENCY)
    }
}

impl BlockFetchPipeline {
    /// Returns a pipeline issuing at most `concurrency` requests at once.
    pub fn new(concurrency: usize) -> Self {
        BlockFetchPipeline {
            concurrency: concurrency.max(1),
        }
    }

    /// Max number of in-flight requests.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Fetches the blocks `start..=end`, ascending.
    ///
    /// Fails [`FetchError::InvalidRange`] without sending any request if `start > end`.
    pub async fn fetch_range<A: ChainApi + ?Sized>(
        &self,
        api: &A,
        start: BlockNumber,
        end: BlockNumber,
    ) -> Result<Vec<SignedBlock>, FetchError> {
        if start > end {
            return Err(FetchError::InvalidRange { start, end });
        }
        debug!(start, end, "fetching block range");
        self.fetch_heights(api, start..=end).await
    }

    /// Fetches the blocks at `heights`, in the order given.
    pub async fn fetch_set<A: ChainApi + ?Sized>(
        &self,
        api: &A,
        heights: &[BlockNumber],
    ) -> Result<Vec<SignedBlock>, FetchError> {
        if heights.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = heights.len(), "fetching block set");
        self.fetch_heights(api, heights.iter().copied()).await
    }

    /// Fetches the blocks `start..=end` and wraps each with its runtime version and events.
    ///
    /// Apis that serve no events yield blocks with an empty event list.
    pub async fn fetch_indexed_range<A: ChainApi + ?Sized>(
        &self,
        api: &A,
        start: BlockNumber,
        end: BlockNumber,
    ) -> Result<Vec<IndexedBlock>, FetchError> {
        if start > end {
            return Err(FetchError::InvalidRange { start, end });
        }
        let with_events = api.supports(RpcMethod::EventsAt);

        stream::iter(start..=end)
            .map(|height| async move {
                let block = api
                    .block_by_number(height)
                    .await
                    .map_err(|source| block_error(height, source))?;
                let hash = block.hash();

                // The runtime that executed a block is the one at its parent.
                let runtime_at = match height {
                    0 => hash,
                    _ => block.block.header.parent_hash,
                };
                let spec_version = api
                    .runtime_version(Some(runtime_at))
                    .await
                    .map_err(|source| block_error(height, source))?
                    .spec_version;

                let events = match with_events {
                    true => api.events_at(hash).await.map_err(|source| {
                        error!(height, %hash, "Failed to fetch events: {source}");
                        FetchError::Events { hash, source }
                    })?,
                    false => Vec::new(),
                };

                wrap_block(block, events, spec_version)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    async fn fetch_heights<A: ChainApi + ?Sized>(
        &self,
        api: &A,
        heights: impl IntoIterator<Item = BlockNumber>,
    ) -> Result<Vec<SignedBlock>, FetchError> {
        stream::iter(heights)
            .map(|height| async move {
                api.block_by_number(height)
                    .await
                    .map_err(|source| block_error(height, source))
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

fn block_error(height: BlockNumber, source: ApiError) -> FetchError {
    error!(height, "Failed to fetch block: {source}");
    FetchError::Block { height, source }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chainq_testutils::{MockAlgod, MockFailure};

    use super::*;
    use crate::adapter::AlgorandAdapter;

    async fn adapter(client: MockAlgod) -> AlgorandAdapter<Arc<MockAlgod>> {
        let adapter = AlgorandAdapter::new(Arc::new(client));
        adapter.connect().await.unwrap();
        adapter
    }

    fn numbers(blocks: &[SignedBlock]) -> Vec<u64> {
        blocks.iter().map(SignedBlock::number).collect()
    }

    #[tokio::test]
    async fn range_is_ordered() {
        let api = adapter(MockAlgod::new(20).with_shuffled_latency()).await;
        let blocks = BlockFetchPipeline::new(4)
            .fetch_range(&api, 5, 8)
            .await
            .unwrap();
        assert_eq!(numbers(&blocks), vec![5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn single_height_range() {
        let api = adapter(MockAlgod::new(20)).await;
        let blocks = BlockFetchPipeline::default()
            .fetch_range(&api, 3, 3)
            .await
            .unwrap();
        assert_eq!(numbers(&blocks), vec![3]);
    }

    #[tokio::test]
    async fn inverted_range_sends_no_request() {
        let api = adapter(MockAlgod::new(20)).await;
        assert!(matches!(
            BlockFetchPipeline::default().fetch_range(&api, 8, 5).await,
            Err(FetchError::InvalidRange { start: 8, end: 5 })
        ));
        assert_eq!(api.client().total_fetches(), 0);
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch() {
        let client = MockAlgod::new(20).with_shuffled_latency();
        client.fail_round(7, MockFailure::Network);
        let api = adapter(client).await;
        match BlockFetchPipeline::new(4).fetch_range(&api, 5, 8).await {
            Err(FetchError::Block { height, source }) => {
                assert_eq!(height, 7);
                assert!(matches!(source, ApiError::NetworkError(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_height_is_not_found() {
        let api = adapter(MockAlgod::new(6)).await;
        assert!(matches!(
            BlockFetchPipeline::default().fetch_range(&api, 5, 8).await,
            Err(FetchError::Block {
                height: 7,
                source: ApiError::NotFound(7)
            })
        ));
    }

    #[tokio::test]
    async fn open_ended_range_stops_at_the_first_missing_height() {
        let api = adapter(MockAlgod::new(5)).await;
        let pipeline = BlockFetchPipeline::new(4);
        assert!(matches!(
            pipeline.fetch_range(&api, 0, u64::MAX).await,
            Err(FetchError::Block {
                height: 6,
                source: ApiError::NotFound(6)
            })
        ));
        assert!(api.client().total_fetches() <= 6 + pipeline.concurrency());
    }

    #[test]
    fn concurrency_is_at_least_one() {
        assert_eq!(BlockFetchPipeline::new(0).concurrency(), 1);
        assert_eq!(BlockFetchPipeline::new(8).concurrency(), 8);
    }

    #[tokio::test]
    async fn set_keeps_input_order() {
        let api = adapter(MockAlgod::new(20).with_shuffled_latency()).await;
        let pipeline = BlockFetchPipeline::new(3);
        let blocks = pipeline.fetch_set(&api, &[9, 2, 15, 4]).await.unwrap();
        assert_eq!(numbers(&blocks), vec![9, 2, 15, 4]);
        assert!(pipeline.fetch_set(&api, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_height_is_fetched_once() {
        let api = adapter(MockAlgod::new(20)).await;
        BlockFetchPipeline::new(2)
            .fetch_range(&api, 1, 10)
            .await
            .unwrap();
        assert_eq!(api.client().total_fetches(), 10);
        assert!((1..=10).all(|n| api.client().fetch_count(n) == 1));
        assert!(api.registry().is_empty().await);
    }

    #[tokio::test]
    async fn indexed_range_carries_spec_version() {
        let api = adapter(MockAlgod::new(20)).await;
        let blocks = BlockFetchPipeline::default()
            .fetch_indexed_range(&api, 0, 3)
            .await
            .unwrap();
        assert_eq!(blocks.len(), 4);
        for (block, number) in blocks.iter().zip(0..) {
            assert_eq!(block.number(), number);
            assert_eq!(block.spec_version, 1);
            assert!(block.events.is_empty());
            assert_eq!(block.timestamp, None);
        }
    }

    #[tokio::test]
    async fn disconnected_api_fails_the_batch() {
        let api = AlgorandAdapter::new(MockAlgod::new(20));
        assert!(matches!(
            BlockFetchPipeline::default().fetch_range(&api, 1, 2).await,
            Err(FetchError::Block {
                height: 1,
                source: ApiError::NotConnected { .. }
            })
        ));
    }
}
