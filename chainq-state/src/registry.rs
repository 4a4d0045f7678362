//! Bidirectional hash <-> number <-> block cache with two-slot retention.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::{
    error::ApiError,
    types::{BlockHash, BlockNumber},
};

/// Retention class of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Current finalized block, retained until a newer block is pinned.
    Pinned,
    /// Previously pinned block, retained until the next pin.
    Retired,
    /// One-shot entry, evicted on the next pin or after being read.
    Transient,
}

#[derive(Debug)]
struct Entry<B> {
    hash: BlockHash,
    block: Arc<B>,
}

#[derive(Debug)]
struct State<B> {
    hashes: HashMap<BlockHash, BlockNumber>,
    blocks: HashMap<BlockNumber, Entry<B>>,
    pinned: Option<BlockHash>,
    retired: Option<BlockHash>,
}

impl<B: PartialEq> State<B> {
    fn slot(&self, hash: &BlockHash) -> Slot {
        if self.pinned.as_ref() == Some(hash) {
            Slot::Pinned
        } else if self.retired.as_ref() == Some(hash) {
            Slot::Retired
        } else {
            Slot::Transient
        }
    }

    /// Returns true if the pinned hash changed.
    fn put(&mut self, hash: BlockHash, number: BlockNumber, block: B) -> bool {
        if let Some(entry) = self.blocks.get(&number) {
            if entry.hash == hash && *entry.block == block {
                return false;
            }
        }

        // A hash moving to a new number drops its old entry.
        if let Some(old_number) = self.hashes.insert(hash, number) {
            if old_number != number {
                self.blocks.remove(&old_number);
            }
        }

        let mut pinned_changed = false;
        if let Some(replaced) = self.blocks.insert(
            number,
            Entry {
                hash,
                block: Arc::new(block),
            },
        ) {
            if replaced.hash != hash {
                self.hashes.remove(&replaced.hash);
                // The replacing hash inherits the slot of the replaced one.
                if self.pinned == Some(replaced.hash) {
                    self.pinned = Some(hash);
                    pinned_changed = true;
                } else if self.retired == Some(replaced.hash) {
                    self.retired = Some(hash);
                }
            }
        }
        pinned_changed
    }

    /// Returns true if the pinned hash changed.
    fn pin(&mut self, hash: BlockHash) -> Result<bool, ApiError> {
        if !self.hashes.contains_key(&hash) {
            return Err(ApiError::MissingBlock(hash));
        }
        if self.pinned == Some(hash) {
            return Ok(false);
        }

        self.retired = self.pinned.replace(hash);
        let keep = [self.pinned, self.retired];
        self.blocks
            .retain(|_, entry| keep.contains(&Some(entry.hash)));
        self.hashes.retain(|hash, _| keep.contains(&Some(*hash)));
        Ok(true)
    }
}

/// Thread safe hash registry.
///
/// A live hash maps to exactly one number and vice versa. [`HashRegistry::pin`] is the sole
/// bulk eviction trigger: it keeps the newly pinned entry and the one it supersedes, and drops
/// everything else under a single write lock, so readers see either the state before or after
/// the pin.
#[derive(Debug, Clone)]
pub struct HashRegistry<B> {
    state: Arc<RwLock<State<B>>>,
    notifier: Arc<watch::Sender<Option<BlockHash>>>,
}

impl<B: Clone + PartialEq + Send + Sync> Default for HashRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Clone + PartialEq + Send + Sync> HashRegistry<B> {
    /// Returns an empty registry.
    pub fn new() -> Self {
        let (notifier, _) = watch::channel(None);
        HashRegistry {
            state: Arc::new(RwLock::new(State {
                hashes: HashMap::new(),
                blocks: HashMap::new(),
                pinned: None,
                retired: None,
            })),
            notifier: Arc::new(notifier),
        }
    }

    /// Registers `block` under `hash` and `number`.
    ///
    /// Writing the same hash twice with identical content is a no-op. Writing a different hash
    /// for a known number replaces the old entry.
    pub async fn put(&self, hash: BlockHash, number: BlockNumber, block: B) {
        let mut state = self.state.write().await;
        if state.put(hash, number, block) {
            self.notify(state.pinned);
        }
    }

    /// Registers `block` and pins it in one critical section.
    pub async fn put_pinned(
        &self,
        hash: BlockHash,
        number: BlockNumber,
        block: B,
    ) -> Result<(), ApiError> {
        let mut state = self.state.write().await;
        let moved = state.put(hash, number, block);
        let pinned = state.pin(hash)?;
        if moved || pinned {
            debug!(%hash, number, "pinned block");
            self.notify(state.pinned);
        }
        Ok(())
    }

    /// Marks `hash` as the pinned entry.
    ///
    /// The previously pinned hash is retired and every other entry is evicted. Pinning the
    /// pinned hash again is a no-op. Fails [`ApiError::MissingBlock`] if `hash` is unknown.
    pub async fn pin(&self, hash: BlockHash) -> Result<(), ApiError> {
        let mut state = self.state.write().await;
        if state.pin(hash)? {
            debug!(%hash, "pinned block");
            self.notify(state.pinned);
        }
        Ok(())
    }

    /// Pins the entry registered for `number` and returns its hash.
    ///
    /// Returns `None` without touching the registry if `number` is unknown. Lookup and pin
    /// share one write lock, so a concurrent read cannot evict the entry in between.
    pub async fn pin_number(&self, number: BlockNumber) -> Option<BlockHash> {
        let mut state = self.state.write().await;
        let hash = state.blocks.get(&number)?.hash;
        // The hash was just read from the registry, pinning it cannot miss.
        if state.pin(hash).ok()? {
            debug!(%hash, number, "pinned block");
            self.notify(state.pinned);
        }
        Some(hash)
    }

    /// Returns the hash registered for `number`, turning a retired entry back into a
    /// transient one.
    pub async fn lookup_or_revive(&self, number: BlockNumber) -> Option<BlockHash> {
        let mut state = self.state.write().await;
        let hash = state.blocks.get(&number)?.hash;
        if state.retired == Some(hash) {
            state.retired = None;
        }
        Some(hash)
    }

    /// Returns the number and block registered under `hash`.
    pub async fn get(&self, hash: &BlockHash) -> Result<(BlockNumber, Arc<B>), ApiError> {
        self.entry(hash)
            .await
            .map(|(number, block, _)| (number, block))
            .ok_or(ApiError::MissingBlock(*hash))
    }

    /// Returns the number, block and slot registered under `hash`.
    pub async fn entry(&self, hash: &BlockHash) -> Option<(BlockNumber, Arc<B>, Slot)> {
        let state = self.state.read().await;
        let number = *state.hashes.get(hash)?;
        let entry = state.blocks.get(&number)?;
        Some((number, Arc::clone(&entry.block), state.slot(hash)))
    }

    /// Removes `hash` if it is a transient entry, returns true if it was removed.
    pub async fn evict_transient(&self, hash: &BlockHash) -> bool {
        let mut state = self.state.write().await;
        if state.slot(hash) != Slot::Transient {
            return false;
        }
        match state.hashes.remove(hash) {
            Some(number) => {
                state.blocks.remove(&number);
                true
            }
            None => false,
        }
    }

    /// Currently pinned hash.
    pub async fn pinned(&self) -> Option<BlockHash> {
        self.state.read().await.pinned
    }

    /// Previously pinned hash.
    pub async fn retired(&self) -> Option<BlockHash> {
        self.state.read().await.retired
    }

    /// Returns true if `hash` is registered.
    pub async fn contains(&self, hash: &BlockHash) -> bool {
        self.state.read().await.hashes.contains_key(hash)
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.blocks.len()
    }

    /// Returns true if the registry holds no entry.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns a receiver notified with every newly pinned hash.
    pub fn subscribe(&self) -> watch::Receiver<Option<BlockHash>> {
        self.notifier.subscribe()
    }

    fn notify(&self, pinned: Option<BlockHash>) {
        self.notifier.send_replace(pinned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> BlockHash {
        BlockHash([n; 32])
    }

    async fn registry_with(numbers: &[u8]) -> HashRegistry<String> {
        let registry = HashRegistry::new();
        for n in numbers {
            registry
                .put(hash(*n), *n as u64, format!("block-{n}"))
                .await;
        }
        registry
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let registry = registry_with(&[1]).await;
        registry.put(hash(1), 1, "block-1".to_string()).await;
        assert_eq!(registry.len().await, 1);
        let (number, block) = registry.get(&hash(1)).await.unwrap();
        assert_eq!(number, 1);
        assert_eq!(*block, "block-1");
    }

    #[tokio::test]
    async fn new_hash_for_known_number_overwrites() {
        let registry = registry_with(&[1]).await;
        registry.put(hash(9), 1, "other".to_string()).await;
        assert!(matches!(
            registry.get(&hash(1)).await,
            Err(ApiError::MissingBlock(h)) if h == hash(1)
        ));
        assert_eq!(registry.lookup_or_revive(1).await, Some(hash(9)));
        assert_eq!(registry.entry(&hash(9)).await.unwrap().2, Slot::Transient);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_hash_is_missing() {
        let registry = registry_with(&[]).await;
        assert!(matches!(
            registry.get(&hash(3)).await,
            Err(ApiError::MissingBlock(_))
        ));
        assert!(matches!(
            registry.pin(hash(3)).await,
            Err(ApiError::MissingBlock(_))
        ));
    }

    #[tokio::test]
    async fn pin_keeps_two_slots() {
        let registry = registry_with(&[1, 2, 3]).await;
        registry.pin(hash(1)).await.unwrap();
        assert_eq!(registry.len().await, 1);

        registry.put(hash(4), 4, "block-4".to_string()).await;
        registry.put(hash(5), 5, "block-5".to_string()).await;
        registry.pin(hash(5)).await.unwrap();

        assert_eq!(registry.pinned().await, Some(hash(5)));
        assert_eq!(registry.retired().await, Some(hash(1)));
        assert!(!registry.contains(&hash(4)).await);
        assert_eq!(registry.len().await, 2);

        registry.put(hash(6), 6, "block-6".to_string()).await;
        registry.pin(hash(6)).await.unwrap();
        assert!(!registry.contains(&hash(1)).await);
        assert_eq!(registry.retired().await, Some(hash(5)));
    }

    #[tokio::test]
    async fn repinning_is_a_noop() {
        let registry = registry_with(&[1, 2]).await;
        registry.pin(hash(1)).await.unwrap();
        registry.put(hash(2), 2, "block-2".to_string()).await;
        registry.pin(hash(2)).await.unwrap();
        registry.pin(hash(2)).await.unwrap();
        assert_eq!(registry.retired().await, Some(hash(1)));
    }

    #[tokio::test]
    async fn only_transient_entries_are_evicted() {
        let registry = registry_with(&[1, 2]).await;
        registry.put_pinned(hash(3), 3, "block-3".to_string()).await.unwrap();
        registry.put(hash(4), 4, "block-4".to_string()).await;
        assert!(!registry.evict_transient(&hash(3)).await);
        assert!(registry.evict_transient(&hash(4)).await);
        assert!(!registry.contains(&hash(4)).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn pin_by_number() {
        let registry = registry_with(&[1, 2]).await;
        assert_eq!(registry.pin_number(7).await, None);
        assert_eq!(registry.len().await, 2);

        assert_eq!(registry.pin_number(1).await, Some(hash(1)));
        assert_eq!(registry.pin_number(1).await, Some(hash(1)));
        assert!(!registry.contains(&hash(2)).await);
        assert_eq!(registry.retired().await, None);

        registry.put(hash(3), 3, "block-3".to_string()).await;
        assert_eq!(registry.pin_number(3).await, Some(hash(3)));
        assert_eq!(registry.retired().await, Some(hash(1)));
    }

    #[tokio::test]
    async fn lookup_by_number_revives_retired_entries() {
        let registry = registry_with(&[1]).await;
        registry.pin(hash(1)).await.unwrap();
        registry.put_pinned(hash(2), 2, "block-2".to_string()).await.unwrap();

        assert_eq!(registry.lookup_or_revive(2).await, Some(hash(2)));
        assert_eq!(registry.entry(&hash(2)).await.unwrap().2, Slot::Pinned);
        assert_eq!(registry.lookup_or_revive(1).await, Some(hash(1)));
        assert_eq!(registry.entry(&hash(1)).await.unwrap().2, Slot::Transient);
        assert!(registry.evict_transient(&hash(1)).await);
        assert_eq!(registry.lookup_or_revive(5).await, None);
    }

    #[tokio::test]
    async fn subscribers_see_pins() {
        let registry = registry_with(&[1]).await;
        let mut receiver = registry.subscribe();
        registry.pin(hash(1)).await.unwrap();
        receiver.changed().await.unwrap();
        assert_eq!(*receiver.borrow(), Some(hash(1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_see_a_half_evicted_state() {
        let registry = registry_with(&[0]).await;
        registry.pin(hash(0)).await.unwrap();

        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for n in 1..=100u8 {
                    registry
                        .put_pinned(hash(n), n as u64, format!("block-{n}"))
                        .await
                        .unwrap();
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    if let Some(pinned) = registry.pinned().await {
                        match registry.get(&pinned).await {
                            Ok((number, block)) => {
                                assert_eq!(*block, format!("block-{number}"));
                                assert_eq!(pinned, hash(number as u8));
                            }
                            Err(ApiError::MissingBlock(_)) => {}
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                    assert!(registry.len().await <= 2);
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(registry.pinned().await, Some(hash(100)));
        assert_eq!(registry.retired().await, Some(hash(99)));
    }
}
