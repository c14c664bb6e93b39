//! Uncompressed-block cache (§5: "the uncompressed-block cache is accessed
//! under a per-entry futex so a cache miss does not block sibling
//! entries"), adapted from the teacher's `RecordCache`
//! (`crates/types/src/logs/record_cache.rs`), a `moka`-backed LRU. The key
//! shape changes from `(LogletId, LogletOffset)` to `(PartId, column,
//! mark)`; `moka::sync::Cache`'s internal per-key striping is what gives us
//! the non-blocking-sibling-entries property for free.

use moka::sync::{Cache, CacheBuilder};
use moka::policy::EvictionPolicy;

use crate::ids::{MarkIndex, PartId};

type BlockKey = (PartId, String, MarkIndex);

/// A decoded column granule, cached by `(part, column, mark)`.
#[derive(Clone)]
pub struct CachedBlock {
    pub bytes: std::sync::Arc<[u8]>,
}

impl CachedBlock {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// LRU cache of decoded granules, shared across all read streams of a
/// MergeTree table. Disabled (every `get` misses, every `insert` is a
/// no-op) when `memory_budget_bytes == 0`.
#[derive(Clone)]
pub struct BlockCache {
    inner: Option<Cache<BlockKey, CachedBlock>>,
}

impl BlockCache {
    pub fn new(memory_budget_bytes: u64) -> Self {
        let inner = if memory_budget_bytes > 0 {
            Some(
                CacheBuilder::new(memory_budget_bytes)
                    .name("MergeTreeUncompressedBlockCache")
                    .weigher(|key: &BlockKey, value: &CachedBlock| {
                        let key_weight = key.0 .0.len() + key.1.len() + 4;
                        (key_weight + value.len()).try_into().unwrap_or(u32::MAX)
                    })
                    .eviction_policy(EvictionPolicy::lru())
                    .build(),
            )
        } else {
            None
        };
        Self { inner }
    }

    pub fn get(&self, part: &PartId, column: &str, mark: MarkIndex) -> Option<CachedBlock> {
        let inner = self.inner.as_ref()?;
        inner.get(&(part.clone(), column.to_owned(), mark))
    }

    pub fn insert(&self, part: PartId, column: &str, mark: MarkIndex, block: CachedBlock) {
        let Some(ref inner) = self.inner else {
            return;
        };
        inner.insert((part, column.to_owned(), mark), block);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map(Cache::entry_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn disabled_cache_never_retains() {
        let cache = BlockCache::new(0);
        cache.insert(
            PartId("p0".into()),
            "col",
            MarkIndex(0),
            CachedBlock {
                bytes: Arc::from(vec![1, 2, 3]),
            },
        );
        assert!(cache.get(&PartId("p0".into()), "col", MarkIndex(0)).is_none());
    }

    #[test]
    fn enabled_cache_roundtrips() {
        let cache = BlockCache::new(1 << 20);
        let part = PartId("p0".into());
        cache.insert(
            part.clone(),
            "col",
            MarkIndex(3),
            CachedBlock {
                bytes: Arc::from(vec![9, 9, 9, 9]),
            },
        );
        let got = cache.get(&part, "col", MarkIndex(3)).unwrap();
        assert_eq!(&*got.bytes, &[9, 9, 9, 9]);
    }
}
