// Partition Cache: reuse compiled partitions for identical declarations
//
// Cache key is a SHA-256 fingerprint of the declaration list and the options
// it was compiled with.

use crate::compiler::pipeline::{compile_graph, CompiledPartition};
use crate::core::context::{CompileContext, PartitionOptions};
use crate::core::error::Result;
use crate::ir::{AttrValue, GraphDecl, OpDecl};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cache key for compiled partitions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: [u8; 32],
}

impl CacheKey {
    pub fn new(decl: &GraphDecl, options: &PartitionOptions) -> Self {
        let mut hasher = Sha256::new();
        hash_str(&mut hasher, &decl.name);
        hash_str(&mut hasher, &format!("{:?}", options));
        hasher.update((decl.ops.len() as u64).to_le_bytes());
        for op in &decl.ops {
            Self::hash_op(&mut hasher, op);
        }

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hasher.finalize());
        Self { hash }
    }

    fn hash_op(hasher: &mut Sha256, op: &OpDecl) {
        hash_str(hasher, &op.name);
        hash_str(hasher, &op.op);
        hasher.update((op.inputs.len() as u64).to_le_bytes());
        for input in &op.inputs {
            hash_str(hasher, &input.name);
            hasher.update(input.output.to_le_bytes());
            hasher.update([input.backedge as u8]);
        }
        hasher.update((op.attributes.len() as u64).to_le_bytes());
        for attr in &op.attributes {
            hash_str(hasher, &attr.name);
            match &attr.value {
                AttrValue::Str(s) => {
                    hasher.update([0u8]);
                    hash_str(hasher, s);
                }
                other => {
                    hasher.update([1u8]);
                    hash_str(hasher, &format!("{:?}", other));
                }
            }
        }
        hash_str(hasher, &format!("{:?}", op.hint));
    }

    /// Hex digest, for logs
    pub fn hex(&self) -> String {
        self.hash.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Length-prefixed so adjacent fields cannot run into each other
fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// Cached partition with usage count
#[derive(Clone)]
pub struct CachedPartition {
    pub partition: Arc<CompiledPartition>,
    pub use_count: usize,
}

/// Partition cache with least-used eviction
pub struct PartitionCache {
    cache: Mutex<HashMap<CacheKey, CachedPartition>>,
    max_entries: usize,
    hits: Mutex<usize>,
    misses: Mutex<usize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PartitionCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompiledPartition>> {
        let mut cache = lock(&self.cache);
        match cache.get_mut(key) {
            Some(entry) => {
                entry.use_count += 1;
                *lock(&self.hits) += 1;
                Some(entry.partition.clone())
            }
            None => {
                *lock(&self.misses) += 1;
                None
            }
        }
    }

    pub fn insert(&self, key: CacheKey, partition: Arc<CompiledPartition>) {
        let mut cache = lock(&self.cache);
        while cache.len() >= self.max_entries && !cache.contains_key(&key) {
            Self::evict_least_used(&mut cache);
        }
        cache.insert(
            key,
            CachedPartition {
                partition,
                use_count: 1,
            },
        );
    }

    fn evict_least_used(cache: &mut HashMap<CacheKey, CachedPartition>) {
        if let Some(key) = cache
            .iter()
            .min_by_key(|(_, entry)| entry.use_count)
            .map(|(k, _)| k.clone())
        {
            log::trace!("Evicting cached partition {}", key.hex());
            cache.remove(&key);
        }
    }

    pub fn clear(&self) {
        lock(&self.cache).clear();
        *lock(&self.hits) = 0;
        *lock(&self.misses) = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            num_entries: lock(&self.cache).len(),
            max_entries: self.max_entries,
            hits: *lock(&self.hits),
            misses: *lock(&self.misses),
        }
    }
}

impl Default for PartitionCache {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub num_entries: usize,
    pub max_entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Compiles declarations, reusing earlier results for identical input
pub struct Compiler {
    options: PartitionOptions,
    cache: PartitionCache,
}

impl Compiler {
    pub fn new(options: PartitionOptions) -> Self {
        Self {
            options,
            cache: PartitionCache::default(),
        }
    }

    pub fn with_cache(options: PartitionOptions, cache: PartitionCache) -> Self {
        Self { options, cache }
    }

    pub fn options(&self) -> &PartitionOptions {
        &self.options
    }

    pub fn cache(&self) -> &PartitionCache {
        &self.cache
    }

    pub fn compile(&self, decl: &GraphDecl) -> Result<Arc<CompiledPartition>> {
        let key = CacheKey::new(decl, &self.options);
        if let Some(hit) = self.cache.get(&key) {
            log::debug!("Partition cache hit for '{}' ({})", decl.name, key.hex());
            return Ok(hit);
        }

        let mut ctx = CompileContext::new(self.options);
        let compiled = Arc::new(compile_graph(decl, &mut ctx)?);
        self.cache.insert(key, compiled.clone());
        Ok(compiled)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(PartitionOptions::default())
    }
}
