// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use std::{
    collections::HashMap,
    fmt,
    hash::Hash,
    time::{Duration, Instant},
};

use enum_ordinalize::*;
use variant_count::*;
use vkcache_util::{Clock, Timer};

use crate::Result;

/// Kind of object stored by a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantCount, Ordinalize)]
pub enum CacheCategory {
    GraphicsPipeline,
    ComputePipeline,
    PipelineLayout,
    DescriptorSetLayout,
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CacheCategory::GraphicsPipeline => "graphics pipeline",
            CacheCategory::ComputePipeline => "compute pipeline",
            CacheCategory::PipelineLayout => "pipeline layout",
            CacheCategory::DescriptorSetLayout => "descriptor set layout",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageStats {
    pub use_count: u64,
    pub last_used: Instant,
}

impl UsageStats {
    fn first(now: Instant) -> Self {
        Self {
            use_count: 1,
            last_used: now,
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.use_count += 1;
        self.last_used = now;
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }
}

/// One record per key, so handle and usage can never go out of sync
#[derive(Debug)]
pub struct CacheEntry<H, X = ()> {
    pub handle: H,
    pub usage: UsageStats,
    /// Per-category bookkeeping, such as the sets lent out against a layout
    pub extra: X,
}

/// Summary of a cache at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_uses: u64,
    pub max_use_count: u64,
    pub oldest_age: Option<Duration>,
}

/// Hash map from structural key to the native handle created for it.
/// The cache owns its handles, but never calls the driver itself:
/// creation is handed in by the caller and destruction handed out on eviction.
pub struct ObjectCache<K, H, X = ()> {
    category: CacheCategory,
    entries: HashMap<K, CacheEntry<H, X>>,
    /// Reverse index kept in step with `entries`
    keys: HashMap<H, K>,
}

impl<K, H, X> ObjectCache<K, H, X>
where
    K: Hash + Eq + Clone,
    H: Hash + Eq + Copy + fmt::Debug,
    X: Default,
{
    pub fn new(category: CacheCategory) -> Self {
        Self {
            category,
            entries: HashMap::new(),
            keys: HashMap::new(),
        }
    }

    pub fn category(&self) -> CacheCategory {
        self.category
    }

    /// Returns the handle for `key`, calling `create` only on a miss.
    /// A failed creation leaves the cache untouched.
    pub fn get_or_create<F>(&mut self, key: &K, clock: &dyn Clock, create: F) -> Result<H>
    where
        F: FnOnce(&K) -> Result<H>,
    {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.usage.touch(clock.now());
            return Ok(entry.handle);
        }

        let mut timer = Timer::new(clock);
        let handle = create(key)?;
        log::debug!(
            "Created {} {:?} in {:?}",
            self.category,
            handle,
            timer.get_delta()
        );

        self.keys.insert(handle, key.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                handle,
                usage: UsageStats::first(timer.get_prev()),
                extra: X::default(),
            },
        );
        Ok(handle)
    }

    /// Looks up a handle without counting it as a use
    pub fn get(&self, key: &K) -> Option<H> {
        self.entries.get(key).map(|entry| entry.handle)
    }

    pub fn usage(&self, key: &K) -> Option<UsageStats> {
        self.entries.get(key).map(|entry| entry.usage)
    }

    pub fn key_of(&self, handle: H) -> Option<&K> {
        self.keys.get(&handle)
    }

    pub fn entry_by_handle(&self, handle: H) -> Option<&CacheEntry<H, X>> {
        let key = self.keys.get(&handle)?;
        self.entries.get(key)
    }

    pub fn entry_by_handle_mut(&mut self, handle: H) -> Option<&mut CacheEntry<H, X>> {
        let key = self.keys.get(&handle)?;
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &CacheEntry<H, X>)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut CacheEntry<H, X>)> {
        self.entries.iter_mut()
    }

    pub fn stats(&self, now: Instant) -> CacheStats {
        let mut stats = CacheStats {
            entries: self.entries.len(),
            ..Default::default()
        };
        for entry in self.entries.values() {
            stats.total_uses += entry.usage.use_count;
            stats.max_use_count = stats.max_use_count.max(entry.usage.use_count);
            let age = entry.usage.age(now);
            stats.oldest_age = Some(stats.oldest_age.map_or(age, |oldest| oldest.max(age)));
        }
        stats
    }

    /// Removes every entry matching `predicate`, handing it to `destroy` first.
    /// Built on `retain`, so each entry is visited exactly once.
    /// Returns how many entries were removed.
    pub fn evict_where<P, D>(&mut self, mut predicate: P, mut destroy: D) -> usize
    where
        P: FnMut(&K, &CacheEntry<H, X>) -> bool,
        D: FnMut(&K, &mut CacheEntry<H, X>),
    {
        let keys = &mut self.keys;
        let before = self.entries.len();
        self.entries.retain(|key, entry| {
            if predicate(key, entry) {
                destroy(key, entry);
                keys.remove(&entry.handle);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }

    /// Empties the cache, returning every entry for destruction
    pub fn drain(&mut self) -> Vec<CacheEntry<H, X>> {
        self.keys.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }
}
