// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use std::time::Duration;

/// Tuning knobs for caches, eviction, and the descriptor pool
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Entries used fewer times than this may be evicted
    pub use_threshold: u64,
    /// Entries unused for longer than this may be evicted
    pub time_threshold: Duration,
    /// Above this many pipelines and pipeline layouts both thresholds are halved
    pub high_water_mark: usize,
    /// A descriptor set layout with more outstanding sets than this is never evicted
    pub max_active_sets_for_eviction: usize,
    /// Descriptor sets per descriptor type category in the shared pool
    pub sets_per_category: u32,
    /// Descriptors of each supported type in the shared pool
    pub descriptors_per_type: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_threshold: 8,
            time_threshold: Duration::from_secs(30),
            high_water_mark: 256,
            max_active_sets_for_eviction: 0,
            sets_per_category: 64,
            descriptors_per_type: 128,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_threshold(mut self, use_threshold: u64) -> Self {
        self.use_threshold = use_threshold;
        self
    }

    pub fn time_threshold(mut self, time_threshold: Duration) -> Self {
        self.time_threshold = time_threshold;
        self
    }

    pub fn high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    pub fn max_active_sets_for_eviction(mut self, max: usize) -> Self {
        self.max_active_sets_for_eviction = max;
        self
    }

    pub fn sets_per_category(mut self, sets_per_category: u32) -> Self {
        self.sets_per_category = sets_per_category;
        self
    }

    pub fn descriptors_per_type(mut self, descriptors_per_type: u32) -> Self {
        self.descriptors_per_type = descriptors_per_type;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder() {
        let config = Config::new()
            .use_threshold(2)
            .time_threshold(Duration::from_secs(1))
            .sets_per_category(4);
        assert_eq!(config.use_threshold, 2);
        assert_eq!(config.time_threshold, Duration::from_secs(1));
        assert_eq!(config.sets_per_category, 4);
        assert_eq!(config.high_water_mark, Config::default().high_water_mark);
    }
}
