// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use std::time::{Duration, Instant};

use crate::{CacheCategory, Config, UsageStats};

/// A second, more aggressive rule: an entry used less than `fraction` of the use
/// threshold and older than `multiple` of the time threshold is evicted as well.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondaryRule {
    pub fraction: f64,
    pub multiple: f64,
}

impl CacheCategory {
    /// Cheaper objects get the more eager rule, descriptor set layouts get none
    pub fn secondary_rule(self) -> Option<SecondaryRule> {
        match self {
            // Contained in the primary rule: graphics pipelines only go through that one
            CacheCategory::GraphicsPipeline => Some(SecondaryRule {
                fraction: 1.0 / 4.0,
                multiple: 1.5,
            }),
            CacheCategory::ComputePipeline => Some(SecondaryRule {
                fraction: 1.0 / 3.0,
                multiple: 2.0 / 3.0,
            }),
            CacheCategory::PipelineLayout => Some(SecondaryRule {
                fraction: 1.0 / 2.0,
                multiple: 0.5,
            }),
            CacheCategory::DescriptorSetLayout => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub use_count: u64,
    pub age: Duration,
}

impl Thresholds {
    /// Base thresholds from `config`, halved when `pressure` is above the high-water mark
    pub fn adjusted(config: &Config, pressure: usize) -> Self {
        let thresholds = Self {
            use_count: config.use_threshold,
            age: config.time_threshold,
        };
        if pressure > config.high_water_mark {
            log::debug!(
                "{} cached pipeline objects above the mark of {}, halving eviction thresholds",
                pressure,
                config.high_water_mark
            );
            Self {
                use_count: thresholds.use_count / 2,
                age: thresholds.age / 2,
            }
        } else {
            thresholds
        }
    }

    pub fn is_candidate(&self, category: CacheCategory, usage: &UsageStats, now: Instant) -> bool {
        let age = usage.age(now);
        if usage.use_count < self.use_count && age > self.age {
            return true;
        }

        match category.secondary_rule() {
            Some(rule) => {
                (usage.use_count as f64) < self.use_count as f64 * rule.fraction
                    && age > self.age.mul_f64(rule.multiple)
            }
            None => false,
        }
    }
}

/// What a cleanup pass destroyed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    destroyed: [usize; CacheCategory::VARIANT_COUNT],
    /// Descriptor sets returned to the pool along with their layouts
    pub descriptor_sets_freed: usize,
}

impl CleanupReport {
    pub fn record(&mut self, category: CacheCategory, count: usize) {
        self.destroyed[category.ordinal() as usize] += count;
    }

    pub fn get(&self, category: CacheCategory) -> usize {
        self.destroyed[category.ordinal() as usize]
    }

    pub fn total(&self) -> usize {
        self.destroyed.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0 && self.descriptor_sets_freed == 0
    }

    pub fn merge(&mut self, other: &CleanupReport) {
        for category in CacheCategory::variants().iter() {
            self.record(*category, other.get(*category));
        }
        self.descriptor_sets_freed += other.descriptor_sets_freed;
    }
}
