// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use std::{collections::HashSet, rc::Rc};

use ash::vk;
use vkcache_util::Clock;

use crate::{
    descriptor::is_exhaustion, validate, CacheCategory, CacheStats, CleanupReport,
    ComputePipelineKey, Config, DescriptorPool, DescriptorSetLayoutKey, DescriptorWrite, Driver,
    Error, GraphicsPipelineKey, ObjectCache, PipelineLayoutKey, PoolCapacity, Result, Thresholds,
    UsageStats,
};

/// Descriptor sets currently lent out against a layout
pub type ActiveSets = Vec<vk::DescriptorSet>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineUsageStats {
    pub graphics_pipelines: CacheStats,
    pub compute_pipelines: CacheStats,
    pub pipeline_layouts: CacheStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub max_sets: u32,
    pub allocated: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutUsageStats {
    pub descriptor_set_layouts: CacheStats,
    pub active_sets: usize,
    pub pool: PoolStats,
}

/// Owns the four object caches and the shared descriptor pool.
///
/// Every call must come from the same thread, usually the one recording command buffers.
/// Cleanup only happens when asked, so destruction stays in step with submission:
/// callers must make sure nothing in flight still uses what a cleanup may destroy.
pub struct PipelineManager<D: Driver> {
    config: Config,
    pool: DescriptorPool<D>,
    graphics_pipelines: ObjectCache<GraphicsPipelineKey, vk::Pipeline>,
    compute_pipelines: ObjectCache<ComputePipelineKey, vk::Pipeline>,
    pipeline_layouts: ObjectCache<PipelineLayoutKey, vk::PipelineLayout>,
    set_layouts: ObjectCache<DescriptorSetLayoutKey, vk::DescriptorSetLayout, ActiveSets>,
    clock: Rc<dyn Clock>,
    driver: Rc<D>,
}

impl<D: Driver> PipelineManager<D> {
    pub fn new(driver: &Rc<D>, clock: Rc<dyn Clock>, config: Config) -> Result<Self> {
        let capacity = PoolCapacity::new(config.sets_per_category, config.descriptors_per_type);
        let pool = DescriptorPool::new(driver, capacity)?;

        Ok(Self {
            config,
            pool,
            graphics_pipelines: ObjectCache::new(CacheCategory::GraphicsPipeline),
            compute_pipelines: ObjectCache::new(CacheCategory::ComputePipeline),
            pipeline_layouts: ObjectCache::new(CacheCategory::PipelineLayout),
            set_layouts: ObjectCache::new(CacheCategory::DescriptorSetLayout),
            clock,
            driver: driver.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn get_pipeline_layout(&mut self, key: &PipelineLayoutKey) -> Result<vk::PipelineLayout> {
        let driver = &self.driver;
        self.pipeline_layouts
            .get_or_create(key, self.clock.as_ref(), |key| {
                validate::pipeline_layout(key, driver.max_push_constants_size())?;
                driver
                    .create_pipeline_layout(key)
                    .map_err(|result| creation_failed(CacheCategory::PipelineLayout, result))
            })
    }

    pub fn get_graphics_pipeline(&mut self, key: &GraphicsPipelineKey) -> Result<vk::Pipeline> {
        let driver = &self.driver;
        self.graphics_pipelines
            .get_or_create(key, self.clock.as_ref(), |key| {
                validate::graphics_pipeline(key)?;
                driver
                    .create_graphics_pipeline(key)
                    .map_err(|result| creation_failed(CacheCategory::GraphicsPipeline, result))
            })
    }

    pub fn get_compute_pipeline(&mut self, key: &ComputePipelineKey) -> Result<vk::Pipeline> {
        let driver = &self.driver;
        self.compute_pipelines
            .get_or_create(key, self.clock.as_ref(), |key| {
                validate::compute_pipeline(key)?;
                driver
                    .create_compute_pipeline(key)
                    .map_err(|result| creation_failed(CacheCategory::ComputePipeline, result))
            })
    }

    pub fn get_descriptor_set_layout(
        &mut self,
        key: &DescriptorSetLayoutKey,
    ) -> Result<vk::DescriptorSetLayout> {
        let driver = &self.driver;
        self.set_layouts
            .get_or_create(key, self.clock.as_ref(), |key| {
                validate::descriptor_set_layout(key)?;
                driver
                    .create_descriptor_set_layout(key)
                    .map_err(|result| creation_failed(CacheCategory::DescriptorSetLayout, result))
            })
    }

    /// Allocates a set from the shared pool against a layout owned by this manager.
    ///
    /// When the pool is full, cold layouts are cleaned up first. If that does not
    /// help, the whole pool is recreated and the allocation retried once.
    /// Recreation invalidates every set allocated before it.
    pub fn allocate_descriptor_set(
        &mut self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        if self.set_layouts.entry_by_handle(layout).is_none() {
            return Err(Error::UnknownLayout(layout));
        }

        match self.pool.allocate(layout) {
            Ok(set) => return self.lend(layout, set),
            Err(result) if !is_exhaustion(result) => return Err(Error::Pool(result)),
            Err(result) => log::warn!(
                "Vulkan descriptor pool is full ({}), cleaning up unused layouts",
                result
            ),
        }

        // The layout asked for stays, whatever its usage
        let report = self.cleanup_layouts(Some(layout));
        if report.descriptor_sets_freed > 0 {
            match self.pool.allocate(layout) {
                Ok(set) => return self.lend(layout, set),
                Err(result) if !is_exhaustion(result) => return Err(Error::Pool(result)),
                Err(_) => (),
            }
        }

        self.recreate_pool()?;
        match self.pool.allocate(layout) {
            Ok(set) => self.lend(layout, set),
            Err(result) if is_exhaustion(result) => Err(Error::PoolExhausted {
                capacity: self.pool.capacity().max_sets,
            }),
            Err(result) => Err(Error::Pool(result)),
        }
    }

    /// Only a set actually handed out counts as a use of its layout
    fn lend(
        &mut self,
        layout: vk::DescriptorSetLayout,
        set: vk::DescriptorSet,
    ) -> Result<vk::DescriptorSet> {
        let now = self.clock.now();
        match self.set_layouts.entry_by_handle_mut(layout) {
            Some(entry) => {
                entry.usage.touch(now);
                entry.extra.push(set);
                Ok(set)
            }
            None => {
                // The layout went away while making room for this set
                self.pool.free(set)?;
                Err(Error::UnknownLayout(layout))
            }
        }
    }

    fn recreate_pool(&mut self) -> Result<()> {
        self.pool.recreate()?;
        for (_, entry) in self.set_layouts.iter_mut() {
            entry.extra.clear();
        }
        Ok(())
    }

    /// Drops invalid writes with a warning and submits the rest.
    /// Returns how many writes were submitted.
    pub fn update_descriptor_set(
        &mut self,
        set: vk::DescriptorSet,
        writes: &[DescriptorWrite],
    ) -> Result<usize> {
        if self.pool.owner(set).is_none() {
            return Err(Error::UnknownDescriptorSet(set));
        }

        let valid: Vec<DescriptorWrite> = writes
            .iter()
            .filter(|write| match write.validate() {
                Ok(()) => true,
                Err(reason) => {
                    log::warn!(
                        "Discarding write to binding {} of descriptor set {:?}: {}",
                        write.binding,
                        set,
                        reason
                    );
                    false
                }
            })
            .cloned()
            .collect();

        if !valid.is_empty() {
            self.driver.update_descriptor_set(set, &valid);
        }
        Ok(valid.len())
    }

    /// Returns a set to the pool. Pool capacity never shrinks.
    pub fn free_descriptor_set(&mut self, set: vk::DescriptorSet) -> Result<()> {
        let layout = self.pool.free(set)?;
        if let Some(entry) = self.set_layouts.entry_by_handle_mut(layout) {
            entry.extra.retain(|active| *active != set);
        }
        Ok(())
    }

    fn thresholds(&self) -> Thresholds {
        let pressure = self.graphics_pipelines.len()
            + self.compute_pipelines.len()
            + self.pipeline_layouts.len();
        Thresholds::adjusted(&self.config, pressure)
    }

    /// Destroys cold graphics pipelines, compute pipelines, and pipeline layouts
    pub fn cleanup_unused_pipelines(&mut self) -> CleanupReport {
        let now = self.clock.now();
        let thresholds = self.thresholds();
        let driver = &self.driver;
        let mut report = CleanupReport::default();

        let category = CacheCategory::GraphicsPipeline;
        let destroyed = self.graphics_pipelines.evict_where(
            |_, entry| thresholds.is_candidate(category, &entry.usage, now),
            |_, entry| driver.destroy_pipeline(entry.handle),
        );
        report.record(category, destroyed);

        let category = CacheCategory::ComputePipeline;
        let destroyed = self.compute_pipelines.evict_where(
            |_, entry| thresholds.is_candidate(category, &entry.usage, now),
            |_, entry| driver.destroy_pipeline(entry.handle),
        );
        report.record(category, destroyed);

        // A layout outlives every cached pipeline built on it
        let in_use: HashSet<vk::PipelineLayout> = self
            .graphics_pipelines
            .iter()
            .map(|(key, _)| key.layout)
            .chain(self.compute_pipelines.iter().map(|(key, _)| key.layout))
            .collect();

        let category = CacheCategory::PipelineLayout;
        let destroyed = self.pipeline_layouts.evict_where(
            |_, entry| {
                !in_use.contains(&entry.handle)
                    && thresholds.is_candidate(category, &entry.usage, now)
            },
            |_, entry| driver.destroy_pipeline_layout(entry.handle),
        );
        report.record(category, destroyed);

        log_report("pipelines", &report);
        report
    }

    /// Destroys cold descriptor set layouts with few enough outstanding sets.
    /// Those sets go back to the pool first.
    /// Layouts still referenced by a cached pipeline layout are kept.
    pub fn cleanup_unused_layouts(&mut self) -> CleanupReport {
        self.cleanup_layouts(None)
    }

    fn cleanup_layouts(&mut self, keep: Option<vk::DescriptorSetLayout>) -> CleanupReport {
        let now = self.clock.now();
        let mut in_use: HashSet<vk::DescriptorSetLayout> = self
            .pipeline_layouts
            .iter()
            .flat_map(|(key, _)| key.set_layouts.iter().copied())
            .collect();
        in_use.extend(keep);
        let thresholds = self.thresholds();
        let max_active_sets = self.config.max_active_sets_for_eviction;
        let driver = &self.driver;
        let pool = &mut self.pool;
        let mut report = CleanupReport::default();
        let mut freed = 0;

        let category = CacheCategory::DescriptorSetLayout;
        let destroyed = self.set_layouts.evict_where(
            |_, entry| {
                !in_use.contains(&entry.handle)
                    && entry.extra.len() <= max_active_sets
                    && thresholds.is_candidate(category, &entry.usage, now)
            },
            |_, entry| {
                for set in entry.extra.drain(..) {
                    match pool.free(set) {
                        Ok(_) => freed += 1,
                        Err(err) => log::warn!("Failed to free descriptor set {:?}: {}", set, err),
                    }
                }
                driver.destroy_descriptor_set_layout(entry.handle);
            },
        );
        report.record(category, destroyed);
        report.descriptor_sets_freed = freed;

        log_report("layouts", &report);
        report
    }

    pub fn pipeline_usage_stats(&self) -> PipelineUsageStats {
        let now = self.clock.now();
        PipelineUsageStats {
            graphics_pipelines: self.graphics_pipelines.stats(now),
            compute_pipelines: self.compute_pipelines.stats(now),
            pipeline_layouts: self.pipeline_layouts.stats(now),
        }
    }

    pub fn layout_usage_stats(&self) -> LayoutUsageStats {
        let now = self.clock.now();
        LayoutUsageStats {
            descriptor_set_layouts: self.set_layouts.stats(now),
            active_sets: self.set_layouts.iter().map(|(_, e)| e.extra.len()).sum(),
            pool: PoolStats {
                max_sets: self.pool.capacity().max_sets,
                allocated: self.pool.allocated(),
                generation: self.pool.generation(),
            },
        }
    }

    pub fn pipeline_layout_usage(&self, key: &PipelineLayoutKey) -> Option<UsageStats> {
        self.pipeline_layouts.usage(key)
    }

    pub fn graphics_pipeline_usage(&self, key: &GraphicsPipelineKey) -> Option<UsageStats> {
        self.graphics_pipelines.usage(key)
    }

    pub fn compute_pipeline_usage(&self, key: &ComputePipelineKey) -> Option<UsageStats> {
        self.compute_pipelines.usage(key)
    }

    pub fn descriptor_set_layout_usage(&self, key: &DescriptorSetLayoutKey) -> Option<UsageStats> {
        self.set_layouts.usage(key)
    }

    /// Sets currently lent out against `layout`
    pub fn active_sets(&self, layout: vk::DescriptorSetLayout) -> Option<&[vk::DescriptorSet]> {
        self.set_layouts
            .entry_by_handle(layout)
            .map(|entry| entry.extra.as_slice())
    }

    /// How many times the descriptor pool has been recreated
    pub fn pool_generation(&self) -> u64 {
        self.pool.generation()
    }

    fn destroy_all(&mut self) {
        // Sets and their pool go first, then pipelines, then what they were built from
        self.pool.destroy();
        for entry in self.graphics_pipelines.drain() {
            self.driver.destroy_pipeline(entry.handle);
        }
        for entry in self.compute_pipelines.drain() {
            self.driver.destroy_pipeline(entry.handle);
        }
        for entry in self.pipeline_layouts.drain() {
            self.driver.destroy_pipeline_layout(entry.handle);
        }
        for entry in self.set_layouts.drain() {
            self.driver.destroy_descriptor_set_layout(entry.handle);
        }
    }

    /// Destroys every cached object and the pool, then starts over with an empty pool.
    /// Meant for device loss: nothing is rebuilt, keys simply miss again.
    pub fn flush(&mut self) -> Result<()> {
        log::warn!("Flushing every cached pipeline, layout, and descriptor set");
        self.destroy_all();
        self.pool.recreate().map(|_| ())
    }
}

impl<D: Driver> Drop for PipelineManager<D> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

fn creation_failed(category: CacheCategory, result: vk::Result) -> Error {
    log::error!("Failed to create Vulkan {}: {}", category, result);
    Error::Creation { category, result }
}

fn log_report(what: &str, report: &CleanupReport) {
    if report.is_empty() {
        log::debug!("Cleanup of unused {} reclaimed nothing, thresholds may be off", what);
    } else {
        log::debug!("Cleanup of unused {}: {:?}", what, report);
    }
}
