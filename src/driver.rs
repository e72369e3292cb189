// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use ash::{prelude::VkResult, vk};

use crate::{
    ComputePipelineKey, DescriptorSetLayoutKey, DescriptorWrite, GraphicsPipelineKey,
    PipelineLayoutKey, PoolCapacity,
};

/// Everything the caches need from the graphics device.
/// Creation calls are synchronous and only happen on a cache miss.
pub trait Driver {
    /// Device limit on the total size of push constants
    fn max_push_constants_size(&self) -> u32;

    fn create_pipeline_layout(&self, key: &PipelineLayoutKey) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    fn create_graphics_pipeline(&self, key: &GraphicsPipelineKey) -> VkResult<vk::Pipeline>;
    fn create_compute_pipeline(&self, key: &ComputePipelineKey) -> VkResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_descriptor_set_layout(
        &self,
        key: &DescriptorSetLayoutKey,
    ) -> VkResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// Destroying a pool frees every set allocated from it
    fn create_descriptor_pool(&self, capacity: &PoolCapacity) -> VkResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Fails with `ERROR_OUT_OF_POOL_MEMORY` or `ERROR_FRAGMENTED_POOL` when the pool is full
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet)
        -> VkResult<()>;

    /// `writes` have already been validated
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);
}
