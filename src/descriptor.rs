// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use std::{collections::HashMap, rc::Rc};

use ash::{prelude::VkResult, vk};

use crate::{Driver, Error, Result};

/// Descriptor types the shared pool provides room for
pub const DESCRIPTOR_TYPE_CATEGORIES: [vk::DescriptorType; 11] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// Whether a failed allocation means the pool is full rather than broken
pub fn is_exhaustion(result: vk::Result) -> bool {
    result == vk::Result::ERROR_OUT_OF_POOL_MEMORY || result == vk::Result::ERROR_FRAGMENTED_POOL
}

/// Size of the shared pool, fixed for its whole life
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCapacity {
    pub max_sets: u32,
    pub sizes: Vec<(vk::DescriptorType, u32)>,
}

impl PoolCapacity {
    /// `sets_per_category`: How many sets for each descriptor type category
    /// `descriptors_per_type`: How many descriptors of each type among all sets
    pub fn new(sets_per_category: u32, descriptors_per_type: u32) -> Self {
        let categories = DESCRIPTOR_TYPE_CATEGORIES.len() as u32;
        Self {
            max_sets: sets_per_category * categories,
            sizes: DESCRIPTOR_TYPE_CATEGORIES
                .iter()
                .map(|ty| (*ty, descriptors_per_type))
                .collect(),
        }
    }

    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        self.sizes
            .iter()
            .map(|(ty, count)| {
                vk::DescriptorPoolSize::builder()
                    .ty(*ty)
                    .descriptor_count(*count)
                    .build()
            })
            .collect()
    }
}

/// Which info list a descriptor type reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorInfo {
    Buffer,
    Image,
    TexelBuffer,
}

impl DescriptorInfo {
    /// `None` for types the shared pool has no room for
    pub fn of(descriptor_type: vk::DescriptorType) -> Option<Self> {
        match descriptor_type {
            vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => Some(DescriptorInfo::Buffer),
            vk::DescriptorType::SAMPLER
            | vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::INPUT_ATTACHMENT => Some(DescriptorInfo::Image),
            vk::DescriptorType::UNIFORM_TEXEL_BUFFER | vk::DescriptorType::STORAGE_TEXEL_BUFFER => {
                Some(DescriptorInfo::TexelBuffer)
            }
            _ => None,
        }
    }
}

/// One write into a descriptor set.
/// Only the info list matching `descriptor_type` is read.
#[derive(Debug, Clone)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub buffer_info: Vec<vk::DescriptorBufferInfo>,
    pub image_info: Vec<vk::DescriptorImageInfo>,
    pub texel_buffer_views: Vec<vk::BufferView>,
}

impl DescriptorWrite {
    fn empty(binding: u32, descriptor_type: vk::DescriptorType, count: u32) -> Self {
        Self {
            binding,
            array_element: 0,
            descriptor_type,
            count,
            buffer_info: vec![],
            image_info: vec![],
            texel_buffer_views: vec![],
        }
    }

    pub fn buffer(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer_info: Vec<vk::DescriptorBufferInfo>,
    ) -> Self {
        let mut write = Self::empty(binding, descriptor_type, buffer_info.len() as u32);
        write.buffer_info = buffer_info;
        write
    }

    pub fn image(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        image_info: Vec<vk::DescriptorImageInfo>,
    ) -> Self {
        let mut write = Self::empty(binding, descriptor_type, image_info.len() as u32);
        write.image_info = image_info;
        write
    }

    pub fn texel_buffer(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        views: Vec<vk::BufferView>,
    ) -> Self {
        let mut write = Self::empty(binding, descriptor_type, views.len() as u32);
        write.texel_buffer_views = views;
        write
    }

    pub fn array_element(mut self, array_element: u32) -> Self {
        self.array_element = array_element;
        self
    }

    /// Length of the info list `descriptor_type` reads from
    pub fn info_len(&self) -> Option<usize> {
        DescriptorInfo::of(self.descriptor_type).map(|info| match info {
            DescriptorInfo::Buffer => self.buffer_info.len(),
            DescriptorInfo::Image => self.image_info.len(),
            DescriptorInfo::TexelBuffer => self.texel_buffer_views.len(),
        })
    }

    /// Returns why this write can not be submitted
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.count == 0 {
            return Err("descriptor count is zero");
        }
        let available = self.info_len().ok_or("unsupported descriptor type")?;
        if available == 0 {
            return Err("no info matching the descriptor type");
        }
        if self.count as usize > available {
            return Err("descriptor count exceeds the info matching the descriptor type");
        }
        Ok(())
    }
}

/// The shared descriptor pool. Sets are lent to callers and must come back through `free`.
///
/// Recreating the pool invalidates every set previously allocated from it.
/// Nothing stops a caller from using such a set afterwards: that is on them.
pub struct DescriptorPool<D: Driver> {
    pool: vk::DescriptorPool,
    capacity: PoolCapacity,
    /// Layout each outstanding set was allocated against
    owners: HashMap<vk::DescriptorSet, vk::DescriptorSetLayout>,
    /// Incremented each time the pool is recreated
    generation: u64,
    driver: Rc<D>,
}

impl<D: Driver> DescriptorPool<D> {
    pub fn new(driver: &Rc<D>, capacity: PoolCapacity) -> Result<Self> {
        let pool = driver.create_descriptor_pool(&capacity).map_err(Error::Pool)?;
        Ok(Self {
            pool,
            capacity,
            owners: HashMap::new(),
            generation: 0,
            driver: driver.clone(),
        })
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    pub fn capacity(&self) -> &PoolCapacity {
        &self.capacity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of sets currently lent out
    pub fn allocated(&self) -> usize {
        self.owners.len()
    }

    pub fn owner(&self, set: vk::DescriptorSet) -> Option<vk::DescriptorSetLayout> {
        self.owners.get(&set).copied()
    }

    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> VkResult<vk::DescriptorSet> {
        if self.pool == vk::DescriptorPool::null() {
            self.pool = self.driver.create_descriptor_pool(&self.capacity)?;
        }
        let set = self.driver.allocate_descriptor_set(self.pool, layout)?;
        self.owners.insert(set, layout);
        Ok(set)
    }

    /// Returns the set to the pool and tells which layout it was allocated against
    pub fn free(&mut self, set: vk::DescriptorSet) -> Result<vk::DescriptorSetLayout> {
        let layout = self
            .owners
            .remove(&set)
            .ok_or(Error::UnknownDescriptorSet(set))?;
        if let Err(result) = self.driver.free_descriptor_set(self.pool, set) {
            self.owners.insert(set, layout);
            return Err(Error::Pool(result));
        }
        Ok(layout)
    }

    /// Destroys the pool and creates a new one with the same capacity.
    /// Returns how many outstanding sets were invalidated.
    pub fn recreate(&mut self) -> Result<usize> {
        let invalidated = self.owners.len();
        self.destroy();
        self.generation += 1;
        log::warn!(
            "Recreating Vulkan descriptor pool (generation {}), {} outstanding sets are now invalid",
            self.generation,
            invalidated
        );
        self.pool = self
            .driver
            .create_descriptor_pool(&self.capacity)
            .map_err(Error::Pool)?;
        Ok(invalidated)
    }

    /// Destroys the pool along with every set allocated from it
    pub fn destroy(&mut self) {
        if self.pool != vk::DescriptorPool::null() {
            self.driver.destroy_descriptor_pool(self.pool);
            self.pool = vk::DescriptorPool::null();
        }
        self.owners.clear();
    }
}

impl<D: Driver> Drop for DescriptorPool<D> {
    fn drop(&mut self) {
        self.destroy();
    }
}
