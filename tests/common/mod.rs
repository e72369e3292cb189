// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use vkcache::{
    ash::{
        prelude::VkResult,
        vk::{self, Handle},
    },
    ComputePipelineKey, Config, DescriptorBinding, DescriptorSetLayoutKey, DescriptorWrite,
    Driver, GraphicsPipelineKey, ManualClock, PipelineLayoutKey, PipelineManager, PoolCapacity,
    PushConstantRange, ShaderStage,
};

/// How many times each driver entry point was called
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub create_pipeline_layout: usize,
    pub create_graphics_pipeline: usize,
    pub create_compute_pipeline: usize,
    pub create_descriptor_set_layout: usize,
    pub create_descriptor_pool: usize,
    pub destroy_pipeline: usize,
    pub destroy_pipeline_layout: usize,
    pub destroy_descriptor_set_layout: usize,
    pub destroy_descriptor_pool: usize,
    pub allocate_descriptor_set: usize,
    pub free_descriptor_set: usize,
    pub update_descriptor_set: usize,
    pub writes: usize,
}

struct MockPool {
    max_sets: u32,
    sets: Vec<vk::DescriptorSet>,
}

/// Driver which hands out fake handles and records what it was asked to do
pub struct MockDriver {
    pub max_push_constants: u32,
    next: Cell<u64>,
    calls: RefCell<Calls>,
    pools: RefCell<HashMap<vk::DescriptorPool, MockPool>>,
    /// Overrides the capacity of pools created from now on
    pub pool_limit: Cell<Option<u32>>,
    /// Returned by the next graphics pipeline creation
    pub fail_graphics: Cell<Option<vk::Result>>,
    /// Kinds of objects in the order they were destroyed
    pub destroyed: RefCell<Vec<&'static str>>,
    /// Hands out destroyed handle values again, most recent first
    pub reuse_handles: Cell<bool>,
    recycled: RefCell<Vec<u64>>,
}

impl MockDriver {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            max_push_constants: 128,
            next: Cell::new(1),
            calls: RefCell::new(Calls::default()),
            pools: RefCell::new(HashMap::new()),
            pool_limit: Cell::new(None),
            fail_graphics: Cell::new(None),
            destroyed: RefCell::new(vec![]),
            reuse_handles: Cell::new(false),
            recycled: RefCell::new(vec![]),
        })
    }

    pub fn calls(&self) -> Calls {
        self.calls.borrow().clone()
    }

    pub fn live_pools(&self) -> usize {
        self.pools.borrow().len()
    }

    fn next_raw(&self) -> u64 {
        if self.reuse_handles.get() {
            if let Some(raw) = self.recycled.borrow_mut().pop() {
                return raw;
            }
        }
        let raw = self.next.get();
        self.next.set(raw + 1);
        raw
    }

    fn recycle(&self, raw: u64) {
        self.recycled.borrow_mut().push(raw);
    }
}

impl Driver for MockDriver {
    fn max_push_constants_size(&self) -> u32 {
        self.max_push_constants
    }

    fn create_pipeline_layout(&self, _key: &PipelineLayoutKey) -> VkResult<vk::PipelineLayout> {
        self.calls.borrow_mut().create_pipeline_layout += 1;
        Ok(vk::PipelineLayout::from_raw(self.next_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.calls.borrow_mut().destroy_pipeline_layout += 1;
        self.recycle(layout.as_raw());
        self.destroyed.borrow_mut().push("pipeline_layout");
    }

    fn create_graphics_pipeline(&self, _key: &GraphicsPipelineKey) -> VkResult<vk::Pipeline> {
        self.calls.borrow_mut().create_graphics_pipeline += 1;
        if let Some(result) = self.fail_graphics.take() {
            return Err(result);
        }
        Ok(vk::Pipeline::from_raw(self.next_raw()))
    }

    fn create_compute_pipeline(&self, _key: &ComputePipelineKey) -> VkResult<vk::Pipeline> {
        self.calls.borrow_mut().create_compute_pipeline += 1;
        Ok(vk::Pipeline::from_raw(self.next_raw()))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.calls.borrow_mut().destroy_pipeline += 1;
        self.recycle(pipeline.as_raw());
        self.destroyed.borrow_mut().push("pipeline");
    }

    fn create_descriptor_set_layout(
        &self,
        _key: &DescriptorSetLayoutKey,
    ) -> VkResult<vk::DescriptorSetLayout> {
        self.calls.borrow_mut().create_descriptor_set_layout += 1;
        Ok(vk::DescriptorSetLayout::from_raw(self.next_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.calls.borrow_mut().destroy_descriptor_set_layout += 1;
        self.recycle(layout.as_raw());
        self.destroyed.borrow_mut().push("descriptor_set_layout");
    }

    fn create_descriptor_pool(&self, capacity: &PoolCapacity) -> VkResult<vk::DescriptorPool> {
        self.calls.borrow_mut().create_descriptor_pool += 1;
        let pool = vk::DescriptorPool::from_raw(self.next_raw());
        let max_sets = self.pool_limit.get().unwrap_or(capacity.max_sets);
        self.pools.borrow_mut().insert(
            pool,
            MockPool {
                max_sets,
                sets: vec![],
            },
        );
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.calls.borrow_mut().destroy_descriptor_pool += 1;
        self.destroyed.borrow_mut().push("descriptor_pool");
        self.pools.borrow_mut().remove(&pool);
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        self.calls.borrow_mut().allocate_descriptor_set += 1;
        let mut pools = self.pools.borrow_mut();
        let pool = pools
            .get_mut(&pool)
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        if pool.sets.len() as u32 >= pool.max_sets {
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        let set = vk::DescriptorSet::from_raw(self.next_raw());
        pool.sets.push(set);
        Ok(set)
    }

    fn free_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    ) -> VkResult<()> {
        self.calls.borrow_mut().free_descriptor_set += 1;
        let mut pools = self.pools.borrow_mut();
        let pool = pools
            .get_mut(&pool)
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)?;
        pool.sets.retain(|s| *s != set);
        Ok(())
    }

    fn update_descriptor_set(&self, _set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let mut calls = self.calls.borrow_mut();
        calls.update_descriptor_set += 1;
        calls.writes += writes.len();
    }
}

pub struct Setup {
    pub driver: Rc<MockDriver>,
    pub clock: Rc<ManualClock>,
    pub manager: PipelineManager<MockDriver>,
}

pub fn setup(config: Config) -> Setup {
    let _ = env_logger::builder().is_test(true).try_init();

    let driver = MockDriver::new();
    let clock = Rc::new(ManualClock::new());
    let manager = PipelineManager::new(&driver, clock.clone(), config)
        .expect("Failed to create pipeline manager");
    Setup {
        driver,
        clock,
        manager,
    }
}

pub fn module() -> vk::ShaderModule {
    vk::ShaderModule::from_raw(0xabc)
}

pub fn layout() -> vk::PipelineLayout {
    vk::PipelineLayout::from_raw(0xdef)
}

pub fn graphics_key(cull_mode: vk::CullModeFlags) -> GraphicsPipelineKey {
    GraphicsPipelineKey::new(layout(), vk::RenderPass::from_raw(0x123), 0)
        .stage(ShaderStage::vertex(module(), "main_vs"))
        .stage(ShaderStage::fragment(module(), "main_fs"))
        .cull_mode(cull_mode)
}

pub fn compute_key(entry_point: &str) -> ComputePipelineKey {
    ComputePipelineKey::new(layout(), module(), entry_point)
}

pub fn pipeline_layout_key(push_constant_size: u32) -> PipelineLayoutKey {
    PipelineLayoutKey::new().push_constant(PushConstantRange::new(
        vk::ShaderStageFlags::VERTEX,
        0,
        push_constant_size,
    ))
}

pub fn set_layout_key(binding: u32) -> DescriptorSetLayoutKey {
    DescriptorSetLayoutKey::new().binding(DescriptorBinding::new(
        binding,
        vk::DescriptorType::UNIFORM_BUFFER,
        1,
        vk::ShaderStageFlags::VERTEX,
    ))
}
