// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

use std::{ffi::CString, ptr, rc::Rc};

use ash::{prelude::VkResult, vk};

use crate::{
    ComputePipelineKey, DescriptorInfo, DescriptorSetLayoutKey, DescriptorWrite, Driver,
    GraphicsPipelineKey, PipelineLayoutKey, PoolCapacity, ShaderStage,
};

fn ptr_or_null<T>(slice: &[T]) -> *const T {
    if slice.is_empty() {
        ptr::null()
    } else {
        slice.as_ptr()
    }
}

fn entry_point(stage: &ShaderStage) -> VkResult<CString> {
    CString::new(stage.entry_point.as_str()).map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)
}

/// Driver backed by an ash logical device.
/// The device is shared, not owned: it must outlive every cache built on this driver.
pub struct VulkanDriver {
    max_push_constants_size: u32,
    pub device: Rc<ash::Device>,
}

impl VulkanDriver {
    pub fn new(device: &Rc<ash::Device>, limits: &vk::PhysicalDeviceLimits) -> Self {
        Self {
            max_push_constants_size: limits.max_push_constants_size,
            device: device.clone(),
        }
    }
}

impl Driver for VulkanDriver {
    fn max_push_constants_size(&self) -> u32 {
        self.max_push_constants_size
    }

    fn create_pipeline_layout(&self, key: &PipelineLayoutKey) -> VkResult<vk::PipelineLayout> {
        let constants: Vec<vk::PushConstantRange> =
            key.push_constants.iter().map(|range| range.to_vk()).collect();
        let create_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&key.set_layouts)
            .push_constant_ranges(&constants)
            .build();
        unsafe { self.device.create_pipeline_layout(&create_info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&self, key: &GraphicsPipelineKey) -> VkResult<vk::Pipeline> {
        // Entry point c strings should be alive until the pipeline has been created
        let names = key
            .stages
            .iter()
            .map(entry_point)
            .collect::<VkResult<Vec<CString>>>()?;
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = key
            .stages
            .iter()
            .zip(names.iter())
            .map(|(stage, name)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(name)
                    .build()
            })
            .collect();

        let bindings: Vec<vk::VertexInputBindingDescription> = key
            .vertex_input
            .bindings
            .iter()
            .map(|binding| binding.to_vk())
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = key
            .vertex_input
            .attributes
            .iter()
            .map(|attribute| attribute.to_vk())
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes)
            .build();

        let input_assembly = key.input_assembly.to_vk();

        // Dynamic viewports and scissors still need a count
        let viewports: Vec<vk::Viewport> = key.viewport.viewports.iter().map(|v| v.to_vk()).collect();
        let scissors: Vec<vk::Rect2D> = key.viewport.scissors.iter().map(|s| s.to_vk()).collect();
        let viewport_count = if viewports.is_empty() && key.is_dynamic(vk::DynamicState::VIEWPORT) {
            1
        } else {
            viewports.len() as u32
        };
        let scissor_count = if scissors.is_empty() && key.is_dynamic(vk::DynamicState::SCISSOR) {
            1
        } else {
            scissors.len() as u32
        };
        let view_state = vk::PipelineViewportStateCreateInfo {
            viewport_count,
            p_viewports: ptr_or_null(&viewports),
            scissor_count,
            p_scissors: ptr_or_null(&scissors),
            ..Default::default()
        };

        let raster_state = key.rasterization.to_vk();

        let multisample = &key.multisample;
        // A mask too short for the sample count is ignored rather than read past its end
        let sample_mask = if multisample.sample_mask.len() < multisample.sample_mask_words() {
            ptr::null()
        } else {
            multisample.sample_mask.as_ptr()
        };
        let multisample_state = vk::PipelineMultisampleStateCreateInfo {
            rasterization_samples: multisample.samples,
            sample_shading_enable: multisample.min_sample_shading.is_some() as vk::Bool32,
            min_sample_shading: multisample.min_sample_shading.map_or(0.0, |f| f.0),
            p_sample_mask: sample_mask,
            alpha_to_coverage_enable: multisample.alpha_to_coverage as vk::Bool32,
            alpha_to_one_enable: multisample.alpha_to_one as vk::Bool32,
            ..Default::default()
        };

        let depth_state = key.depth_stencil.to_vk();

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = key
            .color_blend
            .attachments
            .iter()
            .map(|attachment| attachment.to_vk())
            .collect();
        let blend_constants = [
            key.color_blend.blend_constants[0].0,
            key.color_blend.blend_constants[1].0,
            key.color_blend.blend_constants[2].0,
            key.color_blend.blend_constants[3].0,
        ];
        let blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(key.color_blend.logic_op.is_some())
            .logic_op(key.color_blend.logic_op.unwrap_or(vk::LogicOp::COPY))
            .attachments(&blend_attachments)
            .blend_constants(blend_constants)
            .build();

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&key.dynamic_states)
            .build();

        let create_info = [vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&view_state)
            .rasterization_state(&raster_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_state)
            .color_blend_state(&blend_state)
            .dynamic_state(&dynamic_state)
            .render_pass(key.render_pass)
            .subpass(key.subpass)
            .layout(key.layout)
            .build()];

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &create_info, None)
        }
        .map_err(|(_, result)| result)?;
        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn create_compute_pipeline(&self, key: &ComputePipelineKey) -> VkResult<vk::Pipeline> {
        let name = entry_point(&key.stage)?;
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(key.stage.stage)
            .module(key.stage.module)
            .name(&name)
            .build();

        let create_info = [vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(key.layout)
            .build()];

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &create_info, None)
        }
        .map_err(|(_, result)| result)?;
        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_descriptor_set_layout(
        &self,
        key: &DescriptorSetLayoutKey,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> =
            key.bindings.iter().map(|binding| binding.to_vk()).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&bindings)
            .build();
        unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(&self, capacity: &PoolCapacity) -> VkResult<vk::DescriptorPool> {
        let pool_sizes = capacity.pool_sizes();
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(capacity.max_sets)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .build();
        unsafe { self.device.create_descriptor_pool(&create_info, None) }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let create_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts)
            .build();

        let sets = unsafe { self.device.allocate_descriptor_sets(&create_info) }?;
        sets.into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }

    fn free_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        set: vk::DescriptorSet,
    ) -> VkResult<()> {
        unsafe { self.device.free_descriptor_sets(pool, &[set]) }
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .filter_map(|write| write_to_vk(set, write))
            .collect();
        if writes.is_empty() {
            return;
        }
        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }
}

/// Only the list the descriptor type selects is pointed to, and the driver reads
/// `descriptor_count` entries from it. Invalid writes give `None`.
fn write_to_vk(set: vk::DescriptorSet, write: &DescriptorWrite) -> Option<vk::WriteDescriptorSet> {
    if write.validate().is_err() {
        return None;
    }

    let mut vk_write = vk::WriteDescriptorSet {
        dst_set: set,
        dst_binding: write.binding,
        dst_array_element: write.array_element,
        descriptor_count: write.count,
        descriptor_type: write.descriptor_type,
        ..Default::default()
    };
    match DescriptorInfo::of(write.descriptor_type)? {
        DescriptorInfo::Buffer => vk_write.p_buffer_info = write.buffer_info.as_ptr(),
        DescriptorInfo::Image => vk_write.p_image_info = write.image_info.as_ptr(),
        DescriptorInfo::TexelBuffer => vk_write.p_texel_buffer_view = write.texel_buffer_views.as_ptr(),
    }
    Some(vk_write)
}
