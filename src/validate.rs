// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

//! Checks run on a key before the driver ever sees it

use std::collections::HashSet;

use ash::vk;

use crate::{
    CacheCategory, ComputePipelineKey, DescriptorSetLayoutKey, Error, GraphicsPipelineKey,
    PipelineLayoutKey, Result, ShaderStage,
};

fn check_stage(category: CacheCategory, stage: &ShaderStage) -> Result<()> {
    if stage.module == vk::ShaderModule::null() {
        return Err(Error::validation(
            category,
            format!("{:?} stage has a null shader module", stage.stage),
        ));
    }
    if stage.entry_point.is_empty() {
        return Err(Error::validation(
            category,
            format!("{:?} stage has an empty entry point", stage.stage),
        ));
    }
    if stage.entry_point.contains('\0') {
        return Err(Error::validation(
            category,
            format!("{:?} stage entry point contains a NUL byte", stage.stage),
        ));
    }
    Ok(())
}

/// `max_push_constants_size` is the device limit reported by the driver
pub fn pipeline_layout(key: &PipelineLayoutKey, max_push_constants_size: u32) -> Result<()> {
    let category = CacheCategory::PipelineLayout;

    if let Some(index) = key
        .set_layouts
        .iter()
        .position(|layout| *layout == vk::DescriptorSetLayout::null())
    {
        return Err(Error::validation(
            category,
            format!("descriptor set layout {} is null", index),
        ));
    }

    let size = key.push_constants_size();
    if size > max_push_constants_size as u64 {
        return Err(Error::validation(
            category,
            format!(
                "push constants take {} bytes but the device allows {}",
                size, max_push_constants_size
            ),
        ));
    }

    Ok(())
}

pub fn graphics_pipeline(key: &GraphicsPipelineKey) -> Result<()> {
    let category = CacheCategory::GraphicsPipeline;

    if key.layout == vk::PipelineLayout::null() {
        return Err(Error::validation(category, "pipeline layout is null"));
    }

    if key.stages.is_empty() {
        return Err(Error::validation(category, "no shader stages"));
    }

    let vertex_count = key
        .stages
        .iter()
        .filter(|stage| stage.stage == vk::ShaderStageFlags::VERTEX)
        .count();
    if vertex_count != 1 {
        return Err(Error::validation(
            category,
            format!("expected exactly one vertex stage, found {}", vertex_count),
        ));
    }

    for stage in &key.stages {
        check_stage(category, stage)?;
    }

    let mask = &key.multisample.sample_mask;
    let words = key.multisample.sample_mask_words();
    if !mask.is_empty() && mask.len() < words {
        return Err(Error::validation(
            category,
            format!(
                "sample mask has {} words but {:?} samples need {}",
                mask.len(),
                key.multisample.samples,
                words
            ),
        ));
    }

    for binding in &key.vertex_input.bindings {
        if binding.stride == 0 {
            log::warn!(
                "Vertex binding {} has a zero stride, every vertex will read the same data",
                binding.binding
            );
        }
    }

    Ok(())
}

pub fn compute_pipeline(key: &ComputePipelineKey) -> Result<()> {
    let category = CacheCategory::ComputePipeline;

    if key.layout == vk::PipelineLayout::null() {
        return Err(Error::validation(category, "pipeline layout is null"));
    }

    if key.stage.stage != vk::ShaderStageFlags::COMPUTE {
        return Err(Error::validation(
            category,
            format!("expected a compute stage, found {:?}", key.stage.stage),
        ));
    }

    check_stage(category, &key.stage)
}

pub fn descriptor_set_layout(key: &DescriptorSetLayoutKey) -> Result<()> {
    let mut seen = HashSet::new();
    for binding in &key.bindings {
        if !seen.insert(binding.binding) {
            return Err(Error::validation(
                CacheCategory::DescriptorSetLayout,
                format!("binding {} is declared more than once", binding.binding),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use ash::vk::Handle;

    use super::*;
    use crate::{DescriptorBinding, PushConstantRange, VertexBinding};

    fn module() -> vk::ShaderModule {
        vk::ShaderModule::from_raw(1)
    }

    fn layout() -> vk::PipelineLayout {
        vk::PipelineLayout::from_raw(2)
    }

    fn graphics() -> GraphicsPipelineKey {
        GraphicsPipelineKey::new(layout(), vk::RenderPass::from_raw(3), 0)
    }

    #[test]
    fn push_constants_limit() {
        let key = PipelineLayoutKey::new()
            .push_constant(PushConstantRange::new(vk::ShaderStageFlags::VERTEX, 0, 64))
            .push_constant(PushConstantRange::new(vk::ShaderStageFlags::FRAGMENT, 64, 64));
        assert!(pipeline_layout(&key, 128).is_ok());
        assert!(pipeline_layout(&key, 127).unwrap_err().is_validation());
    }

    #[test]
    fn null_set_layout() {
        let key = PipelineLayoutKey::new().set_layout(vk::DescriptorSetLayout::null());
        assert!(pipeline_layout(&key, 128).is_err());
    }

    #[test]
    fn graphics_needs_stages() {
        assert!(graphics_pipeline(&graphics()).is_err());

        let fragment_only = graphics().stage(ShaderStage::fragment(module(), "main"));
        assert!(graphics_pipeline(&fragment_only).is_err());

        let two_vertex = graphics()
            .stage(ShaderStage::vertex(module(), "a"))
            .stage(ShaderStage::vertex(module(), "b"));
        assert!(graphics_pipeline(&two_vertex).is_err());

        let valid = graphics()
            .stage(ShaderStage::vertex(module(), "main"))
            .stage(ShaderStage::fragment(module(), "main"));
        assert!(graphics_pipeline(&valid).is_ok());
    }

    #[test]
    fn graphics_null_module() {
        let key = graphics()
            .stage(ShaderStage::vertex(module(), "main"))
            .stage(ShaderStage::fragment(vk::ShaderModule::null(), "main"));
        assert!(graphics_pipeline(&key).is_err());
    }

    #[test]
    fn zero_stride_is_allowed() {
        let key = graphics()
            .stage(ShaderStage::vertex(module(), "main"))
            .vertex_binding(VertexBinding::new(0, 0));
        assert!(graphics_pipeline(&key).is_ok());
    }

    #[test]
    fn short_sample_mask() {
        let mut key = graphics().stage(ShaderStage::vertex(module(), "main"));
        key.multisample.samples = vk::SampleCountFlags::TYPE_64;
        key.multisample.sample_mask = vec![!0];
        assert!(graphics_pipeline(&key).unwrap_err().is_validation());

        key.multisample.sample_mask.push(!0);
        assert!(graphics_pipeline(&key).is_ok());

        key.multisample.sample_mask.clear();
        assert!(graphics_pipeline(&key).is_ok());
    }

    #[test]
    fn compute_stage() {
        assert!(compute_pipeline(&ComputePipelineKey::new(layout(), module(), "main")).is_ok());
        assert!(compute_pipeline(&ComputePipelineKey::new(layout(), module(), "")).is_err());

        let mut wrong = ComputePipelineKey::new(layout(), module(), "main");
        wrong.stage.stage = vk::ShaderStageFlags::VERTEX;
        assert!(compute_pipeline(&wrong).is_err());
    }

    #[test]
    fn duplicate_bindings() {
        let binding = DescriptorBinding::new(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            vk::ShaderStageFlags::VERTEX,
        );
        let key = DescriptorSetLayoutKey::new().binding(binding);
        assert!(descriptor_set_layout(&key).is_ok());
        let key = key.binding(binding);
        assert!(descriptor_set_layout(&key).is_err());
    }
}
