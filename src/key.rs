// Copyright © 2021-2022
// Author: Antonio Caggiano <info@antoniocaggiano.eu>
// SPDX-License-Identifier: MIT

//! Structural keys which stand in for native handles that do not exist yet.
//!
//! Every key derives `Hash` over its fields in declaration order, and every list
//! is hashed element by element, so two keys differing only by the order of their
//! shader stages or push constant ranges never collide by construction.

use std::hash::{Hash, Hasher};

use ash::vk;

/// A float which compares and hashes by its bit pattern.
/// Fixed-function blocks are compared byte by byte, so `-0.0 != 0.0` and `NaN == NaN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Float(pub f32);

impl PartialEq for Float {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Float {}

impl Hash for Float {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<f32> for Float {
    fn from(value: f32) -> Self {
        Self(value)
    }
}

impl From<Float> for f32 {
    fn from(value: Float) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stage_flags: vk::ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

impl PushConstantRange {
    pub fn new(stage_flags: vk::ShaderStageFlags, offset: u32, size: u32) -> Self {
        Self {
            stage_flags,
            offset,
            size,
        }
    }

    pub fn to_vk(&self) -> vk::PushConstantRange {
        vk::PushConstantRange::builder()
            .stage_flags(self.stage_flags)
            .offset(self.offset)
            .size(self.size)
            .build()
    }
}

/// A pipeline layout depends on set layouts and push constants
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutKey {
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constants: Vec<PushConstantRange>,
}

impl PipelineLayoutKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_layout(mut self, set_layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(set_layout);
        self
    }

    pub fn push_constant(mut self, range: PushConstantRange) -> Self {
        self.push_constants.push(range);
        self
    }

    /// Sum of the sizes of all push constant ranges
    pub fn push_constants_size(&self) -> u64 {
        self.push_constants.iter().map(|r| r.size as u64).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: String,
}

impl ShaderStage {
    pub fn new(stage: vk::ShaderStageFlags, module: vk::ShaderModule, entry_point: &str) -> Self {
        Self {
            stage,
            module,
            entry_point: entry_point.to_string(),
        }
    }

    pub fn vertex(module: vk::ShaderModule, entry_point: &str) -> Self {
        Self::new(vk::ShaderStageFlags::VERTEX, module, entry_point)
    }

    pub fn fragment(module: vk::ShaderModule, entry_point: &str) -> Self {
        Self::new(vk::ShaderStageFlags::FRAGMENT, module, entry_point)
    }

    pub fn compute(module: vk::ShaderModule, entry_point: &str) -> Self {
        Self::new(vk::ShaderStageFlags::COMPUTE, module, entry_point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

impl VertexBinding {
    pub fn new(binding: u32, stride: u32) -> Self {
        Self {
            binding,
            stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn to_vk(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(self.binding)
            .stride(self.stride)
            .input_rate(self.input_rate)
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn new(location: u32, binding: u32, format: vk::Format, offset: u32) -> Self {
        Self {
            location,
            binding,
            format,
            offset,
        }
    }

    pub fn to_vk(&self) -> vk::VertexInputAttributeDescription {
        vk::VertexInputAttributeDescription::builder()
            .location(self.location)
            .binding(self.binding)
            .format(self.format)
            .offset(self.offset)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexInputLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputAssemblyState {
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
}

impl Default for InputAssemblyState {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
        }
    }
}

impl InputAssemblyState {
    pub fn to_vk(&self) -> vk::PipelineInputAssemblyStateCreateInfo {
        vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(self.primitive_restart)
            .build()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DepthBias {
    pub constant_factor: Float,
    pub clamp: Float,
    pub slope_factor: Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterizationState {
    pub depth_clamp: bool,
    pub rasterizer_discard: bool,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    /// Depth bias is enabled when present
    pub depth_bias: Option<DepthBias>,
    pub line_width: Float,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            depth_clamp: false,
            rasterizer_discard: false,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias: None,
            line_width: Float(1.0),
        }
    }
}

impl RasterizationState {
    pub fn to_vk(&self) -> vk::PipelineRasterizationStateCreateInfo {
        let bias = self.depth_bias.unwrap_or_default();
        vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(self.depth_clamp)
            .rasterizer_discard_enable(self.rasterizer_discard)
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(self.depth_bias.is_some())
            .depth_bias_constant_factor(bias.constant_factor.0)
            .depth_bias_clamp(bias.clamp.0)
            .depth_bias_slope_factor(bias.slope_factor.0)
            .line_width(self.line_width.0)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MultisampleState {
    pub samples: vk::SampleCountFlags,
    /// Sample shading is enabled when present
    pub min_sample_shading: Option<Float>,
    /// An empty mask means all samples are enabled
    pub sample_mask: Vec<u32>,
    pub alpha_to_coverage: bool,
    pub alpha_to_one: bool,
}

impl Default for MultisampleState {
    fn default() -> Self {
        Self {
            samples: vk::SampleCountFlags::TYPE_1,
            min_sample_shading: None,
            sample_mask: vec![],
            alpha_to_coverage: false,
            alpha_to_one: false,
        }
    }
}

impl MultisampleState {
    /// 32-bit words a sample mask needs to cover every sample
    pub fn sample_mask_words(&self) -> usize {
        ((self.samples.as_raw() + 31) / 32) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub fail_op: vk::StencilOp,
    pub pass_op: vk::StencilOp,
    pub depth_fail_op: vk::StencilOp,
    pub compare_op: vk::CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            fail_op: vk::StencilOp::KEEP,
            pass_op: vk::StencilOp::KEEP,
            depth_fail_op: vk::StencilOp::KEEP,
            compare_op: vk::CompareOp::ALWAYS,
            compare_mask: !0,
            write_mask: !0,
            reference: 0,
        }
    }
}

impl StencilFace {
    pub fn to_vk(&self) -> vk::StencilOpState {
        vk::StencilOpState::builder()
            .fail_op(self.fail_op)
            .pass_op(self.pass_op)
            .depth_fail_op(self.depth_fail_op)
            .compare_op(self.compare_op)
            .compare_mask(self.compare_mask)
            .write_mask(self.write_mask)
            .reference(self.reference)
            .build()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub front: StencilFace,
    pub back: StencilFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthBounds {
    pub min: Float,
    pub max: Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    /// Depth bounds test is enabled when present
    pub depth_bounds: Option<DepthBounds>,
    /// Stencil test is enabled when present
    pub stencil: Option<StencilState>,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS,
            depth_bounds: None,
            stencil: None,
        }
    }
}

impl DepthStencilState {
    pub fn disabled() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_compare_op: vk::CompareOp::ALWAYS,
            depth_bounds: None,
            stencil: None,
        }
    }

    pub fn to_vk(&self) -> vk::PipelineDepthStencilStateCreateInfo {
        let stencil = self.stencil.unwrap_or_default();
        let mut builder = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare_op)
            .depth_bounds_test_enable(self.depth_bounds.is_some())
            .stencil_test_enable(self.stencil.is_some())
            .front(stencil.front.to_vk())
            .back(stencil.back.to_vk());
        if let Some(bounds) = self.depth_bounds {
            builder = builder
                .min_depth_bounds(bounds.min.0)
                .max_depth_bounds(bounds.max.0);
        }
        builder.build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_factor: vk::BlendFactor,
    pub dst_color_factor: vk::BlendFactor,
    pub color_op: vk::BlendOp,
    pub src_alpha_factor: vk::BlendFactor,
    pub dst_alpha_factor: vk::BlendFactor,
    pub alpha_op: vk::BlendOp,
    pub write_mask: vk::ColorComponentFlags,
}

impl ColorBlendAttachment {
    /// Writes every channel without blending
    pub fn opaque() -> Self {
        Self {
            blend_enable: false,
            src_color_factor: vk::BlendFactor::ONE,
            dst_color_factor: vk::BlendFactor::ZERO,
            color_op: vk::BlendOp::ADD,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ZERO,
            alpha_op: vk::BlendOp::ADD,
            write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
        }
    }

    /// Classic `src * a + dst * (1 - a)` blending
    pub fn alpha() -> Self {
        Self {
            blend_enable: true,
            src_color_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha_factor: vk::BlendFactor::ONE,
            dst_alpha_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            ..Self::opaque()
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(self.blend_enable)
            .src_color_blend_factor(self.src_color_factor)
            .dst_color_blend_factor(self.dst_color_factor)
            .color_blend_op(self.color_op)
            .src_alpha_blend_factor(self.src_alpha_factor)
            .dst_alpha_blend_factor(self.dst_alpha_factor)
            .alpha_blend_op(self.alpha_op)
            .color_write_mask(self.write_mask)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColorBlendState {
    /// Logic op is enabled when present
    pub logic_op: Option<vk::LogicOp>,
    pub attachments: Vec<ColorBlendAttachment>,
    pub blend_constants: [Float; 4],
}

impl Default for ColorBlendState {
    fn default() -> Self {
        Self {
            logic_op: None,
            attachments: vec![ColorBlendAttachment::opaque()],
            blend_constants: [Float(0.0); 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub x: Float,
    pub y: Float,
    pub width: Float,
    pub height: Float,
    pub min_depth: Float,
    pub max_depth: Float,
}

impl Viewport {
    pub fn to_vk(&self) -> vk::Viewport {
        vk::Viewport::builder()
            .x(self.x.0)
            .y(self.y.0)
            .width(self.width.0)
            .height(self.height.0)
            .min_depth(self.min_depth.0)
            .max_depth(self.max_depth.0)
            .build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scissor {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Scissor {
    pub fn to_vk(&self) -> vk::Rect2D {
        vk::Rect2D::builder()
            .offset(vk::Offset2D::builder().x(self.x).y(self.y).build())
            .extent(
                vk::Extent2D::builder()
                    .width(self.width)
                    .height(self.height)
                    .build(),
            )
            .build()
    }
}

/// Static viewports and scissors.
/// Leave a list empty when the matching dynamic state is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ViewportState {
    pub viewports: Vec<Viewport>,
    pub scissors: Vec<Scissor>,
}

impl ViewportState {
    /// A single viewport and scissor covering `width` x `height`
    pub fn fixed(width: u32, height: u32) -> Self {
        Self {
            viewports: vec![Viewport {
                x: Float(0.0),
                y: Float(0.0),
                width: Float(width as f32),
                height: Float(height as f32),
                min_depth: Float(0.0),
                max_depth: Float(1.0),
            }],
            scissors: vec![Scissor {
                x: 0,
                y: 0,
                width,
                height,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineKey {
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub vertex_input: VertexInputLayout,
    pub stages: Vec<ShaderStage>,
    pub input_assembly: InputAssemblyState,
    pub rasterization: RasterizationState,
    pub multisample: MultisampleState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    pub viewport: ViewportState,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl GraphicsPipelineKey {
    /// Default fixed-function state with dynamic viewport and scissor
    pub fn new(layout: vk::PipelineLayout, render_pass: vk::RenderPass, subpass: u32) -> Self {
        Self {
            layout,
            render_pass,
            subpass,
            vertex_input: VertexInputLayout::default(),
            stages: vec![],
            input_assembly: InputAssemblyState::default(),
            rasterization: RasterizationState::default(),
            multisample: MultisampleState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: ColorBlendState::default(),
            viewport: ViewportState::default(),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn stage(mut self, stage: ShaderStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn vertex_binding(mut self, binding: VertexBinding) -> Self {
        self.vertex_input.bindings.push(binding);
        self
    }

    pub fn vertex_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.vertex_input.attributes.push(attribute);
        self
    }

    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.input_assembly.topology = topology;
        self
    }

    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.rasterization.cull_mode = cull_mode;
        self
    }

    pub fn is_dynamic(&self, state: vk::DynamicState) -> bool {
        self.dynamic_states.contains(&state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub layout: vk::PipelineLayout,
    pub stage: ShaderStage,
}

impl ComputePipelineKey {
    pub fn new(layout: vk::PipelineLayout, module: vk::ShaderModule, entry_point: &str) -> Self {
        Self {
            layout,
            stage: ShaderStage::compute(module, entry_point),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            count,
            stage_flags,
        }
    }

    pub fn to_vk(&self) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding::builder()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stage_flags)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutKey {
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binding(mut self, binding: DescriptorBinding) -> Self {
        self.bindings.push(binding);
        self
    }
}

#[cfg(test)]
mod test {
    use std::collections::hash_map::DefaultHasher;

    use ash::vk::Handle;

    use super::*;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn module(raw: u64) -> vk::ShaderModule {
        vk::ShaderModule::from_raw(raw)
    }

    fn base() -> GraphicsPipelineKey {
        GraphicsPipelineKey::new(
            vk::PipelineLayout::from_raw(1),
            vk::RenderPass::from_raw(2),
            0,
        )
        .stage(ShaderStage::vertex(module(3), "main_vs"))
        .stage(ShaderStage::fragment(module(3), "main_fs"))
    }

    #[test]
    fn float_by_bits() {
        assert_eq!(Float(f32::NAN), Float(f32::NAN));
        assert_ne!(Float(0.0), Float(-0.0));
        assert_eq!(hash_of(&Float(1.5)), hash_of(&Float(1.5)));
    }

    #[test]
    fn identical_keys() {
        let a = base();
        let b = base();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn cull_mode_matters() {
        let a = base().cull_mode(vk::CullModeFlags::FRONT);
        let b = base().cull_mode(vk::CullModeFlags::BACK);
        assert_ne!(a, b);
    }

    #[test]
    fn stage_order_matters() {
        let a = base();
        let mut b = base();
        b.stages.reverse();
        assert_ne!(a, b);
        assert_ne!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn swapped_push_constants_differ() {
        let first = PushConstantRange::new(vk::ShaderStageFlags::VERTEX, 0, 16);
        let second = PushConstantRange::new(vk::ShaderStageFlags::FRAGMENT, 16, 32);
        let a = PipelineLayoutKey::new()
            .push_constant(first)
            .push_constant(second);
        let b = PipelineLayoutKey::new()
            .push_constant(second)
            .push_constant(first);
        assert_ne!(a, b);
        assert_ne!(hash_of(&a), hash_of(&b));
        assert_eq!(a.push_constants_size(), 48);
    }

    #[test]
    fn line_width_bits() {
        let mut a = base();
        a.rasterization.line_width = Float(1.0);
        let mut b = base();
        b.rasterization.line_width = Float(1.0 + f32::EPSILON);
        assert_ne!(a, b);
    }

    #[test]
    fn rasterization_to_vk() {
        let state = RasterizationState {
            cull_mode: vk::CullModeFlags::BACK,
            depth_bias: Some(DepthBias {
                constant_factor: Float(1.25),
                clamp: Float(0.0),
                slope_factor: Float(1.75),
            }),
            ..Default::default()
        };
        let info = state.to_vk();
        assert_eq!(info.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(info.depth_bias_enable, vk::TRUE);
        assert_eq!(info.depth_bias_constant_factor, 1.25);
        assert_eq!(info.line_width, 1.0);
    }

    #[test]
    fn fixed_viewport() {
        let state = ViewportState::fixed(32, 16);
        let viewport = state.viewports[0].to_vk();
        assert_eq!(viewport.width, 32.0);
        assert_eq!(viewport.height, 16.0);
        let scissor = state.scissors[0].to_vk();
        assert_eq!(scissor.extent.width, 32);
    }

    #[test]
    fn sample_mask_words() {
        let mut state = MultisampleState::default();
        assert_eq!(state.sample_mask_words(), 1);
        state.samples = vk::SampleCountFlags::TYPE_64;
        assert_eq!(state.sample_mask_words(), 2);
    }

    #[test]
    fn descriptor_binding_to_vk() {
        let binding = DescriptorBinding::new(
            2,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            vk::ShaderStageFlags::VERTEX,
        );
        let vk_binding = binding.to_vk();
        assert_eq!(vk_binding.binding, 2);
        assert_eq!(vk_binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(vk_binding.descriptor_count, 1);
    }
}
