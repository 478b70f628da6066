use anyhow::{anyhow, Context, Result};
use std::mem::size_of;
use vulkanalia::bytecode::Bytecode;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::constants;
use super::error::SetupError;
use super::{context::VulkanContext, device::VulkanDevice};

/// Quad vertex: position, tint color, texture coordinate.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(pos: [f32; 2], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            pos,
            color,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(0)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(1)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(size_of::<[f32; 2]>() as u32)
                .build(),
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(2)
                .format(vk::Format::R32G32_SFLOAT)
                .offset((size_of::<[f32; 2]>() + size_of::<[f32; 3]>()) as u32)
                .build(),
        ]
    }
}

#[derive(Debug)]
pub struct VulkanPipeline;

impl VulkanPipeline {
    /// Builds the pipeline layout and graphics pipeline against the current
    /// render pass. Shader modules are loaded from disk and destroyed as
    /// soon as the pipeline exists.
    pub unsafe fn create(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let vert = read_shader_bytecode(constants::VERT_SHADER_PATH)?;
        let frag = read_shader_bytecode(constants::FRAG_SHADER_PATH)?;

        let vertex_shader_module =
            VulkanPipeline::create_shader_module(device, constants::VERT_SHADER_PATH, &vert)?;
        let fragment_shader_module =
            VulkanPipeline::create_shader_module(device, constants::FRAG_SHADER_PATH, &frag)?;

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader_module)
            .name(b"main\0");

        let binding_descriptions = &[Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts are baked in.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1);

        // No blending; alpha is ignored for the opaque quad.
        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(
                vk::ColorComponentFlags::R
                    | vk::ColorComponentFlags::G
                    | vk::ColorComponentFlags::B,
            )
            .blend_enable(false);

        let attachments = &[attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(attachments);

        let set_layouts = &[context.descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        context.pipeline_layout = device
            .vk_device
            .create_pipeline_layout(&layout_info, None)?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(context.pipeline_layout)
            .render_pass(context.render_pass)
            .subpass(0);

        context.pipeline = device
            .vk_device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)?
            .0[0];

        device
            .vk_device
            .destroy_shader_module(vertex_shader_module, None);
        device
            .vk_device
            .destroy_shader_module(fragment_shader_module, None);

        Ok(())
    }

    unsafe fn create_shader_module(
        device: &VulkanDevice,
        path: &str,
        bytecode: &[u8],
    ) -> Result<vk::ShaderModule> {
        let bytecode = Bytecode::new(bytecode)
            .map_err(|_| anyhow!(SetupError::InvalidShader(path.to_string())))?;
        let info = vk::ShaderModuleCreateInfo::builder()
            .code_size(bytecode.code_size())
            .code(bytecode.code());

        Ok(device.vk_device.create_shader_module(&info, None)?)
    }

    pub unsafe fn destroy(device: &VulkanDevice, context: &mut VulkanContext) {
        if !context.pipeline.is_null() {
            device.vk_device.destroy_pipeline(context.pipeline, None);
            context.pipeline = vk::Pipeline::null();
        }
        if !context.pipeline_layout.is_null() {
            device
                .vk_device
                .destroy_pipeline_layout(context.pipeline_layout, None);
            context.pipeline_layout = vk::PipelineLayout::null();
        }
    }
}

fn read_shader_bytecode(path: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading shader bytecode from `{path}`"))
}

/// Fits the logical render resolution inside the window, preserving aspect
/// ratio and centering. The content is scaled down when the window is
/// smaller than the base resolution, never up.
pub fn letterbox_viewport(window: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let window_width = window.width as f32;
    let window_height = window.height as f32;

    let scale = (window_width / constants::RENDER_WIDTH)
        .min(window_height / constants::RENDER_HEIGHT)
        .min(1.0);
    let width = constants::RENDER_WIDTH * scale;
    let height = constants::RENDER_HEIGHT * scale;
    let x = (window_width - width) / 2.0;
    let y = (window_height - height) / 2.0;

    let viewport = vk::Viewport {
        x,
        y,
        width,
        height,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D {
            x: x as i32,
            y: y as i32,
        },
        extent: vk::Extent2D {
            width: width as u32,
            height: height as u32,
        },
    };

    (viewport, scissor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn vertex_layout_matches_shader_interface() {
        assert_eq!(Vertex::binding_description().stride, 28);
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[2].offset, 20);
    }

    #[test]
    fn viewport_fills_window_at_base_resolution() {
        let (viewport, _) = letterbox_viewport(extent(1240, 720));
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 0.0);
        assert_eq!(viewport.width, 1240.0);
        assert_eq!(viewport.height, 720.0);
    }

    #[test]
    fn viewport_pillarboxes_wide_windows() {
        let (viewport, scissor) = letterbox_viewport(extent(2480, 720));
        assert_eq!(viewport.width, 1240.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.x, 620.0);
        assert_eq!(viewport.y, 0.0);
        assert_eq!(scissor.offset.x, 620);
    }

    #[test]
    fn viewport_letterboxes_tall_windows() {
        let (viewport, _) = letterbox_viewport(extent(1240, 1440));
        assert_eq!(viewport.width, 1240.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.y, 360.0);
    }

    #[test]
    fn viewport_scales_down_but_never_up() {
        let (small, _) = letterbox_viewport(extent(620, 360));
        assert_eq!(small.width, 620.0);
        assert_eq!(small.height, 360.0);

        let (large, _) = letterbox_viewport(extent(5000, 4000));
        assert_eq!(large.width, 1240.0);
        assert_eq!(large.height, 720.0);
    }

    #[test]
    fn viewport_preserves_aspect_ratio_and_center() {
        for (w, h) in [(100, 100), (1000, 300), (1920, 1080), (333, 777)] {
            let (viewport, _) = letterbox_viewport(extent(w, h));
            let aspect = viewport.width / viewport.height;
            assert!((aspect - 1240.0 / 720.0).abs() < 1e-3);
            assert!((viewport.x * 2.0 + viewport.width - w as f32).abs() < 1e-3);
            assert!((viewport.y * 2.0 + viewport.height - h as f32).abs() < 1e-3);
            assert!(viewport.width <= 1240.0);
            assert!(viewport.height <= 720.0);
        }
    }
}
