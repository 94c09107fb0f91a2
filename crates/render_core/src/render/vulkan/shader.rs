//! Shader modules and graphics pipeline assembly
//!
//! SPIR-V loading plus a builder for the single scene pipeline. Viewport and
//! scissor are dynamic, so a pipeline survives swapchain recreation as long
//! as its render pass does.

use ash::{vk, Device};
use std::ffi::CStr;
use std::fs::File;
use std::path::Path;

use crate::render::vulkan::{VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = c"main";

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Load a compiled `.spv` file
    pub fn from_spv_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to open shader file {}: {e}", path.display()))
        })?;
        let code = ash::util::read_spv(&mut file).map_err(|e| {
            VulkanError::InitializationFailed(format!("Failed to read shader file {}: {e}", path.display()))
        })?;

        log::debug!("Loaded shader {} ({} words)", path.display(), code.len());

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None)? };

        Ok(Self { device, module })
    }

    fn stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Graphics pipeline and its layout
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Get pipeline handle
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Fixed-function state of a pipeline, separate from the handles it needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PipelineState {
    /// Enable depth test and write with `LESS`
    depth_test: bool,
    /// Rasterization samples, matching the render pass
    samples: vk::SampleCountFlags,
    /// Faces to cull
    cull_mode: vk::CullModeFlags,
    /// Winding of front faces
    front_face: vk::FrontFace,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            depth_test: true,
            samples: vk::SampleCountFlags::TYPE_1,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

/// Builder for [`GraphicsPipeline`]
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: &'a ShaderModule,
    fragment_shader: &'a ShaderModule,
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    state: PipelineState,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Start from a vertex and fragment shader pair
    pub fn new(vertex_shader: &'a ShaderModule, fragment_shader: &'a ShaderModule) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            bindings: Vec::new(),
            attributes: Vec::new(),
            set_layouts: Vec::new(),
            state: PipelineState::default(),
        }
    }

    /// Vertex input layout
    pub fn vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.bindings = bindings.to_vec();
        self.attributes = attributes.to_vec();
        self
    }

    /// Append a descriptor set layout at the next set index
    pub fn descriptor_set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    /// Enable or disable depth testing
    pub fn depth_test(mut self, enabled: bool) -> Self {
        self.state.depth_test = enabled;
        self
    }

    /// Rasterization sample count
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.state.samples = samples;
        self
    }

    /// Create the layout and pipeline for subpass 0 of `render_pass`
    pub fn build(self, device: Device, render_pass: vk::RenderPass) -> VulkanResult<GraphicsPipeline> {
        let shader_stages = [
            self.vertex_shader.stage_info(vk::ShaderStageFlags::VERTEX),
            self.fragment_shader.stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.state.cull_mode)
            .front_face(self.state.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(self.state.samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.state.depth_test)
            .depth_write_enable(self.state.depth_test)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&self.set_layouts);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, err)) => {
                unsafe { device.destroy_pipeline_layout(layout, None) };
                return Err(err.into());
            }
        }
        .ok_or_else(|| VulkanError::InitializationFailed("No graphics pipeline created".to_string()))?;

        log::debug!(
            "Graphics pipeline created: depth {}, samples {:?}",
            self.state.depth_test,
            self.state.samples
        );

        Ok(GraphicsPipeline {
            device,
            pipeline,
            layout,
        })
    }
}
