//! Vulkan frame backend
//!
//! [`VulkanRenderer`] owns every GPU object the frame loop touches and
//! implements [`FrameBackend`] so [`crate::render::FrameScheduler`] can drive
//! it. Scene data is uploaded once through the transfer engine; per-frame
//! uniforms go through the descriptor table's persistently mapped buffers.

use ash::vk;
use nalgebra::Matrix4;

use crate::assets::{ImageData, SceneData};
use crate::core::{RenderFeatures, RendererConfig};
use crate::render::scheduler::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::render::vertex::{TextureSelector, UniformBufferObject, Vertex};
use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::descriptor::{DescriptorBindingTable, DescriptorLayoutSpec};
use crate::render::vulkan::image::{GpuImage, Sampler};
use crate::render::vulkan::shader::{GraphicsPipeline, GraphicsPipelineBuilder, ShaderModule};
use crate::render::vulkan::surface::SurfaceProvider;
use crate::render::vulkan::swapchain_manager::{RecreateOutcome, SwapchainManager};
use crate::render::vulkan::sync::FrameSlot;
use crate::render::vulkan::transfer::ResourceTransferEngine;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Length of the sampler array in the scene fragment shader
pub const TEXTURE_SLOTS: u32 = 3;

const UNIFORM_BINDING: u32 = 0;
const TEXTURE_BINDING: u32 = 1;
const SELECTOR_BINDING: u32 = 2;

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// One indexed draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRange {
    /// First index in the scene index buffer
    pub first_index: u32,
    /// Number of indices
    pub index_count: u32,
}

/// Sampled texture and the sampler created for its mip chain
struct SceneTexture {
    sampler: Sampler,
    image: GpuImage,
}

/// Device-resident scene
struct GpuScene {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    draws: Vec<DrawRange>,
    #[allow(dead_code)] // Kept alive while the descriptor sets reference them
    textures: Vec<SceneTexture>,
}

/// Camera and model transforms applied to the next frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransforms {
    /// Model matrix
    pub model: Matrix4<f32>,
    /// View matrix
    pub view: Matrix4<f32>,
    /// Vertical field of view in radians
    pub fovy: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for FrameTransforms {
    fn default() -> Self {
        Self {
            model: Matrix4::identity(),
            view: Matrix4::identity(),
            fovy: 45f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Vulkan implementation of the frame protocol
pub struct VulkanRenderer {
    // Field order is destruction order; the device goes last
    scene: Option<GpuScene>,
    placeholder: SceneTexture,
    pipeline: GraphicsPipeline,
    vertex_shader: ShaderModule,
    fragment_shader: ShaderModule,
    descriptors: DescriptorBindingTable,
    slots: Vec<FrameSlot>,
    swapchain: SwapchainManager,
    #[allow(dead_code)] // Owns the slots' command buffers
    frame_pool: CommandPool,
    transfer_pool: CommandPool,
    features: RenderFeatures,
    clear_color: [f32; 4],
    transforms: FrameTransforms,
    selector: TextureSelector,
    context: DeviceContext,
}

impl VulkanRenderer {
    /// Create the device, swapchain, frame slots and scene pipeline
    pub fn new<P: SurfaceProvider + ?Sized>(config: &RendererConfig, provider: &mut P) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid renderer config: {e}")))?;

        log::debug!("Creating DeviceContext...");
        let context = DeviceContext::new(&config.device, provider)?;
        let features = config.render_features();

        let graphics_family = context.queue_families().graphics;
        let frame_pool = CommandPool::new(context.device().clone(), graphics_family)?;
        let transfer_pool = CommandPool::new(context.device().clone(), graphics_family)?;

        log::debug!("Creating SwapchainManager...");
        let swapchain = SwapchainManager::create(&context, &transfer_pool, features, provider.framebuffer_size())?;

        let frames_in_flight = config.frames_in_flight;
        let command_buffers = frame_pool.allocate_command_buffers(frames_in_flight as u32)?;
        let slots = FrameSlot::create_ring(context.device(), &command_buffers)?;

        let descriptor_spec = DescriptorLayoutSpec::new()
            .uniform_buffer(
                UNIFORM_BINDING,
                std::mem::size_of::<UniformBufferObject>() as vk::DeviceSize,
                vk::ShaderStageFlags::VERTEX,
            )
            .image_samplers(TEXTURE_BINDING, TEXTURE_SLOTS, vk::ShaderStageFlags::FRAGMENT)
            .uniform_buffer(
                SELECTOR_BINDING,
                std::mem::size_of::<TextureSelector>() as vk::DeviceSize,
                vk::ShaderStageFlags::FRAGMENT,
            );
        let mut descriptors = DescriptorBindingTable::new(&context, descriptor_spec, frames_in_flight)?;

        log::debug!("Loading scene shaders...");
        let vertex_shader = ShaderModule::from_spv_file(context.device().clone(), &config.shaders.vertex_shader_path)?;
        let fragment_shader =
            ShaderModule::from_spv_file(context.device().clone(), &config.shaders.fragment_shader_path)?;
        let pipeline = Self::build_pipeline(
            &context,
            &swapchain,
            &vertex_shader,
            &fragment_shader,
            descriptors.layout(),
            features,
        )?;

        let placeholder = Self::create_texture(
            &context,
            &transfer_pool,
            &ImageData::checkerboard(64, 8, [255, 0, 255, 255], [32, 32, 32, 255]),
            false,
        )?;
        descriptors.bind_textures(TEXTURE_BINDING, &[(placeholder.image.view(), placeholder.sampler.handle())])?;

        log::info!(
            "VulkanRenderer ready: {} frames in flight, features {:?}",
            frames_in_flight,
            features
        );

        Ok(Self {
            scene: None,
            placeholder,
            pipeline,
            vertex_shader,
            fragment_shader,
            descriptors,
            slots,
            swapchain,
            frame_pool,
            transfer_pool,
            features,
            clear_color: config.clear_color,
            transforms: FrameTransforms::default(),
            selector: TextureSelector::new(0),
            context,
        })
    }

    fn build_pipeline(
        context: &DeviceContext,
        swapchain: &SwapchainManager,
        vertex_shader: &ShaderModule,
        fragment_shader: &ShaderModule,
        set_layout: vk::DescriptorSetLayout,
        features: RenderFeatures,
    ) -> VulkanResult<GraphicsPipeline> {
        GraphicsPipelineBuilder::new(vertex_shader, fragment_shader)
            .vertex_input(&[Vertex::binding_description()], &Vertex::attribute_descriptions())
            .descriptor_set_layout(set_layout)
            .depth_test(features.contains(RenderFeatures::DEPTH))
            .samples(swapchain.samples())
            .build(context.device().clone(), swapchain.render_pass().handle())
    }

    fn create_texture(
        context: &DeviceContext,
        pool: &CommandPool,
        image: &ImageData,
        mipmapped: bool,
    ) -> VulkanResult<SceneTexture> {
        let transfer = ResourceTransferEngine::new(context, pool);
        let extent = vk::Extent2D {
            width: image.width,
            height: image.height,
        };
        let image = transfer.create_texture(&image.data, extent, TEXTURE_FORMAT, mipmapped)?;
        let sampler = Sampler::new(context, image.mip_levels())?;
        Ok(SceneTexture { sampler, image })
    }

    /// Upload a scene and its decoded textures, replacing any previous scene
    ///
    /// `textures` is indexed by material; at most [`TEXTURE_SLOTS`] are bound.
    /// Blocks until the device is idle before touching resources in use.
    pub fn load_scene(&mut self, scene: &SceneData, textures: &[ImageData]) -> VulkanResult<()> {
        if scene.vertices.is_empty() || scene.indices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Scene has no geometry".to_string(),
            });
        }
        if textures.len() > TEXTURE_SLOTS as usize {
            log::warn!(
                "Scene has {} textures, only the first {} are bound",
                textures.len(),
                TEXTURE_SLOTS
            );
        }

        self.context.wait_idle()?;

        let mipmapped = self.features.contains(RenderFeatures::MIPMAPS);
        let transfer = ResourceTransferEngine::new(&self.context, &self.transfer_pool);
        let vertex_buffer = transfer.create_device_local_buffer(
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&scene.vertices),
        )?;
        let index_buffer = transfer.create_device_local_buffer(
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&scene.indices),
        )?;

        let textures = textures
            .iter()
            .take(TEXTURE_SLOTS as usize)
            .map(|image| Self::create_texture(&self.context, &self.transfer_pool, image, mipmapped))
            .collect::<VulkanResult<Vec<_>>>()?;

        let bindings: Vec<(vk::ImageView, vk::Sampler)> = if textures.is_empty() {
            vec![(self.placeholder.image.view(), self.placeholder.sampler.handle())]
        } else {
            textures.iter().map(|t| (t.image.view(), t.sampler.handle())).collect()
        };
        self.descriptors.bind_textures(TEXTURE_BINDING, &bindings)?;

        let draws = scene
            .meshes
            .iter()
            .filter(|mesh| mesh.index_count > 0)
            .map(|mesh| DrawRange {
                first_index: mesh.first_index,
                index_count: mesh.index_count,
            })
            .collect();

        log::info!(
            "Scene uploaded: {} vertices, {} indices, {} textures",
            scene.vertices.len(),
            scene.indices.len(),
            textures.len()
        );

        self.scene = Some(GpuScene {
            vertex_buffer,
            index_buffer,
            draws,
            textures,
        });
        Ok(())
    }

    /// Transforms written into the next frames' uniforms
    pub fn set_transforms(&mut self, transforms: FrameTransforms) {
        self.transforms = transforms;
    }

    /// Texture used by vertices without a material
    pub fn set_default_texture(&mut self, index: u32) {
        self.selector = TextureSelector::new(index.min(TEXTURE_SLOTS - 1) as i32);
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.swapchain().extent()
    }

    fn slot(&self, slot: usize) -> VulkanResult<&FrameSlot> {
        self.slots.get(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Frame slot {slot} out of range"),
        })
    }
}

impl FrameBackend for VulkanRenderer {
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.slot(slot)?.sync.in_flight.wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
        let semaphore = self.slot(slot)?.sync.image_available.handle();
        self.swapchain.swapchain().acquire_next_image(semaphore)
    }

    fn update_descriptors(&mut self, slot: usize, _image_index: u32) -> VulkanResult<()> {
        let extent = self.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let t = &self.transforms;
        let proj = UniformBufferObject::vulkan_perspective(t.fovy, aspect, t.near, t.far);
        let ubo = UniformBufferObject::new(&t.model, &t.view, &proj);

        self.descriptors.write_uniform(slot, UNIFORM_BINDING, &ubo)?;
        self.descriptors.write_uniform(slot, SELECTOR_BINDING, &self.selector)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let command_buffer = self.slot(slot)?.command_buffer;
        let descriptor_set = self.descriptors.set(slot)?;
        let framebuffer = self.swapchain.framebuffer(image_index)?;
        let extent = self.extent();
        let clear_values = self.swapchain.render_pass().desc().clear_values(self.clear_color);

        let mut recorder = CommandRecorder::new(command_buffer, self.context.device().clone());
        recorder.reset()?.begin(vk::CommandBufferUsageFlags::empty())?;

        {
            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            let mut pass = recorder.begin_render_pass(
                self.swapchain.render_pass().handle(),
                framebuffer,
                render_area,
                &clear_values,
            )?;

            if let Some(scene) = &self.scene {
                pass.bind_pipeline(self.pipeline.handle());
                pass.set_viewport(vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: extent.width as f32,
                    height: extent.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                });
                pass.set_scissor(render_area);
                pass.bind_descriptor_sets(self.pipeline.layout(), &[descriptor_set]);
                pass.bind_vertex_buffers(0, &[scene.vertex_buffer.handle()], &[0]);
                pass.bind_index_buffer(scene.index_buffer.handle(), 0, vk::IndexType::UINT32);

                for draw in &scene.draws {
                    pass.draw_indexed(draw.index_count, draw.first_index, 0);
                }
            }
        }

        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let frame = self.slot(slot)?;

        // Only reset once work that will signal it is certain to be submitted
        frame.sync.in_flight.reset()?;

        let wait_semaphores = [frame.sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [frame.command_buffer];
        let signal_semaphores = [frame.sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context.device().queue_submit(
                self.context.graphics_queue(),
                &[submit_info],
                frame.sync.in_flight.handle(),
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let wait_semaphore = self.slot(slot)?.sync.render_finished.handle();
        self.swapchain
            .swapchain()
            .present(self.context.present_queue(), image_index, wait_semaphore)
    }

    fn recreate_swapchain(&mut self, framebuffer_size: (u32, u32)) -> VulkanResult<RecreateOutcome> {
        let outcome = self.swapchain.recreate(&self.context, &self.transfer_pool, framebuffer_size)?;

        if let RecreateOutcome::Recreated {
            render_pass_changed: true,
        } = outcome
        {
            self.pipeline = Self::build_pipeline(
                &self.context,
                &self.swapchain,
                &self.vertex_shader,
                &self.fragment_shader,
                self.descriptors.layout(),
                self.features,
            )?;
        }
        Ok(outcome)
    }

    fn wait_idle(&mut self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        log::debug!("Cleaning up VulkanRenderer...");
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during cleanup: {e}");
        }
    }
}
