//! Swapchain-dependent resource set
//!
//! The swapchain, its depth and multisample attachments and one framebuffer
//! per image are created and replaced as a unit.

use ash::vk;

use crate::core::RenderFeatures;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::image::{GpuImage, ImageDesc};
use crate::render::vulkan::render_pass::{framebuffer_attachments, RenderPass, RenderPassDesc};
use crate::render::vulkan::swapchain::{Swapchain, SwapchainPlan, SwapchainSupport};
use crate::render::vulkan::transfer::ResourceTransferEngine;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Result of a recreation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// A new chain is in place; pipelines must be rebuilt when the render pass changed
    Recreated {
        /// The surface format changed, so the render pass was rebuilt
        render_pass_changed: bool,
    },
    /// The framebuffer has no area; nothing was touched
    Deferred,
}

/// Depth and multisample targets sized to the swapchain
struct Attachments {
    depth: Option<GpuImage>,
    msaa_color: Option<GpuImage>,
}

/// Owns the swapchain, render pass, attachments and framebuffers
pub struct SwapchainManager {
    // Field order is destruction order
    framebuffers: Vec<Framebuffer>,
    attachments: Attachments,
    swapchain: Swapchain,
    render_pass: RenderPass,
    depth_format: Option<vk::Format>,
    samples: vk::SampleCountFlags,
}

impl SwapchainManager {
    /// Build the full set for the current surface
    pub fn create(
        context: &DeviceContext,
        pool: &CommandPool,
        features: RenderFeatures,
        framebuffer_size: (u32, u32),
    ) -> VulkanResult<Self> {
        let depth_format = if features.contains(RenderFeatures::DEPTH) {
            Some(context.find_depth_format()?)
        } else {
            None
        };
        let samples = if features.contains(RenderFeatures::MSAA) {
            context.max_usable_sample_count()
        } else {
            vk::SampleCountFlags::TYPE_1
        };

        let plan = SwapchainPlan::resolve(&SwapchainSupport::query(context)?, framebuffer_size)?;
        if plan.is_zero_area() {
            return Err(VulkanError::InitializationFailed(
                "Cannot create a swapchain for a zero-sized framebuffer".to_string(),
            ));
        }

        let swapchain = Swapchain::new(context, plan, vk::SwapchainKHR::null())?;
        let render_pass = RenderPass::new(
            context.device().clone(),
            RenderPassDesc {
                color_format: swapchain.format(),
                depth_format,
                samples,
            },
        )?;
        let attachments = Self::create_attachments(context, pool, render_pass.desc(), swapchain.extent())?;
        let framebuffers = Self::create_framebuffers(context, &render_pass, &swapchain, &attachments)?;

        log::debug!(
            "SwapchainManager created: {} framebuffers, depth {:?}, samples {:?}",
            framebuffers.len(),
            depth_format,
            samples
        );

        Ok(Self {
            framebuffers,
            attachments,
            swapchain,
            render_pass,
            depth_format,
            samples,
        })
    }

    /// Replace the swapchain and everything derived from it
    ///
    /// Waits for the device to go idle first. A zero-area framebuffer leaves
    /// the current set untouched and reports [`RecreateOutcome::Deferred`].
    ///
    /// Teardown order is framebuffers, then depth and MSAA attachments. The old
    /// swapchain and its image views are released only after the new chain has
    /// been created, because its handle must be passed as `oldSwapchain`. The
    /// old views are owned by the old [`Swapchain`] and go with it. Rebuild
    /// runs in dependency order: swapchain, render pass (only when the format
    /// changed), attachments, framebuffers.
    pub fn recreate(
        &mut self,
        context: &DeviceContext,
        pool: &CommandPool,
        framebuffer_size: (u32, u32),
    ) -> VulkanResult<RecreateOutcome> {
        let plan = SwapchainPlan::resolve(&SwapchainSupport::query(context)?, framebuffer_size)?;
        if plan.is_zero_area() {
            log::debug!("Swapchain recreation deferred: framebuffer has zero area");
            return Ok(RecreateOutcome::Deferred);
        }

        context.wait_idle()?;

        // Dependents go first; the old chain stays alive to be retired by the new one
        self.framebuffers.clear();
        self.attachments = Attachments {
            depth: None,
            msaa_color: None,
        };

        let new_swapchain = Swapchain::new(context, plan, self.swapchain.handle())?;
        let old_swapchain = std::mem::replace(&mut self.swapchain, new_swapchain);
        drop(old_swapchain);

        let render_pass_changed = self.render_pass.desc().color_format != self.swapchain.format();
        if render_pass_changed {
            log::debug!(
                "Swapchain format changed to {:?}, rebuilding render pass",
                self.swapchain.format()
            );
            self.render_pass = RenderPass::new(
                context.device().clone(),
                RenderPassDesc {
                    color_format: self.swapchain.format(),
                    depth_format: self.depth_format,
                    samples: self.samples,
                },
            )?;
        }

        self.attachments = Self::create_attachments(context, pool, self.render_pass.desc(), self.swapchain.extent())?;
        self.framebuffers = Self::create_framebuffers(context, &self.render_pass, &self.swapchain, &self.attachments)?;

        log::debug!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(RecreateOutcome::Recreated { render_pass_changed })
    }

    fn create_attachments(
        context: &DeviceContext,
        pool: &CommandPool,
        desc: &RenderPassDesc,
        extent: vk::Extent2D,
    ) -> VulkanResult<Attachments> {
        let transfer = ResourceTransferEngine::new(context, pool);

        let depth = desc
            .depth_format
            .map(|format| -> VulkanResult<GpuImage> {
                let mut image = transfer.create_image(ImageDesc::depth_attachment(extent, format, desc.samples))?;
                transfer.transition_layout(&mut image, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)?;
                Ok(image)
            })
            .transpose()?;

        let msaa_color = if desc.is_multisampled() {
            Some(transfer.create_image(ImageDesc::multisample_color(extent, desc.color_format, desc.samples))?)
        } else {
            None
        };

        Ok(Attachments { depth, msaa_color })
    }

    fn create_framebuffers(
        context: &DeviceContext,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        attachments: &Attachments,
    ) -> VulkanResult<Vec<Framebuffer>> {
        let depth_view = attachments.depth.as_ref().map(GpuImage::view);
        let msaa_view = attachments.msaa_color.as_ref().map(GpuImage::view);

        swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    context.device().clone(),
                    render_pass.handle(),
                    &framebuffer_attachments(view, depth_view, msaa_view),
                    swapchain.extent(),
                )
            })
            .collect()
    }

    /// Current swapchain
    pub const fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Render pass compatible with the framebuffers
    pub const fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    /// Framebuffer for a swapchain image
    pub fn framebuffer(&self, image_index: u32) -> VulkanResult<vk::Framebuffer> {
        self.framebuffers
            .get(image_index as usize)
            .map(Framebuffer::handle)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for image {image_index}"),
            })
    }

    /// Samples per pixel of the color and depth targets
    pub const fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}
