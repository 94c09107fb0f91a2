//! Forward render pass
//!
//! Attachment order is fixed: the color target, then depth when enabled,
//! then the single-sample resolve target when multisampling.

use ash::{vk, Device};

use crate::render::vulkan::VulkanResult;

/// Formats and sample count of the pass's attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    /// Swapchain image format
    pub color_format: vk::Format,
    /// Depth format, `None` without a depth attachment
    pub depth_format: Option<vk::Format>,
    /// Samples per pixel of the color and depth targets
    pub samples: vk::SampleCountFlags,
}

impl RenderPassDesc {
    /// Whether the pass renders multisampled and resolves into the swapchain image
    pub fn is_multisampled(&self) -> bool {
        self.samples != vk::SampleCountFlags::TYPE_1
    }

    /// Number of clear values `begin_render_pass` needs
    pub fn attachment_count(&self) -> usize {
        1 + usize::from(self.depth_format.is_some()) + usize::from(self.is_multisampled())
    }

    /// Clear values in attachment order
    pub fn clear_values(&self, clear_color: [f32; 4]) -> Vec<vk::ClearValue> {
        let mut values = vec![vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];
        if self.depth_format.is_some() {
            values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        }
        if self.is_multisampled() {
            values.push(vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            });
        }
        values
    }
}

/// Framebuffer attachment views in render pass order
pub fn framebuffer_attachments(
    swapchain_view: vk::ImageView,
    depth_view: Option<vk::ImageView>,
    msaa_color_view: Option<vk::ImageView>,
) -> Vec<vk::ImageView> {
    match msaa_color_view {
        Some(color) => std::iter::once(color)
            .chain(depth_view)
            .chain(std::iter::once(swapchain_view))
            .collect(),
        None => std::iter::once(swapchain_view).chain(depth_view).collect(),
    }
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    /// Create a single-subpass forward pass
    pub fn new(device: Device, desc: RenderPassDesc) -> VulkanResult<Self> {
        let multisampled = desc.is_multisampled();

        let mut attachments = vec![vk::AttachmentDescription::builder()
            .format(desc.color_format)
            .samples(desc.samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(if multisampled {
                vk::AttachmentStoreOp::DONT_CARE
            } else {
                vk::AttachmentStoreOp::STORE
            })
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(if multisampled {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::PRESENT_SRC_KHR
            })
            .build()];

        let color_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];

        let depth_ref = desc.depth_format.map(|format| {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(format)
                    .samples(desc.samples)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            vk::AttachmentReference {
                attachment: 1,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let resolve_ref = multisampled.then(|| {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(desc.color_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .build(),
            );
            [vk::AttachmentReference {
                attachment: (attachments.len() - 1) as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            }]
        });

        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        if let Some(resolve_ref) = resolve_ref.as_ref() {
            subpass = subpass.resolve_attachments(resolve_ref);
        }
        let subpasses = [subpass.build()];

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            )
            .build();
        let dependencies = [dependency];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.create_render_pass(&create_info, None)? };

        Ok(Self {
            device,
            render_pass,
            desc,
        })
    }

    /// Get the render pass handle
    pub const fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Attachment description the pass was built from
    pub const fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
