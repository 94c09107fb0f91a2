//! Vulkan rendering backend
//!
//! RAII wrappers over the raw `ash` objects plus the four subsystems the
//! frame loop is built from: [`DeviceContext`], [`SwapchainManager`],
//! [`ResourceTransferEngine`] and [`DescriptorBindingTable`].
//! [`VulkanRenderer`] ties them together as a
//! [`FrameBackend`](crate::render::FrameBackend).

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor;
pub mod framebuffer;
pub mod image;
pub mod render_pass;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;
pub mod transfer;
pub mod window;

pub use buffer::{Buffer, MappedBuffer};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder};
pub use context::{DeviceContext, PhysicalDeviceInfo, QueueFamilyIndices, VulkanError, VulkanInstance, VulkanResult};
pub use descriptor::{BindingKind, DescriptorBindingTable, DescriptorLayoutSpec};
pub use framebuffer::Framebuffer;
pub use image::{GpuImage, ImageDesc, Sampler};
pub use render_pass::{RenderPass, RenderPassDesc};
pub use renderer::{FrameTransforms, VulkanRenderer, TEXTURE_SLOTS};
pub use shader::{GraphicsPipeline, GraphicsPipelineBuilder, ShaderModule};
pub use surface::{FramebufferSource, SurfaceProvider};
pub use swapchain::{Swapchain, SwapchainPlan, SwapchainSupport};
pub use swapchain_manager::{RecreateOutcome, SwapchainManager};
pub use sync::{Fence, FrameSlot, FrameSync, Semaphore};
pub use transfer::ResourceTransferEngine;
pub use window::{Window, WindowError, WindowEvent};
