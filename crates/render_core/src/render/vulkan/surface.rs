//! Window-system seam
//!
//! The core never touches a windowing library directly. A window hands over
//! the instance extensions it needs, creates the presentation surface and
//! reports its framebuffer size in pixels.

use ash::vk;

use crate::render::vulkan::VulkanResult;

/// Synchronous source of the current framebuffer size in pixels
pub trait FramebufferSource {
    /// Framebuffer width and height; `(0, 0)` while minimised
    fn framebuffer_size(&self) -> (u32, u32);
}

/// Fixed sizes, for offscreen use and tests
impl FramebufferSource for (u32, u32) {
    fn framebuffer_size(&self) -> (u32, u32) {
        *self
    }
}

/// A window that can host a Vulkan surface
pub trait SurfaceProvider: FramebufferSource {
    /// Instance extensions the window system needs
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create the presentation surface; ownership passes to the caller
    fn create_surface(&mut self, instance: &ash::Instance) -> VulkanResult<vk::SurfaceKHR>;
}
