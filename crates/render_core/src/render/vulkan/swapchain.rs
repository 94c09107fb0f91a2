//! Swapchain selection and creation
//!
//! The selection rules are plain functions over the surface's reported
//! support so they can be checked without a device. [`Swapchain`] owns the
//! chain and one color view per image.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::scheduler::{AcquireOutcome, PresentOutcome};
use crate::render::vulkan::image::create_image_view;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Prefer `B8G8R8A8_SRGB` in `SRGB_NONLINEAR`, else the first offered format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first().copied())
        .ok_or_else(|| VulkanError::InitializationFailed("Surface offers no formats".to_string()))
}

/// Prefer `MAILBOX`, else `FIFO` which every implementation supports
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Use the surface's current extent unless it is the `u32::MAX` sentinel,
/// in which case clamp the framebuffer size to the supported range
pub fn resolve_extent(capabilities: &vk::SurfaceCapabilitiesKHR, framebuffer: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when it is non-zero
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let requested = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        requested.min(capabilities.max_image_count)
    } else {
        requested
    }
}

/// What the surface reports for the selected device
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format/color-space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query the context's surface
    pub fn query(context: &DeviceContext) -> VulkanResult<Self> {
        let loader = context.surface_loader();
        let device = context.physical_device().handle;
        let surface = context.surface();

        unsafe {
            Ok(Self {
                capabilities: loader.get_physical_device_surface_capabilities(device, surface)?,
                formats: loader.get_physical_device_surface_formats(device, surface)?,
                present_modes: loader.get_physical_device_surface_present_modes(device, surface)?,
            })
        }
    }
}

/// Resolved swapchain parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    /// Image format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Present mode
    pub present_mode: vk::PresentModeKHR,
    /// Image size
    pub extent: vk::Extent2D,
    /// Requested minimum image count
    pub image_count: u32,
    /// Surface transform to apply
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    /// Apply the selection rules to the reported support
    pub fn resolve(support: &SwapchainSupport, framebuffer: (u32, u32)) -> VulkanResult<Self> {
        Ok(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: resolve_extent(&support.capabilities, framebuffer),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }

    /// Whether the extent has no area, as when the window is minimised
    pub const fn is_zero_area(&self) -> bool {
        self.extent.width == 0 || self.extent.height == 0
    }
}

/// Presentable image chain with one view per image
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    plan: SwapchainPlan,
}

impl Swapchain {
    /// Create the chain described by `plan`, retiring `old_swapchain` if not null
    pub fn new(context: &DeviceContext, plan: SwapchainPlan, old_swapchain: vk::SwapchainKHR) -> VulkanResult<Self> {
        let device = context.device().clone();
        let loader = context.swapchain_loader()?.clone();
        let families = context.queue_families();
        let family_indices = [families.graphics, families.present];

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface())
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if families.is_shared() {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        // Views are pushed as they are created so Drop can release a partial set
        let mut chain = Self {
            device,
            loader,
            swapchain,
            images,
            image_views: Vec::new(),
            plan,
        };
        for index in 0..chain.images.len() {
            let view = create_image_view(
                &chain.device,
                chain.images[index],
                plan.surface_format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            chain.image_views.push(view);
        }

        log::debug!(
            "Created swapchain: {} images, {:?}, {:?}, {}x{}",
            chain.images.len(),
            plan.surface_format.format,
            plan.present_mode,
            plan.extent.width,
            plan.extent.height
        );

        Ok(chain)
    }

    /// Acquire the next image, signaling `semaphore` when it is writable
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Queue `image_index` for presentation after `wait_semaphore`
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VulkanResult<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Swapchain handle
    pub const fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image size
    pub const fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    /// Image format
    pub const fn format(&self) -> vk::Format {
        self.plan.surface_format.format
    }

    /// Number of images actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Color views, indexed like the images
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_extent_sentinel_uses_framebuffer() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 8);
        assert_eq!(resolve_extent(&caps, (1280, 720)), vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn test_extent_sentinel_clamps_framebuffer() {
        let caps = capabilities((u32::MAX, u32::MAX), 2, 8);
        assert_eq!(resolve_extent(&caps, (8000, 0)), vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn test_extent_current_used_verbatim() {
        let caps = capabilities((800, 600), 2, 8);
        assert_eq!(resolve_extent(&caps, (1280, 720)), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_present_mode_preference() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_surface_format_preference() {
        let preferred = format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let other = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);

        assert_eq!(choose_surface_format(&[other, preferred]).unwrap(), preferred);
        assert_eq!(choose_surface_format(&[other]).unwrap(), other);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_image_count_clamp() {
        assert_eq!(choose_image_count(&capabilities((800, 600), 2, 8)), 3);
        assert_eq!(choose_image_count(&capabilities((800, 600), 3, 3)), 3);
        assert_eq!(choose_image_count(&capabilities((800, 600), 2, 0)), 3);
    }

    #[test]
    fn test_plan_is_stable_across_recreation() {
        let support = SwapchainSupport {
            capabilities: capabilities((u32::MAX, u32::MAX), 2, 3),
            formats: vec![format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        let first = SwapchainPlan::resolve(&support, (1024, 768)).unwrap();
        let second = SwapchainPlan::resolve(&support, (1024, 768)).unwrap();
        assert_eq!(first, second);
        assert!((2..=3).contains(&second.image_count));
        assert_eq!(second.present_mode, vk::PresentModeKHR::MAILBOX);
        assert!(!second.is_zero_area());
    }

    #[test]
    fn test_plan_minimised_window_is_zero_area() {
        let support = SwapchainSupport {
            capabilities: capabilities((0, 0), 2, 3),
            formats: vec![format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(SwapchainPlan::resolve(&support, (0, 0)).unwrap().is_zero_area());
    }
}
