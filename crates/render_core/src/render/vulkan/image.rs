//! Device images, views and samplers
//!
//! A [`GpuImage`] records its current layout and mip count. The layout only
//! changes through the transfer engine, which records the matching barrier.

use ash::{vk, Device};

use crate::render::vulkan::buffer::allocate_memory;
use crate::render::vulkan::context::has_stencil_component;
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Full mip chain length: `floor(log2(max(width, height))) + 1`
pub fn mip_levels_for(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Bytes per texel of an uncompressed color format that can be staged
///
/// `None` for depth, packed and block-compressed formats.
pub fn texel_size(format: vk::Format) -> Option<u32> {
    use vk::Format as F;

    match format {
        F::R8_UNORM | F::R8_SNORM | F::R8_UINT | F::R8_SINT | F::R8_SRGB => Some(1),
        F::R8G8_UNORM
        | F::R8G8_SNORM
        | F::R8G8_UINT
        | F::R8G8_SINT
        | F::R8G8_SRGB
        | F::R16_UNORM
        | F::R16_SFLOAT
        | F::R16_UINT
        | F::R16_SINT => Some(2),
        F::R8G8B8A8_UNORM
        | F::R8G8B8A8_SNORM
        | F::R8G8B8A8_UINT
        | F::R8G8B8A8_SINT
        | F::R8G8B8A8_SRGB
        | F::B8G8R8A8_UNORM
        | F::B8G8R8A8_SRGB
        | F::R16G16_UNORM
        | F::R16G16_SFLOAT
        | F::R32_SFLOAT
        | F::R32_UINT
        | F::R32_SINT => Some(4),
        F::R16G16B16A16_UNORM | F::R16G16B16A16_SFLOAT | F::R32G32_SFLOAT => Some(8),
        F::R32G32B32A32_SFLOAT | F::R32G32B32A32_UINT | F::R32G32B32A32_SINT => Some(16),
        _ => None,
    }
}

/// Aspect flags implied by a format
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        f if has_stencil_component(f) || f == vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Image creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Size of mip level 0
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Number of mip levels
    pub mip_levels: u32,
    /// Samples per texel
    pub samples: vk::SampleCountFlags,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Memory properties of the backing allocation
    pub memory_properties: vk::MemoryPropertyFlags,
}

impl ImageDesc {
    /// Sampled texture uploaded through a staging buffer
    ///
    /// With `mipmapped` the full chain is allocated and the image is also a
    /// transfer source for the blits that fill it.
    pub fn texture(extent: vk::Extent2D, format: vk::Format, mipmapped: bool) -> Self {
        let mip_levels = if mipmapped { mip_levels_for(extent.width, extent.height) } else { 1 };
        Self {
            extent,
            format,
            mip_levels,
            samples: vk::SampleCountFlags::TYPE_1,
            usage: vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    /// Depth attachment matching the swapchain extent
    pub const fn depth_attachment(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            extent,
            format,
            mip_levels: 1,
            samples,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    /// Transient multisampled color target resolved into the swapchain image
    pub fn multisample_color(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        Self {
            extent,
            format,
            mip_levels: 1,
            samples,
            usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }

    /// Aspect of the image's view
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }

    /// Byte size of tightly packed mip level 0, if the format can be staged
    pub fn level0_size(&self) -> Option<vk::DeviceSize> {
        let texel = vk::DeviceSize::from(texel_size(self.format)?);
        Some(vk::DeviceSize::from(self.extent.width) * vk::DeviceSize::from(self.extent.height) * texel)
    }
}

/// Create a 2D view over `mip_levels` levels
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });

    Ok(unsafe { device.create_image_view(&create_info, None)? })
}

/// Device image with memory, a full view and tracked layout
pub struct GpuImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    desc: ImageDesc,
    layout: vk::ImageLayout,
}

impl GpuImage {
    /// Create the image in `UNDEFINED` layout with bound memory and a view
    pub fn new(context: &DeviceContext, desc: ImageDesc) -> VulkanResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 || desc.mip_levels == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Invalid image description {desc:?}"),
            });
        }

        let device = context.device().clone();
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(desc.samples)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.create_image(&create_info, None)? };
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let memory = match allocate_memory(&device, context.memory_properties(), requirements, desc.memory_properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe { device.bind_image_memory(image, memory, 0) }
            .map_err(VulkanError::from)
            .and_then(|()| create_image_view(&device, image, desc.format, desc.aspect(), desc.mip_levels));

        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(e);
            }
        };

        log::trace!(
            "Created image {}x{} {:?} ({} mips, {:?})",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.mip_levels,
            desc.samples
        );

        Ok(Self {
            device,
            image,
            memory,
            view,
            desc,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    /// Get image handle
    pub const fn handle(&self) -> vk::Image {
        self.image
    }

    /// View over every mip level
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Creation parameters
    pub const fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    /// Size of mip level 0
    pub const fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    /// Texel format
    pub const fn format(&self) -> vk::Format {
        self.desc.format
    }

    /// Number of mip levels
    pub const fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    /// Layout of every subresource after the last recorded transition
    pub const fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub(crate) fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Texture sampler with RAII cleanup
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear, repeating sampler with maximum anisotropy covering `mip_levels`
    pub fn new(context: &DeviceContext, mip_levels: u32) -> VulkanResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(context.max_sampler_anisotropy())
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);

        let device = context.device().clone();
        let sampler = unsafe { device.create_sampler(&create_info, None)? };
        Ok(Self { device, sampler })
    }

    /// Get sampler handle
    pub const fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_levels_for() {
        assert_eq!(mip_levels_for(1, 1), 1);
        assert_eq!(mip_levels_for(2, 1), 2);
        assert_eq!(mip_levels_for(512, 512), 10);
        assert_eq!(mip_levels_for(1024, 300), 11);
        assert_eq!(mip_levels_for(1023, 5), 10);
        assert_eq!(mip_levels_for(0, 0), 1);
    }

    #[test]
    fn test_texture_desc_mip_chain() {
        let extent = vk::Extent2D { width: 256, height: 64 };
        let mipped = ImageDesc::texture(extent, vk::Format::R8G8B8A8_SRGB, true);
        assert_eq!(mipped.mip_levels, 9);
        assert!(mipped.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert_eq!(mipped.level0_size(), Some(256 * 64 * 4));

        let flat = ImageDesc::texture(extent, vk::Format::R8G8B8A8_SRGB, false);
        assert_eq!(flat.mip_levels, 1);
    }

    #[test]
    fn test_level0_size_follows_format() {
        let extent = vk::Extent2D { width: 16, height: 8 };
        let size = |format| ImageDesc::texture(extent, format, false).level0_size();

        assert_eq!(size(vk::Format::R8_UNORM), Some(128));
        assert_eq!(size(vk::Format::B8G8R8A8_SRGB), Some(512));
        assert_eq!(size(vk::Format::R16G16B16A16_SFLOAT), Some(1024));
        assert_eq!(size(vk::Format::R32G32B32A32_SFLOAT), Some(2048));
        assert_eq!(size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
        assert_eq!(size(vk::Format::D32_SFLOAT), None);
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(aspect_for_format(vk::Format::R8G8B8A8_SRGB), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
