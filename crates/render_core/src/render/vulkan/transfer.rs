//! Host-to-device resource transfer
//!
//! Data reaches device-local memory through a temporary host-visible staging
//! buffer and a blocking one-shot submission on the graphics queue. Image
//! layouts move only along the pairs in [`transition_masks`].

use ash::vk;

use crate::render::vulkan::buffer::Buffer;
use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::image::{GpuImage, ImageDesc};
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Access and stage masks for one image layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Accesses that must complete before the transition
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing the source accesses
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming the destination accesses
    pub dst_stage: vk::PipelineStageFlags,
}

/// Look up the barrier masks for `old -> new`
///
/// Pairs outside the table are rejected rather than guessed.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::TRANSFER_READ, S::TRANSFER, S::TRANSFER)
        }
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_READ, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::EARLY_FRAGMENT_TESTS,
        ),
        _ => return Err(VulkanError::UnsupportedLayoutTransition { old, new }),
    };

    Ok(TransitionMasks {
        src_access,
        dst_access,
        src_stage,
        dst_stage,
    })
}

/// One blit of the mip chain: level `src_level` downsampled into `dst_level`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipStep {
    /// Level read from
    pub src_level: u32,
    /// Level written to
    pub dst_level: u32,
    /// Size of the source level
    pub src_extent: (i32, i32),
    /// Size of the destination level, halved with a floor of 1
    pub dst_extent: (i32, i32),
}

/// Blits needed to fill levels `1..mip_levels` from level 0
pub fn mip_chain_plan(extent: vk::Extent2D, mip_levels: u32) -> Vec<MipStep> {
    let mut width = extent.width.max(1) as i32;
    let mut height = extent.height.max(1) as i32;

    (1..mip_levels)
        .map(|level| {
            let next = ((width / 2).max(1), (height / 2).max(1));
            let step = MipStep {
                src_level: level - 1,
                dst_level: level,
                src_extent: (width, height),
                dst_extent: next,
            };
            (width, height) = next;
            step
        })
        .collect()
}

fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn blit_region(step: &MipStep) -> vk::ImageBlit {
    let corner = |(x, y): (i32, i32)| [vk::Offset3D { x: 0, y: 0, z: 0 }, vk::Offset3D { x, y, z: 1 }];
    vk::ImageBlit {
        src_subresource: color_layers(step.src_level),
        src_offsets: corner(step.src_extent),
        dst_subresource: color_layers(step.dst_level),
        dst_offsets: corner(step.dst_extent),
    }
}

/// Record a table-checked barrier over `level_count` levels starting at `base_level`
fn record_transition(
    recorder: &mut CommandRecorder,
    image: &GpuImage,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
    base_level: u32,
    level_count: u32,
) -> VulkanResult<()> {
    let masks = transition_masks(old, new)?;
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.handle())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: image.desc().aspect(),
            base_mip_level: base_level,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .build();

    recorder.cmd_image_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
    Ok(())
}

/// Creates device resources and moves data into them
pub struct ResourceTransferEngine<'a> {
    context: &'a DeviceContext,
    pool: &'a CommandPool,
}

impl<'a> ResourceTransferEngine<'a> {
    /// Use `pool` (on the graphics family) for one-shot transfer commands
    pub const fn new(context: &'a DeviceContext, pool: &'a CommandPool) -> Self {
        Self { context, pool }
    }

    /// Create a buffer with memory of the requested properties, bound at offset 0
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Buffer> {
        Buffer::new(self.context, size, usage, properties)
    }

    /// Create an image in `UNDEFINED` layout with memory bound at offset 0
    pub fn create_image(&self, desc: ImageDesc) -> VulkanResult<GpuImage> {
        GpuImage::new(self.context, desc)
    }

    /// Create a device-local buffer holding `data`
    pub fn create_device_local_buffer(&self, usage: vk::BufferUsageFlags, data: &[u8]) -> VulkanResult<Buffer> {
        let buffer = self.create_buffer(
            data.len() as vk::DeviceSize,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        self.upload_via_staging(data, &buffer, 0)?;
        Ok(buffer)
    }

    /// Copy `data` into `destination` at `offset` through a staging buffer
    ///
    /// Blocks until the copy has completed; the staging buffer is freed before
    /// returning.
    pub fn upload_via_staging(&self, data: &[u8], destination: &Buffer, offset: vk::DeviceSize) -> VulkanResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let size = data.len() as vk::DeviceSize;
        if offset.checked_add(size).map_or(true, |end| end > destination.size()) {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Upload of {size} bytes at {offset} exceeds buffer of {}", destination.size()),
            });
        }

        let staging = Buffer::with_data(self.context, vk::BufferUsageFlags::TRANSFER_SRC, data)?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: offset,
            size,
        };

        self.pool.submit_one_time(self.context.graphics_queue(), |recorder| {
            recorder.cmd_copy_buffer(staging.handle(), destination.handle(), &[region]);
            Ok(())
        })?;

        log::trace!("Uploaded {} bytes via staging", size);
        Ok(())
    }

    /// Read `len` bytes from the start of `source` back to the host
    ///
    /// `source` must have been created with `TRANSFER_SRC` usage.
    pub fn download_via_staging(&self, source: &Buffer, len: usize) -> VulkanResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let size = len as vk::DeviceSize;
        if size > source.size() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Download of {size} bytes exceeds buffer of {}", source.size()),
            });
        }

        let staging = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };

        self.pool.submit_one_time(self.context.graphics_queue(), |recorder| {
            recorder.cmd_copy_buffer(source.handle(), staging.handle(), &[region]);
            Ok(())
        })?;

        staging.read_bytes(len)
    }

    /// Move every level of `image` to `new_layout`, blocking until done
    pub fn transition_layout(&self, image: &mut GpuImage, new_layout: vk::ImageLayout) -> VulkanResult<()> {
        let old_layout = image.layout();
        let levels = image.mip_levels();
        transition_masks(old_layout, new_layout)?;

        let target: &GpuImage = image;
        self.pool.submit_one_time(self.context.graphics_queue(), |recorder| {
            record_transition(recorder, target, old_layout, new_layout, 0, levels)
        })?;

        image.set_layout(new_layout);
        Ok(())
    }

    /// Upload `pixels` into mip level 0 and leave the image shader-readable
    ///
    /// When the image has more than one level, the remaining levels are filled
    /// by successive linear blits.
    pub fn upload_image(&self, pixels: &[u8], image: &mut GpuImage) -> VulkanResult<()> {
        let expected = image.desc().level0_size().ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("Cannot stage pixel data for format {:?}", image.format()),
        })?;
        if pixels.len() as vk::DeviceSize != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Expected {expected} bytes of pixel data, got {}", pixels.len()),
            });
        }

        let old_layout = image.layout();
        transition_masks(old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        let mip_levels = image.mip_levels();
        if mip_levels > 1 {
            self.ensure_linear_blit(image.format())?;
        }

        let staging = Buffer::with_data(self.context, vk::BufferUsageFlags::TRANSFER_SRC, pixels)?;
        let extent = image.extent();
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: color_layers(0),
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };

        let target: &GpuImage = image;
        self.pool.submit_one_time(self.context.graphics_queue(), |recorder| {
            record_transition(
                recorder,
                target,
                old_layout,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                0,
                mip_levels,
            )?;
            recorder.cmd_copy_buffer_to_image(staging.handle(), target.handle(), &[region]);
            if mip_levels > 1 {
                Self::record_mip_chain(recorder, target)
            } else {
                record_transition(
                    recorder,
                    target,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    0,
                    1,
                )
            }
        })?;

        image.set_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        log::debug!(
            "Uploaded {}x{} image with {} mip level(s)",
            extent.width,
            extent.height,
            mip_levels
        );
        Ok(())
    }

    /// Create a sampled texture from tightly packed pixels in `format`
    pub fn create_texture(
        &self,
        pixels: &[u8],
        extent: vk::Extent2D,
        format: vk::Format,
        mipmapped: bool,
    ) -> VulkanResult<GpuImage> {
        let mut image = self.create_image(ImageDesc::texture(extent, format, mipmapped))?;
        self.upload_image(pixels, &mut image)?;
        Ok(image)
    }

    fn ensure_linear_blit(&self, format: vk::Format) -> VulkanResult<()> {
        let features = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
        if self
            .context
            .format_properties(format)
            .optimal_tiling_features
            .contains(features)
        {
            Ok(())
        } else {
            Err(VulkanError::UnsupportedFormat { features })
        }
    }

    /// Expects every level in `TRANSFER_DST_OPTIMAL`; leaves every level shader-readable
    fn record_mip_chain(recorder: &mut CommandRecorder, image: &GpuImage) -> VulkanResult<()> {
        use vk::ImageLayout as L;

        for step in mip_chain_plan(image.extent(), image.mip_levels()) {
            record_transition(recorder, image, L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL, step.src_level, 1)?;
            recorder.cmd_blit_image(image.handle(), blit_region(&step), vk::Filter::LINEAR);
            record_transition(
                recorder,
                image,
                L::TRANSFER_SRC_OPTIMAL,
                L::SHADER_READ_ONLY_OPTIMAL,
                step.src_level,
                1,
            )?;
        }

        let last_level = image.mip_levels() - 1;
        record_transition(
            recorder,
            image,
            L::TRANSFER_DST_OPTIMAL,
            L::SHADER_READ_ONLY_OPTIMAL,
            last_level,
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_entries() {
        use vk::ImageLayout as L;

        let upload = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(upload.src_access, vk::AccessFlags::empty());
        assert_eq!(upload.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(upload.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let sample = transition_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(sample.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sample.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(sample.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let blit_src = transition_masks(L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(blit_src.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(blit_src.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(blit_src.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let depth = transition_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(
            depth.dst_access,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(depth.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_unsupported_transition_is_rejected() {
        use vk::ImageLayout as L;

        for (old, new) in [
            (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL),
            (L::UNDEFINED, L::PRESENT_SRC_KHR),
            (L::TRANSFER_DST_OPTIMAL, L::UNDEFINED),
        ] {
            match transition_masks(old, new) {
                Err(VulkanError::UnsupportedLayoutTransition { old: o, new: n }) => {
                    assert_eq!((o, n), (old, new));
                }
                other => panic!("expected unsupported transition, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_mip_chain_plan_halves_with_floor_of_one() {
        let plan = mip_chain_plan(vk::Extent2D { width: 8, height: 2 }, 4);
        let extents: Vec<_> = plan.iter().map(|s| (s.src_extent, s.dst_extent)).collect();
        assert_eq!(
            extents,
            vec![((8, 2), (4, 1)), ((4, 1), (2, 1)), ((2, 1), (1, 1))]
        );
        assert_eq!(plan[2].src_level, 2);
        assert_eq!(plan[2].dst_level, 3);
    }

    #[test]
    fn test_mip_chain_plan_single_level_is_empty() {
        assert!(mip_chain_plan(vk::Extent2D { width: 64, height: 64 }, 1).is_empty());
    }

    #[test]
    fn test_blit_region_offsets() {
        let step = MipStep {
            src_level: 0,
            dst_level: 1,
            src_extent: (16, 8),
            dst_extent: (8, 4),
        };
        let region = blit_region(&step);
        assert_eq!(region.src_offsets[1].x, 16);
        assert_eq!(region.dst_offsets[1].y, 4);
        assert_eq!(region.dst_offsets[1].z, 1);
        assert_eq!(region.dst_subresource.mip_level, 1);
    }
}
