//! Synchronization primitives and frame slots
//!
//! Semaphores order work on the GPU; fences bound how far the CPU runs ahead.
//! A [`FrameSlot`] bundles one of each per in-flight frame together with the
//! command buffer recorded for it.

use ash::{vk, Device};

use crate::render::vulkan::VulkanResult;

/// GPU-GPU synchronization primitive
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub const fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// GPU-CPU synchronization primitive
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    /// Block until signaled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout)? };
        Ok(())
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Get the fence handle
    pub const fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Per-frame synchronization objects
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready to be written
    pub image_available: Semaphore,
    /// Signaled when the slot's submission finished rendering
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completed on the GPU
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects, the fence starting signaled
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

/// One entry of the frame-slot ring
///
/// The command buffer belongs to the pool it was allocated from and is freed
/// with it.
pub struct FrameSlot {
    /// Synchronization objects
    pub sync: FrameSync,
    /// Command buffer re-recorded every time the slot is used
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// Create `command_buffers.len()` slots, one per command buffer
    pub fn create_ring(device: &Device, command_buffers: &[vk::CommandBuffer]) -> VulkanResult<Vec<Self>> {
        command_buffers
            .iter()
            .map(|&command_buffer| {
                Ok(Self {
                    sync: FrameSync::new(device)?,
                    command_buffer,
                })
            })
            .collect()
    }
}
