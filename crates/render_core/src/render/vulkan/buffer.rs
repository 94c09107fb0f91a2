//! Device buffers and memory type selection
//!
//! Every allocation is dedicated to one resource and bound at offset 0.

use ash::{vk, Device};
use bytemuck::Pod;
use std::ptr::NonNull;

use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// Index of the first memory type allowed by `type_filter` that has all `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = memory_properties.memory_type_count as usize;
    memory_properties.memory_types[..count]
        .iter()
        .zip(0u32..)
        .find(|(memory_type, index)| {
            type_filter & (1 << index) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(_, index)| index)
        .ok_or(VulkanError::NoSuitableMemoryType { type_filter, properties })
}

/// Allocate memory satisfying `requirements` and `properties`
pub(crate) fn allocate_memory(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    Ok(unsafe { device.allocate_memory(&alloc_info, None)? })
}

/// Buffer wrapper with its dedicated memory
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Create a buffer and bind fresh memory with the requested properties
    pub fn new(
        context: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Buffer size must be non-zero".to_string(),
            });
        }

        let device = context.device().clone();
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory = match allocate_memory(&device, context.memory_properties(), requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(e.into());
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            properties,
        })
    }

    /// Create a host-visible, host-coherent buffer filled with `data`
    pub fn with_data(context: &DeviceContext, usage: vk::BufferUsageFlags, data: &[u8]) -> VulkanResult<Self> {
        let mut buffer = Self::new(
            context,
            data.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.write_bytes(0, data)?;
        Ok(buffer)
    }

    fn ensure_host_visible(&self) -> VulkanResult<()> {
        if self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: "Buffer memory is not host visible".to_string(),
            })
        }
    }

    fn ensure_range(&self, offset: vk::DeviceSize, len: usize) -> VulkanResult<()> {
        let end = offset.checked_add(len as vk::DeviceSize);
        if end.is_some_and(|end| end <= self.size) {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: format!("Range {offset}+{len} exceeds buffer size {}", self.size),
            })
        }
    }

    /// Map, copy `data` at `offset`, unmap
    pub fn write_bytes(&mut self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        self.ensure_host_visible()?;
        self.ensure_range(offset, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        unsafe {
            let ptr = self.device.map_memory(
                self.memory,
                offset,
                data.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.cast::<u8>(), data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Map, copy `len` bytes out from offset 0, unmap
    pub fn read_bytes(&self, len: usize) -> VulkanResult<Vec<u8>> {
        self.ensure_host_visible()?;
        self.ensure_range(0, len)?;
        let mut out = vec![0u8; len];
        if len == 0 {
            return Ok(out);
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, len as vk::DeviceSize, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), out.as_mut_ptr(), len);
            self.device.unmap_memory(self.memory);
        }
        Ok(out)
    }

    /// Keep the memory mapped for the lifetime of the returned buffer
    pub fn into_persistently_mapped(self) -> VulkanResult<MappedBuffer> {
        self.ensure_host_visible()?;
        let ptr = unsafe {
            self.device
                .map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
        };
        let ptr = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| VulkanError::InitializationFailed("vkMapMemory returned null".to_string()))?;
        Ok(MappedBuffer { buffer: self, ptr })
    }

    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Size in bytes as requested at creation
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Host-coherent buffer that stays mapped until dropped
///
/// Writes become visible to the GPU without flushing; callers must only write
/// while no submitted work reads the buffer.
pub struct MappedBuffer {
    buffer: Buffer,
    ptr: NonNull<u8>,
}

impl MappedBuffer {
    /// Copy a plain-old-data value to the start of the buffer
    pub fn write<T: Pod>(&mut self, value: &T) -> VulkanResult<()> {
        self.write_bytes(0, bytemuck::bytes_of(value))
    }

    /// Copy raw bytes at `offset`
    pub fn write_bytes(&mut self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        self.buffer.ensure_range(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset as usize), data.len());
        }
        Ok(())
    }

    /// Get buffer handle
    pub const fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        unsafe {
            self.buffer.device.unmap_memory(self.buffer.memory);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            *slot = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn test_find_memory_type_respects_filter() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn test_find_memory_type_none_compatible() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let result = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(matches!(result, Err(VulkanError::NoSuitableMemoryType { type_filter: 1, .. })));
    }

    #[test]
    fn test_find_memory_type_ignores_types_past_count() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }
}
