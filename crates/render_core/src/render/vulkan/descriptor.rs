//! Descriptor binding table
//!
//! One descriptor set per frame slot, allocated from a pool sized exactly for
//! those sets. Uniform buffers are created per slot and stay mapped; a slot's
//! uniforms may only be rewritten once its fence has signaled.

use ash::{vk, Device};
use bytemuck::Pod;

use crate::render::vulkan::buffer::{Buffer, MappedBuffer};
use crate::render::vulkan::{DeviceContext, VulkanError, VulkanResult};

/// What a binding holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Uniform buffer of `size` bytes, one per frame slot
    UniformBuffer {
        /// Buffer size in bytes
        size: vk::DeviceSize,
    },
    /// Array of combined image samplers
    CombinedImageSampler {
        /// Array length
        count: u32,
    },
}

impl BindingKind {
    const fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            Self::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            Self::CombinedImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }

    const fn descriptor_count(self) -> u32 {
        match self {
            Self::UniformBuffer { .. } => 1,
            Self::CombinedImageSampler { count } => count,
        }
    }
}

/// One binding of the set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSpec {
    /// Shader binding number
    pub binding: u32,
    /// Resource type and size
    pub kind: BindingKind,
    /// Stages that read the binding
    pub stages: vk::ShaderStageFlags,
}

/// Ordered list of bindings making up the per-frame set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorLayoutSpec {
    bindings: Vec<BindingSpec>,
}

impl DescriptorLayoutSpec {
    /// Empty layout
    pub const fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    /// Add a uniform buffer binding of `size` bytes
    #[must_use]
    pub fn uniform_buffer(mut self, binding: u32, size: vk::DeviceSize, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(BindingSpec {
            binding,
            kind: BindingKind::UniformBuffer { size },
            stages,
        });
        self
    }

    /// Add an array of `count` combined image samplers
    #[must_use]
    pub fn image_samplers(mut self, binding: u32, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(BindingSpec {
            binding,
            kind: BindingKind::CombinedImageSampler { count },
            stages,
        });
        self
    }

    /// Bindings in declaration order
    pub fn bindings(&self) -> &[BindingSpec] {
        &self.bindings
    }

    fn find(&self, binding: u32) -> Option<&BindingSpec> {
        self.bindings.iter().find(|spec| spec.binding == binding)
    }

    /// Pool capacity for `frame_slots` sets: per-type descriptor count times slots
    pub fn pool_sizes(&self, frame_slots: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for spec in &self.bindings {
            let ty = spec.kind.descriptor_type();
            let count = spec.kind.descriptor_count() * frame_slots;
            match sizes.iter_mut().find(|size| size.ty == ty) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: count,
                }),
            }
        }
        sizes.retain(|size| size.descriptor_count > 0);
        sizes
    }

    fn layout_bindings(&self) -> Vec<vk::DescriptorSetLayoutBinding> {
        self.bindings
            .iter()
            .map(|spec| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(spec.binding)
                    .descriptor_type(spec.kind.descriptor_type())
                    .descriptor_count(spec.kind.descriptor_count())
                    .stage_flags(spec.stages)
                    .build()
            })
            .collect()
    }
}

/// Pool exhaustion is reported as its own error; everything else stays an API error
fn map_allocation_error(result: vk::Result) -> VulkanError {
    match result {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            VulkanError::DescriptorPoolExhausted
        }
        other => VulkanError::Api(other),
    }
}

/// Refuse allocations past the pool's `max_sets`
///
/// Drivers may silently over-allocate, so the table enforces the bound itself.
fn check_capacity(allocated: usize, capacity: usize, count: usize) -> VulkanResult<()> {
    match allocated.checked_add(count) {
        Some(total) if total <= capacity => Ok(()),
        _ => Err(VulkanError::DescriptorPoolExhausted),
    }
}

struct SlotUniform {
    binding: u32,
    buffer: MappedBuffer,
}

/// Per-frame descriptor sets, their pool and the persistently mapped uniforms
pub struct DescriptorBindingTable {
    device: Device,
    spec: DescriptorLayoutSpec,
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    capacity: usize,
    allocated: usize,
    sets: Vec<vk::DescriptorSet>,
    uniforms: Vec<Vec<SlotUniform>>,
}

impl DescriptorBindingTable {
    /// Create the layout, a pool for `frame_slots` sets, the sets and their uniform buffers
    pub fn new(context: &DeviceContext, spec: DescriptorLayoutSpec, frame_slots: usize) -> VulkanResult<Self> {
        let device = context.device().clone();
        let slot_count = u32::try_from(frame_slots).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("Too many frame slots: {frame_slots}"),
        })?;

        let bindings = spec.layout_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };

        let pool_sizes = spec.pool_sizes(slot_count);
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(&pool_sizes)
            .max_sets(slot_count);
        let pool = match unsafe { device.create_descriptor_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(e.into());
            }
        };

        // From here on Drop releases the layout and pool
        let mut table = Self {
            device,
            spec,
            layout,
            pool,
            capacity: frame_slots,
            allocated: 0,
            sets: Vec::new(),
            uniforms: Vec::new(),
        };

        table.sets = table.allocate_sets(frame_slots)?;
        table.uniforms = (0..frame_slots)
            .map(|_| table.create_slot_uniforms(context))
            .collect::<VulkanResult<_>>()?;
        table.write_uniform_descriptors();

        log::debug!(
            "Descriptor table ready: {} sets, pool sizes {:?}",
            frame_slots,
            pool_sizes
                .iter()
                .map(|size| (size.ty, size.descriptor_count))
                .collect::<Vec<_>>()
        );

        Ok(table)
    }

    /// Allocate `count` sets from the pool
    ///
    /// The pool holds one set per frame slot and is never grown; running out
    /// is fatal.
    pub fn allocate_sets(&mut self, count: usize) -> VulkanResult<Vec<vk::DescriptorSet>> {
        check_capacity(self.allocated, self.capacity, count)?;

        let layouts = vec![self.layout; count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }.map_err(map_allocation_error)?;
        self.allocated += sets.len();
        Ok(sets)
    }

    fn create_slot_uniforms(&self, context: &DeviceContext) -> VulkanResult<Vec<SlotUniform>> {
        self.spec
            .bindings()
            .iter()
            .filter_map(|spec| match spec.kind {
                BindingKind::UniformBuffer { size } => Some((spec.binding, size)),
                BindingKind::CombinedImageSampler { .. } => None,
            })
            .map(|(binding, size)| {
                let buffer = Buffer::new(
                    context,
                    size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )?
                .into_persistently_mapped()?;
                Ok(SlotUniform { binding, buffer })
            })
            .collect()
    }

    fn write_uniform_descriptors(&self) {
        let buffer_infos: Vec<(vk::DescriptorSet, u32, [vk::DescriptorBufferInfo; 1])> = self
            .sets
            .iter()
            .zip(&self.uniforms)
            .flat_map(|(&set, slot)| {
                slot.iter().map(move |uniform| {
                    let info = vk::DescriptorBufferInfo {
                        buffer: uniform.buffer.handle(),
                        offset: 0,
                        range: uniform.buffer.size(),
                    };
                    (set, uniform.binding, [info])
                })
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = buffer_infos
            .iter()
            .map(|(set, binding, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set)
                    .dst_binding(*binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(info)
                    .build()
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }

    /// Point `binding` of every set at the given view/sampler pairs
    ///
    /// Fewer pairs than the array length repeat the last pair so every element
    /// stays valid. Must be called while no frame using the sets is in flight.
    pub fn bind_textures(&mut self, binding: u32, textures: &[(vk::ImageView, vk::Sampler)]) -> VulkanResult<()> {
        let count = match self.spec.find(binding).map(|spec| spec.kind) {
            Some(BindingKind::CombinedImageSampler { count }) => count as usize,
            _ => {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("Binding {binding} is not an image sampler array"),
                })
            }
        };
        let Some(&last) = textures.last() else {
            return Err(VulkanError::InvalidOperation {
                reason: "No textures to bind".to_string(),
            });
        };
        if textures.len() > count {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{} textures exceed array length {count}", textures.len()),
            });
        }

        let image_infos: Vec<vk::DescriptorImageInfo> = textures
            .iter()
            .chain(std::iter::repeat(&last))
            .take(count)
            .map(|&(view, sampler)| vk::DescriptorImageInfo {
                sampler,
                image_view: view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
            .collect();

        let writes: Vec<vk::WriteDescriptorSet> = self
            .sets
            .iter()
            .map(|&set| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos)
                    .build()
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    /// Copy `value` into the slot's uniform buffer for `binding`
    pub fn write_uniform<T: Pod>(&mut self, slot: usize, binding: u32, value: &T) -> VulkanResult<()> {
        let uniform = self
            .uniforms
            .get_mut(slot)
            .and_then(|uniforms| uniforms.iter_mut().find(|uniform| uniform.binding == binding))
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No uniform buffer at slot {slot}, binding {binding}"),
            })?;
        uniform.buffer.write(value)
    }

    /// Set layout shared by every set
    pub const fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Descriptor set of a frame slot
    pub fn set(&self, slot: usize) -> VulkanResult<vk::DescriptorSet> {
        self.sets.get(slot).copied().ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("No descriptor set for slot {slot}"),
        })
    }

    /// Number of frame slots served
    pub fn frame_slots(&self) -> usize {
        self.sets.len()
    }
}

impl Drop for DescriptorBindingTable {
    fn drop(&mut self) {
        unsafe {
            // Sets are freed with the pool
            self.device.destroy_descriptor_pool(self.pool, None);
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
