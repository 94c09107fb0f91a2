//! Vertex and uniform layouts shared with the scene shaders

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3, Vector3};

/// Interleaved scene vertex
///
/// `material_index` selects the combined image sampler; a negative value
/// falls back to [`TextureSelector::default_index`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub pos: [f32; 3],
    /// Vertex color
    pub color: [f32; 3],
    /// Texture coordinate, origin top-left
    pub tex_coord: [f32; 2],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Index into the bound texture array
    pub material_index: i32,
}

impl Vertex {
    /// Single interleaved binding at slot 0
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attributes at shader locations 0..=4
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        let attribute = |location: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };

        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, pos)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
            attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Self, tex_coord)),
            attribute(3, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(4, vk::Format::R32_SINT, offset_of!(Self, material_index)),
        ]
    }
}

/// Per-frame transform block at binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Model matrix, column-major
    pub model: [[f32; 4]; 4],
    /// View matrix, column-major
    pub view: [[f32; 4]; 4],
    /// Projection matrix with Vulkan's downward Y, column-major
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Pack the three transforms; `proj` must already target Vulkan clip space
    pub fn new(model: &Matrix4<f32>, view: &Matrix4<f32>, proj: &Matrix4<f32>) -> Self {
        Self {
            model: (*model).into(),
            view: (*view).into(),
            proj: (*proj).into(),
        }
    }

    /// Right-handed look-at view from `eye` towards `eye + front`
    pub fn look_towards(eye: &Point3<f32>, front: &Vector3<f32>, up: &Vector3<f32>) -> Matrix4<f32> {
        Matrix4::look_at_rh(eye, &(eye + front), up)
    }

    /// Perspective projection with the Y axis flipped for Vulkan clip space
    pub fn vulkan_perspective(fovy: f32, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
        let mut proj = Matrix4::new_perspective(aspect, fovy, near, far);
        proj[(1, 1)] *= -1.0;
        proj
    }
}

/// Fallback texture choice at binding 2
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct TextureSelector {
    /// Texture used by vertices without a material
    pub default_index: i32,
    _padding: [i32; 3],
}

impl TextureSelector {
    /// Select `default_index` for unmaterialed vertices
    pub const fn new(default_index: i32) -> Self {
        Self {
            default_index,
            _padding: [0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_layout_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 48);
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 48);

        let offsets: Vec<u32> = Vertex::attribute_descriptions().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 32, 44]);
        assert_eq!(Vertex::attribute_descriptions()[4].format, vk::Format::R32_SINT);
    }

    #[test]
    fn test_uniform_block_sizes() {
        assert_eq!(size_of::<UniformBufferObject>(), 192);
        assert_eq!(size_of::<TextureSelector>(), 16);
    }

    #[test]
    fn test_projection_flips_y() {
        let aspect = 1200.0 / 900.0;
        let gl = Matrix4::new_perspective(aspect, 45f32.to_radians(), 0.1, 100.0);
        let flipped = UniformBufferObject::vulkan_perspective(45f32.to_radians(), aspect, 0.1, 100.0);

        assert_relative_eq!(flipped[(1, 1)], -gl[(1, 1)]);
        assert_relative_eq!(flipped[(0, 0)], gl[(0, 0)]);
        assert_relative_eq!(flipped[(2, 2)], gl[(2, 2)]);
    }

    #[test]
    fn test_matrices_are_column_major() {
        let model = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let ubo = UniformBufferObject::new(&model, &Matrix4::identity(), &Matrix4::identity());

        // Translation lives in the fourth column
        assert_relative_eq!(ubo.model[3][0], 1.0);
        assert_relative_eq!(ubo.model[3][1], 2.0);
        assert_relative_eq!(ubo.model[3][2], 3.0);
        assert_relative_eq!(ubo.view[2][2], 1.0);
    }

    #[test]
    fn test_look_towards_maps_eye_to_origin() {
        let eye = Point3::new(0.0, 0.0, 3.0);
        let view = UniformBufferObject::look_towards(&eye, &-Vector3::z(), &Vector3::y());
        let moved = view.transform_point(&eye);

        assert_relative_eq!(moved.coords.norm(), 0.0, epsilon = 1e-6);
        let ahead = view.transform_point(&Point3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(ahead.z, -3.0, epsilon = 1e-6);
    }
}
