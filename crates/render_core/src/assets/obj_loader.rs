//! OBJ scene loader
//!
//! Flattens every model of an OBJ file into one vertex buffer and one index
//! buffer. Each model keeps its own index range so it can be drawn separately.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::assets::AssetError;
use crate::render::vertex::Vertex;

/// Contiguous index range of one OBJ model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshRange {
    /// Model name from the `o`/`g` statement
    pub name: String,
    /// First index in [`SceneData::indices`]
    pub first_index: u32,
    /// Number of indices
    pub index_count: u32,
    /// Material used by the model, if any
    pub material: Option<usize>,
}

/// Diffuse texture of one material
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialTexture {
    /// Material name from the MTL file
    pub name: String,
    /// Resolved `map_Kd` path, if the material has one
    pub path: Option<PathBuf>,
}

/// Host-side scene ready for upload
#[derive(Debug, Clone, Default)]
pub struct SceneData {
    /// All vertices of all models
    pub vertices: Vec<Vertex>,
    /// Indices into `vertices`, already offset per model
    pub indices: Vec<u32>,
    /// One entry per model
    pub meshes: Vec<MeshRange>,
    /// One entry per material, in material index order
    pub textures: Vec<MaterialTexture>,
}

/// Loads [`SceneData`] from OBJ files
pub struct SceneLoader;

impl SceneLoader {
    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        }
    }

    /// Load an OBJ file and the MTL files it references
    ///
    /// A missing or broken MTL file is logged and the scene loads without
    /// materials.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SceneData, AssetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AssetError::NotFound(path.display().to_string()));
        }

        let (models, materials) = tobj::load_obj(path, &Self::load_options())?;
        let materials = materials.unwrap_or_else(|e| {
            log::warn!("Failed to load materials for {}: {e}", path.display());
            Vec::new()
        });

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let scene = Self::build(models, &materials, base_dir)?;

        log::info!(
            "Loaded {}: {} vertices, {} indices, {} meshes, {} materials",
            path.display(),
            scene.vertices.len(),
            scene.indices.len(),
            scene.meshes.len(),
            scene.textures.len()
        );
        Ok(scene)
    }

    /// Parse OBJ text from a reader; `mtl` supplies the material library if any
    ///
    /// Texture paths resolve against `base_dir`.
    pub fn load_from_buf<R: BufRead>(
        obj: &mut R,
        mtl: Option<&str>,
        base_dir: &Path,
    ) -> Result<SceneData, AssetError> {
        let (models, materials) = tobj::load_obj_buf(obj, &Self::load_options(), |_| match mtl {
            Some(text) => tobj::load_mtl_buf(&mut text.as_bytes()),
            None => Ok(Default::default()),
        })?;

        Self::build(models, &materials?, base_dir)
    }

    fn build(models: Vec<tobj::Model>, materials: &[tobj::Material], base_dir: &Path) -> Result<SceneData, AssetError> {
        let mut scene = SceneData {
            textures: materials
                .iter()
                .map(|m| MaterialTexture {
                    name: m.name.clone(),
                    path: m.diffuse_texture.as_ref().map(|t| base_dir.join(t)),
                })
                .collect(),
            ..SceneData::default()
        };

        for model in models {
            let mesh = model.mesh;
            let vertex_count = mesh.positions.len() / 3;
            let base_vertex = u32::try_from(scene.vertices.len())
                .map_err(|_| AssetError::InvalidData("Scene exceeds u32 vertex range".to_string()))?;

            let material_index = match mesh.material_id {
                Some(id) if id < materials.len() => i32::try_from(id).unwrap_or(-1),
                Some(id) => {
                    log::warn!("Model '{}' references unknown material {id}", model.name);
                    -1
                }
                None => -1,
            };

            scene.vertices.extend((0..vertex_count).map(|i| Vertex {
                pos: [mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]],
                color: if mesh.vertex_color.len() >= 3 * (i + 1) {
                    [mesh.vertex_color[3 * i], mesh.vertex_color[3 * i + 1], mesh.vertex_color[3 * i + 2]]
                } else {
                    [1.0, 1.0, 1.0]
                },
                // OBJ puts v = 0 at the bottom; Vulkan samples the top row first
                tex_coord: if mesh.texcoords.len() >= 2 * (i + 1) {
                    [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
                } else {
                    [0.0, 0.0]
                },
                normal: if mesh.normals.len() >= 3 * (i + 1) {
                    [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
                } else {
                    [0.0, 0.0, 0.0]
                },
                material_index,
            }));

            let first_index = scene.indices.len() as u32;
            scene.indices.extend(mesh.indices.iter().map(|&i| base_vertex + i));

            scene.meshes.push(MeshRange {
                name: model.name,
                first_index,
                index_count: mesh.indices.len() as u32,
                material: mesh.material_id.filter(|&id| id < materials.len()),
            });
        }

        if scene.indices.is_empty() {
            return Err(AssetError::InvalidData("OBJ contains no faces".to_string()));
        }

        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TWO_MODELS: &str = "\
mtllib scene.mtl
o floor
v 0 0 0
v 1 0 0
v 1 0 1
v 0 0 1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 1 0
usemtl wood
f 1/1/1 2/2/1 3/3/1 4/4/1
o marker
usemtl stone
v 0 1 0
v 1 1 0
v 0 2 0
f 5 6 7
";

    const MATERIALS: &str = "\
newmtl wood
Kd 0.8 0.6 0.4
map_Kd textures/wood.png
newmtl stone
Kd 0.5 0.5 0.5
";

    fn load(obj: &str, mtl: Option<&str>) -> SceneData {
        crate::foundation::logging::init_for_tests();
        SceneLoader::load_from_buf(&mut obj.as_bytes(), mtl, Path::new("models")).unwrap()
    }

    #[test]
    fn test_quads_are_triangulated_and_ranges_recorded() {
        let scene = load(TWO_MODELS, Some(MATERIALS));

        assert_eq!(scene.meshes.len(), 2);
        assert_eq!(scene.meshes[0].name, "floor");
        assert_eq!(scene.meshes[0].first_index, 0);
        assert_eq!(scene.meshes[0].index_count, 6);
        assert_eq!(scene.meshes[1].first_index, 6);
        assert_eq!(scene.meshes[1].index_count, 3);
        assert_eq!(scene.indices.len(), 9);
    }

    #[test]
    fn test_second_model_indices_are_offset() {
        let scene = load(TWO_MODELS, Some(MATERIALS));

        let floor_vertices = 4;
        let marker = &scene.indices[6..9];
        assert!(marker.iter().all(|&i| i >= floor_vertices));
        assert!(scene.indices.iter().all(|&i| (i as usize) < scene.vertices.len()));
        assert_relative_eq!(scene.vertices[marker[2] as usize].pos[1], 2.0);
    }

    #[test]
    fn test_texcoords_are_flipped_vertically() {
        let scene = load(TWO_MODELS, Some(MATERIALS));

        let top_right = scene
            .vertices
            .iter()
            .find(|v| v.pos == [1.0, 0.0, 1.0])
            .unwrap();
        assert_relative_eq!(top_right.tex_coord[0], 1.0);
        assert_relative_eq!(top_right.tex_coord[1], 0.0);
        assert_relative_eq!(top_right.normal[1], 1.0);
    }

    #[test]
    fn test_materials_resolve_textures_and_indices() {
        let scene = load(TWO_MODELS, Some(MATERIALS));

        assert_eq!(scene.textures.len(), 2);
        assert_eq!(scene.textures[0].path, Some(PathBuf::from("models/textures/wood.png")));
        assert_eq!(scene.textures[1].path, None);
        assert_eq!(scene.textures[0].name, "wood");

        assert_eq!(scene.meshes[0].material, Some(0));
        assert_eq!(scene.meshes[1].material, Some(1));
        assert!(scene.vertices[..4].iter().all(|v| v.material_index == 0));
        assert!(scene.vertices[4..].iter().all(|v| v.material_index == 1));
    }

    #[test]
    fn test_missing_attributes_get_defaults() {
        let scene = load("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n", None);

        assert_eq!(scene.vertices.len(), 3);
        assert_eq!(scene.vertices[1].color, [1.0, 1.0, 1.0]);
        assert_eq!(scene.vertices[1].tex_coord, [0.0, 0.0]);
        assert_eq!(scene.vertices[1].material_index, -1);
        assert_eq!(scene.meshes[0].material, None);
        assert!(scene.textures.is_empty());
    }

    #[test]
    fn test_scene_without_faces_is_rejected() {
        let result = SceneLoader::load_from_buf(&mut "v 0 0 0\n".as_bytes(), None, Path::new("."));
        assert!(matches!(result, Err(AssetError::InvalidData(_))));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            SceneLoader::load("no/such/scene.obj"),
            Err(AssetError::NotFound(_))
        ));
    }
}
