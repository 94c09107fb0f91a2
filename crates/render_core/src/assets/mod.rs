//! Scene and texture loading
//!
//! Parses OBJ/MTL files with `tobj` and decodes textures with `image`. Output
//! is plain host data; uploading it is the renderer's job.

pub mod image_loader;
pub mod obj_loader;

pub use image_loader::ImageData;
pub use obj_loader::{MaterialTexture, MeshRange, SceneData, SceneLoader};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Asset not found
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// OBJ or MTL parse error
    #[error("OBJ parse error: {0}")]
    Obj(#[from] tobj::LoadError),

    /// IO error during asset loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
