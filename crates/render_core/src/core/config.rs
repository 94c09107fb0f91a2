//! # Renderer Configuration
//!
//! Per-operation configuration structs for the device, window, swapchain and
//! frame loop. All of them are serde-serializable so they can be embedded in an
//! application config file and loaded through [`Config`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use crate::config::{Config, ConfigError};

/// Upper bound on the frame-slot ring
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

bitflags! {
    /// Optional capabilities that parameterize the swapchain attachments and pipeline
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderFeatures: u32 {
        /// Depth attachment and depth testing
        const DEPTH = 1;
        /// Multisampled color attachment resolved into the swapchain image
        const MSAA = 1 << 1;
        /// Full mip chains for uploaded textures
        const MIPMAPS = 1 << 2;
    }
}

/// Shader binary locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config by probing the usual output directories
    ///
    /// The first directory containing each file wins; when nothing is found the
    /// path falls back to `target/shaders/`.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 4] = ["target/shaders/", "../target/shaders/", "shaders/", "./"];

        let resolve = |file: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| format!("{dir}{file}"))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{file}"))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Check that both shader files exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        for path in [&self.vertex_shader_path, &self.fragment_shader_path] {
            if !Path::new(path).exists() {
                return Err(ConfigError::Invalid(format!("Shader not found: {path}")));
            }
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("scene.vert.spv", "scene.frag.spv")
    }
}

/// Instance and device creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger
    pub enable_validation: bool,
}

impl DeviceConfig {
    /// Create a device configuration with validation following the build type
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
        }
    }

    /// Enable or disable validation layers
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new("render_core application")
    }
}

/// Window parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "render_core".to_string(),
            width: 1200,
            height: 900,
        }
    }
}

/// Serializable form of [`RenderFeatures`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Depth attachment
    pub depth: bool,
    /// Multisampling at the highest sample count the device supports
    pub msaa: bool,
    /// Mip chain generation for textures
    pub mipmaps: bool,
}

impl FeatureConfig {
    /// Convert into capability flags
    pub fn flags(self) -> RenderFeatures {
        let mut flags = RenderFeatures::empty();
        flags.set(RenderFeatures::DEPTH, self.depth);
        flags.set(RenderFeatures::MSAA, self.msaa);
        flags.set(RenderFeatures::MIPMAPS, self.mipmaps);
        flags
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            depth: true,
            msaa: true,
            mipmaps: true,
        }
    }
}

/// # Renderer Configuration
///
/// Everything the frame loop needs besides the scene itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Instance and device parameters
    pub device: DeviceConfig,
    /// Window parameters
    pub window: WindowConfig,
    /// Number of frame slots (flight depth)
    pub frames_in_flight: usize,
    /// Optional attachments and texture features
    pub features: FeatureConfig,
    /// Clear color for the color attachment
    pub clear_color: [f32; 4],
    /// Shader binaries
    pub shaders: ShaderConfig,
}

impl RendererConfig {
    /// Create a renderer configuration with defaults
    pub fn new(app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            window: WindowConfig {
                title: app_name.clone(),
                ..WindowConfig::default()
            },
            device: DeviceConfig::new(app_name),
            frames_in_flight: 2,
            features: FeatureConfig::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderConfig::default(),
        }
    }

    /// Set the number of frame slots
    #[must_use]
    pub const fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the initial window size
    #[must_use]
    pub const fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Capability flags in their runtime form
    pub fn render_features(&self) -> RenderFeatures {
        self.features.flags()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid("Frames in flight must be at least 1".to_string()));
        }

        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "Frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT_LIMIT}"
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("Window size must be non-zero".to_string()));
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("render_core application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RendererConfig::default();
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!((config.window.width, config.window.height), (1200, 900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(RendererConfig::default().with_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::default().with_frames_in_flight(1).validate().is_ok());
        assert!(RendererConfig::default().with_frames_in_flight(8).validate().is_ok());
        assert!(RendererConfig::default().with_frames_in_flight(9).validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RendererConfig::default().with_window_size(0, 600);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_feature_flags() {
        let features = FeatureConfig {
            depth: true,
            msaa: false,
            mipmaps: true,
        };
        let flags = features.flags();
        assert!(flags.contains(RenderFeatures::DEPTH | RenderFeatures::MIPMAPS));
        assert!(!flags.contains(RenderFeatures::MSAA));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RendererConfig = toml::from_str(
            r#"
            frames_in_flight = 3

            [device]
            application_name = "viewer"
            enable_validation = false

            [features]
            msaa = false
            "#,
        )
        .unwrap();

        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.device.application_name, "viewer");
        assert!(!config.device.enable_validation);
        assert!(config.features.depth);
        assert!(!config.features.msaa);
        // Missing tables come from the renderer default, whose title follows the app name
        assert_eq!(config.window, RendererConfig::default().window);
        assert_eq!(config.window.title, "render_core application");
    }

    #[test]
    fn test_new_titles_window_after_app() {
        let config = RendererConfig::new("viewer");
        assert_eq!(config.window.title, "viewer");
        assert_eq!(config.device.application_name, "viewer");
        assert_eq!(config.window.width, WindowConfig::default().width);
    }

    #[test]
    fn test_ron_roundtrip_preserves_values() {
        let config = RendererConfig::new("ron test").with_frames_in_flight(4);
        let text = ron::ser::to_string(&config).unwrap();
        let parsed: RendererConfig = ron::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_shader_validate_reports_missing_file() {
        let shaders = ShaderConfig::new("does/not/exist.vert.spv", "does/not/exist.frag.spv");
        assert!(shaders.validate().is_err());
    }
}
