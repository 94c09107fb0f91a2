//! Viewer settings loaded from `viewer.toml`

use render_core::core::{Config, ConfigError, RendererConfig};
use render_core::render::vulkan::TEXTURE_SLOTS;
use serde::{Deserialize, Serialize};

/// Default location of the settings file
pub const CONFIG_PATH: &str = "viewer.toml";

/// Everything the viewer reads at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// OBJ file to display
    pub model_path: String,
    /// Rotation of the model about +Y, in degrees
    pub model_rotation_degrees: f32,
    /// Initial camera position
    pub camera_position: [f32; 3],
    /// Camera speed in units per second
    pub camera_speed: f32,
    /// Texture slot sampled by faces without a material
    pub default_texture: u32,
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            model_path: "resources/models/quad.obj".to_string(),
            model_rotation_degrees: 70.0,
            camera_position: [0.0, 0.0, 3.0],
            camera_speed: 2.0,
            default_texture: 0,
            renderer: RendererConfig::new("model_viewer"),
        }
    }
}

impl Config for ViewerConfig {}

impl ViewerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_path.is_empty() {
            return Err(ConfigError::Invalid("model_path must not be empty".to_string()));
        }
        if !(self.camera_speed.is_finite() && self.camera_speed > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "camera_speed must be positive, got {}",
                self.camera_speed
            )));
        }
        if self.default_texture >= TEXTURE_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "default_texture must be below {TEXTURE_SLOTS}, got {}",
                self.default_texture
            )));
        }
        self.renderer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer.frames_in_flight, 2);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join("model_viewer_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("viewer.toml");
        std::fs::write(&path, "model_path = \"scene.obj\"\ncamera_speed = 5.0\n").unwrap();

        let config = ViewerConfig::load_from_file(&path).unwrap();
        assert_eq!(config.model_path, "scene.obj");
        assert_eq!(config.camera_speed, 5.0);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.renderer, ViewerConfig::default().renderer);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rejects_bad_speed() {
        let config = ViewerConfig {
            camera_speed: 0.0,
            ..ViewerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_default_texture_must_name_a_slot() {
        let last = ViewerConfig {
            default_texture: TEXTURE_SLOTS - 1,
            ..ViewerConfig::default()
        };
        assert!(last.validate().is_ok());

        let past_end = ViewerConfig {
            default_texture: TEXTURE_SLOTS,
            ..ViewerConfig::default()
        };
        assert!(matches!(past_end.validate(), Err(ConfigError::Invalid(_))));
    }
}
