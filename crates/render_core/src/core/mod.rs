//! # Core Module
//!
//! Configuration types shared by every subsystem.

pub mod config;

pub use config::{
    Config, ConfigError, DeviceConfig, FeatureConfig, RenderFeatures, RendererConfig, ShaderConfig,
    WindowConfig,
};
