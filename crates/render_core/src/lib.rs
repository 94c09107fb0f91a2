//! # Render Core
//!
//! A swapchain-synchronized Vulkan frame loop with a host-to-device transfer
//! pipeline.
//!
//! ## Features
//!
//! - **Frame Scheduling**: a fixed ring of frame slots bounds how far the CPU runs ahead
//! - **Swapchain Recreation**: resize and out-of-date handling with full resource replacement
//! - **Staged Transfers**: buffers and mipmapped textures uploaded through staging buffers
//! - **Descriptor Tables**: per-slot uniform buffers that stay mapped for their lifetime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut window = Window::new(&config.window.title, config.window.width, config.window.height)?;
//!     let mut renderer = VulkanRenderer::new(&config, &mut window)?;
//!     let mut scheduler = FrameScheduler::new(config.frames_in_flight, window.resize_signal());
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         scheduler.run_frame(&mut renderer, &window)?;
//!     }
//!     scheduler.shutdown(&mut renderer)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{AssetError, ImageData, SceneData, SceneLoader},
        core::config::{Config, ConfigError, DeviceConfig, RenderFeatures, RendererConfig, ShaderConfig},
        render::{
            vulkan::{FrameTransforms, VulkanError, VulkanRenderer, VulkanResult, Window, WindowError, WindowEvent},
            FrameBackend, FrameOutcome, FrameScheduler, ResizeSignal, UniformBufferObject,
        },
    };
}
