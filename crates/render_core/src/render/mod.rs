//! # Rendering
//!
//! The frame loop ([`FrameScheduler`]) and the Vulkan backend it drives.
//!
//! ## Frame protocol
//!
//! Each call to [`FrameScheduler::run_frame`] waits on one frame slot's fence,
//! acquires a swapchain image, writes the slot's uniforms, records and submits
//! the slot's command buffer and presents. Window resizes only raise a
//! [`ResizeSignal`]; the swapchain is rebuilt after present.

pub mod scheduler;
pub mod vertex;
pub mod vulkan;

pub use scheduler::{AcquireOutcome, FrameBackend, FrameOutcome, FrameScheduler, PresentOutcome, ResizeSignal};
pub use vertex::{TextureSelector, UniformBufferObject, Vertex};
