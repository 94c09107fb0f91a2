//! Window management using GLFW
//!
//! Provides the window used as the presentation surface. Framebuffer resize
//! events only raise the shared [`ResizeSignal`]; the frame loop decides when
//! to rebuild the swapchain.

use ash::vk;
use thiserror::Error;

use crate::render::scheduler::ResizeSignal;
use crate::render::vulkan::surface::{FramebufferSource, SurfaceProvider};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialised
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// GLFW refused to create the window
    #[error("Window creation failed")]
    CreationFailed,

    /// GLFW reported no Vulkan support
    #[error("Vulkan is not supported by the window system")]
    VulkanUnsupported,
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// Input and lifecycle events surfaced to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// A key was pressed or released
    Key(glfw::Key, glfw::Action),
    /// The framebuffer changed size
    FramebufferResized(u32, u32),
    /// The user asked to close the window
    CloseRequested,
}

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    resize_signal: ResizeSignal,
}

impl Window {
    /// Open a resizable window without a client API
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|e| WindowError::InitializationFailed(e.to_string()))?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::debug!("Opened window '{}' ({}x{})", title, width, height);

        Ok(Self {
            glfw,
            window,
            events,
            resize_signal: ResizeSignal::new(),
        })
    }

    /// Shared flag raised on every framebuffer resize
    pub fn resize_signal(&self) -> ResizeSignal {
        self.resize_signal.clone()
    }

    /// Whether the window has been asked to close
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request the window to close
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Poll GLFW and translate pending events
    pub fn poll_events(&mut self) -> Vec<WindowEvent> {
        self.glfw.poll_events();
        self.drain_events()
    }

    /// Block until at least one event arrives, used while minimised
    pub fn wait_events(&mut self) -> Vec<WindowEvent> {
        self.glfw.wait_events();
        self.drain_events()
    }

    fn drain_events(&self) -> Vec<WindowEvent> {
        let mut translated = Vec::new();
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    self.resize_signal.notify();
                    translated.push(WindowEvent::FramebufferResized(
                        width.max(0) as u32,
                        height.max(0) as u32,
                    ));
                }
                glfw::WindowEvent::Key(key, _, action, _) => translated.push(WindowEvent::Key(key, action)),
                glfw::WindowEvent::Close => translated.push(WindowEvent::CloseRequested),
                _ => {}
            }
        }
        translated
    }

    /// Whether `key` is currently held down
    pub fn is_key_down(&self, key: glfw::Key) -> bool {
        matches!(self.window.get_key(key), glfw::Action::Press | glfw::Action::Repeat)
    }

    /// Seconds since GLFW was initialised
    pub fn time(&self) -> f64 {
        self.glfw.get_time()
    }
}

impl FramebufferSource for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }
}

impl SurfaceProvider for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| VulkanError::InitializationFailed("GLFW reported no Vulkan instance extensions".to_string()))
    }

    fn create_surface(&mut self, instance: &ash::Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::Api(result))
        }
    }
}
