//! OBJ model viewer
//!
//! Loads an OBJ scene and its diffuse textures, then runs the frame loop
//! until the window closes. WASD moves the camera, Q/E lift it, Escape quits.

mod camera;
mod config;

use std::path::Path;
use std::process::ExitCode;

use glfw::{Action, Key};
use nalgebra::{Matrix4, Point3, Vector3};
use render_core::assets::{AssetError, ImageData, SceneData, SceneLoader};
use render_core::core::{Config, ConfigError};
use render_core::foundation::logging;
use render_core::render::vulkan::{FrameTransforms, VulkanError, VulkanRenderer, Window, WindowError, WindowEvent};
use render_core::render::{FrameOutcome, FrameScheduler};
use thiserror::Error;

use crate::camera::{FlyCamera, MoveKeys};
use crate::config::{ViewerConfig, CONFIG_PATH};

#[derive(Error, Debug)]
enum ViewerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("window error: {0}")]
    Window(#[from] WindowError),

    #[error("vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
}

struct ModelViewer {
    scheduler: FrameScheduler,
    // Dropped before the window that owns its surface
    renderer: VulkanRenderer,
    window: Window,
    camera: FlyCamera,
    model: Matrix4<f32>,
    last_time: f64,
}

impl ModelViewer {
    fn new(config: &ViewerConfig) -> Result<Self, ViewerError> {
        config.validate()?;
        config.renderer.shaders.validate().map_err(|e| {
            log::error!("Compile resources/shaders with glslc (or set VULKAN_SDK before building)");
            e
        })?;

        let window_config = &config.renderer.window;
        let mut window = Window::new(&window_config.title, window_config.width, window_config.height)?;
        let mut renderer = VulkanRenderer::new(&config.renderer, &mut window)?;

        let scene = SceneLoader::load(&config.model_path)?;
        let textures = load_textures(&scene);
        renderer.load_scene(&scene, &textures)?;
        renderer.set_default_texture(config.default_texture);

        let scheduler = FrameScheduler::new(renderer.frames_in_flight(), window.resize_signal());
        let [x, y, z] = config.camera_position;
        let last_time = window.time();

        Ok(Self {
            scheduler,
            renderer,
            window,
            camera: FlyCamera::new(Point3::new(x, y, z), config.camera_speed),
            model: Matrix4::from_axis_angle(&Vector3::y_axis(), config.model_rotation_degrees.to_radians()),
            last_time,
        })
    }

    fn run(&mut self) -> Result<(), ViewerError> {
        log::info!("Entering frame loop");

        while !self.window.should_close() {
            let events = self.window.poll_events();
            self.handle_events(&events);
            self.update_camera();

            match self.scheduler.run_frame(&mut self.renderer, &self.window)? {
                FrameOutcome::Deferred => {
                    // Minimised: sleep until the window system has something for us
                    let events = self.window.wait_events();
                    self.handle_events(&events);
                }
                FrameOutcome::Skipped | FrameOutcome::Presented { .. } => {}
            }
        }

        self.scheduler.shutdown(&mut self.renderer)?;
        log::info!("Presented {} frames", self.scheduler.frames_presented());
        Ok(())
    }

    fn handle_events(&mut self, events: &[WindowEvent]) {
        for event in events {
            match *event {
                WindowEvent::Key(Key::Escape, Action::Press) | WindowEvent::CloseRequested => {
                    self.window.set_should_close(true);
                }
                WindowEvent::FramebufferResized(width, height) => {
                    log::debug!("Framebuffer resized to {width}x{height}");
                }
                WindowEvent::Key(..) => {}
            }
        }
    }

    fn update_camera(&mut self) {
        let now = self.window.time();
        let dt = (now - self.last_time) as f32;
        self.last_time = now;

        let keys = MoveKeys {
            forward: self.window.is_key_down(Key::W),
            back: self.window.is_key_down(Key::S),
            left: self.window.is_key_down(Key::A),
            right: self.window.is_key_down(Key::D),
            up: self.window.is_key_down(Key::Q),
            down: self.window.is_key_down(Key::E),
        };
        self.camera.update(keys, dt);

        self.renderer.set_transforms(FrameTransforms {
            model: self.model,
            view: self.camera.view(),
            ..FrameTransforms::default()
        });
    }
}

/// Decode each material's texture; unreadable files become a checkerboard
fn load_textures(scene: &SceneData) -> Vec<ImageData> {
    scene
        .textures
        .iter()
        .map(|material| match material.path.as_deref() {
            Some(path) => load_texture(&material.name, path),
            None => ImageData::solid_color(1, 1, [255, 255, 255, 255]),
        })
        .collect()
}

fn load_texture(material: &str, path: &Path) -> ImageData {
    ImageData::from_file(path).unwrap_or_else(|e| {
        log::warn!("Material '{material}': {e}, using placeholder texture");
        ImageData::checkerboard(64, 8, [255, 255, 255, 255], [96, 96, 96, 255])
    })
}

fn main() -> ExitCode {
    let config = match ViewerConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            log::error!("Failed to read {CONFIG_PATH}: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log_level);

    log::info!("Starting model viewer with {}", config.model_path);

    let result = ModelViewer::new(&config).and_then(|mut viewer| viewer.run());
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                log::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
