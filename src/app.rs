//! winit application shell.
//!
//! Adapts the window event loop to the renderer's lifecycle callbacks:
//! `resumed` creates the surface and scene resources, `Resized` reprojects,
//! `RedrawRequested` draws, mouse drags and touch input become pointer
//! events, and `suspended`/`CloseRequested` release the scene. Frames are
//! produced on demand: the loop waits until the touch handler (or the
//! window system) requests a redraw.

use std::path::PathBuf;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::error::EventLoopError;
use winit::event::{ElementState, MouseButton, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::assets::DirAssetStore;
use crate::gpu::WgpuBackend;
use crate::renderer::{SurfaceControl, SurfaceRenderer, TriangleRenderer};
use crate::touch::{PointerAction, PointerEvent};

/// Window and asset configuration for [`run`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub initial_size: (u32, u32),
    /// Root directory of the shader assets.
    pub assets_root: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "trigon".to_string(),
            initial_size: (320, 480),
            assets_root: PathBuf::from("assets"),
        }
    }
}

/// Opens a window and runs the triangle renderer until the window closes.
pub fn run(config: AppConfig) -> Result<(), EventLoopError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let assets = Arc::new(DirAssetStore::new(config.assets_root.clone()));
    let mut app = App {
        config,
        renderer: TriangleRenderer::new(assets),
        window: None,
        gpu: None,
        pointer_down: false,
        cursor: (0.0, 0.0),
    };
    event_loop.run_app(&mut app)
}

struct App {
    config: AppConfig,
    renderer: TriangleRenderer,
    window: Option<Arc<Window>>,
    gpu: Option<WgpuBackend>,
    pointer_down: bool,
    cursor: (f32, f32),
}

/// [`SurfaceControl`] view of the winit window.
struct WindowSurface<'a> {
    window: &'a Window,
}

impl SurfaceControl for WindowSurface<'_> {
    fn request_render(&self) {
        self.window.request_redraw();
    }

    fn width(&self) -> u32 {
        self.window.inner_size().width
    }

    fn height(&self) -> u32 {
        self.window.inner_size().height
    }
}

impl App {
    fn deliver_pointer(&mut self, action: PointerAction, x: f32, y: f32) {
        let Some(window) = self.window.as_ref() else {
            return;
        };
        let view = WindowSurface { window };
        self.renderer
            .on_touch_event(&view, PointerEvent::new(action, x, y));
    }

    fn release_scene(&mut self) {
        if let Some(gpu) = self.gpu.as_mut() {
            self.renderer.on_pause(gpu);
        }
        self.gpu = None;
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let (width, height) = self.config.initial_size;
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(LogicalSize::new(width, height));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let mut gpu = WgpuBackend::new(window.clone());

        if let Err(e) = self.renderer.on_surface_created(&mut gpu) {
            log::error!("failed to create scene resources: {e}");
            event_loop.exit();
            return;
        }

        let size = window.inner_size();
        self.renderer
            .on_surface_changed(&mut gpu, size.width, size.height);

        window.request_redraw();
        self.window = Some(window);
        self.gpu = Some(gpu);
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        // The surface is going away; resources are rebuilt on resume.
        self.release_scene();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.release_scene();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(size.width, size.height);
                    self.renderer
                        .on_surface_changed(gpu, size.width, size.height);
                }
                if let Some(window) = self.window.as_ref() {
                    window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(gpu) = self.gpu.as_mut() {
                    if let Err(e) = self.renderer.on_draw_frame(gpu) {
                        log::error!("frame failed: {e}");
                    }
                }
            }

            WindowEvent::CursorMoved { position, .. } => {
                let (x, y) = (position.x as f32, position.y as f32);
                self.cursor = (x, y);
                if self.pointer_down {
                    self.deliver_pointer(PointerAction::Move, x, y);
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let (x, y) = self.cursor;
                match state {
                    ElementState::Pressed => {
                        self.pointer_down = true;
                        self.deliver_pointer(PointerAction::Down, x, y);
                    }
                    ElementState::Released => {
                        self.pointer_down = false;
                        self.deliver_pointer(PointerAction::Up, x, y);
                    }
                }
            }

            WindowEvent::Touch(touch) => {
                let (x, y) = (touch.location.x as f32, touch.location.y as f32);
                let action = match touch.phase {
                    TouchPhase::Started => PointerAction::Down,
                    TouchPhase::Moved => PointerAction::Move,
                    TouchPhase::Ended | TouchPhase::Cancelled => PointerAction::Up,
                };
                self.deliver_pointer(action, x, y);
            }

            _ => {}
        }
    }
}
