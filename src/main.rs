// Vulkan sandbox renderer
//
// Window and event handling live here; everything Vulkan lives in the
// Renderer. The scene is two quads spinning in opposite directions.
//
// FRAME FLOW:
// 1. winit delivers RedrawRequested
// 2. Animate model matrices from elapsed time
// 3. Recreate the swapchain if the window changed
// 4. Renderer::draw records, submits and presents one frame

mod backend;
mod config;
mod renderer;

use anyhow::Result;
use config::Config;
use glam::Mat4;
use renderer::Renderer;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

fn main() -> Result<()> {
    let config = Config::load();

    init_logging();
    log::info!("Starting Vulkan renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen {
            "fullscreen"
        } else {
            "windowed"
        }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

/// Application state: the window, the renderer, and frame bookkeeping
struct App {
    config: Config,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    is_fullscreen: bool,

    // Animation clock
    start_time: Instant,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            window: None,
            renderer: None,
            is_fullscreen,
            start_time: now,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    /// Drive one frame: animate, handle pending resizes, draw.
    fn render_frame(&mut self) -> Result<bool> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(false);
        };

        // Two quads counter-rotating around Z
        let angle = self.start_time.elapsed().as_secs_f32() * 90f32.to_radians();
        renderer.update_model(0, Mat4::from_rotation_z(angle));
        renderer.update_model(1, Mat4::from_rotation_z(-angle * 2.0));

        if renderer.needs_resize {
            if let Some(ref window) = self.window {
                let size = window.inner_size();
                renderer.recreate_swapchain(size.width, size.height)?;
            }
            if renderer.is_minimized {
                return Ok(false);
            }
        }

        renderer.draw()
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(renderer) = self.renderer.as_mut() {
                renderer.needs_resize = true;
            }
        }
    }

    /// Update the window title with FPS and frame time once a second
    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                let mode = if self.is_fullscreen {
                    "fullscreen"
                } else {
                    "windowed"
                };
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    mode
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        let renderer = {
            use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
            let size = window.inner_size();
            window
                .display_handle()
                .map_err(anyhow::Error::from)
                .and_then(|display| {
                    let display = display.as_raw();
                    let window_handle = window.window_handle()?.as_raw();
                    Renderer::new(&self.config, display, window_handle, size.width, size.height)
                })
        };

        match renderer {
            Ok(r) => self.renderer = Some(r),
            Err(e) => {
                log::error!("Failed to initialize Vulkan: {:?}", e);
                event_loop.exit();
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if let Some(renderer) = self.renderer.as_mut() {
                    if size.width == 0 || size.height == 0 {
                        renderer.is_minimized = true;
                    } else {
                        renderer.is_minimized = false;
                        renderer.needs_resize = true;
                    }
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(rendered) => {
                    if rendered {
                        self.update_fps();
                    }
                }
                Err(e) => {
                    // Recoverable conditions (out-of-date, minimized) never
                    // reach here; anything that does is fatal
                    log::error!("Render error: {:?}", e);
                    event_loop.exit();
                }
            },

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F11 => {
                                self.toggle_fullscreen();
                            }
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws so the animation keeps running
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
