// =============================================================================
// FRAME PACER - Vulkan frame pacing and presentation lifecycle
// =============================================================================
//
// Opens a window and drives the frame protocol every redraw: a fixed-aspect
// content area, letterboxed inside whatever size the window has.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit App (window, input, event loop)                          │
// │    └── Renderer (frame core root object)                        │
// │          ├── FrameOrchestrator (per-frame protocol)             │
// │          ├── PresentationChain (rebuildable swapchain)          │
// │          └── FrameSlotRing (N frames in flight)                 │
// │                └── VulkanDevice + VulkanPresenter (backend)     │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for the slot's previous frame (fence)
// 2. Acquire swapchain image
// 3. Record: clear bars, fill the letterboxed viewport
// 4. Submit to the graphics queue
// 5. Present on the present queue
// 6. Advance to the next slot
//
// =============================================================================

mod backend;
mod config;
mod frame;

use anyhow::{Context, Result};
use ash::vk;
use backend::{VulkanDevice, VulkanPresenter};
use config::Config;
use frame::{DrawableSurface, FrameOutcome, Renderer};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting frame pacer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!(
        "Frames in flight: {}, present modes: {:?}",
        config.graphics.frames_in_flight,
        config.graphics.present_modes
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // A fatal frame error ends the loop; report it through the exit code
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging: config level as the default, RUST_LOG wins
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or(config.debug.log_level.as_str())).init();
}

// =============================================================================
// WINDOW SURFACE
// =============================================================================

/// The window as the frame core sees it: a drawable size in pixels
struct WindowSurface(Arc<Window>);

impl DrawableSurface for WindowSurface {
    fn drawable_size(&self) -> vk::Extent2D {
        let size = self.0.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

type WindowRenderer = Renderer<VulkanDevice, VulkanPresenter, WindowSurface>;

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Main application struct.
///
/// IMPORTANT: Field order matters for Drop! The renderer owns the Vulkan
/// surface of the window, so it goes before the window.
struct App {
    config: Config,

    // ─────────────────────────────────────────────────────────────────────────
    // RENDERING
    // ─────────────────────────────────────────────────────────────────────────
    renderer: Option<WindowRenderer>,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    is_fullscreen: bool,
    is_minimized: bool,

    // Set once the render loop hits an unrecoverable error
    fatal: Option<anyhow::Error>,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        Self {
            config,
            renderer: None,
            window: None,
            is_fullscreen,
            is_minimized: false,
            fatal: None,
            frame_count: 0,
            last_fps_update: Instant::now(),
            last_frame_time: Instant::now(),
        }
    }

    // =========================================================================
    // VULKAN INITIALIZATION
    // =========================================================================

    fn init_renderer(&mut self, window: Arc<Window>) -> Result<()> {
        let device = VulkanDevice::new(
            &self.config.window.title,
            self.config.debug.validation_layers,
            window.raw_display_handle(),
            window.raw_window_handle(),
        )?;
        let presenter = VulkanPresenter::new(device.clone())?;

        let renderer = Renderer::new(
            device,
            presenter,
            WindowSurface(window),
            self.config.frame_settings(),
        )
        .context("Failed to set up frame pacing")?;

        self.renderer = Some(renderer);
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        // The render loop is over once a frame has failed
        if self.fatal.is_some() {
            return;
        }
        let content_color = self.config.graphics.content_color;
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        let outcome = renderer.render_frame(|frame| frame.clear_viewport(content_color));

        match outcome {
            Ok(FrameOutcome::Presented) | Ok(FrameOutcome::PresentedStale) => self.update_fps(),
            Ok(FrameOutcome::Skipped) => {}
            Ok(FrameOutcome::Suspended) => {
                // Wait for a Resized event instead of spinning
                self.is_minimized = true;
            }
            Err(e) => {
                log::error!("Fatal frame error: {}", e);
                self.fatal = Some(anyhow::Error::new(e).context("Render loop stopped"));
                self.shutdown(event_loop);
            }
        }
    }

    /// Drain the GPU and leave the event loop
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(ref renderer) = self.renderer {
            if let Err(e) = renderer.drain() {
                log::warn!("Device idle wait failed on shutdown: {}", e);
            }
        }
        event_loop.exit();
    }

    fn request_rebuild(&mut self) {
        if let Some(ref mut renderer) = self.renderer {
            renderer.request_rebuild();
        }
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        let Some(ref window) = self.window else {
            return;
        };
        self.is_fullscreen = !self.is_fullscreen;

        if self.is_fullscreen {
            // Enter fullscreen (use current monitor)
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }

        self.request_rebuild();
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let (Some(window), Some(renderer)) = (&self.window, &self.renderer) {
                let extent = renderer.current_extent();
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms) [{}x{}, {} in flight]",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                    extent.width,
                    extent.height,
                    renderer.frames_in_flight(),
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Create window with settings from config
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
                self.fatal = Some(anyhow::Error::new(e).context("Failed to create window"));
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_renderer(window.clone()) {
            log::error!("Failed to initialize Vulkan: {:#}", e);
            self.fatal = Some(e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    /// Handle window events.
    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            // ─────────────────────────────────────────────────────────────────
            // CLOSE REQUEST
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            // ─────────────────────────────────────────────────────────────────
            // WINDOW RESIZED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                self.is_minimized = size.width == 0 || size.height == 0;
                self.request_rebuild();
                if !self.is_minimized {
                    if let Some(ref window) = self.window {
                        window.request_redraw();
                    }
                }
            }

            // ─────────────────────────────────────────────────────────────────
            // REDRAW REQUESTED
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::RedrawRequested => self.redraw(event_loop),

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            // ESC - Quit application
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                self.shutdown(event_loop);
                            }
                            // F11 - Toggle fullscreen
                            KeyCode::F11 => self.toggle_fullscreen(),
                            _ => {}
                        }
                    }
                }
            }

            _ => {}
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// Redraw continuously unless minimized; then sleep until an event.
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.is_minimized {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Renderer drains the device, then releases chain, ring and surface
        self.renderer.take();

        log::info!("Cleanup complete");
    }
}
