use std::sync::Arc;
use std::time::Duration;

use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::PhysicalKey;
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::WindowBuilder;

use super::Window;
use crate::config::WindowConfig;
use crate::error::{initialization_error, EngineResult};
use crate::input::{InputState, KeyCode};

/// Desktop window driven by polling instead of `EventLoop::run`, so the
/// game loop keeps control of its own thread.
pub struct WinitWindow {
    event_loop: EventLoop<()>,
    window: Arc<winit::window::Window>,
    input: InputState,
    resized: bool,
    close_requested: bool,
    size: PhysicalSize<u32>,
}

impl WinitWindow {
    pub fn new(config: &WindowConfig) -> EngineResult<Self> {
        let event_loop = EventLoop::new().map_err(|e| initialization_error("event loop", e))?;
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .build(&event_loop)
            .map_err(|e| initialization_error("window", e))?;
        let size = window.inner_size();

        log::info!("[WinitWindow::new] Created {}x{} window", size.width, size.height);

        Ok(Self {
            event_loop,
            window: Arc::new(window),
            input: InputState::new(),
            resized: false,
            close_requested: false,
            size,
        })
    }

    /// Shared handle for surface creation
    pub fn handle(&self) -> Arc<winit::window::Window> {
        Arc::clone(&self.window)
    }
}

impl Window for WinitWindow {
    fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.input.is_key_pressed(key)
    }

    fn is_resize(&self) -> bool {
        self.resized
    }

    fn set_resize(&mut self, resize: bool) {
        self.resized = resize;
    }

    fn window_should_close(&self) -> bool {
        self.close_requested
    }

    fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    fn update(&mut self) {
        let window_id = self.window.id();
        let input = &mut self.input;
        let resized = &mut self.resized;
        let close_requested = &mut self.close_requested;
        let size = &mut self.size;

        let status = self.event_loop.pump_events(Some(Duration::ZERO), |event, _| {
            let Event::WindowEvent { window_id: id, event } = event else {
                return;
            };
            if id != window_id {
                return;
            }

            match event {
                WindowEvent::CloseRequested => *close_requested = true,
                WindowEvent::Resized(new_size) => {
                    *size = new_size;
                    *resized = true;
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if let PhysicalKey::Code(code) = event.physical_key {
                        input.process_key(code, event.state);
                    }
                }
                // Keys released while unfocused never report
                WindowEvent::Focused(false) => input.clear(),
                _ => {}
            }
        });

        if let PumpStatus::Exit(code) = status {
            log::info!("[WinitWindow::update] Event loop exited with code {}", code);
            self.close_requested = true;
        }
    }

    fn width(&self) -> u32 {
        self.size.width
    }

    fn height(&self) -> u32 {
        self.size.height
    }
}
