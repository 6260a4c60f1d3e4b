use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::config::EngineConfig;
use crate::device::{Gpu, GpuInit, WgpuBackend};
use crate::engine::{ControlHandle, Controls, Engine};
use crate::error::EngineError;
use crate::time::FrameClock;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    /// Controls in effect before the host pushes any.
    pub initial_controls: Controls,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "veil".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            initial_controls: Controls::default(),
        }
    }
}

/// Hosts one engine in one window and redraws continuously.
pub struct Runtime;

impl Runtime {
    pub fn run(config: RuntimeConfig, gpu_init: GpuInit, engine: EngineConfig) -> Result<()> {
        Self::run_with(config, gpu_init, engine, |_| {})
    }

    /// Like [`run`](Self::run), handing the engine's [`ControlHandle`] to
    /// `on_controls` once the window exists so other threads can drive it.
    pub fn run_with(
        config: RuntimeConfig,
        gpu_init: GpuInit,
        engine: EngineConfig,
        on_controls: impl FnOnce(ControlHandle) + 'static,
    ) -> Result<()> {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            gpu_init,
            engine_config: engine,
            on_controls: Some(Box::new(on_controls)),
            entry: None,
            failure: None,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,
    title: String,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    engine: Engine<WgpuBackend<'this>>,
}

struct AppState {
    config: RuntimeConfig,
    gpu_init: GpuInit,
    engine_config: EngineConfig,
    on_controls: Option<Box<dyn FnOnce(ControlHandle)>>,

    entry: Option<WindowEntry>,
    failure: Option<anyhow::Error>,
}

impl AppState {
    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let gpu_init = self.gpu_init.clone();
        let engine_config = self.engine_config.clone();
        let initial = self.config.initial_controls;

        let entry = WindowEntryTryBuilder {
            clock: FrameClock::new(),
            title: self.config.title.clone(),
            window,
            engine_builder: |w| {
                let gpu = pollster::block_on(Gpu::new(w, gpu_init))
                    .context("GPU initialization failed for window")?;
                let engine = Engine::new(WgpuBackend::new(gpu), engine_config);
                engine.update_controls(initial.vector, initial.float_var1, initial.float_var2);
                Ok::<_, anyhow::Error>(engine)
            },
        }
        .try_build()?;

        Ok(entry)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.entry = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }

        match self.create_window_entry(event_loop) {
            Ok(entry) => {
                if let Some(on_controls) = self.on_controls.take() {
                    on_controls(entry.with_engine(|e| e.controls()));
                }
                entry.with_window(|w| w.request_redraw());
                self.entry = Some(entry);
            }
            Err(e) => self.fail(event_loop, e.context("failed to create initial window")),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(entry) = self.entry.as_mut() else {
            return;
        };
        if entry.with_window(|w| w.id()) != window_id {
            return;
        }

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.entry = None;
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                entry.with_engine_mut(|e| e.request_resize(size.width, size.height));
                entry.with_window(|w| w.request_redraw());
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let size = entry.with_window(|w| w.inner_size());
                entry.with_engine_mut(|e| e.request_resize(size.width, size.height));
                entry.with_window(|w| w.request_redraw());
            }

            WindowEvent::RedrawRequested => {
                let result = entry.with_mut(|fields| {
                    let time = fields.clock.tick();
                    let status = fields.engine.frame(time)?;
                    if let Some(fps) = status.fps {
                        fields
                            .window
                            .set_title(&format!("{} ({fps:.0} fps)", fields.title));
                    }
                    Ok::<_, EngineError>(status)
                });

                match result {
                    Ok(_) => entry.with_window(|w| w.request_redraw()),
                    Err(err) => self.fail(event_loop, anyhow::Error::new(err).context("frame failed")),
                }
            }

            _ => {}
        }
    }
}
