//! Veil engine crate.
//!
//! A stencil-masked three-pass compositor: math and camera helpers, a
//! GL-shaped GPU layer with a wgpu implementation, the engine that drives
//! the passes, and the window runtime that hosts it.

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod logging;
pub mod math;
pub mod time;
pub mod window;

pub use config::{EngineConfig, ShaderSet};
pub use engine::{Controls, ControlHandle, Engine, EnginePhase, FrameStatus, PassKind};
pub use error::{EngineError, EngineResult, ErrorCategory};
