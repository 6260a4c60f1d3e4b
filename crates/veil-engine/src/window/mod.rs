//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window and drives one [`Engine`](crate::Engine)
//! on the wgpu backend.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
