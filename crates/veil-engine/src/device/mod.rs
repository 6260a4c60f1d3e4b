//! wgpu device, surface and the [`Backend`](crate::gpu::Backend) built on them.
//!
//! - [`Gpu`] owns the device, queue and configured window surface
//! - [`WgpuBackend`] maps the handle-based command layer onto wgpu objects

mod backend;
mod context;
mod error;
mod frame;
mod init;
mod surface;

pub use backend::WgpuBackend;
pub use context::Gpu;
pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use init::GpuInit;
