//! Frame timing and frame-rate measurement.
//!
//! Neither type is coupled to the runtime: `FrameClock` is ticked once per
//! presented frame and `FpsMeter` is a pure function of frame count and
//! elapsed time.

mod fps;
mod frame_clock;

pub use fps::FpsMeter;
pub use frame_clock::{FrameClock, FrameTime};
