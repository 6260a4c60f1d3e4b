use std::time::Duration;

/// Frame-rate estimator over fixed sampling windows.
///
/// Produces at most one estimate per window: frames counted since the last
/// estimate divided by the time that passed.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window: Duration,
    last_sample: Duration,
    last_frame_count: u64,
    latest: Option<f64>,
}

impl FpsMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sample: Duration::ZERO,
            last_frame_count: 0,
            latest: None,
        }
    }

    /// Records that `frame_count` frames have been drawn by `now`.
    ///
    /// Returns an estimate once `now` is at least one window past the
    /// previous sample, and `None` otherwise.
    pub fn update(&mut self, frame_count: u64, now: Duration) -> Option<f64> {
        let elapsed = now.saturating_sub(self.last_sample);
        if elapsed < self.window {
            return None;
        }

        let frames = frame_count.saturating_sub(self.last_frame_count);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let fps = frames as f64 / elapsed_ms * 1000.0;

        self.last_sample = now;
        self.last_frame_count = frame_count;
        self.latest = Some(fps);
        Some(fps)
    }

    /// Most recent estimate, if a full window has passed.
    pub fn latest(&self) -> Option<f64> {
        self.latest
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}
