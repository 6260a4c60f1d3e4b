use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTime {
    /// Time since the previous tick, in seconds, clamped.
    pub dt: f32,

    /// Unclamped time since the clock started.
    pub elapsed: Duration,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

impl FrameTime {
    /// A snapshot at `elapsed` with no frame history, for driving the
    /// engine without a real clock.
    pub fn at(elapsed: Duration, frame_index: u64) -> Self {
        Self {
            dt: 0.0,
            elapsed,
            frame_index,
        }
    }

    /// Elapsed time in seconds with millisecond resolution.
    pub fn seconds(&self) -> f32 {
        self.elapsed.as_millis() as f32 / 1000.0
    }
}

/// Frame clock producing `FrameTime` snapshots.
///
/// Delta time is clamped to avoid pathological values when the application is
/// paused by the debugger, minimized, or stalls. Elapsed time is not.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Resets the delta baseline. Elapsed time keeps counting from the start.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            elapsed: now.saturating_duration_since(self.start),
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped_but_elapsed_is_not() {
        let mut clock = FrameClock::new();
        let start = clock.start;

        let first = clock.tick_at(start + Duration::from_secs(2));
        assert_eq!(first.frame_index, 0);
        assert!((first.dt - 0.25).abs() < 1e-6);
        assert_eq!(first.elapsed, Duration::from_secs(2));

        let second = clock.tick_at(start + Duration::from_secs(2));
        assert_eq!(second.frame_index, 1);
        assert!((second.dt - 0.0001).abs() < 1e-6);
    }

    #[test]
    fn seconds_use_whole_milliseconds() {
        let ft = FrameTime::at(Duration::from_micros(1_500_900), 0);
        assert_eq!(ft.seconds(), 1.5);
    }
}
