use std::sync::Arc;

use parking_lot::Mutex;

use crate::math::Vec3;

/// User-driven parameters read once per frame.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Controls {
    /// Mask pass input. Components are conventionally in `[0, 1]` but not
    /// clamped.
    pub vector: Vec3,
    pub float_var1: f32,
    pub float_var2: f32,
}

impl Controls {
    pub fn new(vector: Vec3, float_var1: f32, float_var2: f32) -> Self {
        Self {
            vector,
            float_var1,
            float_var2,
        }
    }
}

/// Cloneable publisher for [`Controls`].
///
/// Each update replaces the whole snapshot, so a reader never observes the
/// vector from one update paired with scalars from another.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    inner: Arc<Mutex<Controls>>,
}

impl ControlHandle {
    pub fn new(initial: Controls) -> Self {
        Self {
            inner: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn update(&self, vector: Vec3, float_var1: f32, float_var2: f32) {
        *self.inner.lock() = Controls::new(vector, float_var1, float_var2);
    }

    pub fn snapshot(&self) -> Controls {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_one_snapshot() {
        let handle = ControlHandle::default();
        let publisher = handle.clone();
        publisher.update(Vec3::new(1.0, 0.0, 0.0), 0.25, 0.5);

        let seen = handle.snapshot();
        assert_eq!(seen.vector, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(seen.float_var1, 0.25);
        assert_eq!(seen.float_var2, 0.5);
    }

    #[test]
    fn concurrent_updates_are_never_torn() {
        let handle = ControlHandle::default();
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let h = handle.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let v = i as f32;
                        h.update(Vec3::new(v, v, v), v, v);
                    }
                })
            })
            .collect();

        for _ in 0..500 {
            let c = handle.snapshot();
            assert_eq!(c.vector.x, c.float_var1);
            assert_eq!(c.vector.z, c.float_var2);
        }
        for w in writers {
            w.join().unwrap();
        }
    }
}
