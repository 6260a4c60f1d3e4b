use std::path::PathBuf;
use std::time::Duration;

use crate::engine::PassKind;
use crate::gpu::{Filter, LinkPolicy, ShaderSource, Wrap};

const FULLSCREEN_VS: &str = include_str!("engine/shaders/fullscreen.vert.wgsl");

/// One vertex/fragment pair per pass.
#[derive(Debug, Clone)]
pub struct ShaderSet {
    pub background: ShaderSource,
    pub mask: ShaderSource,
    pub paint: ShaderSource,
}

impl ShaderSet {
    pub fn get(&self, kind: PassKind) -> &ShaderSource {
        match kind {
            PassKind::Background => &self.background,
            PassKind::Mask => &self.mask,
            PassKind::Paint => &self.paint,
        }
    }
}

impl Default for ShaderSet {
    fn default() -> Self {
        let pair = |fragment: &str| ShaderSource {
            vertex: FULLSCREEN_VS.to_owned(),
            fragment: fragment.to_owned(),
        };
        Self {
            background: pair(include_str!("engine/shaders/background.frag.wgsl")),
            mask: pair(include_str!("engine/shaders/mask.frag.wgsl")),
            paint: pair(include_str!("engine/shaders/paint.frag.wgsl")),
        }
    }
}

/// Engine behaviour knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bitmap sampled by the background pass.
    pub background_image: PathBuf,
    /// Bitmap whose alpha shapes the stencil mask.
    pub mask_image: PathBuf,

    pub shaders: ShaderSet,

    /// Sampling parameters for both bitmaps.
    pub image_filter: Filter,
    pub image_wrap: Wrap,

    /// FPS sampling window.
    pub fps_window: Duration,

    /// Treat a failed program link as fatal instead of logging it.
    pub fail_on_link_error: bool,

    /// Snapshot graphics state before each frame and restore it afterwards,
    /// for hosts that share the context with other renderers.
    pub preserve_host_state: bool,

    /// Clear colour of the visible surface.
    pub surface_clear: [f32; 4],
    /// Clear colour of the offscreen target.
    pub target_clear: [f32; 4],
}

impl EngineConfig {
    pub fn link_policy(&self) -> LinkPolicy {
        if self.fail_on_link_error {
            LinkPolicy::Fail
        } else {
            LinkPolicy::Tolerate
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            background_image: PathBuf::from("assets/darkTexture.jpg"),
            mask_image: PathBuf::from("assets/LogoBackwardsWhite.png"),
            shaders: ShaderSet::default(),
            image_filter: Filter::Linear,
            image_wrap: Wrap::ClampToEdge,
            fps_window: Duration::from_millis(1000),
            fail_on_link_error: false,
            preserve_host_state: false,
            surface_clear: [0.0, 0.0, 0.0, 1.0],
            target_clear: [0.0, 0.0, 0.0, 0.0],
        }
    }
}
