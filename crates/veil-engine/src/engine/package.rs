use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::{EngineError, EngineResult};
use crate::gpu::{
    AttributeSet, Backend, ColorMask, CompareFunc, GpuContext, ResolvedProgram, StencilOp,
    TextureId, Uniform,
};

pub const U_TIME: &str = "uTime";
pub const U_RESOLUTION: &str = "uResolution";
pub const U_VECTOR: &str = "uVector";
pub const U_FLOAT_VAR1: &str = "uFloatVar1";
pub const U_FLOAT_VAR2: &str = "uFloatVar2";

pub const S_IMAGE: &str = "uImage";
pub const S_RENDER_TARGET: &str = "uRenderTarget";
pub const S_MASK_IMAGE: &str = "uMaskImage";

/// Stencil reference shared by the mask and paint passes.
pub const STENCIL_REF: u32 = 1;
pub const STENCIL_MASK: u32 = 0xFF;

/// The three fixed passes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PassKind {
    /// Full-screen background composited onto the surface.
    Background,
    /// Writes the stencil mask offscreen.
    Mask,
    /// Draws offscreen where the mask is not set.
    Paint,
}

impl PassKind {
    pub const ALL: [PassKind; 3] = [PassKind::Background, PassKind::Mask, PassKind::Paint];

    pub fn name(self) -> &'static str {
        match self {
            PassKind::Background => "background",
            PassKind::Mask => "mask",
            PassKind::Paint => "paint",
        }
    }

    /// Exact, case-sensitive match on [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StencilMode {
    /// Stencil ignored, colour written.
    None,
    /// Clears the stencil and writes the reference wherever fragments land.
    /// Colour writes are off.
    Write,
    /// Colour written only where the stencil differs from the reference.
    Read,
}

impl StencilMode {
    /// Puts `gpu` into this mode. `Write` also clears the stencil of the
    /// bound framebuffer.
    pub fn apply<B: Backend>(self, gpu: &mut GpuContext<B>) {
        match self {
            StencilMode::None => {
                gpu.stencil_func(CompareFunc::Always, STENCIL_REF, STENCIL_MASK);
                gpu.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep);
                gpu.color_mask(ColorMask::ALL);
            }
            StencilMode::Write => {
                gpu.clear(crate::gpu::ClearMask::STENCIL);
                gpu.stencil_func(CompareFunc::Always, STENCIL_REF, STENCIL_MASK);
                gpu.stencil_op(StencilOp::Keep, StencilOp::Replace, StencilOp::Replace);
                gpu.color_mask(ColorMask::NONE);
            }
            StencilMode::Read => {
                gpu.stencil_func(CompareFunc::NotEqual, STENCIL_REF, STENCIL_MASK);
                gpu.stencil_op(StencilOp::Keep, StencilOp::Keep, StencilOp::Keep);
                gpu.color_mask(ColorMask::ALL);
            }
        }
    }
}

/// Where a sampler's texture comes from at draw time.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SamplerSource {
    /// The package's own bitmap.
    Image,
    /// The offscreen render target's colour texture.
    RenderTarget,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SamplerBinding {
    pub name: &'static str,
    pub unit: u32,
    pub source: SamplerSource,
}

impl SamplerBinding {
    pub fn new(name: &'static str, unit: u32, source: SamplerSource) -> Self {
        Self { name, unit, source }
    }
}

/// Everything needed to draw one pass.
#[derive(Debug)]
pub struct Package {
    pub kind: PassKind,
    pub active: bool,
    pub attributes: AttributeSet,
    pub uniforms: Vec<Uniform>,
    pub program: ResolvedProgram,
    pub uses_normals: bool,
    pub stencil: StencilMode,
    /// Bitmap sampled through [`SamplerSource::Image`].
    pub image: Option<TextureId>,
    pub samplers: Vec<SamplerBinding>,
}

impl Package {
    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.uniforms.iter().find(|u| u.name() == name)
    }

    pub fn uniform_mut(&mut self, name: &str) -> Option<&mut Uniform> {
        self.uniforms.iter_mut().find(|u| u.name() == name)
    }

    /// Like [`uniform_mut`](Self::uniform_mut) but a missing name is an error.
    pub fn require_uniform(&mut self, name: &str) -> EngineResult<&mut Uniform> {
        let kind = self.kind;
        self.uniform_mut(name).ok_or_else(|| EngineError::UnknownUniform {
            package: kind.name().to_owned(),
            uniform: name.to_owned(),
        })
    }
}

/// The three packages, addressed by [`PassKind`].
#[derive(Debug)]
pub struct Passes {
    background: Package,
    mask: Package,
    paint: Package,
}

impl Passes {
    pub fn new(background: Package, mask: Package, paint: Package) -> Self {
        debug_assert_eq!(background.kind, PassKind::Background);
        debug_assert_eq!(mask.kind, PassKind::Mask);
        debug_assert_eq!(paint.kind, PassKind::Paint);
        Self {
            background,
            mask,
            paint,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        [&self.background, &self.mask, &self.paint].into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Package> {
        [&mut self.background, &mut self.mask, &mut self.paint].into_iter()
    }
}

impl Index<PassKind> for Passes {
    type Output = Package;

    fn index(&self, kind: PassKind) -> &Package {
        match kind {
            PassKind::Background => &self.background,
            PassKind::Mask => &self.mask,
            PassKind::Paint => &self.paint,
        }
    }
}

impl IndexMut<PassKind> for Passes {
    fn index_mut(&mut self, kind: PassKind) -> &mut Package {
        match kind {
            PassKind::Background => &mut self.background,
            PassKind::Mask => &mut self.mask,
            PassKind::Paint => &mut self.paint,
        }
    }
}

/// Finds uniform `uniform_name` of package `package_name` by exact name.
pub fn lookup_uniform<'a>(
    passes: &'a mut Passes,
    package_name: &str,
    uniform_name: &str,
) -> EngineResult<&'a mut Uniform> {
    let kind = PassKind::from_name(package_name)
        .ok_or_else(|| EngineError::UnknownPackage(package_name.to_owned()))?;
    passes[kind].require_uniform(uniform_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_names_round_trip_exactly() {
        for kind in PassKind::ALL {
            assert_eq!(PassKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PassKind::from_name("Mask"), None);
        assert_eq!(PassKind::from_name("stencil"), None);
    }

    #[test]
    fn stencil_modes_set_expected_state() {
        use crate::gpu::RecordingBackend;

        let mut gpu = GpuContext::new(RecordingBackend::new(2, 2));

        StencilMode::Write.apply(&mut gpu);
        let s = gpu.state().stencil;
        assert_eq!((s.func, s.reference), (CompareFunc::Always, STENCIL_REF));
        assert_eq!((s.fail, s.depth_fail, s.pass), (StencilOp::Keep, StencilOp::Replace, StencilOp::Replace));
        assert_eq!(gpu.state().color_mask, ColorMask::NONE);
        assert_eq!(gpu.backend().clears().len(), 1);

        StencilMode::Read.apply(&mut gpu);
        let s = gpu.state().stencil;
        assert_eq!((s.func, s.reference), (CompareFunc::NotEqual, STENCIL_REF));
        assert_eq!(s.pass, StencilOp::Keep);
        assert_eq!(gpu.state().color_mask, ColorMask::ALL);

        StencilMode::None.apply(&mut gpu);
        assert_eq!(gpu.state().stencil.func, CompareFunc::Always);
        assert_eq!(gpu.backend().clears().len(), 1);
    }
}
