use crate::error::EngineResult;

use super::backend::{
    Backend, BufferId, ClearRequest, DrawCall, FramebufferId, ProgramId, TextureId,
};

pub const MAX_TEXTURE_UNITS: usize = 4;
pub const MAX_VERTEX_ATTRIBUTES: usize = 4;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlendState {
    pub enabled: bool,
    pub src: BlendFactor,
    pub dst: BlendFactor,
    pub equation: BlendEquation,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enabled: false,
            src: BlendFactor::One,
            dst: BlendFactor::Zero,
            equation: BlendEquation::Add,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    Decrement,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

/// Stencil test configuration (front and back faces share it).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StencilState {
    pub enabled: bool,
    pub func: CompareFunc,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
    /// Stencil test failed.
    pub fail: StencilOp,
    /// Stencil passed, depth failed.
    pub depth_fail: StencilOp,
    /// Both passed.
    pub pass: StencilOp,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            enabled: false,
            func: CompareFunc::Always,
            reference: 0,
            read_mask: 0xFF,
            write_mask: 0xFF,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass: StencilOp::Keep,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ColorMask(pub [bool; 4]);

impl ColorMask {
    pub const ALL: ColorMask = ColorMask([true; 4]);
    pub const NONE: ColorMask = ColorMask([false; 4]);

    pub fn writes_any(self) -> bool {
        self.0.iter().any(|c| *c)
    }
}

impl Default for ColorMask {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct ClearMask {
    pub color: bool,
    pub stencil: bool,
}

impl ClearMask {
    pub const COLOR: ClearMask = ClearMask { color: true, stencil: false };
    pub const STENCIL: ClearMask = ClearMask { color: false, stencil: true };
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexBinding {
    pub buffer: BufferId,
    pub components: u32,
}

/// Every piece of pipeline state the engine touches.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsState {
    pub program: Option<ProgramId>,
    pub framebuffer: Option<FramebufferId>,
    pub array_buffer: Option<BufferId>,
    pub active_texture: u32,
    pub texture_units: [Option<TextureId>; MAX_TEXTURE_UNITS],
    pub vertex_attributes: [Option<VertexBinding>; MAX_VERTEX_ATTRIBUTES],
    pub blend: BlendState,
    pub stencil: StencilState,
    pub color_mask: ColorMask,
    pub cull_back_faces: bool,
    pub viewport: (u32, u32),
    pub clear_color: [f32; 4],
    pub clear_stencil: u32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            program: None,
            framebuffer: None,
            array_buffer: None,
            active_texture: 0,
            texture_units: [None; MAX_TEXTURE_UNITS],
            vertex_attributes: [None; MAX_VERTEX_ATTRIBUTES],
            blend: BlendState::default(),
            stencil: StencilState::default(),
            color_mask: ColorMask::ALL,
            cull_back_faces: false,
            viewport: (0, 0),
            clear_color: [0.0; 4],
            clear_stencil: 0,
        }
    }
}

/// The subset of [`GraphicsState`] the engine mutates per draw.
///
/// Captured before and restored after a frame when the engine shares its
/// context with other renderers.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub program: Option<ProgramId>,
    pub blend_src: BlendFactor,
    pub blend_dst: BlendFactor,
    pub blend_equation: BlendEquation,
    pub array_buffer: Option<BufferId>,
    pub active_texture: u32,
    pub bound_texture: Option<TextureId>,
    pub stencil_func: CompareFunc,
    pub stencil_reference: u32,
    pub stencil_read_mask: u32,
    pub stencil_fail: StencilOp,
    pub stencil_depth_fail: StencilOp,
    pub stencil_pass: StencilOp,
    pub color_mask: ColorMask,
}

/// Explicit graphics context: a backend plus the state it draws with.
///
/// Setters only touch the tracked [`GraphicsState`]; the backend sees that
/// state in full at each draw, so no call depends on what a previous pass
/// happened to leave bound.
pub struct GpuContext<B: Backend> {
    backend: B,
    state: GraphicsState,
}

impl<B: Backend> GpuContext<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: GraphicsState::default(),
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn state(&self) -> &GraphicsState {
        &self.state
    }

    pub fn use_program(&mut self, program: Option<ProgramId>) {
        self.state.program = program;
    }

    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.state.framebuffer = framebuffer;
    }

    pub fn bind_array_buffer(&mut self, buffer: Option<BufferId>) {
        self.state.array_buffer = buffer;
    }

    /// Selects the unit targeted by [`bind_texture`](Self::bind_texture).
    /// Units past the supported range are clamped to the last one.
    pub fn active_texture(&mut self, unit: u32) {
        let last = MAX_TEXTURE_UNITS as u32 - 1;
        if unit > last {
            log::warn!("texture unit {unit} exceeds supported range; using unit {last}");
        }
        self.state.active_texture = unit.min(last);
    }

    pub fn bind_texture(&mut self, texture: Option<TextureId>) {
        let unit = self.state.active_texture as usize;
        self.state.texture_units[unit] = texture;
    }

    pub fn set_blend_enabled(&mut self, enabled: bool) {
        self.state.blend.enabled = enabled;
    }

    pub fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.state.blend.src = src;
        self.state.blend.dst = dst;
    }

    pub fn blend_equation(&mut self, equation: BlendEquation) {
        self.state.blend.equation = equation;
    }

    pub fn set_stencil_test_enabled(&mut self, enabled: bool) {
        self.state.stencil.enabled = enabled;
    }

    pub fn stencil_func(&mut self, func: CompareFunc, reference: u32, mask: u32) {
        self.state.stencil.func = func;
        self.state.stencil.reference = reference;
        self.state.stencil.read_mask = mask;
    }

    pub fn stencil_op(&mut self, fail: StencilOp, depth_fail: StencilOp, pass: StencilOp) {
        self.state.stencil.fail = fail;
        self.state.stencil.depth_fail = depth_fail;
        self.state.stencil.pass = pass;
    }

    pub fn color_mask(&mut self, mask: ColorMask) {
        self.state.color_mask = mask;
    }

    pub fn set_cull_back_faces(&mut self, enabled: bool) {
        self.state.cull_back_faces = enabled;
    }

    pub fn viewport(&mut self, width: u32, height: u32) {
        self.state.viewport = (width, height);
    }

    pub fn clear_color(&mut self, rgba: [f32; 4]) {
        self.state.clear_color = rgba;
    }

    /// Clears the bound framebuffer.
    pub fn clear(&mut self, mask: ClearMask) {
        let request = ClearRequest {
            color: mask.color.then_some(self.state.clear_color),
            stencil: mask.stencil.then_some(self.state.clear_stencil),
        };
        self.backend.clear(self.state.framebuffer, request);
    }

    /// Sources attribute `location` from the bound array buffer.
    ///
    /// Out-of-range locations and an unbound array buffer disable the slot.
    pub fn vertex_attrib_pointer(&mut self, location: u32, components: u32) {
        let Some(slot) = self.state.vertex_attributes.get_mut(location as usize) else {
            log::warn!("vertex attribute location {location} exceeds supported range");
            return;
        };
        *slot = self
            .state
            .array_buffer
            .map(|buffer| VertexBinding { buffer, components });
    }

    pub fn disable_vertex_attrib(&mut self, location: u32) {
        if let Some(slot) = self.state.vertex_attributes.get_mut(location as usize) {
            *slot = None;
        }
    }

    pub fn draw_arrays(&mut self, first: u32, count: u32) {
        let draw = DrawCall {
            state: &self.state,
            first,
            count,
        };
        self.backend.draw_arrays(&draw);
    }

    pub fn end_frame(&mut self) -> EngineResult<()> {
        self.backend.end_frame()
    }

    pub fn snapshot_state(&self) -> StateSnapshot {
        let s = &self.state;
        StateSnapshot {
            program: s.program,
            blend_src: s.blend.src,
            blend_dst: s.blend.dst,
            blend_equation: s.blend.equation,
            array_buffer: s.array_buffer,
            active_texture: s.active_texture,
            bound_texture: s.texture_units[s.active_texture as usize],
            stencil_func: s.stencil.func,
            stencil_reference: s.stencil.reference,
            stencil_read_mask: s.stencil.read_mask,
            stencil_fail: s.stencil.fail,
            stencil_depth_fail: s.stencil.depth_fail,
            stencil_pass: s.stencil.pass,
            color_mask: s.color_mask,
        }
    }

    pub fn restore_state(&mut self, snapshot: &StateSnapshot) {
        self.use_program(snapshot.program);
        self.bind_array_buffer(snapshot.array_buffer);
        self.blend_func(snapshot.blend_src, snapshot.blend_dst);
        self.blend_equation(snapshot.blend_equation);
        // Unit first, so the texture lands on the unit it was captured from.
        self.active_texture(snapshot.active_texture);
        self.bind_texture(snapshot.bound_texture);
        self.stencil_func(
            snapshot.stencil_func,
            snapshot.stencil_reference,
            snapshot.stencil_read_mask,
        );
        self.stencil_op(
            snapshot.stencil_fail,
            snapshot.stencil_depth_fail,
            snapshot.stencil_pass,
        );
        self.color_mask(snapshot.color_mask);
    }
}
