use std::fmt;

use crate::error::EngineResult;

use super::program::{UniformData, UniformKind};
use super::state::GraphicsState;
use super::texture::TextureDesc;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// Compiled shader stage.
    ShaderId
);
handle!(
    /// Linked vertex + fragment program.
    ProgramId
);
handle!(BufferId);
handle!(TextureId);
handle!(FramebufferId);
handle!(RenderbufferId);
handle!(
    /// Opaque uniform or sampler slot inside one program.
    UniformLocation
);

/// What a failed allocation was trying to create.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    VertexShader,
    FragmentShader,
    Program,
    Buffer,
    Texture,
    Framebuffer,
    Renderbuffer,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::VertexShader => "vertex shader",
            ResourceKind::FragmentShader => "fragment shader",
            ResourceKind::Program => "program",
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Renderbuffer => "renderbuffer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            ShaderStage::Vertex => ResourceKind::VertexShader,
            ShaderStage::Fragment => ResourceKind::FragmentShader,
        }
    }
}

/// Upload frequency hint for vertex data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

/// Names a program exposes to the host.
///
/// GL-style backends discover this through reflection and may ignore it.
/// Backends without reflection use it to lay out the uniform block and the
/// sampler bindings.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ProgramInterface {
    pub attributes: Vec<String>,
    pub uniforms: Vec<UniformDecl>,
    pub samplers: Vec<String>,
}

/// Buffers touched by a clear. `None` leaves that buffer untouched.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClearRequest {
    pub color: Option<[f32; 4]>,
    pub stencil: Option<u32>,
}

/// One `draw_arrays` invocation with the full pipeline state it runs under.
#[derive(Debug, Copy, Clone)]
pub struct DrawCall<'a> {
    pub state: &'a GraphicsState,
    pub first: u32,
    pub count: u32,
}

/// Handle-based graphics command interface.
///
/// Allocation methods return `None` when the driver hands back no object;
/// callers turn that into a resource-creation error. Pipeline state is not
/// ambient: it travels with each [`DrawCall`] and each clear names its target.
pub trait Backend {
    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId>;
    fn compile_shader(&mut self, shader: ShaderId, source: &str);
    /// Compiler output; empty when there is nothing to report.
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&mut self, shader: ShaderId);

    fn create_program(&mut self) -> Option<ProgramId>;
    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
        interface: &ProgramInterface,
    );
    fn link_status(&self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    /// Resolves plain uniforms and samplers alike.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&mut self, program: ProgramId, location: UniformLocation, data: UniformData);
    fn set_sampler_unit(&mut self, program: ProgramId, location: UniformLocation, unit: u32);
    fn delete_program(&mut self, program: ProgramId);

    fn create_buffer(&mut self) -> Option<BufferId>;
    fn buffer_data(&mut self, buffer: BufferId, data: &[f32], usage: BufferUsage);
    fn delete_buffer(&mut self, buffer: BufferId);

    fn create_texture(&mut self) -> Option<TextureId>;
    fn tex_image_2d(&mut self, texture: TextureId, desc: &TextureDesc, pixels: Option<&[u8]>);
    fn delete_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self) -> Option<FramebufferId>;
    fn framebuffer_texture(&mut self, framebuffer: FramebufferId, texture: TextureId);
    fn create_renderbuffer(&mut self) -> Option<RenderbufferId>;
    /// Allocates 8-bit stencil storage.
    fn renderbuffer_storage(&mut self, renderbuffer: RenderbufferId, width: u32, height: u32);
    fn framebuffer_renderbuffer(&mut self, framebuffer: FramebufferId, renderbuffer: RenderbufferId);
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId);

    fn resize_surface(&mut self, width: u32, height: u32);
    fn surface_size(&self) -> (u32, u32);

    /// `target == None` is the visible surface.
    fn clear(&mut self, target: Option<FramebufferId>, request: ClearRequest);
    fn draw_arrays(&mut self, draw: &DrawCall<'_>);

    /// Submits everything recorded since the previous call and presents.
    fn end_frame(&mut self) -> EngineResult<()>;
    fn is_context_lost(&self) -> bool;
}
