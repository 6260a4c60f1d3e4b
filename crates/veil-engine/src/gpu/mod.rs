//! GPU resource utilities.
//!
//! A GL-shaped [`Backend`] trait with an explicit [`GpuContext`] on top of it,
//! and the helpers that build programs, vertex buffers, textures and render
//! targets through that context.

mod attributes;
mod backend;
mod program;
pub mod recording;
mod state;
mod texture;

pub use attributes::{
    create_attribute_buffers, release_attribute_buffers, update_attribute_buffers, Attribute,
    AttributeSet,
};
pub use backend::{
    Backend, BufferId, BufferUsage, ClearRequest, DrawCall, FramebufferId, ProgramId,
    ProgramInterface, RenderbufferId, ResourceKind, ShaderId, ShaderStage, TextureId,
    UniformDecl, UniformLocation,
};
pub use program::{
    assign_uniform, bind_sampler, compile_and_link_program, delete_program, LinkPolicy,
    ResolvedProgram, ShaderSource, Uniform, UniformData, UniformKind, UniformValue,
    NORMAL_ATTRIBUTE, POSITION_ATTRIBUTE,
};
pub use recording::RecordingBackend;
pub use state::{
    BlendEquation, BlendFactor, BlendState, ClearMask, ColorMask, CompareFunc, GpuContext,
    GraphicsState, StateSnapshot, StencilOp, StencilState, VertexBinding, MAX_TEXTURE_UNITS,
    MAX_VERTEX_ATTRIBUTES,
};
pub use texture::{
    create_render_target, create_texture, delete_render_target, resize_render_target, Filter,
    RenderTarget, TextureDesc, TextureFormat, Wrap,
};
