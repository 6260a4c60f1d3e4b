use crate::error::{EngineError, EngineResult};

use super::backend::{Backend, BufferId, BufferUsage, ResourceKind};
use super::program::{NORMAL_ATTRIBUTE, POSITION_ATTRIBUTE};
use super::state::GpuContext;

/// Components per vertex for both attributes.
pub const COMPONENTS: u32 = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Attribute {
    pub buffer: BufferId,
    pub components: u32,
    /// Number of vertices, not floats.
    pub count: u32,
}

/// Position and normal streams of one package.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AttributeSet {
    pub position: Attribute,
    pub normal: Attribute,
}

impl AttributeSet {
    /// Vertex count shared by both streams.
    ///
    /// Fails when normals are in use and the two streams disagree.
    pub fn vertex_count(&self, uses_normals: bool) -> EngineResult<u32> {
        if uses_normals && self.position.count != self.normal.count {
            return Err(EngineError::VertexCountMismatch {
                position: self.position.count,
                normal: self.normal.count,
            });
        }
        Ok(self.position.count)
    }
}

fn vertex_count(name: &'static str, data: &[f32]) -> EngineResult<u32> {
    if data.len() % COMPONENTS as usize != 0 {
        return Err(EngineError::OddVertexData {
            name,
            len: data.len(),
        });
    }
    Ok((data.len() / COMPONENTS as usize) as u32)
}

fn upload<B: Backend>(
    gpu: &mut GpuContext<B>,
    data: &[f32],
    count: u32,
    usage: BufferUsage,
) -> EngineResult<Attribute> {
    let buffer = gpu
        .backend_mut()
        .create_buffer()
        .ok_or(EngineError::ResourceCreation(ResourceKind::Buffer))?;
    gpu.bind_array_buffer(Some(buffer));
    gpu.backend_mut().buffer_data(buffer, data, usage);

    Ok(Attribute {
        buffer,
        components: COMPONENTS,
        count,
    })
}

/// Uploads 2-component positions and normals into two new static buffers.
pub fn create_attribute_buffers<B: Backend>(
    gpu: &mut GpuContext<B>,
    positions: &[f32],
    normals: &[f32],
) -> EngineResult<AttributeSet> {
    let position_count = vertex_count(POSITION_ATTRIBUTE, positions)?;
    let normal_count = vertex_count(NORMAL_ATTRIBUTE, normals)?;

    Ok(AttributeSet {
        position: upload(gpu, positions, position_count, BufferUsage::Static)?,
        normal: upload(gpu, normals, normal_count, BufferUsage::Static)?,
    })
}

/// Re-uploads both streams into fresh dynamic buffers and releases the old
/// ones. On error `set` is left untouched.
pub fn update_attribute_buffers<B: Backend>(
    gpu: &mut GpuContext<B>,
    set: &mut AttributeSet,
    positions: &[f32],
    normals: &[f32],
) -> EngineResult<()> {
    let position_count = vertex_count(POSITION_ATTRIBUTE, positions)?;
    let normal_count = vertex_count(NORMAL_ATTRIBUTE, normals)?;

    let position = upload(gpu, positions, position_count, BufferUsage::Dynamic)?;
    let normal = match upload(gpu, normals, normal_count, BufferUsage::Dynamic) {
        Ok(normal) => normal,
        Err(e) => {
            gpu.backend_mut().delete_buffer(position.buffer);
            return Err(e);
        }
    };

    release_attribute_buffers(gpu, set);
    *set = AttributeSet { position, normal };
    Ok(())
}

pub fn release_attribute_buffers<B: Backend>(gpu: &mut GpuContext<B>, set: &AttributeSet) {
    let backend = gpu.backend_mut();
    backend.delete_buffer(set.position.buffer);
    backend.delete_buffer(set.normal.buffer);
}
