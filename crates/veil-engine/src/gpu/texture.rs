use crate::error::{EngineError, EngineResult};

use super::backend::{Backend, FramebufferId, RenderbufferId, ResourceKind, TextureId};
use super::state::GpuContext;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA, unsigned normalized.
    #[default]
    Rgba8,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Filter {
    #[default]
    Linear,
    Nearest,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum Wrap {
    #[default]
    ClampToEdge,
    Repeat,
}

/// Dimensions and sampling parameters of a 2D texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub filter: Filter,
    pub wrap: Wrap,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::default(),
            filter: Filter::default(),
            wrap: Wrap::default(),
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_wrap(mut self, wrap: Wrap) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Allocates a 2D texture and uploads `pixels`.
///
/// Without pixel data an RGBA8 texture is explicitly zero-filled so its
/// initial contents are defined.
pub fn create_texture<B: Backend>(
    gpu: &mut GpuContext<B>,
    desc: &TextureDesc,
    pixels: Option<&[u8]>,
) -> EngineResult<TextureId> {
    let texture = gpu
        .backend_mut()
        .create_texture()
        .ok_or(EngineError::ResourceCreation(ResourceKind::Texture))?;

    let zeroed;
    let pixels = match (pixels, desc.format) {
        (Some(p), _) => Some(p),
        (None, TextureFormat::Rgba8) => {
            zeroed = vec![0u8; desc.byte_len()];
            Some(zeroed.as_slice())
        }
    };

    gpu.bind_texture(Some(texture));
    gpu.backend_mut().tex_image_2d(texture, desc, pixels);
    Ok(texture)
}

/// Offscreen colour texture with a co-allocated stencil buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RenderTarget {
    pub texture: TextureId,
    pub framebuffer: FramebufferId,
    pub stencil: RenderbufferId,
    pub width: u32,
    pub height: u32,
}

pub fn create_render_target<B: Backend>(
    gpu: &mut GpuContext<B>,
    width: u32,
    height: u32,
) -> EngineResult<RenderTarget> {
    let texture = create_texture(gpu, &TextureDesc::new(width, height), None)?;

    let backend = gpu.backend_mut();
    let Some(framebuffer) = backend.create_framebuffer() else {
        backend.delete_texture(texture);
        return Err(EngineError::ResourceCreation(ResourceKind::Framebuffer));
    };
    backend.framebuffer_texture(framebuffer, texture);

    let Some(stencil) = backend.create_renderbuffer() else {
        backend.delete_framebuffer(framebuffer);
        backend.delete_texture(texture);
        return Err(EngineError::ResourceCreation(ResourceKind::Renderbuffer));
    };
    backend.renderbuffer_storage(stencil, width, height);
    backend.framebuffer_renderbuffer(framebuffer, stencil);

    log::debug!("render target {framebuffer:?} created at {width}x{height}");
    Ok(RenderTarget {
        texture,
        framebuffer,
        stencil,
        width,
        height,
    })
}

/// Reallocates the colour texture and stencil storage at the new size.
///
/// Framebuffer and renderbuffer keep their handles; the previous texture is
/// released once the new one is attached.
pub fn resize_render_target<B: Backend>(
    gpu: &mut GpuContext<B>,
    target: &mut RenderTarget,
    width: u32,
    height: u32,
) -> EngineResult<()> {
    let texture = create_texture(gpu, &TextureDesc::new(width, height), None)?;

    let backend = gpu.backend_mut();
    backend.framebuffer_texture(target.framebuffer, texture);
    backend.renderbuffer_storage(target.stencil, width, height);
    backend.framebuffer_renderbuffer(target.framebuffer, target.stencil);
    backend.delete_texture(target.texture);

    target.texture = texture;
    target.width = width;
    target.height = height;
    Ok(())
}

pub fn delete_render_target<B: Backend>(gpu: &mut GpuContext<B>, target: &RenderTarget) {
    let backend = gpu.backend_mut();
    backend.delete_framebuffer(target.framebuffer);
    backend.delete_renderbuffer(target.stencil);
    backend.delete_texture(target.texture);
}
