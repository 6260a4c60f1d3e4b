//! [`Backend`] implementation on wgpu.
//!
//! Programs are WGSL module pairs with `vs_main` / `fs_main` entry points.
//! Each program owns one uniform block at `@group(0) @binding(0)`, laid out
//! in declaration order with WGSL uniform alignment, followed by a texture
//! and sampler pair per declared sampler at bindings `1 + 2i` and `2 + 2i`.
//!
//! Clears and draws are recorded and only encoded at [`Backend::end_frame`]:
//! consecutive commands on one target share a render pass, and clears issued
//! before a pass's first draw become its load operations. Uniform values are
//! uploaded once per frame, so the last value written in a frame is the one
//! every draw of that frame sees.

use std::collections::HashMap;
use std::rc::Rc;

use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::error::{EngineError, EngineResult};
use crate::gpu::{
    Backend, BlendEquation, BlendFactor, BufferId, BufferUsage, ClearRequest, ColorMask,
    CompareFunc, DrawCall, Filter, FramebufferId, ProgramId, ProgramInterface, RenderbufferId,
    ShaderId, ShaderStage, StencilOp, StencilState, TextureDesc, TextureId,
    UniformData, UniformDecl, UniformKind, UniformLocation, Wrap,
};

use super::{Gpu, SurfaceErrorAction};

const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Stencil8;

// ── uniform block layout ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct UniformField {
    name: String,
    kind: UniformKind,
    offset: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct UniformBlock {
    fields: Vec<UniformField>,
    size: usize,
}

/// (align, size) in the uniform address space.
fn wgsl_layout(kind: UniformKind) -> (usize, usize) {
    match kind {
        UniformKind::Float => (4, 4),
        UniformKind::Vec2 => (8, 8),
        UniformKind::Vec3 => (16, 12),
        UniformKind::Vec4 => (16, 16),
    }
}

fn uniform_block(decls: &[UniformDecl]) -> UniformBlock {
    let mut offset = 0usize;
    let fields = decls
        .iter()
        .map(|decl| {
            let (align, size) = wgsl_layout(decl.kind);
            offset = offset.next_multiple_of(align);
            let field = UniformField {
                name: decl.name.clone(),
                kind: decl.kind,
                offset,
            };
            offset += size;
            field
        })
        .collect();

    UniformBlock {
        fields,
        size: offset.next_multiple_of(16).max(16),
    }
}

// ── objects ────────────────────────────────────────────────────────────────

struct ShaderObject {
    stage: ShaderStage,
    module: Option<Rc<wgpu::ShaderModule>>,
    log: String,
    compiled: bool,
}

#[derive(Default)]
struct ProgramObject {
    vertex: Option<Rc<wgpu::ShaderModule>>,
    fragment: Option<Rc<wgpu::ShaderModule>>,
    attributes: Vec<String>,
    block: UniformBlock,
    samplers: Vec<String>,
    sampler_units: Vec<u32>,
    staging: Vec<u8>,
    dirty: bool,
    uniform_buffer: Option<wgpu::Buffer>,
    bind_group_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: Option<wgpu::PipelineLayout>,
    linked: bool,
    log: String,
}

struct TextureObject {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    size: (u32, u32),
    _texture: wgpu::Texture,
}

#[derive(Default)]
struct FramebufferObject {
    color: Option<TextureId>,
    stencil: Option<RenderbufferId>,
}

struct RenderbufferObject {
    view: wgpu::TextureView,
    _texture: wgpu::Texture,
}

// ── recorded frame ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    format: wgpu::TextureFormat,
    stencil_attachment: bool,
    blend: Option<(BlendFactor, BlendFactor, BlendEquation)>,
    /// Reference zeroed; it is dynamic pass state.
    stencil: Option<StencilState>,
    color_mask: ColorMask,
    cull_back_faces: bool,
    /// (shader location, components) per bound vertex buffer.
    vertex: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
struct PendingDraw {
    key: PipelineKey,
    vertex_buffers: Vec<BufferId>,
    /// Texture per program sampler, in declaration order.
    textures: Vec<Option<TextureId>>,
    viewport: (u32, u32),
    stencil_reference: u32,
    first: u32,
    count: u32,
}

#[derive(Debug, Clone)]
enum Recorded {
    Clear {
        target: Option<FramebufferId>,
        request: ClearRequest,
    },
    Draw {
        target: Option<FramebufferId>,
        draw: PendingDraw,
    },
}

/// Commands that run in one render pass.
#[derive(Debug, Default)]
struct Segment {
    target: Option<FramebufferId>,
    color: Option<[f32; 4]>,
    stencil: Option<u32>,
    draws: Vec<PendingDraw>,
}

fn segments(commands: Vec<Recorded>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();

    for command in commands {
        match command {
            Recorded::Clear { target, request } => match out.last_mut() {
                Some(seg) if seg.target == target && seg.draws.is_empty() => {
                    seg.color = request.color.or(seg.color);
                    seg.stencil = request.stencil.or(seg.stencil);
                }
                _ => out.push(Segment {
                    target,
                    color: request.color,
                    stencil: request.stencil,
                    draws: Vec::new(),
                }),
            },
            Recorded::Draw { target, draw } => match out.last_mut() {
                Some(seg) if seg.target == target => seg.draws.push(draw),
                _ => out.push(Segment {
                    target,
                    draws: vec![draw],
                    ..Default::default()
                }),
            },
        }
    }
    out
}

// ── state mapping ──────────────────────────────────────────────────────────

fn blend_factor(f: BlendFactor) -> wgpu::BlendFactor {
    match f {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
    }
}

fn blend_state((src, dst, equation): (BlendFactor, BlendFactor, BlendEquation)) -> wgpu::BlendState {
    let operation = match equation {
        BlendEquation::Add => wgpu::BlendOperation::Add,
        BlendEquation::Subtract => wgpu::BlendOperation::Subtract,
        BlendEquation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
    };
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(src),
        dst_factor: blend_factor(dst),
        operation,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

fn compare_function(f: CompareFunc) -> wgpu::CompareFunction {
    match f {
        CompareFunc::Never => wgpu::CompareFunction::Never,
        CompareFunc::Less => wgpu::CompareFunction::Less,
        CompareFunc::Equal => wgpu::CompareFunction::Equal,
        CompareFunc::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareFunc::Greater => wgpu::CompareFunction::Greater,
        CompareFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareFunc::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareFunc::Always => wgpu::CompareFunction::Always,
    }
}

fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Increment => wgpu::StencilOperation::IncrementClamp,
        StencilOp::Decrement => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrementWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrementWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

/// Stencil8 attachment state; a disabled test passes everything and keeps
/// the buffer.
fn depth_stencil_state(stencil: Option<StencilState>) -> wgpu::DepthStencilState {
    let stencil = match stencil {
        Some(s) => {
            let face = wgpu::StencilFaceState {
                compare: compare_function(s.func),
                fail_op: stencil_operation(s.fail),
                depth_fail_op: stencil_operation(s.depth_fail),
                pass_op: stencil_operation(s.pass),
            };
            wgpu::StencilState {
                front: face,
                back: face,
                read_mask: s.read_mask,
                write_mask: s.write_mask,
            }
        }
        None => wgpu::StencilState {
            front: wgpu::StencilFaceState::IGNORE,
            back: wgpu::StencilFaceState::IGNORE,
            read_mask: 0,
            write_mask: 0,
        },
    };

    wgpu::DepthStencilState {
        format: STENCIL_FORMAT,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::Always,
        stencil,
        bias: wgpu::DepthBiasState::default(),
    }
}

fn color_writes(mask: ColorMask) -> wgpu::ColorWrites {
    let [r, g, b, a] = mask.0;
    let mut writes = wgpu::ColorWrites::empty();
    for (on, bit) in [
        (r, wgpu::ColorWrites::RED),
        (g, wgpu::ColorWrites::GREEN),
        (b, wgpu::ColorWrites::BLUE),
        (a, wgpu::ColorWrites::ALPHA),
    ] {
        if on {
            writes |= bit;
        }
    }
    writes
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

fn filter_mode(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Linear => wgpu::FilterMode::Linear,
        Filter::Nearest => wgpu::FilterMode::Nearest,
    }
}

fn address_mode(wrap: Wrap) -> wgpu::AddressMode {
    match wrap {
        Wrap::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        Wrap::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn clear_color(c: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(c[0]),
        g: f64::from(c[1]),
        b: f64::from(c[2]),
        a: f64::from(c[3]),
    }
}

// ── backend ────────────────────────────────────────────────────────────────

pub struct WgpuBackend<'w> {
    gpu: Gpu<'w>,
    next_id: u32,

    shaders: HashMap<ShaderId, ShaderObject>,
    programs: HashMap<ProgramId, ProgramObject>,
    buffers: HashMap<BufferId, Option<wgpu::Buffer>>,
    textures: HashMap<TextureId, Option<TextureObject>>,
    framebuffers: HashMap<FramebufferId, FramebufferObject>,
    renderbuffers: HashMap<RenderbufferId, Option<RenderbufferObject>>,

    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    /// Bound wherever a sampler has no texture.
    fallback: TextureObject,

    commands: Vec<Recorded>,
    context_lost: bool,
}

impl<'w> WgpuBackend<'w> {
    pub fn new(gpu: Gpu<'w>) -> Self {
        let fallback = create_texture_object(
            &gpu,
            &TextureDesc::new(1, 1),
            Some(&[0, 0, 0, 0]),
            "veil fallback texture",
        );
        Self {
            gpu,
            next_id: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            pipelines: HashMap::new(),
            fallback,
            commands: Vec::new(),
            context_lost: false,
        }
    }

    pub fn gpu(&self) -> &Gpu<'w> {
        &self.gpu
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn flush_uniforms(&mut self) {
        let queue = self.gpu.queue();
        for program in self.programs.values_mut().filter(|p| p.dirty) {
            if let Some(buffer) = &program.uniform_buffer {
                queue.write_buffer(buffer, 0, &program.staging);
            }
            program.dirty = false;
        }
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey) {
        if self.pipelines.contains_key(key) {
            return;
        }
        let Some(program) = self.programs.get(&key.program) else {
            return;
        };
        if let Some(pipeline) = build_pipeline(self.gpu.device(), program, key) {
            log::debug!("created pipeline for {:?} -> {:?}", key.program, key.format);
            self.pipelines.insert(key.clone(), pipeline);
        }
    }

    fn bind_group(&self, draw: &PendingDraw) -> Option<wgpu::BindGroup> {
        let program = self.programs.get(&draw.key.program)?;
        let layout = program.bind_group_layout.as_ref()?;
        let ubo = program.uniform_buffer.as_ref()?;

        let textures: Vec<&TextureObject> = draw
            .textures
            .iter()
            .map(|id| {
                id.and_then(|id| self.textures.get(&id))
                    .and_then(Option::as_ref)
                    .unwrap_or(&self.fallback)
            })
            .collect();

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: ubo.as_entire_binding(),
        }];
        for (i, texture) in textures.iter().enumerate() {
            let i = i as u32;
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + 2 * i,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 + 2 * i,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }

        Some(self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("veil program bind group"),
            layout,
            entries: &entries,
        }))
    }

    /// Colour view, its size, and the stencil view of a target.
    fn attachments<'a>(
        &'a self,
        target: Option<FramebufferId>,
        surface_view: &'a wgpu::TextureView,
    ) -> Option<(&'a wgpu::TextureView, (u32, u32), Option<&'a wgpu::TextureView>)> {
        let Some(fb) = target else {
            let size = self.gpu.size();
            return Some((surface_view, (size.width, size.height), None));
        };

        let fb = self.framebuffers.get(&fb)?;
        let color = self.textures.get(&fb.color?)?.as_ref()?;
        let stencil = fb
            .stencil
            .and_then(|rb| self.renderbuffers.get(&rb))
            .and_then(Option::as_ref)
            .map(|rb| &rb.view);
        Some((&color.view, color.size, stencil))
    }

    fn target_format(&self, target: Option<FramebufferId>) -> (wgpu::TextureFormat, bool) {
        match target {
            None => (self.gpu.surface_format(), false),
            Some(fb) => {
                let stencil = self
                    .framebuffers
                    .get(&fb)
                    .and_then(|fb| fb.stencil)
                    .and_then(|rb| self.renderbuffers.get(&rb))
                    .is_some_and(Option::is_some);
                (OFFSCREEN_FORMAT, stencil)
            }
        }
    }

    fn encode_segment(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        surface_view: &wgpu::TextureView,
        segment: &Segment,
    ) {
        for draw in &segment.draws {
            self.ensure_pipeline(&draw.key);
        }
        let bind_groups: Vec<Option<wgpu::BindGroup>> =
            segment.draws.iter().map(|d| self.bind_group(d)).collect();

        let Some((color_view, (width, height), stencil_view)) =
            self.attachments(segment.target, surface_view)
        else {
            log::warn!("skipping pass on incomplete framebuffer {:?}", segment.target);
            return;
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("veil pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: segment
                        .color
                        .map_or(wgpu::LoadOp::Load, |c| wgpu::LoadOp::Clear(clear_color(c))),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: stencil_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations {
                        load: segment.stencil.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for (draw, bind_group) in segment.draws.iter().zip(&bind_groups) {
            let Some(pipeline) = self.pipelines.get(&draw.key) else {
                continue;
            };
            let Some(bind_group) = bind_group else {
                continue;
            };
            let buffers: Option<Vec<&wgpu::Buffer>> = draw
                .vertex_buffers
                .iter()
                .map(|id| self.buffers.get(id).and_then(Option::as_ref))
                .collect();
            let Some(buffers) = buffers else {
                log::warn!("draw references a buffer with no data; skipped");
                continue;
            };

            let (vw, vh) = (draw.viewport.0.min(width), draw.viewport.1.min(height));
            if vw == 0 || vh == 0 {
                continue;
            }

            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, bind_group, &[]);
            for (slot, buffer) in buffers.iter().enumerate() {
                rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
            }
            rpass.set_stencil_reference(draw.stencil_reference);
            rpass.set_viewport(0.0, 0.0, vw as f32, vh as f32, 0.0, 1.0);
            rpass.draw(draw.first..draw.first + draw.count, 0..1);
        }
    }
}

fn create_texture_object(
    gpu: &Gpu<'_>,
    desc: &TextureDesc,
    pixels: Option<&[u8]>,
    label: &str,
) -> TextureObject {
    let size = wgpu::Extent3d {
        width: desc.width.max(1),
        height: desc.height.max(1),
        depth_or_array_layers: 1,
    };

    let texture = gpu.device().create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });

    match pixels {
        Some(pixels) if pixels.len() == desc.byte_len() && desc.byte_len() > 0 => {
            gpu.queue().write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                pixels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(desc.width * desc.format.bytes_per_pixel() as u32),
                    rows_per_image: Some(desc.height),
                },
                size,
            );
        }
        Some(pixels) => log::warn!(
            "{label}: got {} bytes for {}x{}; contents left undefined",
            pixels.len(),
            desc.width,
            desc.height
        ),
        None => {}
    }

    let filter = filter_mode(desc.filter);
    let wrap = address_mode(desc.wrap);
    let sampler = gpu.device().create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wrap,
        address_mode_v: wrap,
        address_mode_w: wrap,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    });

    TextureObject {
        view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
        sampler,
        size: (desc.width, desc.height),
        _texture: texture,
    }
}

fn build_pipeline(
    device: &wgpu::Device,
    program: &ProgramObject,
    key: &PipelineKey,
) -> Option<wgpu::RenderPipeline> {
    let vertex = program.vertex.as_deref()?;
    let fragment = program.fragment.as_deref()?;
    let layout = program.pipeline_layout.as_ref()?;

    let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
        .vertex
        .iter()
        .map(|&(location, components)| {
            [wgpu::VertexAttribute {
                format: vertex_format(components),
                offset: 0,
                shader_location: location,
            }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
        .vertex
        .iter()
        .zip(&attributes)
        .map(|(&(_, components), attrs)| wgpu::VertexBufferLayout {
            array_stride: u64::from(components) * std::mem::size_of::<f32>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: attrs,
        })
        .collect();

    Some(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("veil pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: key.blend.map(blend_state),
                write_mask: color_writes(key.color_mask),
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: key.cull_back_faces.then_some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: key
            .stencil_attachment
            .then(|| depth_stencil_state(key.stencil)),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    }))
}

impl Backend for WgpuBackend<'_> {
    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        let shader = ShaderId(self.next());
        self.shaders.insert(
            shader,
            ShaderObject {
                stage,
                module: None,
                log: String::new(),
                compiled: false,
            },
        );
        Some(shader)
    }

    fn compile_shader(&mut self, shader: ShaderId, source: &str) {
        let device = self.gpu.device();
        let Some(obj) = self.shaders.get_mut(&shader) else {
            return;
        };

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(match obj.stage {
                ShaderStage::Vertex => "veil vertex shader",
                ShaderStage::Fragment => "veil fragment shader",
            }),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let info = pollster::block_on(module.get_compilation_info());
        let mut compiled = true;
        let mut log = String::new();
        for message in &info.messages {
            if matches!(message.message_type, wgpu::CompilationMessageType::Error) {
                compiled = false;
            }
            log.push_str(&format!("{:?}: {}\n", message.message_type, message.message));
        }

        obj.module = Some(Rc::new(module));
        obj.log = log;
        obj.compiled = compiled;
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        self.shaders
            .get(&shader)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> Option<ProgramId> {
        let program = ProgramId(self.next());
        self.programs.insert(program, ProgramObject::default());
        Some(program)
    }

    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
        interface: &ProgramInterface,
    ) {
        let mut log = String::new();
        let mut stage_module = |id: ShaderId, expected: ShaderStage| {
            match self.shaders.get(&id) {
                Some(s) if s.stage == expected && s.compiled => s.module.clone(),
                Some(s) if s.stage != expected => {
                    log.push_str(&format!("{id:?} is not a {expected:?} shader\n"));
                    None
                }
                Some(_) => {
                    log.push_str(&format!("{expected:?} shader {id:?} did not compile\n"));
                    None
                }
                None => {
                    log.push_str(&format!("{expected:?} shader {id:?} does not exist\n"));
                    None
                }
            }
        };
        let vertex = stage_module(vertex, ShaderStage::Vertex);
        let fragment = stage_module(fragment, ShaderStage::Fragment);

        let device = self.gpu.device();
        let block = uniform_block(&interface.uniforms);

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        for i in 0..interface.samplers.len() as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + 2 * i,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 2 + 2 * i,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("veil program bgl"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("veil program layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("veil program uniforms"),
            size: block.size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let linked = vertex.is_some() && fragment.is_some();
        let obj = ProgramObject {
            vertex,
            fragment,
            attributes: interface.attributes.clone(),
            staging: vec![0; block.size],
            block,
            samplers: interface.samplers.clone(),
            sampler_units: vec![0; interface.samplers.len()],
            dirty: true,
            uniform_buffer: Some(uniform_buffer),
            bind_group_layout: Some(bind_group_layout),
            pipeline_layout: Some(pipeline_layout),
            linked,
            log,
        };

        self.pipelines.retain(|key, _| key.program != program);
        self.programs.insert(program, obj);
    }

    fn link_status(&self, program: ProgramId) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        self.programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let p = self.programs.get(&program)?;
        p.attributes.iter().position(|a| a == name).map(|i| i as u32)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let p = self.programs.get(&program)?;
        let fields = p.block.fields.len();
        p.block
            .fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| p.samplers.iter().position(|s| s == name).map(|i| fields + i))
            .map(|i| UniformLocation(i as u32))
    }

    fn set_uniform(&mut self, program: ProgramId, location: UniformLocation, data: UniformData) {
        let Some(p) = self.programs.get_mut(&program) else {
            return;
        };
        let Some(field) = p.block.fields.get(location.0 as usize) else {
            log::warn!("{location:?} is not a uniform of {program:?}");
            return;
        };
        if field.kind != data.kind() {
            log::warn!(
                "uniform `{}` is {} but was set as {}",
                field.name,
                field.kind,
                data.kind()
            );
            return;
        }

        let bytes: &[u8] = bytemuck::cast_slice(data.as_slice());
        p.staging[field.offset..field.offset + bytes.len()].copy_from_slice(bytes);
        p.dirty = true;
    }

    fn set_sampler_unit(&mut self, program: ProgramId, location: UniformLocation, unit: u32) {
        let Some(p) = self.programs.get_mut(&program) else {
            return;
        };
        let index = (location.0 as usize).checked_sub(p.block.fields.len());
        match index.and_then(|i| p.sampler_units.get_mut(i)) {
            Some(slot) => *slot = unit,
            None => log::warn!("{location:?} is not a sampler of {program:?}"),
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
    }

    fn create_buffer(&mut self) -> Option<BufferId> {
        let buffer = BufferId(self.next());
        self.buffers.insert(buffer, None);
        Some(buffer)
    }

    fn buffer_data(&mut self, buffer: BufferId, data: &[f32], usage: BufferUsage) {
        let contents = (!data.is_empty()).then(|| {
            self.gpu
                .device()
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(match usage {
                        BufferUsage::Static => "veil static vbo",
                        BufferUsage::Dynamic => "veil dynamic vbo",
                    }),
                    contents: bytemuck::cast_slice(data),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                })
        });
        self.buffers.insert(buffer, contents);
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_texture(&mut self) -> Option<TextureId> {
        let texture = TextureId(self.next());
        self.textures.insert(texture, None);
        Some(texture)
    }

    fn tex_image_2d(&mut self, texture: TextureId, desc: &TextureDesc, pixels: Option<&[u8]>) {
        let obj = create_texture_object(&self.gpu, desc, pixels, "veil texture");
        self.textures.insert(texture, Some(obj));
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let framebuffer = FramebufferId(self.next());
        self.framebuffers.insert(framebuffer, FramebufferObject::default());
        Some(framebuffer)
    }

    fn framebuffer_texture(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.color = Some(texture);
        }
    }

    fn create_renderbuffer(&mut self) -> Option<RenderbufferId> {
        let renderbuffer = RenderbufferId(self.next());
        self.renderbuffers.insert(renderbuffer, None);
        Some(renderbuffer)
    }

    fn renderbuffer_storage(&mut self, renderbuffer: RenderbufferId, width: u32, height: u32) {
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("veil stencil renderbuffer"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.renderbuffers.insert(
            renderbuffer,
            Some(RenderbufferObject {
                view,
                _texture: texture,
            }),
        );
    }

    fn framebuffer_renderbuffer(&mut self, framebuffer: FramebufferId, renderbuffer: RenderbufferId) {
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer) {
            fb.stencil = Some(renderbuffer);
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        self.renderbuffers.remove(&renderbuffer);
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.gpu.resize(PhysicalSize::new(width, height));
    }

    fn surface_size(&self) -> (u32, u32) {
        let size = self.gpu.size();
        (size.width, size.height)
    }

    fn clear(&mut self, target: Option<FramebufferId>, request: ClearRequest) {
        self.commands.push(Recorded::Clear { target, request });
    }

    fn draw_arrays(&mut self, draw: &DrawCall<'_>) {
        let state = draw.state;
        let Some(program_id) = state.program else {
            log::warn!("draw with no program bound; skipped");
            return;
        };
        let Some(program) = self.programs.get(&program_id).filter(|p| p.linked) else {
            log::trace!("draw with unlinked {program_id:?}; skipped");
            return;
        };

        let (vertex, vertex_buffers): (Vec<(u32, u32)>, Vec<BufferId>) = state
            .vertex_attributes
            .iter()
            .enumerate()
            .filter_map(|(location, binding)| {
                binding.map(|b| ((location as u32, b.components), b.buffer))
            })
            .unzip();

        let textures = program
            .sampler_units
            .iter()
            .map(|&unit| state.texture_units.get(unit as usize).copied().flatten())
            .collect();

        let target = state.framebuffer;
        let (format, stencil_attachment) = self.target_format(target);
        let stencil = state.stencil.enabled.then_some(StencilState {
            reference: 0,
            ..state.stencil
        });

        let key = PipelineKey {
            program: program_id,
            format,
            stencil_attachment,
            blend: state
                .blend
                .enabled
                .then_some((state.blend.src, state.blend.dst, state.blend.equation)),
            stencil,
            color_mask: state.color_mask,
            cull_back_faces: state.cull_back_faces,
            vertex,
        };

        self.commands.push(Recorded::Draw {
            target,
            draw: PendingDraw {
                key,
                vertex_buffers,
                textures,
                viewport: state.viewport,
                stencil_reference: state.stencil.reference,
                first: draw.first,
                count: draw.count,
            },
        });
    }

    fn end_frame(&mut self) -> EngineResult<()> {
        if self.context_lost {
            return Err(EngineError::ContextLost);
        }

        let commands = std::mem::take(&mut self.commands);
        let mut frame = match self.gpu.begin_frame() {
            Ok(frame) => frame,
            Err(err) => match self.gpu.handle_surface_error(err) {
                SurfaceErrorAction::Fatal => {
                    self.context_lost = true;
                    return Err(EngineError::ContextLost);
                }
                SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => return Ok(()),
            },
        };

        self.flush_uniforms();
        for segment in segments(commands) {
            self.encode_segment(&mut frame.encoder, &frame.view, &segment);
        }
        self.gpu.submit(frame);
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, kind: UniformKind) -> UniformDecl {
        UniformDecl {
            name: name.into(),
            kind,
        }
    }

    fn offsets(block: &UniformBlock) -> Vec<usize> {
        block.fields.iter().map(|f| f.offset).collect()
    }

    // ── uniform layout ──

    #[test]
    fn vec2_after_float_is_aligned_to_eight() {
        let block = uniform_block(&[decl("uTime", UniformKind::Float), decl("uResolution", UniformKind::Vec2)]);
        assert_eq!(offsets(&block), vec![0, 8]);
        assert_eq!(block.size, 16);
    }

    #[test]
    fn float_packs_after_vec3() {
        let block = uniform_block(&[
            decl("uVector", UniformKind::Vec3),
            decl("uTime", UniformKind::Float),
            decl("uResolution", UniformKind::Vec2),
        ]);
        assert_eq!(offsets(&block), vec![0, 12, 16]);
        assert_eq!(block.size, 32);
    }

    #[test]
    fn three_floats_then_vec2() {
        let block = uniform_block(&[
            decl("a", UniformKind::Float),
            decl("b", UniformKind::Float),
            decl("c", UniformKind::Float),
            decl("d", UniformKind::Vec2),
        ]);
        assert_eq!(offsets(&block), vec![0, 4, 8, 16]);
        assert_eq!(block.size, 32);
    }

    #[test]
    fn empty_block_still_has_minimum_size() {
        assert_eq!(uniform_block(&[]).size, 16);
    }

    // ── pass segmentation ──

    fn draw(program: u32) -> PendingDraw {
        PendingDraw {
            key: PipelineKey {
                program: ProgramId(program),
                format: OFFSCREEN_FORMAT,
                stencil_attachment: false,
                blend: None,
                stencil: None,
                color_mask: ColorMask::ALL,
                cull_back_faces: false,
                vertex: vec![(0, 2)],
            },
            vertex_buffers: vec![BufferId(1)],
            textures: Vec::new(),
            viewport: (1, 1),
            stencil_reference: 0,
            first: 0,
            count: 6,
        }
    }

    #[test]
    fn leading_clears_fold_into_load_ops() {
        let fb = Some(FramebufferId(3));
        let commands = vec![
            Recorded::Clear {
                target: fb,
                request: ClearRequest { color: Some([0.0; 4]), stencil: None },
            },
            Recorded::Clear {
                target: fb,
                request: ClearRequest { color: None, stencil: Some(0) },
            },
            Recorded::Draw { target: fb, draw: draw(1) },
            Recorded::Draw { target: fb, draw: draw(2) },
            Recorded::Clear {
                target: None,
                request: ClearRequest { color: Some([0.0, 0.0, 0.0, 1.0]), stencil: None },
            },
            Recorded::Draw { target: None, draw: draw(3) },
        ];

        let segs = segments(commands);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].target, fb);
        assert_eq!(segs[0].color, Some([0.0; 4]));
        assert_eq!(segs[0].stencil, Some(0));
        assert_eq!(segs[0].draws.len(), 2);
        assert_eq!(segs[1].target, None);
        assert_eq!(segs[1].color, Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(segs[1].draws.len(), 1);
    }

    #[test]
    fn clear_after_draw_starts_new_pass() {
        let commands = vec![
            Recorded::Draw { target: None, draw: draw(1) },
            Recorded::Clear {
                target: None,
                request: ClearRequest { color: None, stencil: Some(0) },
            },
            Recorded::Draw { target: None, draw: draw(2) },
        ];

        let segs = segments(commands);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].color, None);
        assert_eq!(segs[1].stencil, Some(0));
    }

    // ── state mapping ──

    #[test]
    fn color_mask_maps_channel_bits() {
        assert_eq!(color_writes(ColorMask::ALL), wgpu::ColorWrites::ALL);
        assert_eq!(color_writes(ColorMask::NONE), wgpu::ColorWrites::empty());
        assert_eq!(
            color_writes(ColorMask([true, false, false, true])),
            wgpu::ColorWrites::RED | wgpu::ColorWrites::ALPHA
        );
    }

    #[test]
    fn stencil_write_maps_to_replace_on_pass() {
        let state = depth_stencil_state(Some(StencilState {
            enabled: true,
            func: CompareFunc::Always,
            reference: 0,
            read_mask: 0xFF,
            write_mask: 0xFF,
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Replace,
            pass: StencilOp::Replace,
        }));
        assert_eq!(state.format, STENCIL_FORMAT);
        assert_eq!(state.stencil.front.compare, wgpu::CompareFunction::Always);
        assert_eq!(state.stencil.front.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(state.stencil.back, state.stencil.front);
    }
}
