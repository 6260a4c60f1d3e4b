//! Headless backend that records every command.
//!
//! Handles come from one increasing counter, so no two objects of any kind
//! share an id. Shader compilation always succeeds; info logs, link status,
//! allocation failures and context loss can be scripted per test.

use std::collections::{HashMap, HashSet};

use crate::error::{EngineError, EngineResult};

use super::backend::{
    Backend, BufferId, BufferUsage, ClearRequest, DrawCall, FramebufferId, ProgramId,
    ProgramInterface, RenderbufferId, ResourceKind, ShaderId, ShaderStage, TextureId,
    UniformLocation,
};
use super::program::UniformData;
use super::state::GraphicsState;
use super::texture::TextureDesc;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub state: GraphicsState,
    pub first: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateShader { shader: ShaderId, stage: ShaderStage },
    CompileShader(ShaderId),
    DeleteShader(ShaderId),
    CreateProgram(ProgramId),
    LinkProgram { program: ProgramId, vertex: ShaderId, fragment: ShaderId },
    SetUniform { program: ProgramId, location: UniformLocation, data: UniformData },
    SetSamplerUnit { program: ProgramId, location: UniformLocation, unit: u32 },
    DeleteProgram(ProgramId),
    CreateBuffer(BufferId),
    BufferData { buffer: BufferId, len: usize, usage: BufferUsage },
    DeleteBuffer(BufferId),
    CreateTexture(TextureId),
    TexImage2D { texture: TextureId, desc: TextureDesc },
    DeleteTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    FramebufferTexture { framebuffer: FramebufferId, texture: TextureId },
    CreateRenderbuffer(RenderbufferId),
    RenderbufferStorage { renderbuffer: RenderbufferId, width: u32, height: u32 },
    FramebufferRenderbuffer { framebuffer: FramebufferId, renderbuffer: RenderbufferId },
    DeleteFramebuffer(FramebufferId),
    DeleteRenderbuffer(RenderbufferId),
    ResizeSurface { width: u32, height: u32 },
    Clear { target: Option<FramebufferId>, request: ClearRequest },
    Draw(RecordedDraw),
    EndFrame,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureUpload {
    pub desc: TextureDesc,
    pub pixels: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct LinkedProgram {
    attributes: HashMap<String, u32>,
    locations: HashMap<String, UniformLocation>,
    values: HashMap<UniformLocation, UniformData>,
    units: HashMap<UniformLocation, u32>,
    linked: bool,
    log: String,
}

#[derive(Debug)]
pub struct RecordingBackend {
    next_id: u32,
    surface: (u32, u32),
    calls: Vec<Call>,

    programs: HashMap<ProgramId, LinkedProgram>,
    textures: HashMap<TextureId, TextureUpload>,
    live_textures: HashSet<TextureId>,

    shader_log: String,
    link_failure: Option<String>,
    failing: HashSet<ResourceKind>,
    hidden_uniforms: HashSet<String>,
    hidden_attributes: HashSet<String>,
    context_lost: bool,
    frames: u64,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            next_id: 1,
            surface: (width, height),
            calls: Vec::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            live_textures: HashSet::new(),
            shader_log: String::new(),
            link_failure: None,
            failing: HashSet::new(),
            hidden_uniforms: HashSet::new(),
            hidden_attributes: HashSet::new(),
            context_lost: false,
            frames: 0,
        }
    }

    // ── scripting ──

    /// Info log returned for every compiled shader.
    pub fn set_shader_log(&mut self, log: impl Into<String>) {
        self.shader_log = log.into();
    }

    /// `Some(log)` makes every later link fail with that log.
    pub fn set_link_failure(&mut self, log: Option<String>) {
        self.link_failure = log;
    }

    /// Makes every later allocation of `kind` return no handle.
    pub fn fail_creation(&mut self, kind: ResourceKind) {
        self.failing.insert(kind);
    }

    /// Treats `name` as optimized out of every program linked afterwards.
    pub fn hide_uniform(&mut self, name: impl Into<String>) {
        self.hidden_uniforms.insert(name.into());
    }

    pub fn hide_attribute(&mut self, name: impl Into<String>) {
        self.hidden_attributes.insert(name.into());
    }

    pub fn set_context_lost(&mut self, lost: bool) {
        self.context_lost = lost;
    }

    // ── inspection ──

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Drains the call log.
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn draws(&self) -> Vec<&RecordedDraw> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    pub fn clears(&self) -> Vec<(Option<FramebufferId>, ClearRequest)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Clear { target, request } => Some((*target, *request)),
                _ => None,
            })
            .collect()
    }

    pub fn texture(&self, texture: TextureId) -> Option<&TextureUpload> {
        self.textures.get(&texture)
    }

    pub fn is_texture_live(&self, texture: TextureId) -> bool {
        self.live_textures.contains(&texture)
    }

    /// Last value assigned to uniform `name` of `program`.
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformData> {
        let p = self.programs.get(&program)?;
        let location = p.locations.get(name)?;
        p.values.get(location).copied()
    }

    pub fn sampler_unit(&self, program: ProgramId, name: &str) -> Option<u32> {
        let p = self.programs.get(&program)?;
        let location = p.locations.get(name)?;
        p.units.get(location).copied()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn allocate(&mut self, kind: ResourceKind) -> Option<u32> {
        if self.failing.contains(&kind) {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(id)
    }
}

impl Backend for RecordingBackend {
    fn create_shader(&mut self, stage: ShaderStage) -> Option<ShaderId> {
        let shader = ShaderId(self.allocate(stage.resource_kind())?);
        self.calls.push(Call::CreateShader { shader, stage });
        Some(shader)
    }

    fn compile_shader(&mut self, shader: ShaderId, _source: &str) {
        self.calls.push(Call::CompileShader(shader));
    }

    fn shader_info_log(&self, _shader: ShaderId) -> String {
        self.shader_log.clone()
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.calls.push(Call::DeleteShader(shader));
    }

    fn create_program(&mut self) -> Option<ProgramId> {
        let program = ProgramId(self.allocate(ResourceKind::Program)?);
        self.programs.insert(program, LinkedProgram::default());
        self.calls.push(Call::CreateProgram(program));
        Some(program)
    }

    fn link_program(
        &mut self,
        program: ProgramId,
        vertex: ShaderId,
        fragment: ShaderId,
        interface: &ProgramInterface,
    ) {
        self.calls.push(Call::LinkProgram {
            program,
            vertex,
            fragment,
        });

        let hidden_uniforms = &self.hidden_uniforms;
        let hidden_attributes = &self.hidden_attributes;
        let p = self.programs.entry(program).or_default();

        p.attributes = interface
            .attributes
            .iter()
            .enumerate()
            .filter(|(_, name)| !hidden_attributes.contains(*name))
            .map(|(i, name)| (name.clone(), i as u32))
            .collect();

        let names = interface
            .uniforms
            .iter()
            .map(|u| &u.name)
            .chain(interface.samplers.iter())
            .filter(|name| !hidden_uniforms.contains(*name));
        p.locations = names
            .enumerate()
            .map(|(i, name)| (name.clone(), UniformLocation(i as u32)))
            .collect();

        match &self.link_failure {
            Some(log) => {
                p.linked = false;
                p.log = log.clone();
            }
            None => {
                p.linked = true;
                p.log.clear();
            }
        }
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
        self.programs.get(&program)?.attributes.get(name).copied()
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.locations.get(name).copied()
    }

    fn set_uniform(&mut self, program: ProgramId, location: UniformLocation, data: UniformData) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.values.insert(location, data);
        }
        self.calls.push(Call::SetUniform {
            program,
            location,
            data,
        });
    }

    fn set_sampler_unit(&mut self, program: ProgramId, location: UniformLocation, unit: u32) {
        if let Some(p) = self.programs.get_mut(&program) {
            p.units.insert(location, unit);
        }
        self.calls.push(Call::SetSamplerUnit {
            program,
            location,
            unit,
        });
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.calls.push(Call::DeleteProgram(program));
    }

    fn create_buffer(&mut self) -> Option<BufferId> {
        let buffer = BufferId(self.allocate(ResourceKind::Buffer)?);
        self.calls.push(Call::CreateBuffer(buffer));
        Some(buffer)
    }

    fn buffer_data(&mut self, buffer: BufferId, data: &[f32], usage: BufferUsage) {
        self.calls.push(Call::BufferData {
            buffer,
            len: data.len(),
            usage,
        });
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.calls.push(Call::DeleteBuffer(buffer));
    }

    fn create_texture(&mut self) -> Option<TextureId> {
        let texture = TextureId(self.allocate(ResourceKind::Texture)?);
        self.live_textures.insert(texture);
        self.calls.push(Call::CreateTexture(texture));
        Some(texture)
    }

    fn tex_image_2d(&mut self, texture: TextureId, desc: &TextureDesc, pixels: Option<&[u8]>) {
        self.textures.insert(
            texture,
            TextureUpload {
                desc: *desc,
                pixels: pixels.map(<[u8]>::to_vec),
            },
        );
        self.calls.push(Call::TexImage2D {
            texture,
            desc: *desc,
        });
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.live_textures.remove(&texture);
        self.calls.push(Call::DeleteTexture(texture));
    }

    fn create_framebuffer(&mut self) -> Option<FramebufferId> {
        let framebuffer = FramebufferId(self.allocate(ResourceKind::Framebuffer)?);
        self.calls.push(Call::CreateFramebuffer(framebuffer));
        Some(framebuffer)
    }

    fn framebuffer_texture(&mut self, framebuffer: FramebufferId, texture: TextureId) {
        self.calls.push(Call::FramebufferTexture {
            framebuffer,
            texture,
        });
    }

    fn create_renderbuffer(&mut self) -> Option<RenderbufferId> {
        let renderbuffer = RenderbufferId(self.allocate(ResourceKind::Renderbuffer)?);
        self.calls.push(Call::CreateRenderbuffer(renderbuffer));
        Some(renderbuffer)
    }

    fn renderbuffer_storage(&mut self, renderbuffer: RenderbufferId, width: u32, height: u32) {
        self.calls.push(Call::RenderbufferStorage {
            renderbuffer,
            width,
            height,
        });
    }

    fn framebuffer_renderbuffer(&mut self, framebuffer: FramebufferId, renderbuffer: RenderbufferId) {
        self.calls.push(Call::FramebufferRenderbuffer {
            framebuffer,
            renderbuffer,
        });
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.calls.push(Call::DeleteFramebuffer(framebuffer));
    }

    fn delete_renderbuffer(&mut self, renderbuffer: RenderbufferId) {
        self.calls.push(Call::DeleteRenderbuffer(renderbuffer));
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = (width, height);
        self.calls.push(Call::ResizeSurface { width, height });
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    fn clear(&mut self, target: Option<FramebufferId>, request: ClearRequest) {
        self.calls.push(Call::Clear { target, request });
    }

    fn draw_arrays(&mut self, draw: &DrawCall<'_>) {
        self.calls.push(Call::Draw(RecordedDraw {
            state: draw.state.clone(),
            first: draw.first,
            count: draw.count,
        }));
    }

    fn end_frame(&mut self) -> EngineResult<()> {
        if self.context_lost {
            return Err(EngineError::ContextLost);
        }
        self.frames += 1;
        self.calls.push(Call::EndFrame);
        Ok(())
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_across_kinds() {
        let mut b = RecordingBackend::new(1, 1);
        let t = b.create_texture().unwrap();
        let f = b.create_framebuffer().unwrap();
        let r = b.create_renderbuffer().unwrap();
        assert_ne!(t.0, f.0);
        assert_ne!(f.0, r.0);
    }

    #[test]
    fn lost_context_fails_frame() {
        let mut b = RecordingBackend::new(1, 1);
        b.end_frame().unwrap();
        b.set_context_lost(true);
        assert!(matches!(b.end_frame(), Err(EngineError::ContextLost)));
        assert_eq!(b.frames(), 1);
    }
}
