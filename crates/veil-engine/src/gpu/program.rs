use std::collections::HashMap;
use std::fmt;

use crate::error::{EngineError, EngineResult};

use super::backend::{
    Backend, ProgramId, ProgramInterface, ShaderId, ShaderStage, UniformDecl, UniformLocation,
};
use super::state::GpuContext;

pub const POSITION_ATTRIBUTE: &str = "aPosition";
pub const NORMAL_ATTRIBUTE: &str = "aNormal";

/// Declared GLSL-style type of a uniform.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    /// Number of `f32` components the kind expects.
    pub fn arity(self) -> usize {
        match self {
            UniformKind::Float => 1,
            UniformKind::Vec2 => 2,
            UniformKind::Vec3 => 3,
            UniformKind::Vec4 => 4,
        }
    }
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UniformKind::Float => "float",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
        })
    }
}

/// Host-side value of a uniform. Its shape is checked against the declared
/// kind only when the value is pushed to a program.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Vector(Vec<f32>),
}

impl UniformValue {
    fn arity(&self) -> usize {
        match self {
            UniformValue::Scalar(_) => 1,
            UniformValue::Vector(v) => v.len(),
        }
    }
}

/// Shape-checked payload handed to [`Backend::set_uniform`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformData {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
}

impl UniformData {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformData::Float(_) => UniformKind::Float,
            UniformData::Vec2(_) => UniformKind::Vec2,
            UniformData::Vec3(_) => UniformKind::Vec3,
            UniformData::Vec4(_) => UniformKind::Vec4,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        match self {
            UniformData::Float(v) => std::slice::from_ref(v),
            UniformData::Vec2(v) => v,
            UniformData::Vec3(v) => v,
            UniformData::Vec4(v) => v,
        }
    }
}

/// A named uniform value. Locations live in [`ResolvedProgram`], not here.
#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    name: String,
    kind: UniformKind,
    value: UniformValue,
}

impl Uniform {
    pub fn new(name: impl Into<String>, kind: UniformKind, value: UniformValue) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
        }
    }

    pub fn float(name: impl Into<String>, value: f32) -> Self {
        Self::new(name, UniformKind::Float, UniformValue::Scalar(value))
    }

    pub fn vec2(name: impl Into<String>, value: [f32; 2]) -> Self {
        Self::new(name, UniformKind::Vec2, UniformValue::Vector(value.to_vec()))
    }

    pub fn vec3(name: impl Into<String>, value: [f32; 3]) -> Self {
        Self::new(name, UniformKind::Vec3, UniformValue::Vector(value.to_vec()))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> UniformKind {
        self.kind
    }

    #[inline]
    pub fn value(&self) -> &UniformValue {
        &self.value
    }

    pub fn set_value(&mut self, value: UniformValue) {
        self.value = value;
    }

    pub fn set_scalar(&mut self, value: f32) {
        self.value = UniformValue::Scalar(value);
    }

    /// Replaces the value with `components`, reusing the vector allocation.
    pub fn set_vector(&mut self, components: &[f32]) {
        match &mut self.value {
            UniformValue::Vector(v) => {
                v.clear();
                v.extend_from_slice(components);
            }
            slot => *slot = UniformValue::Vector(components.to_vec()),
        }
    }

    pub fn decl(&self) -> UniformDecl {
        UniformDecl {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    /// Checks the value against the declared kind.
    ///
    /// A scalar only satisfies `float`; a vector only satisfies the kind with
    /// its exact length. Nothing is coerced.
    pub fn data(&self) -> EngineResult<UniformData> {
        let mismatch = || EngineError::UniformArity {
            name: self.name.clone(),
            kind: self.kind,
            arity: self.value.arity(),
        };

        match (self.kind, &self.value) {
            (UniformKind::Float, UniformValue::Scalar(v)) => Ok(UniformData::Float(*v)),
            (UniformKind::Float, UniformValue::Vector(_)) => Err(mismatch()),
            (_, UniformValue::Scalar(_)) => Err(mismatch()),
            (UniformKind::Vec2, UniformValue::Vector(v)) => {
                <[f32; 2]>::try_from(v.as_slice())
                    .map(UniformData::Vec2)
                    .map_err(|_| mismatch())
            }
            (UniformKind::Vec3, UniformValue::Vector(v)) => {
                <[f32; 3]>::try_from(v.as_slice())
                    .map(UniformData::Vec3)
                    .map_err(|_| mismatch())
            }
            (UniformKind::Vec4, UniformValue::Vector(v)) => {
                <[f32; 4]>::try_from(v.as_slice())
                    .map(UniformData::Vec4)
                    .map_err(|_| mismatch())
            }
        }
    }
}

/// Vertex + fragment source pair.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub vertex: String,
    pub fragment: String,
}

/// A linked program plus the locations resolved against it.
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    program: ProgramId,
    position_location: Option<u32>,
    normal_location: Option<u32>,
    uniform_locations: HashMap<String, Option<UniformLocation>>,
    sampler_locations: HashMap<String, Option<UniformLocation>>,
    linked: bool,
}

impl ResolvedProgram {
    #[inline]
    pub fn id(&self) -> ProgramId {
        self.program
    }

    #[inline]
    pub fn position_location(&self) -> Option<u32> {
        self.position_location
    }

    #[inline]
    pub fn normal_location(&self) -> Option<u32> {
        self.normal_location
    }

    /// `false` when linking failed and the failure was tolerated.
    #[inline]
    pub fn linked(&self) -> bool {
        self.linked
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniform_locations.get(name).copied().flatten()
    }

    pub fn sampler_location(&self, name: &str) -> Option<UniformLocation> {
        self.sampler_locations.get(name).copied().flatten()
    }
}

/// Link failure handling.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum LinkPolicy {
    /// Log the link log and keep going with an unusable program.
    #[default]
    Tolerate,
    /// Turn a failed link into [`EngineError::LinkFailed`].
    Fail,
}

fn compile_stage<B: Backend>(
    gpu: &mut GpuContext<B>,
    stage: ShaderStage,
    source: &str,
) -> EngineResult<ShaderId> {
    let backend = gpu.backend_mut();
    let shader = backend
        .create_shader(stage)
        .ok_or(EngineError::ResourceCreation(stage.resource_kind()))?;
    backend.compile_shader(shader, source);

    let info = backend.shader_info_log(shader);
    if !info.is_empty() {
        log::warn!("{} diagnostics:\n{info}", stage.resource_kind());
    }
    Ok(shader)
}

/// Compiles both stages, links them and resolves the program's interface.
///
/// Compiler output is logged and never fails the call. Every uniform in
/// `uniforms` is resolved and immediately assigned, so a value of the wrong
/// shape is rejected here rather than at the first draw.
pub fn compile_and_link_program<B: Backend>(
    gpu: &mut GpuContext<B>,
    source: &ShaderSource,
    interface: &ProgramInterface,
    uniforms: &[Uniform],
    policy: LinkPolicy,
) -> EngineResult<ResolvedProgram> {
    let vertex = compile_stage(gpu, ShaderStage::Vertex, &source.vertex)?;
    let fragment = compile_stage(gpu, ShaderStage::Fragment, &source.fragment)?;

    let backend = gpu.backend_mut();
    let program = backend
        .create_program()
        .ok_or(EngineError::ResourceCreation(super::ResourceKind::Program))?;
    backend.link_program(program, vertex, fragment, interface);

    // Linked programs keep their own copy of the stages.
    backend.delete_shader(vertex);
    backend.delete_shader(fragment);

    let linked = backend.link_status(program);
    if !linked {
        let info = backend.program_info_log(program);
        match policy {
            LinkPolicy::Fail => return Err(EngineError::LinkFailed { log: info }),
            LinkPolicy::Tolerate => log::warn!("program {program:?} failed to link:\n{info}"),
        }
    }

    let uniform_locations = uniforms
        .iter()
        .map(|u| (u.name.clone(), backend.uniform_location(program, &u.name)))
        .collect();
    let sampler_locations = interface
        .samplers
        .iter()
        .map(|name| (name.clone(), backend.uniform_location(program, name)))
        .collect();

    let resolved = ResolvedProgram {
        program,
        position_location: backend.attrib_location(program, POSITION_ATTRIBUTE),
        normal_location: backend.attrib_location(program, NORMAL_ATTRIBUTE),
        uniform_locations,
        sampler_locations,
        linked,
    };

    gpu.use_program(Some(program));
    for uniform in uniforms {
        assign_uniform(gpu, &resolved, uniform)?;
    }

    log::debug!(
        "linked program {program:?} ({} uniforms, {} samplers)",
        uniforms.len(),
        interface.samplers.len()
    );
    Ok(resolved)
}

/// Pushes `uniform` to `program`.
///
/// Fails on a shape mismatch. A uniform the program does not use resolves to
/// no location and is skipped.
pub fn assign_uniform<B: Backend>(
    gpu: &mut GpuContext<B>,
    program: &ResolvedProgram,
    uniform: &Uniform,
) -> EngineResult<()> {
    let data = uniform.data()?;

    let location = match program.uniform_locations.get(uniform.name()) {
        Some(location) => *location,
        None => gpu.backend().uniform_location(program.id(), uniform.name()),
    };

    match location {
        Some(location) => gpu.backend_mut().set_uniform(program.id(), location, data),
        None => log::trace!("uniform `{}` inactive in {:?}", uniform.name(), program.id()),
    }
    Ok(())
}

/// Points sampler `name` at texture `unit`.
pub fn bind_sampler<B: Backend>(
    gpu: &mut GpuContext<B>,
    program: &ResolvedProgram,
    name: &str,
    unit: u32,
) {
    if let Some(location) = program.sampler_location(name) {
        gpu.backend_mut().set_sampler_unit(program.id(), location, unit);
    }
}

/// Releases the program object.
pub fn delete_program<B: Backend>(gpu: &mut GpuContext<B>, program: &ResolvedProgram) {
    gpu.backend_mut().delete_program(program.id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::gpu::recording::{Call, RecordingBackend};
    use crate::gpu::ResourceKind;

    fn source() -> ShaderSource {
        ShaderSource {
            vertex: "vs".into(),
            fragment: "fs".into(),
        }
    }

    fn interface(uniforms: &[Uniform]) -> ProgramInterface {
        ProgramInterface {
            attributes: vec![POSITION_ATTRIBUTE.into(), NORMAL_ATTRIBUTE.into()],
            uniforms: uniforms.iter().map(Uniform::decl).collect(),
            samplers: vec!["uImage".into()],
        }
    }

    // ── uniform shape ──

    #[test]
    fn data_accepts_matching_shapes() {
        assert_eq!(Uniform::float("a", 1.5).data().unwrap(), UniformData::Float(1.5));
        assert_eq!(
            Uniform::vec2("b", [1.0, 2.0]).data().unwrap(),
            UniformData::Vec2([1.0, 2.0])
        );
        let v4 = Uniform::new(
            "c",
            UniformKind::Vec4,
            UniformValue::Vector(vec![1.0, 2.0, 3.0, 4.0]),
        );
        assert_eq!(v4.data().unwrap().as_slice(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn data_rejects_arity_mismatch() {
        let bad = Uniform::new("uResolution", UniformKind::Vec2, UniformValue::Vector(vec![1.0; 3]));
        let err = bad.data().unwrap_err();
        assert!(matches!(
            err,
            EngineError::UniformArity { ref name, kind: UniformKind::Vec2, arity: 3 } if name == "uResolution"
        ));
        assert_eq!(err.category(), ErrorCategory::ContractViolation);

        let scalar_for_vec = Uniform::new("v", UniformKind::Vec3, UniformValue::Scalar(1.0));
        assert!(scalar_for_vec.data().is_err());

        let vec_for_float = Uniform::new("f", UniformKind::Float, UniformValue::Vector(vec![1.0]));
        assert!(vec_for_float.data().is_err());
    }

    #[test]
    fn set_vector_replaces_components() {
        let mut u = Uniform::vec3("uVector", [0.0; 3]);
        u.set_vector(&[1.0, 0.5, 0.25]);
        assert_eq!(u.data().unwrap(), UniformData::Vec3([1.0, 0.5, 0.25]));
    }

    // ── linking ──

    #[test]
    fn link_resolves_and_applies_every_uniform() {
        let mut gpu = GpuContext::new(RecordingBackend::new(8, 8));
        let uniforms = [Uniform::float("uTime", 0.25), Uniform::vec2("uResolution", [8.0, 8.0])];

        let program = compile_and_link_program(
            &mut gpu,
            &source(),
            &interface(&uniforms),
            &uniforms,
            LinkPolicy::Tolerate,
        )
        .unwrap();

        assert!(program.linked());
        assert_eq!(program.position_location(), Some(0));
        assert_eq!(program.normal_location(), Some(1));
        assert!(program.uniform_location("uTime").is_some());
        assert!(program.sampler_location("uImage").is_some());
        assert_eq!(gpu.state().program, Some(program.id()));

        let time = gpu.backend().uniform_value(program.id(), "uTime");
        assert_eq!(time, Some(UniformData::Float(0.25)));
        let res = gpu.backend().uniform_value(program.id(), "uResolution");
        assert_eq!(res, Some(UniformData::Vec2([8.0, 8.0])));
    }

    #[test]
    fn link_rejects_misshapen_uniform() {
        let mut gpu = GpuContext::new(RecordingBackend::new(8, 8));
        let uniforms = [Uniform::new("uVector", UniformKind::Vec3, UniformValue::Scalar(0.0))];

        let err = compile_and_link_program(
            &mut gpu,
            &source(),
            &interface(&uniforms),
            &uniforms,
            LinkPolicy::Tolerate,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UniformArity { .. }));
    }

    #[test]
    fn shader_diagnostics_are_not_fatal() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.set_shader_log("warning: unused variable");
        let mut gpu = GpuContext::new(backend);

        let program =
            compile_and_link_program(&mut gpu, &source(), &interface(&[]), &[], LinkPolicy::Tolerate);
        assert!(program.is_ok());
    }

    #[test]
    fn link_failure_follows_policy() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.set_link_failure(Some("undefined symbol".into()));
        let mut gpu = GpuContext::new(backend);

        let tolerated =
            compile_and_link_program(&mut gpu, &source(), &interface(&[]), &[], LinkPolicy::Tolerate)
                .unwrap();
        assert!(!tolerated.linked());

        let err = compile_and_link_program(&mut gpu, &source(), &interface(&[]), &[], LinkPolicy::Fail)
            .unwrap_err();
        assert!(matches!(err, EngineError::LinkFailed { ref log } if log == "undefined symbol"));
    }

    #[test]
    fn missing_shader_handle_is_resource_error() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.fail_creation(ResourceKind::FragmentShader);
        let mut gpu = GpuContext::new(backend);

        let err = compile_and_link_program(&mut gpu, &source(), &interface(&[]), &[], LinkPolicy::Tolerate)
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceCreation(ResourceKind::FragmentShader)));
    }

    #[test]
    fn assign_skips_inactive_uniform() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.hide_uniform("uUnused");
        let mut gpu = GpuContext::new(backend);
        let uniforms = [Uniform::float("uUnused", 1.0)];

        let program = compile_and_link_program(
            &mut gpu,
            &source(),
            &interface(&uniforms),
            &uniforms,
            LinkPolicy::Tolerate,
        )
        .unwrap();

        assert_eq!(program.uniform_location("uUnused"), None);
        assert!(!gpu
            .backend()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::SetUniform { .. })));
    }
}
