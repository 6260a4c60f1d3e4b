//! The compositor: three fixed passes drawn through a [`GpuContext`].
//!
//! Each frame draws the mask pass (stencil write, no colour) and the paint
//! pass (stencil read) into an offscreen render target, then composites the
//! background pass and that target onto the visible surface.

mod assets;
mod controls;
mod package;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gpu::{
    assign_uniform, bind_sampler, compile_and_link_program, create_attribute_buffers,
    create_render_target, create_texture, delete_program, delete_render_target,
    release_attribute_buffers, resize_render_target, update_attribute_buffers, Backend,
    BlendFactor, ClearMask, GpuContext, ProgramInterface, RenderTarget, StateSnapshot,
    TextureDesc, TextureId, Uniform, UniformValue, NORMAL_ATTRIBUTE, POSITION_ATTRIBUTE,
};
use crate::math::Vec3;
use crate::time::{FpsMeter, FrameTime};

pub use assets::{decode_bitmap, AssetBarrier, Bitmap, LoadedAssets};
pub use controls::{ControlHandle, Controls};
pub use package::{
    lookup_uniform, Package, PassKind, Passes, SamplerBinding, SamplerSource, StencilMode,
    STENCIL_MASK, STENCIL_REF, S_IMAGE, S_MASK_IMAGE, S_RENDER_TARGET, U_FLOAT_VAR1, U_FLOAT_VAR2,
    U_RESOLUTION, U_TIME, U_VECTOR,
};

/// Two triangles covering clip space.
pub const QUAD_POSITIONS: [f32; 12] = [
    -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, //
    -1.0, -1.0, 1.0, 1.0, -1.0, 1.0,
];
pub const QUAD_NORMALS: [f32; 12] = [0.0; 12];

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EnginePhase {
    /// Waiting for both bitmaps.
    Loading,
    /// Building GPU resources; only observable if that failed.
    Initializing,
    Running,
}

/// What one call to [`Engine::frame`] did.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameStatus {
    pub phase: EnginePhase,
    /// Packages drawn this frame.
    pub draw_calls: u32,
    /// Set on the frames that close an FPS sampling window.
    pub fps: Option<f64>,
}

struct Session {
    target: RenderTarget,
    images: [TextureId; 2],
    passes: Passes,
}

pub struct Engine<B: Backend> {
    gpu: GpuContext<B>,
    config: EngineConfig,
    phase: EnginePhase,
    assets: AssetBarrier,
    controls: ControlHandle,
    session: Option<Session>,
    pending_resize: Option<(u32, u32)>,
    frame_count: u64,
    fps: FpsMeter,
    fps_observer: Option<Box<dyn FnMut(f64)>>,
}

impl<B: Backend> Engine<B> {
    /// Starts loading both bitmaps named in `config` in the background.
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let assets = AssetBarrier::spawn(config.background_image.clone(), config.mask_image.clone());
        Self::with_barrier(backend, config, assets)
    }

    /// Uses bitmaps that are already decoded; the first frame initializes.
    pub fn with_assets(backend: B, config: EngineConfig, assets: LoadedAssets) -> Self {
        Self::with_barrier(backend, config, AssetBarrier::ready(assets))
    }

    fn with_barrier(backend: B, config: EngineConfig, assets: AssetBarrier) -> Self {
        let fps = FpsMeter::new(config.fps_window);
        Self {
            gpu: GpuContext::new(backend),
            config,
            phase: EnginePhase::Loading,
            assets,
            controls: ControlHandle::default(),
            session: None,
            pending_resize: None,
            frame_count: 0,
            fps,
            fps_observer: None,
        }
    }

    #[inline]
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    #[inline]
    pub fn gpu(&self) -> &GpuContext<B> {
        &self.gpu
    }

    #[inline]
    pub fn backend(&self) -> &B {
        self.gpu.backend()
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        self.gpu.backend_mut()
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Publisher that other threads can use to push control updates.
    pub fn controls(&self) -> ControlHandle {
        self.controls.clone()
    }

    pub fn update_controls(&self, vector: Vec3, float_var1: f32, float_var2: f32) {
        self.controls.update(vector, float_var1, float_var2);
    }

    /// Most recent FPS estimate.
    pub fn latest_fps(&self) -> Option<f64> {
        self.fps.latest()
    }

    /// Called with every new FPS estimate.
    pub fn on_fps(&mut self, observer: impl FnMut(f64) + 'static) {
        self.fps_observer = Some(Box::new(observer));
    }

    /// Queues a surface resize; it is applied at the start of the next frame.
    /// Later requests replace earlier ones.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.pending_resize = Some((width, height));
    }

    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.session.as_ref().map(|s| &s.target)
    }

    pub fn passes(&self) -> Option<&Passes> {
        self.session.as_ref().map(|s| &s.passes)
    }

    pub fn set_pass_active(&mut self, kind: PassKind, active: bool) -> EngineResult<()> {
        let session = self.session.as_mut().ok_or(EngineError::NotRunning)?;
        session.passes[kind].active = active;
        Ok(())
    }

    /// Makes the pass feed `aNormal` from its normal buffer on later draws.
    pub fn set_pass_normals(&mut self, kind: PassKind, uses_normals: bool) -> EngineResult<()> {
        let session = self.session.as_mut().ok_or(EngineError::NotRunning)?;
        session.passes[kind].uses_normals = uses_normals;
        Ok(())
    }

    /// Replaces the vertex data of one pass with freshly uploaded buffers.
    pub fn replace_geometry(
        &mut self,
        kind: PassKind,
        positions: &[f32],
        normals: &[f32],
    ) -> EngineResult<()> {
        let session = self.session.as_mut().ok_or(EngineError::NotRunning)?;
        let package = &mut session.passes[kind];
        update_attribute_buffers(&mut self.gpu, &mut package.attributes, positions, normals)
    }

    /// Sets a uniform by package and uniform name; it reaches the GPU at the
    /// pass's next draw.
    ///
    /// `uTime`, `uResolution`, `uVector` and the two scalars are rewritten by
    /// the engine every frame.
    pub fn set_uniform(
        &mut self,
        package: &str,
        uniform: &str,
        value: UniformValue,
    ) -> EngineResult<()> {
        let session = self.session.as_mut().ok_or(EngineError::NotRunning)?;
        let slot = lookup_uniform(&mut session.passes, package, uniform)?;

        let mut candidate = slot.clone();
        candidate.set_value(value);
        candidate.data()?;
        *slot = candidate;
        Ok(())
    }

    /// Runs one step of the engine.
    ///
    /// While loading this only polls the bitmap loads. The frame that sees
    /// both bitmaps builds every GPU resource and draws the first frame.
    pub fn frame(&mut self, time: FrameTime) -> EngineResult<FrameStatus> {
        if self.gpu.backend().is_context_lost() {
            return Err(EngineError::ContextLost);
        }

        if self.session.is_none() {
            if !self.assets.poll()? {
                return Ok(FrameStatus {
                    phase: self.phase,
                    draw_calls: 0,
                    fps: None,
                });
            }
            self.initialize()?;
        }

        self.render_frame(time)
    }

    fn initialize(&mut self) -> EngineResult<()> {
        self.phase = EnginePhase::Initializing;
        log::info!("assets ready; initializing");

        let assets = self.assets.take().ok_or(EngineError::AssetLoaderDisconnected)?;
        let (width, height) = self.gpu.backend().surface_size();
        let gpu = &mut self.gpu;

        gpu.bind_framebuffer(None);
        gpu.clear_color(self.config.surface_clear);
        gpu.clear(ClearMask::COLOR);

        gpu.set_blend_enabled(true);
        gpu.blend_func(BlendFactor::SrcAlpha, BlendFactor::One);
        gpu.set_cull_back_faces(true);
        gpu.set_stencil_test_enabled(true);
        gpu.viewport(width, height);

        let target = create_render_target(gpu, width, height)?;

        let upload = |gpu: &mut GpuContext<B>, bitmap: &Bitmap| {
            let desc = TextureDesc::new(bitmap.width, bitmap.height)
                .with_filter(self.config.image_filter)
                .with_wrap(self.config.image_wrap);
            create_texture(gpu, &desc, Some(&bitmap.pixels))
        };
        let background_image = upload(gpu, &assets.background)?;
        let mask_image = upload(gpu, &assets.mask)?;

        let resolution = [width as f32, height as f32];
        let time = 0.0;

        let background = self.build_package(
            PassKind::Background,
            vec![Uniform::float(U_TIME, time), Uniform::vec2(U_RESOLUTION, resolution)],
            StencilMode::None,
            Some(background_image),
            vec![
                SamplerBinding::new(S_IMAGE, 0, SamplerSource::Image),
                SamplerBinding::new(S_RENDER_TARGET, 1, SamplerSource::RenderTarget),
            ],
        )?;

        let vector = self.controls.snapshot().vector.to_array();
        let mask = self.build_package(
            PassKind::Mask,
            vec![
                Uniform::vec3(U_VECTOR, vector),
                Uniform::float(U_TIME, time),
                Uniform::vec2(U_RESOLUTION, resolution),
            ],
            StencilMode::Write,
            Some(mask_image),
            vec![SamplerBinding::new(S_MASK_IMAGE, 0, SamplerSource::Image)],
        )?;

        let paint = self.build_package(
            PassKind::Paint,
            vec![
                Uniform::float(U_FLOAT_VAR1, 0.0),
                Uniform::float(U_FLOAT_VAR2, 0.0),
                Uniform::float(U_TIME, time),
                Uniform::vec2(U_RESOLUTION, resolution),
            ],
            StencilMode::Read,
            None,
            Vec::new(),
        )?;

        self.session = Some(Session {
            target,
            images: [background_image, mask_image],
            passes: Passes::new(background, mask, paint),
        });
        self.pending_resize = Some((width, height));
        self.phase = EnginePhase::Running;

        log::info!("engine running at {width}x{height}");
        Ok(())
    }

    fn build_package(
        &mut self,
        kind: PassKind,
        uniforms: Vec<Uniform>,
        stencil: StencilMode,
        image: Option<TextureId>,
        samplers: Vec<SamplerBinding>,
    ) -> EngineResult<Package> {
        let attributes = create_attribute_buffers(&mut self.gpu, &QUAD_POSITIONS, &QUAD_NORMALS)?;

        let interface = ProgramInterface {
            attributes: vec![POSITION_ATTRIBUTE.to_owned(), NORMAL_ATTRIBUTE.to_owned()],
            uniforms: uniforms.iter().map(Uniform::decl).collect(),
            samplers: samplers.iter().map(|s| s.name.to_owned()).collect(),
        };

        let program = compile_and_link_program(
            &mut self.gpu,
            self.config.shaders.get(kind),
            &interface,
            &uniforms,
            self.config.link_policy(),
        )?;

        log::debug!("built {kind} package");
        Ok(Package {
            kind,
            active: true,
            attributes,
            uniforms,
            program,
            uses_normals: false,
            stencil,
            image,
            samplers,
        })
    }

    fn apply_resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if width == 0 || height == 0 {
            log::trace!("ignoring resize to {width}x{height}");
            return Ok(());
        }

        let gpu = &mut self.gpu;
        gpu.backend_mut().resize_surface(width, height);
        gpu.viewport(width, height);
        resize_render_target(gpu, &mut session.target, width, height)?;

        let resolution = [width as f32, height as f32];
        for package in session.passes.iter_mut() {
            package.require_uniform(U_RESOLUTION)?.set_vector(&resolution);
            if let Some(uniform) = package.uniform(U_RESOLUTION) {
                assign_uniform(gpu, &package.program, uniform)?;
            }
        }

        log::debug!("resized to {width}x{height}");
        Ok(())
    }

    fn render_frame(&mut self, time: FrameTime) -> EngineResult<FrameStatus> {
        if let Some((width, height)) = self.pending_resize.take() {
            self.apply_resize(width, height)?;
        }

        self.frame_count += 1;
        let fps = self.fps.update(self.frame_count, time.elapsed);
        if let Some(fps) = fps {
            log::debug!("{fps:.1} fps");
            if let Some(observer) = self.fps_observer.as_mut() {
                observer(fps);
            }
        }

        let Some(session) = self.session.as_mut() else {
            return Err(EngineError::NotRunning);
        };

        let host_state: Option<StateSnapshot> = self
            .config
            .preserve_host_state
            .then(|| self.gpu.snapshot_state());

        let seconds = time.seconds();
        let controls = self.controls.snapshot();
        for package in session.passes.iter_mut() {
            package.require_uniform(U_TIME)?.set_scalar(seconds);
        }
        session.passes[PassKind::Mask]
            .require_uniform(U_VECTOR)?
            .set_vector(&controls.vector.to_array());
        let paint = &mut session.passes[PassKind::Paint];
        paint.require_uniform(U_FLOAT_VAR1)?.set_scalar(controls.float_var1);
        paint.require_uniform(U_FLOAT_VAR2)?.set_scalar(controls.float_var2);

        let gpu = &mut self.gpu;
        let mut draw_calls = 0;

        // Offscreen: mask then paint.
        gpu.bind_framebuffer(Some(session.target.framebuffer));
        gpu.clear_color(self.config.target_clear);
        gpu.clear(ClearMask::COLOR);
        gpu.blend_func(BlendFactor::SrcAlpha, BlendFactor::One);
        draw_calls += draw_package(gpu, &session.passes[PassKind::Mask], &session.target)?;
        draw_calls += draw_package(gpu, &session.passes[PassKind::Paint], &session.target)?;

        // Surface: background plus the offscreen result.
        gpu.bind_framebuffer(None);
        gpu.clear_color(self.config.surface_clear);
        gpu.clear(ClearMask::COLOR);
        gpu.blend_func(BlendFactor::One, BlendFactor::Zero);
        draw_calls += draw_package(gpu, &session.passes[PassKind::Background], &session.target)?;

        if let Some(snapshot) = host_state {
            gpu.restore_state(&snapshot);
        }

        gpu.end_frame()?;
        log::trace!("frame {} drew {draw_calls} packages", self.frame_count);

        Ok(FrameStatus {
            phase: self.phase,
            draw_calls,
            fps,
        })
    }

    fn release(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        for package in session.passes.iter() {
            release_attribute_buffers(&mut self.gpu, &package.attributes);
            delete_program(&mut self.gpu, &package.program);
        }
        for image in session.images {
            self.gpu.backend_mut().delete_texture(image);
        }
        delete_render_target(&mut self.gpu, &session.target);
        log::debug!("engine resources released");
    }
}

impl<B: Backend> Drop for Engine<B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Draws one package; returns the number of draws issued (0 or 1).
fn draw_package<B: Backend>(
    gpu: &mut GpuContext<B>,
    package: &Package,
    target: &RenderTarget,
) -> EngineResult<u32> {
    if !package.active {
        return Ok(0);
    }

    let program = &package.program;
    gpu.use_program(Some(program.id()));
    package.stencil.apply(gpu);

    let position = program
        .position_location()
        .ok_or(EngineError::AttributeLocation { name: POSITION_ATTRIBUTE })?;
    gpu.bind_array_buffer(Some(package.attributes.position.buffer));
    gpu.vertex_attrib_pointer(position, package.attributes.position.components);

    if package.uses_normals {
        let normal = program
            .normal_location()
            .ok_or(EngineError::AttributeLocation { name: NORMAL_ATTRIBUTE })?;
        gpu.bind_array_buffer(Some(package.attributes.normal.buffer));
        gpu.vertex_attrib_pointer(normal, package.attributes.normal.components);
    } else if let Some(normal) = program.normal_location() {
        gpu.disable_vertex_attrib(normal);
    }

    // Higher units first so unit 0 stays active afterwards.
    for binding in package.samplers.iter().rev() {
        let texture = match binding.source {
            SamplerSource::Image => package.image,
            SamplerSource::RenderTarget => Some(target.texture),
        };
        gpu.active_texture(binding.unit);
        gpu.bind_texture(texture);
        bind_sampler(gpu, program, binding.name, binding.unit);
    }

    for uniform in &package.uniforms {
        assign_uniform(gpu, program, uniform)?;
    }

    let count = package.attributes.vertex_count(package.uses_normals)?;
    gpu.draw_arrays(0, count);
    Ok(1)
}
