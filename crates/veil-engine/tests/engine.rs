use std::path::PathBuf;
use std::time::Duration;

use veil_engine::engine::{Bitmap, LoadedAssets, U_FLOAT_VAR1, U_RESOLUTION, U_TIME, U_VECTOR};
use veil_engine::gpu::recording::RecordingBackend;
use veil_engine::gpu::{
    Backend, BlendFactor, ColorMask, CompareFunc, StencilOp, UniformData, UniformValue,
    NORMAL_ATTRIBUTE, POSITION_ATTRIBUTE,
};
use veil_engine::math::Vec3;
use veil_engine::time::FrameTime;
use veil_engine::{Engine, EngineConfig, EngineError, EnginePhase, PassKind};

fn assets() -> LoadedAssets {
    LoadedAssets {
        background: Bitmap::solid(4, 4, [40, 40, 40, 255]),
        mask: Bitmap::solid(2, 2, [255, 255, 255, 255]),
    }
}

fn running(config: EngineConfig) -> Engine<RecordingBackend> {
    let mut engine = Engine::with_assets(RecordingBackend::new(320, 200), config, assets());
    let status = engine.frame(FrameTime::at(Duration::ZERO, 0)).unwrap();
    assert_eq!(status.phase, EnginePhase::Running);
    engine
}

fn at_ms(ms: u64, frame: u64) -> FrameTime {
    FrameTime::at(Duration::from_millis(ms), frame)
}

fn program_of(engine: &Engine<RecordingBackend>, kind: PassKind) -> veil_engine::gpu::ProgramId {
    engine.passes().unwrap()[kind].program.id()
}

#[test]
fn first_frame_initializes_and_draws_all_passes() {
    let mut engine = Engine::with_assets(
        RecordingBackend::new(320, 200),
        EngineConfig::default(),
        assets(),
    );
    assert_eq!(engine.phase(), EnginePhase::Loading);

    let status = engine.frame(at_ms(0, 0)).unwrap();
    assert_eq!(status.phase, EnginePhase::Running);
    assert_eq!(status.draw_calls, 3);
    assert_eq!(engine.frame_count(), 1);
    assert_eq!(engine.backend().frames(), 1);
}

#[test]
fn passes_draw_masked_offscreen_then_composite() {
    let mut engine = running(EngineConfig::default());
    engine.backend_mut().take_calls();

    engine.update_controls(Vec3::new(1.0, 0.0, 0.0), 0.0, 0.0);
    engine.frame(at_ms(16, 1)).unwrap();

    let target = *engine.render_target().unwrap();
    let mask_program = program_of(&engine, PassKind::Mask);
    let paint_program = program_of(&engine, PassKind::Paint);
    let background_program = program_of(&engine, PassKind::Background);

    let backend = engine.backend();
    let draws = backend.draws();
    assert_eq!(draws.len(), 3);

    let mask = &draws[0].state;
    assert_eq!(mask.program, Some(mask_program));
    assert_eq!(mask.framebuffer, Some(target.framebuffer));
    assert!(mask.stencil.enabled);
    assert_eq!(mask.stencil.func, CompareFunc::Always);
    assert_eq!(mask.stencil.reference, 1);
    assert_eq!(mask.stencil.pass, StencilOp::Replace);
    assert_eq!(mask.color_mask, ColorMask::NONE);

    let paint = &draws[1].state;
    assert_eq!(paint.program, Some(paint_program));
    assert_eq!(paint.framebuffer, Some(target.framebuffer));
    assert_eq!(paint.stencil.func, CompareFunc::NotEqual);
    assert_eq!(paint.stencil.reference, 1);
    assert_eq!(paint.stencil.pass, StencilOp::Keep);
    assert_eq!(paint.color_mask, ColorMask::ALL);
    assert_eq!((paint.blend.src, paint.blend.dst), (BlendFactor::SrcAlpha, BlendFactor::One));

    let background = &draws[2].state;
    assert_eq!(background.program, Some(background_program));
    assert_eq!(background.framebuffer, None);
    assert_eq!(background.texture_units[1], Some(target.texture));
    assert_eq!((background.blend.src, background.blend.dst), (BlendFactor::One, BlendFactor::Zero));
    assert!(draws.iter().all(|d| d.count == 6));

    assert_eq!(
        backend.uniform_value(mask_program, U_VECTOR),
        Some(UniformData::Vec3([1.0, 0.0, 0.0]))
    );
    assert_eq!(
        backend.uniform_value(paint_program, U_FLOAT_VAR1),
        Some(UniformData::Float(0.0))
    );
    assert_eq!(
        backend.uniform_value(background_program, U_TIME),
        Some(UniformData::Float(0.016))
    );
}

#[test]
fn offscreen_target_clears_colour_and_stencil_before_mask() {
    let mut engine = running(EngineConfig::default());
    engine.backend_mut().take_calls();
    engine.frame(at_ms(16, 1)).unwrap();

    let fb = engine.render_target().unwrap().framebuffer;
    let clears = engine.backend().clears();
    let offscreen: Vec<_> = clears.iter().filter(|(t, _)| *t == Some(fb)).collect();
    assert_eq!(offscreen.len(), 2);
    assert_eq!(offscreen[0].1.color, Some([0.0, 0.0, 0.0, 0.0]));
    assert_eq!(offscreen[1].1.stencil, Some(0));

    let surface: Vec<_> = clears.iter().filter(|(t, _)| t.is_none()).collect();
    assert_eq!(surface.len(), 1);
    assert_eq!(surface[0].1.color, Some([0.0, 0.0, 0.0, 1.0]));
}

#[test]
fn resize_keeps_framebuffer_and_replaces_texture() {
    let mut engine = running(EngineConfig::default());
    let before = *engine.render_target().unwrap();

    engine.request_resize(640, 480);
    engine.frame(at_ms(16, 1)).unwrap();

    let after = *engine.render_target().unwrap();
    assert_eq!(after.framebuffer, before.framebuffer);
    assert_eq!(after.stencil, before.stencil);
    assert_ne!(after.texture, before.texture);
    assert_eq!((after.width, after.height), (640, 480));

    let backend = engine.backend();
    assert!(!backend.is_texture_live(before.texture));
    assert!(backend.is_texture_live(after.texture));
    assert_eq!(backend.texture(after.texture).unwrap().desc.width, 640);
    assert_eq!(backend.surface_size(), (640, 480));
}

#[test]
fn resize_updates_resolution_on_every_pass() {
    let mut engine = running(EngineConfig::default());
    engine.request_resize(800, 600);
    engine.frame(at_ms(16, 1)).unwrap();

    for kind in PassKind::ALL {
        let program = program_of(&engine, kind);
        assert_eq!(
            engine.backend().uniform_value(program, U_RESOLUTION),
            Some(UniformData::Vec2([800.0, 600.0])),
            "{kind}"
        );
    }
    let draws = engine.backend().draws();
    assert_eq!(draws.last().unwrap().state.viewport, (800, 600));
}

#[test]
fn zero_sized_resize_is_ignored() {
    let mut engine = running(EngineConfig::default());
    let before = *engine.render_target().unwrap();

    engine.request_resize(0, 480);
    engine.frame(at_ms(16, 1)).unwrap();

    assert_eq!(*engine.render_target().unwrap(), before);
}

#[test]
fn latest_resize_request_wins() {
    let mut engine = running(EngineConfig::default());
    engine.request_resize(100, 100);
    engine.request_resize(200, 150);
    engine.frame(at_ms(16, 1)).unwrap();

    let target = engine.render_target().unwrap();
    assert_eq!((target.width, target.height), (200, 150));
}

#[test]
fn inactive_pass_is_skipped() {
    let mut engine = running(EngineConfig::default());
    engine.set_pass_active(PassKind::Paint, false).unwrap();

    let status = engine.frame(at_ms(16, 1)).unwrap();
    assert_eq!(status.draw_calls, 2);

    engine.set_pass_active(PassKind::Paint, true).unwrap();
    assert_eq!(engine.frame(at_ms(32, 2)).unwrap().draw_calls, 3);
}

#[test]
fn replaced_geometry_changes_vertex_count() {
    let mut engine = running(EngineConfig::default());
    let triangle = [-1.0, -1.0, 1.0, -1.0, 0.0, 1.0];
    engine.replace_geometry(PassKind::Mask, &triangle, &[]).unwrap();

    engine.backend_mut().take_calls();
    engine.frame(at_ms(16, 1)).unwrap();
    let draws = engine.backend().draws();
    assert_eq!(draws[0].count, 3);
    assert_eq!(draws[1].count, 6);

    let err = engine.replace_geometry(PassKind::Mask, &[0.0, 1.0, 2.0], &[]).unwrap_err();
    assert!(matches!(err, EngineError::OddVertexData { len: 3, .. }));
}

#[test]
fn set_uniform_reports_unknown_names_and_bad_shapes() {
    let mut engine = running(EngineConfig::default());

    let err = engine
        .set_uniform("lights", U_TIME, UniformValue::Scalar(1.0))
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownPackage(ref name) if name == "lights"));

    let err = engine
        .set_uniform("Mask", U_TIME, UniformValue::Scalar(1.0))
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownPackage(_)));

    let err = engine
        .set_uniform("mask", "uMissing", UniformValue::Scalar(1.0))
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownUniform { .. }));

    let err = engine
        .set_uniform("paint", U_FLOAT_VAR1, UniformValue::Vector(vec![1.0, 2.0]))
        .unwrap_err();
    assert!(matches!(err, EngineError::UniformArity { arity: 2, .. }));

    engine
        .set_uniform("mask", U_VECTOR, UniformValue::Vector(vec![0.0, 1.0, 0.0]))
        .unwrap();
}

#[test]
fn pass_controls_are_unavailable_before_running() {
    let mut engine = Engine::with_assets(
        RecordingBackend::new(8, 8),
        EngineConfig::default(),
        assets(),
    );
    assert!(matches!(
        engine.set_pass_active(PassKind::Mask, false),
        Err(EngineError::NotRunning)
    ));
    assert!(matches!(
        engine.set_uniform("mask", U_TIME, UniformValue::Scalar(0.0)),
        Err(EngineError::NotRunning)
    ));
}

#[test]
fn missing_position_attribute_stops_first_frame() {
    let mut backend = RecordingBackend::new(8, 8);
    backend.hide_attribute(POSITION_ATTRIBUTE);
    let mut engine = Engine::with_assets(backend, EngineConfig::default(), assets());

    let err = engine.frame(at_ms(0, 0)).unwrap_err();
    assert!(matches!(err, EngineError::AttributeLocation { name: "aPosition" }));
    assert!(engine.backend().draws().is_empty());
}

#[test]
fn missing_normal_attribute_matters_only_when_normals_are_used() {
    let mut backend = RecordingBackend::new(8, 8);
    backend.hide_attribute(NORMAL_ATTRIBUTE);
    let mut engine = Engine::with_assets(backend, EngineConfig::default(), assets());
    assert_eq!(engine.frame(at_ms(0, 0)).unwrap().draw_calls, 3);

    engine.set_pass_normals(PassKind::Mask, true).unwrap();
    let err = engine.frame(at_ms(16, 1)).unwrap_err();
    assert!(matches!(err, EngineError::AttributeLocation { name: "aNormal" }));
}

#[test]
fn pass_with_normals_binds_normal_buffer() {
    let mut engine = running(EngineConfig::default());
    engine.set_pass_normals(PassKind::Paint, true).unwrap();
    engine.backend_mut().take_calls();
    engine.frame(at_ms(16, 1)).unwrap();

    let normal = engine.passes().unwrap()[PassKind::Paint].attributes.normal.buffer;
    let draws = engine.backend().draws();
    let paint = &draws[1].state;
    assert!(paint
        .vertex_attributes
        .iter()
        .flatten()
        .any(|binding| binding.buffer == normal));
}

#[test]
fn context_loss_is_fatal() {
    let mut engine = running(EngineConfig::default());
    engine.backend_mut().set_context_lost(true);

    let err = engine.frame(at_ms(16, 1)).unwrap_err();
    assert!(matches!(err, EngineError::ContextLost));
    assert!(matches!(engine.frame(at_ms(32, 2)), Err(EngineError::ContextLost)));
}

#[test]
fn host_state_is_restored_when_requested() {
    let mut plain = running(EngineConfig::default());
    let background = program_of(&plain, PassKind::Background);
    assert_eq!(plain.gpu().state().program, Some(background));

    let config = EngineConfig {
        preserve_host_state: true,
        ..EngineConfig::default()
    };
    let mut preserving = running(config);
    let before = preserving.gpu().snapshot_state();
    preserving.frame(at_ms(16, 1)).unwrap();
    assert_eq!(preserving.gpu().snapshot_state(), before);

    plain.frame(at_ms(16, 1)).unwrap();
    assert_eq!(plain.gpu().state().program, Some(background));
}

#[test]
fn fps_is_reported_once_per_window() {
    let mut engine = running(EngineConfig::default());
    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = seen.clone();
    engine.on_fps(move |fps| sink.borrow_mut().push(fps));

    let mut reported = Vec::new();
    for i in 1..=100u64 {
        let status = engine.frame(at_ms(i * 10, i)).unwrap();
        if let Some(fps) = status.fps {
            reported.push(fps);
        }
    }

    assert_eq!(reported.len(), 1);
    assert!((reported[0] - 101.0).abs() < 1e-9);
    assert_eq!(*seen.borrow(), reported);
    assert_eq!(engine.latest_fps(), Some(reported[0]));
}

#[test]
fn missing_image_fails_loading() {
    let config = EngineConfig {
        background_image: PathBuf::from("does/not/exist.jpg"),
        mask_image: PathBuf::from("does/not/exist.png"),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(RecordingBackend::new(8, 8), config);

    let mut outcome = None;
    for i in 0..500 {
        match engine.frame(at_ms(i, i)) {
            Ok(status) => {
                assert_eq!(status.phase, EnginePhase::Loading);
                assert_eq!(status.draw_calls, 0);
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(err) => {
                outcome = Some(err);
                break;
            }
        }
    }

    assert!(matches!(outcome, Some(EngineError::AssetLoad { .. })));
    assert!(engine.backend().draws().is_empty());
}

#[test]
fn link_failure_is_fatal_only_when_configured() {
    let mut backend = RecordingBackend::new(8, 8);
    backend.set_link_failure(Some("bad varyings".into()));
    let mut tolerant = Engine::with_assets(backend, EngineConfig::default(), assets());
    assert_eq!(tolerant.frame(at_ms(0, 0)).unwrap().phase, EnginePhase::Running);

    let mut backend = RecordingBackend::new(8, 8);
    backend.set_link_failure(Some("bad varyings".into()));
    let config = EngineConfig {
        fail_on_link_error: true,
        ..EngineConfig::default()
    };
    let mut strict = Engine::with_assets(backend, config, assets());
    let err = strict.frame(at_ms(0, 0)).unwrap_err();
    assert!(matches!(err, EngineError::LinkFailed { ref log } if log.contains("bad varyings")));
}
