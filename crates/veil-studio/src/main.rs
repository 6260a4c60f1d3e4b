use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use winit::dpi::LogicalSize;

use veil_engine::device::GpuInit;
use veil_engine::gpu::Filter;
use veil_engine::logging::{init_logging, LoggingConfig};
use veil_engine::math::Vec3;
use veil_engine::window::{Runtime, RuntimeConfig};
use veil_engine::{ControlHandle, Controls, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "veil", version)]
struct Cli {
    /// Bitmap drawn behind everything.
    #[arg(long, default_value = "assets/darkTexture.jpg")]
    background: PathBuf,

    /// Bitmap whose opaque pixels form the stencil mask.
    #[arg(long, default_value = "assets/LogoBackwardsWhite.png")]
    mask: PathBuf,

    /// Initial mask vector.
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [1.0, 0.0, 0.0])]
    vector: Vec<f32>,

    #[arg(long, default_value_t = 0.0)]
    var1: f32,

    #[arg(long, default_value_t = 0.0)]
    var2: f32,

    /// Sweep the controls from a background thread.
    #[arg(long, default_value_t = false)]
    animate: bool,

    #[arg(long, default_value_t = 1280.0)]
    width: f64,

    #[arg(long, default_value_t = 720.0)]
    height: f64,

    /// Sample both bitmaps with nearest filtering.
    #[arg(long, default_value_t = false)]
    nearest: bool,

    /// Present without waiting for vblank.
    #[arg(long, default_value_t = false)]
    no_vsync: bool,

    /// Abort when a shader program fails to link.
    #[arg(long, default_value_t = false)]
    fail_on_link_error: bool,

    /// `env_logger` filter; overrides RUST_LOG.
    #[arg(long)]
    log: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(LoggingConfig {
        env_filter: cli.log.clone(),
        ..Default::default()
    });

    let [x, y, z] = <[f32; 3]>::try_from(cli.vector.as_slice())
        .map_err(|_| anyhow::anyhow!("--vector takes exactly three values"))?;

    let engine = EngineConfig {
        background_image: cli.background,
        mask_image: cli.mask,
        image_filter: if cli.nearest { Filter::Nearest } else { Filter::Linear },
        fail_on_link_error: cli.fail_on_link_error,
        ..EngineConfig::default()
    };

    let runtime = RuntimeConfig {
        title: "veil".to_string(),
        initial_size: LogicalSize::new(cli.width, cli.height),
        initial_controls: Controls::new(Vec3::new(x, y, z), cli.var1, cli.var2),
    };

    let gpu = GpuInit {
        present_mode: if cli.no_vsync {
            wgpu::PresentMode::AutoNoVsync
        } else {
            wgpu::PresentMode::Fifo
        },
        ..GpuInit::default()
    };

    log::info!("starting with {}x{}", cli.width, cli.height);

    if cli.animate {
        Runtime::run_with(runtime, gpu, engine, spawn_sweep)
    } else {
        Runtime::run(runtime, gpu, engine)
    }
}

/// Cycles the vector through the colour wheel and the scalars through
/// `[0, 1]`, roughly 60 updates per second.
fn spawn_sweep(controls: ControlHandle) {
    std::thread::spawn(move || {
        let start = Instant::now();
        loop {
            let t = start.elapsed().as_secs_f32();
            let phase = |offset: f32| 0.5 + 0.5 * (t + offset).sin();
            controls.update(
                Vec3::new(phase(0.0), phase(2.094), phase(4.189)),
                phase(0.0),
                phase(1.571),
            );
            std::thread::sleep(Duration::from_millis(16));
        }
    });
}
