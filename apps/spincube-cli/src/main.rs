use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spincube_common::Rgba8Image;
use spincube_render::{RecordingBackend, Scene, ShaderSources};
use spincube_scene::{FrameLoopState, Spin, VertexData, ViewpointSettings};
use tracing_subscriber::EnvFilter;

/// Viewport the headless run pretends to draw into.
const VIEWPORT: (u32, u32) = (800, 600);

#[derive(Parser)]
#[command(name = "spincube-cli", about = "Headless tools for the spincube frame loop")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Run the frame loop against the recording backend
    Simulate {
        /// Number of frames to run
        #[arg(short, long, default_value = "10")]
        frames: u64,
        /// Seconds between consecutive frames
        #[arg(short, long, default_value = "0.016")]
        step: f64,
        /// Per-cube rotation divisors, one cube per value
        #[arg(long, value_delimiter = ',', default_value = "5,2")]
        divisors: Vec<f32>,
        /// Print every recorded backend call
        #[arg(long)]
        trace: bool,
    },
}

fn simulate(frames: u64, step: f64, divisors: &[f32], trace: bool) -> Result<()> {
    if !step.is_finite() || step < 0.0 {
        anyhow::bail!("frame step must be a finite, non-negative number of seconds");
    }
    let spins = Spin::about_x_all(divisors).context("parse --divisors")?;
    let viewpoint = ViewpointSettings::default()
        .derive(VIEWPORT.0, VIEWPORT.1)
        .context("derive viewpoint")?;
    // Any valid image will do; nothing is sampled.
    let texture = Rgba8Image::solid(2, 2, [255, 255, 255, 255]);

    let mut backend = RecordingBackend::new();
    let mut scene = Scene::build(
        &mut backend,
        viewpoint,
        ShaderSources::CUBE,
        &texture,
        &VertexData::cube(),
        &spins,
    )
    .context("set up scene")?;
    let setup = backend.take_calls();
    println!(
        "Setup: {} objects, {} calls, {} live resources",
        scene.objects().len(),
        setup.len(),
        backend.live_resources()
    );
    if trace {
        for call in &setup {
            println!("  {call}");
        }
    }

    let mut state = FrameLoopState::new(0.0);
    for frame in 1..=frames {
        state = state.advance(frame as f64 * step);
        scene
            .frame(&mut backend, &state)
            .with_context(|| format!("frame {frame}"))?;
        let calls = backend.take_calls();
        let angles: Vec<String> = scene
            .objects()
            .iter()
            .map(|o| format!("{:.4}", o.spin.rotation_angle(state.angle)))
            .collect();
        println!(
            "Frame {}: angle={:.4} objects=[{}] calls={}",
            state.frame_index,
            state.angle,
            angles.join(", "),
            calls.len()
        );
        if trace {
            for call in &calls {
                println!("  {call}");
            }
        }
    }

    scene.release(&mut backend);
    println!(
        "Released: {} frames presented, {} live resources",
        backend.frames_presented(),
        backend.live_resources()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("spincube-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", spincube_render::crate_info());
            println!("assets: {}", spincube_assets::crate_info());
            println!("mesh: {} vertices", VertexData::cube().vertex_count());
        }
        Commands::Simulate {
            frames,
            step,
            divisors,
            trace,
        } => {
            if let Err(err) = simulate(frames, step, &divisors, trace) {
                tracing::error!("{err:#}");
                return Err(err);
            }
        }
    }

    Ok(())
}
