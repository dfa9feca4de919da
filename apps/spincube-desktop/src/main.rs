use anyhow::{Context, Result};
use clap::Parser;
use spincube_assets::AssetPaths;
use spincube_common::Rgba8Image;
use spincube_render::{Scene, ShaderSources};
use spincube_render_wgpu::{GpuContext, WgpuBackend};
use spincube_scene::{FrameClock, FrameLoopState, LoopPhase, Spin, VertexData, ViewpointSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

const WINDOW_TITLE: &str = "Spinning Cubes";
const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

#[derive(Parser)]
#[command(name = "spincube-desktop", about = "Two textured cubes spinning in a window")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory searched for assets instead of the defaults
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Texture file applied to every cube
    #[arg(long, default_value = "square.png")]
    texture: String,

    /// Per-cube rotation divisors, one cube per value
    #[arg(long, value_delimiter = ',', default_value = "5,2")]
    divisors: Vec<f32>,
}

/// GPU state that exists only while the window does.
struct Running {
    window: Arc<Window>,
    backend: WgpuBackend,
    scene: Scene,
}

struct SpinApp {
    assets: AssetPaths,
    texture: String,
    mesh: VertexData,
    spins: Vec<Spin>,
    phase: LoopPhase,
    clock: FrameClock,
    state: FrameLoopState,
    running: Option<Running>,
    error: Option<anyhow::Error>,
}

impl SpinApp {
    fn new(assets: AssetPaths, texture: String, spins: Vec<Spin>) -> Self {
        let clock = FrameClock::new();
        Self {
            assets,
            texture,
            mesh: VertexData::cube(),
            spins,
            phase: LoopPhase::Initializing,
            state: FrameLoopState::new(clock.now()),
            clock,
            running: None,
            error: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attrs = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(PhysicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);

        let size = window.inner_size();
        let ctx = GpuContext::new(window.clone(), size.width, size.height)
            .context("create GPU context")?;
        let mut backend = WgpuBackend::new(ctx);

        let viewpoint = ViewpointSettings::default()
            .derive(size.width, size.height)
            .context("derive viewpoint")?;
        let texture: Rgba8Image = self
            .assets
            .load_texture(&self.texture)
            .with_context(|| format!("load texture {}", self.texture))?;
        let scene = Scene::build(
            &mut backend,
            viewpoint,
            ShaderSources::CUBE,
            &texture,
            &self.mesh,
            &self.spins,
        )
        .context("set up scene")?;

        Ok(Running {
            window,
            backend,
            scene,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        tracing::error!("{err:#}");
        self.error = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.phase = self.phase.terminate();
        if let Some(mut running) = self.running.take() {
            running.scene.release(&mut running.backend);
            tracing::info!(
                "released scene after {} frames",
                running.backend.frames_presented()
            );
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for SpinApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() || self.phase == LoopPhase::Terminating {
            return;
        }
        let started = self.start(event_loop).and_then(|running| {
            self.phase = self.phase.start_running()?;
            Ok(running)
        });
        match started {
            Ok(running) => {
                self.state = FrameLoopState::new(self.clock.now());
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if !self.phase.is_running() {
                    return;
                }
                let Some(running) = &mut self.running else {
                    return;
                };
                self.state = self.state.advance(self.clock.now());
                match running.scene.frame(&mut running.backend, &self.state) {
                    Ok(()) => running.window.request_redraw(),
                    Err(err) => {
                        let err = anyhow::Error::new(err).context("render frame");
                        self.fail(event_loop, err);
                    }
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            self.shutdown(event_loop);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("spincube-desktop starting");

    let spins = Spin::about_x_all(&cli.divisors)
        .context("parse --divisors")
        .inspect_err(|e| tracing::error!("{e:#}"))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = SpinApp::new(AssetPaths::new(cli.assets), cli.texture, spins);
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
