use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::TryRecvError;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use orrery::prelude::*;
use orrery::ternary;
use parking_lot::Mutex;

mod engine;
mod surface;

use engine::OrbitEngine;
use surface::{Panel, SoftwareSurface};

const UI_TICK: Duration = Duration::from_millis(16);
const HIDDEN_FOR: Duration = Duration::from_millis(250);
const RUN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "demo")]
#[command(version)]
#[command(about = "Drives the orrery render loop against a headless surface")]
struct Cli {
    /// Stop after this many presented frames
    #[arg(short, long, default_value = "600")]
    frames: u64,

    /// Frame cap; overrides the stored host settings
    #[arg(long)]
    fps: Option<f32>,

    /// Display scale reported by the (pretend) window system
    #[arg(long, default_value = "1.0")]
    scale: f32,

    /// Catalog to load instead of the configured one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report a device loss once this many frames were presented
    #[arg(long)]
    lose_device_at: Option<u64>,

    /// Hide the app briefly once this many frames were presented
    #[arg(long)]
    hide_at: Option<u64>,

    /// Directory holding host_settings.json
    #[arg(long)]
    settings_dir: Option<PathBuf>,

    /// Write the effective settings back before running
    #[arg(long)]
    save_settings: bool,
}

/// One-shot UI actions keyed by presented frame count.
struct Script {
    lose_device_at: Option<u64>,
    hide_at: Option<u64>,
    resize_at: Option<u64>,
    drag_at: Option<u64>,
    keys_at: Option<u64>,
}

impl Script {
    fn take_due(slot: &mut Option<u64>, frames: u64) -> bool {
        slot.take_if(|at| frames >= *at).is_some()
    }
}

fn main() {
    init_logger();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        error!("demo failed: {}", err);
        std::process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> Result<HostSettings, Box<dyn Error>> {
    let dir = cli.settings_dir.clone().or_else(storage::config_dir);

    let mut settings = match &dir {
        Some(dir) => storage::load_host_settings_if_exists(dir)?
            .unwrap_or_default(),
        None => HostSettings::default(),
    };

    if let Some(fps) = cli.fps {
        settings.max_fps = Some(fps);
    }
    if let Some(config) = &cli.config {
        settings.config_path = Some(config.clone());
    }

    if cli.save_settings {
        let dir = dir.ok_or("no settings directory available")?;
        storage::save_host_settings(&dir, &settings)?;
        info!(
            "saved settings to {}",
            storage::host_settings_path(&dir).display()
        );
    }

    Ok(settings)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let settings = load_settings(&cli)?;
    let config = settings.render_loop_config(cli.scale);

    let (ui, events) = ui_channel();
    let (engine, stats) = OrbitEngine::new();
    let render_loop =
        RenderLoop::new(engine, SoftwareSurface::new(), Arc::new(ui), config);
    let coordinator = Coordinator::new(render_loop);

    let mut input = InputTranslator::new(
        coordinator.render_loop().tasks(),
        settings.scale_factor(cli.scale),
    );

    let panel: Panel = Arc::new(Mutex::new(SurfaceSize::new(1280, 720)));
    let mut panel_pending = !coordinator.on_panel_ready(panel.clone());

    let mut script = Script {
        lose_device_at: cli.lose_device_at,
        hide_at: cli.hide_at,
        resize_at: Some(cli.frames / 2),
        drag_at: Some(cli.frames / 4),
        keys_at: Some(cli.frames / 3),
    };

    let started = Instant::now();
    let mut last_status = Instant::now();

    loop {
        loop {
            match events.try_recv() {
                Ok(UiEvent::LoadingProgress(message)) => debug!("{}", message),
                Ok(UiEvent::LoadingComplete) => info!("loading complete"),
                Ok(UiEvent::Alert(message)) => warn!("alert: {}", message),
                Ok(UiEvent::Recovering) => info!("graphics recovering"),
                Ok(UiEvent::Recovered) => info!("graphics recovered"),
                Ok(UiEvent::Failed(reason)) => {
                    coordinator.shutdown();
                    return Err(reason.into());
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err("render loop dropped its UI context".into());
                }
            }
        }

        if panel_pending {
            panel_pending = !coordinator.on_panel_ready(panel.clone());
        }

        let render_loop = coordinator.render_loop();
        let frames = render_loop.frames_presented();

        if frames >= cli.frames {
            break;
        }
        if started.elapsed() > RUN_TIMEOUT {
            warn!("gave up after {:?} at frame {}", RUN_TIMEOUT, frames);
            break;
        }

        if Script::take_due(&mut script.lose_device_at, frames) {
            info!("reporting device loss at frame {}", frames);
            let signal = coordinator.on_device_lost();
            debug!("loss signal {:?}", signal);
        }

        if Script::take_due(&mut script.hide_at, frames) {
            info!("hiding for {:?}", HIDDEN_FOR);
            coordinator.on_visibility_changed(false);
            thread::sleep(HIDDEN_FOR);
            coordinator.on_visibility_changed(true);
        }

        if Script::take_due(&mut script.resize_at, frames) {
            *panel.lock() = SurfaceSize::new(1920, 1080);
        }

        if Script::take_due(&mut script.drag_at, frames) {
            let left = PointerButton::Left;
            let start = LogicalPoint::new(400.0, 300.0);
            let end = LogicalPoint::new(460.0, 280.0);
            input.pointer_pressed(PointerKind::Mouse, left, start);
            input.pointer_moved(
                PointerKind::Mouse,
                HeldButtons::only(left),
                end,
            );
            input.pointer_released(PointerKind::Mouse, left, end);
            input.wheel(120.0, ScrollAxis::Vertical);
        }

        if Script::take_due(&mut script.keys_at, frames) {
            let modifiers = ModifierState::default();
            input.character('l', modifiers);
            input.key_down(32, modifiers);
            input.key_up(32, modifiers);
        }

        if last_status.elapsed() >= Duration::from_secs(1) {
            let stats = stats.lock().clone();
            info!(
                "frame {} | {:.1} fps | day {:.1} x{} | {} bodies in {}x{}{}",
                frames,
                render_loop.average_fps(),
                stats.sim_days,
                stats.time_scale,
                stats.visible_bodies,
                stats.viewport.0,
                stats.viewport.1,
                ternary!(stats.paused, " (paused)", "")
            );
            last_status = Instant::now();
        }

        thread::sleep(UI_TICK);
    }

    coordinator.shutdown();
    info!(
        "presented {} frames with {} render workers",
        coordinator.render_loop().frames_presented(),
        coordinator.render_loop().workers_spawned()
    );

    Ok(())
}
