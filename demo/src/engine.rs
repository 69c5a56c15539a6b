use std::f32::consts::{FRAC_PI_2, TAU};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use orrery::prelude::*;
use orrery::ternary;
use parking_lot::Mutex;

const KEY_SPACE: i32 = 32;
const ORBIT_SPEED: f32 = 0.01;
const ZOOM_STEP: f32 = 1.1;

#[derive(Clone, Debug, PartialEq)]
struct Body {
    name: String,
    radius_au: f32,
    period_days: f32,
}

/// Numbers the UI loop reads back for its status line.
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    pub sim_days: f64,
    pub visible_bodies: usize,
    pub viewport: (u32, u32),
    pub time_scale: f64,
    pub paused: bool,
    pub dpi: u32,
}

pub type SharedStats = Arc<Mutex<EngineStats>>;

/// Toy orrery: bodies on circular orbits, viewed by an orbiting camera.
pub struct OrbitEngine {
    bodies: Vec<Body>,
    yaw: f32,
    pitch: f32,
    distance: f32,
    sim_days: f64,
    time_scale: f64,
    paused: bool,
    viewport: (u32, u32),
    last_tick: Option<Instant>,
    ready: bool,
    stats: SharedStats,
}

impl OrbitEngine {
    pub fn new() -> (Self, SharedStats) {
        let stats = SharedStats::default();
        let engine = Self {
            bodies: vec![],
            yaw: 0.0,
            pitch: 0.3,
            distance: 40.0,
            sim_days: 0.0,
            time_scale: 10.0,
            paused: false,
            viewport: (0, 0),
            last_tick: None,
            ready: false,
            stats: stats.clone(),
        };
        (engine, stats)
    }

    fn load_catalog(path: &Path) -> Result<Vec<Body>, String> {
        let text = fs::read_to_string(path)
            .map_err(|err| format!("{}: {}", path.display(), err))?;

        let mut bodies = vec![];
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let [name, radius, period] = fields[..] else {
                return Err(format!("line {}: expected 3 fields", number + 1));
            };

            let parse = |value: &str| {
                value
                    .parse::<f32>()
                    .map_err(|err| format!("line {}: {}", number + 1, err))
            };

            bodies.push(Body {
                name: name.to_string(),
                radius_au: parse(radius)?,
                period_days: parse(period)?,
            });
        }

        if bodies.is_empty() {
            return Err(format!("{} lists no bodies", path.display()));
        }

        Ok(bodies)
    }

    fn builtin_catalog() -> Vec<Body> {
        [
            ("Mercury", 0.39, 88.0),
            ("Venus", 0.72, 224.7),
            ("Earth", 1.0, 365.25),
            ("Mars", 1.52, 687.0),
            ("Jupiter", 5.2, 4331.0),
            ("Saturn", 9.54, 10747.0),
            ("Uranus", 19.2, 30589.0),
            ("Neptune", 30.06, 59800.0),
        ]
        .into_iter()
        .map(|(name, radius_au, period_days)| Body {
            name: name.to_string(),
            radius_au,
            period_days,
        })
        .collect()
    }

    /// Counts bodies whose projected position lands inside the viewport.
    fn visible_bodies(&self) -> usize {
        let (width, height) = self.viewport;
        if width == 0 || height == 0 {
            return 0;
        }

        let aspect = width as f32 / height as f32;
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();

        self.bodies
            .iter()
            .filter(|body| {
                let angle =
                    TAU * (self.sim_days as f32 / body.period_days).fract();
                let (x, z) = (
                    body.radius_au * angle.cos(),
                    body.radius_au * angle.sin(),
                );

                let view_x = x * cos_yaw - z * sin_yaw;
                let view_z = x * sin_yaw + z * cos_yaw;
                let view_y = -view_z * sin_pitch;
                let depth = self.distance + view_z * cos_pitch;

                if depth <= 0.0 {
                    return false;
                }

                let screen_x = view_x / depth / aspect;
                let screen_y = view_y / depth;
                screen_x.abs() <= 1.0 && screen_y.abs() <= 1.0
            })
            .count()
    }
}

impl SimulationEngine for OrbitEngine {
    fn initialize_graphics(&mut self) -> bool {
        debug!("software graphics initialized");
        true
    }

    fn start_simulation(
        &mut self,
        config_path: &Path,
        extra_paths: &[PathBuf],
        progress: &mut dyn FnMut(&str),
    ) -> bool {
        progress(&format!("Reading {}", config_path.display()));

        let mut bodies = if config_path.exists() {
            match Self::load_catalog(config_path) {
                Ok(bodies) => bodies,
                Err(err) => {
                    warn!("catalog rejected: {}", err);
                    return false;
                }
            }
        } else {
            progress("Using built-in catalog");
            Self::builtin_catalog()
        };

        for path in extra_paths {
            progress(&format!("Reading {}", path.display()));
            match Self::load_catalog(path) {
                Ok(extra) => bodies.extend(extra),
                Err(err) => warn!("skipping extra catalog: {}", err),
            }
        }

        for body in &bodies {
            progress(&format!("Loaded {}", body.name));
        }

        info!("catalog holds {} bodies", bodies.len());
        self.bodies = bodies;
        true
    }

    fn start_renderer(&mut self) -> bool {
        self.ready = !self.bodies.is_empty();
        self.ready
    }

    fn set_dpi(&mut self, dpi: u32) {
        self.stats.lock().dpi = dpi;
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!("viewport {}x{}", width, height);
        self.viewport = (width, height);
    }

    fn tick(&mut self) {
        let now = Instant::now();
        let elapsed = self
            .last_tick
            .map(|last| now.duration_since(last).as_secs_f64())
            .unwrap_or_default();
        self.last_tick = Some(now);

        if !self.paused {
            self.sim_days += elapsed * self.time_scale;
        }
    }

    fn draw(&mut self) {
        if !self.ready {
            return;
        }

        let visible = self.visible_bodies();
        let mut stats = self.stats.lock();
        stats.sim_days = self.sim_days;
        stats.visible_bodies = visible;
        stats.viewport = self.viewport;
        stats.time_scale = self.time_scale;
        stats.paused = self.paused;
    }

    fn pointer_down(&mut self, x: f32, y: f32, button: PointerButton) {
        debug!("{:?} down at {:.0},{:.0}", button, x, y);
    }

    fn pointer_move(&mut self, dx: f32, dy: f32, button: PointerButton) {
        match button {
            PointerButton::Left => {
                self.yaw = (self.yaw + dx * ORBIT_SPEED).rem_euclid(TAU);
                self.pitch = (self.pitch + dy * ORBIT_SPEED)
                    .clamp(-FRAC_PI_2, FRAC_PI_2);
            }
            PointerButton::Right => {
                self.distance = (self.distance + dy * 0.1).max(1.0);
            }
            PointerButton::Middle => {}
        }
    }

    fn pointer_up(&mut self, x: f32, y: f32, button: PointerButton) {
        debug!("{:?} up at {:.0},{:.0}", button, x, y);
    }

    fn key_down(&mut self, code: i32, _modifiers: u32) {
        if code == KEY_SPACE {
            self.paused = !self.paused;
            info!("simulation {}", ternary!(self.paused, "paused", "resumed"));
        }
    }

    fn key_up(&mut self, _code: i32, _modifiers: u32) {}

    fn char_entered(&mut self, ch: char, _modifiers: u32) {
        match ch {
            'l' => self.time_scale *= 10.0,
            'k' => self.time_scale /= 10.0,
            'j' => self.time_scale = -self.time_scale,
            _ => return,
        }
        info!("time scale {}", self.time_scale);
    }

    fn wheel(&mut self, direction: f32, _axis: u32) {
        let zoomed = if direction < 0.0 {
            self.distance / ZOOM_STEP
        } else {
            self.distance * ZOOM_STEP
        };
        self.distance = zoomed.max(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_loads_when_config_is_missing() {
        let (mut engine, _) = OrbitEngine::new();
        let mut messages = vec![];

        let loaded = engine.start_simulation(
            Path::new("does/not/exist.cfg"),
            &[],
            &mut |message: &str| messages.push(message.to_string()),
        );

        assert!(loaded);
        assert!(engine.start_renderer());
        assert!(messages.contains(&"Using built-in catalog".to_string()));
        assert!(messages.contains(&"Loaded Earth".to_string()));
    }

    #[test]
    fn wheel_zooms_toward_the_scene() {
        let (mut engine, _) = OrbitEngine::new();
        let before = engine.distance;

        engine.wheel(-1.0, 0);
        assert!(engine.distance < before);

        engine.wheel(1.0, 0);
        assert!((engine.distance - before).abs() < 1e-3);
    }

    #[test]
    fn draw_publishes_stats() {
        let (mut engine, stats) = OrbitEngine::new();
        engine.start_simulation(Path::new("missing.cfg"), &[], &mut |_: &str| {});
        engine.start_renderer();
        engine.resize(800, 600);
        engine.draw();

        let stats = stats.lock();
        assert_eq!(stats.viewport, (800, 600));
        assert!(stats.visible_bodies > 0);
    }
}
