#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use orrery::prelude::*;
use parking_lot::Mutex;

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq)]
pub enum EngineCall {
    InitializeGraphics,
    StartSimulation(PathBuf),
    StartRenderer,
    SetDpi(u32),
    Resize(u32, u32),
    Tick,
    Draw,
    PointerDown(f32, f32, PointerButton),
    PointerMove(f32, f32, PointerButton),
    PointerUp(f32, f32, PointerButton),
    KeyDown(i32, u32),
    KeyUp(i32, u32),
    Char(char, u32),
    Wheel(f32, u32),
    Note(String),
}

pub type EngineLog = Arc<Mutex<Vec<EngineCall>>>;

#[derive(Default)]
pub struct FakeEngine {
    pub log: EngineLog,
    pub fail_graphics: bool,
    pub fail_renderer: bool,
    pub failing_configs: Vec<PathBuf>,
    /// Time `start_simulation` spends "loading".
    pub setup_delay: Duration,
    pub panic_on_draw: bool,
}

impl FakeEngine {
    pub fn new() -> (Self, EngineLog) {
        let engine = Self::default();
        let log = engine.log.clone();
        (engine, log)
    }

    /// Records a marker so tests can see where queued work ran.
    pub fn note(&mut self, label: impl Into<String>) {
        self.record(EngineCall::Note(label.into()));
    }

    fn record(&self, call: EngineCall) {
        self.log.lock().push(call);
    }
}

impl SimulationEngine for FakeEngine {
    fn initialize_graphics(&mut self) -> bool {
        self.record(EngineCall::InitializeGraphics);
        !self.fail_graphics
    }

    fn start_simulation(
        &mut self,
        config_path: &Path,
        _extra_paths: &[PathBuf],
        progress: &mut dyn FnMut(&str),
    ) -> bool {
        self.record(EngineCall::StartSimulation(config_path.to_path_buf()));
        progress("Loading catalogs");
        thread::sleep(self.setup_delay);
        !self.failing_configs.iter().any(|path| path == config_path)
    }

    fn start_renderer(&mut self) -> bool {
        self.record(EngineCall::StartRenderer);
        !self.fail_renderer
    }

    fn set_dpi(&mut self, dpi: u32) {
        self.record(EngineCall::SetDpi(dpi));
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.record(EngineCall::Resize(width, height));
    }

    fn tick(&mut self) {
        self.record(EngineCall::Tick);
    }

    fn draw(&mut self) {
        self.record(EngineCall::Draw);
        if self.panic_on_draw {
            panic!("draw call rejected by the driver");
        }
    }

    fn pointer_down(&mut self, x: f32, y: f32, button: PointerButton) {
        self.record(EngineCall::PointerDown(x, y, button));
    }

    fn pointer_move(&mut self, dx: f32, dy: f32, button: PointerButton) {
        self.record(EngineCall::PointerMove(dx, dy, button));
    }

    fn pointer_up(&mut self, x: f32, y: f32, button: PointerButton) {
        self.record(EngineCall::PointerUp(x, y, button));
    }

    fn key_down(&mut self, code: i32, modifiers: u32) {
        self.record(EngineCall::KeyDown(code, modifiers));
    }

    fn key_up(&mut self, code: i32, modifiers: u32) {
        self.record(EngineCall::KeyUp(code, modifiers));
    }

    fn char_entered(&mut self, ch: char, modifiers: u32) {
        self.record(EngineCall::Char(ch, modifiers));
    }

    fn wheel(&mut self, direction: f32, axis: u32) {
        self.record(EngineCall::Wheel(direction, axis));
    }
}

/// Knobs and counters shared between a test and its [`FakeSurface`].
pub struct SurfaceControl {
    pub creates: AtomicU32,
    pub destroys: AtomicU32,
    pub resets: AtomicU32,
    pub presents: AtomicU64,
    /// Number of upcoming `create` calls that fail.
    pub fail_creates: AtomicU32,
    /// Number of upcoming `reset` calls that fail.
    pub fail_resets: AtomicU32,
    /// Number of upcoming presents that report device loss.
    pub lose_presents: AtomicU32,
    pub size: Mutex<SurfaceSize>,
    /// Signalled from inside `reset` to simulate a loss reported mid-recovery.
    pub notifier: Mutex<Option<LossNotifier>>,
    pub signals_during_reset: Mutex<Vec<LossSignal>>,
    /// Read from inside `reset` to capture what the UI sees mid-recovery.
    pub monitor: Mutex<Option<LoopMonitor>>,
    pub seen_during_reset: Mutex<Vec<(LoopState, bool)>>,
}

impl Default for SurfaceControl {
    fn default() -> Self {
        Self {
            creates: AtomicU32::new(0),
            destroys: AtomicU32::new(0),
            resets: AtomicU32::new(0),
            presents: AtomicU64::new(0),
            fail_creates: AtomicU32::new(0),
            fail_resets: AtomicU32::new(0),
            lose_presents: AtomicU32::new(0),
            size: Mutex::new(SurfaceSize::new(800, 600)),
            notifier: Mutex::new(None),
            signals_during_reset: Mutex::new(vec![]),
            monitor: Mutex::new(None),
            seen_during_reset: Mutex::new(vec![]),
        }
    }
}

impl SurfaceControl {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeSurface {
    pub control: Arc<SurfaceControl>,
}

impl FakeSurface {
    pub fn new() -> (Self, Arc<SurfaceControl>) {
        let control = Arc::new(SurfaceControl::default());
        (
            Self {
                control: control.clone(),
            },
            control,
        )
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl SurfaceProvider for FakeSurface {
    type Panel = ();

    fn create(&mut self, _panel: &()) -> Result<(), String> {
        if take_one(&self.control.fail_creates) {
            return Err("panel not ready".to_string());
        }
        self.control.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&mut self) {
        self.control.destroys.fetch_add(1, Ordering::SeqCst);
    }

    fn reset(&mut self) -> Result<(), String> {
        self.control.resets.fetch_add(1, Ordering::SeqCst);
        if let Some(notifier) = self.control.notifier.lock().as_ref() {
            let signal = notifier.signal();
            self.control.signals_during_reset.lock().push(signal);
        }
        if let Some(monitor) = self.control.monitor.lock().as_ref() {
            let seen = (monitor.state(), monitor.surface_valid());
            self.control.seen_during_reset.lock().push(seen);
        }
        if take_one(&self.control.fail_resets) {
            return Err("device removed".to_string());
        }
        Ok(())
    }

    fn size(&self, _panel: &()) -> SurfaceSize {
        *self.control.size.lock()
    }

    fn make_current(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn present(&mut self) -> PresentOutcome {
        if take_one(&self.control.lose_presents) {
            return PresentOutcome::DeviceLost;
        }
        self.control.presents.fetch_add(1, Ordering::SeqCst);
        PresentOutcome::Presented
    }
}

#[derive(Default)]
pub struct RecordingUi {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &UiEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == event).count()
    }

    pub fn saw(&self, event: &UiEvent) -> bool {
        self.count(event) > 0
    }

    pub fn saw_failure(&self) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| matches!(e, UiEvent::Failed(_)))
    }
}

impl UiContext for RecordingUi {
    fn post(&self, event: UiEvent) {
        self.events.lock().push(event);
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub fn fast_recovery() -> RecoveryPolicy {
    RecoveryPolicy {
        backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        ..RecoveryPolicy::default()
    }
}

pub fn test_config() -> RenderLoopConfig {
    RenderLoopConfig {
        startup: StartupConfig::new("celestia.cfg"),
        max_fps: Some(500.0),
        recovery: fast_recovery(),
    }
}

pub struct Harness {
    pub coordinator: Coordinator<FakeEngine, FakeSurface>,
    pub log: EngineLog,
    pub surface: Arc<SurfaceControl>,
    pub ui: Arc<RecordingUi>,
}

impl Harness {
    pub fn new() -> Self {
        let (engine, _) = FakeEngine::new();
        Self::with(engine, test_config())
    }

    pub fn with(engine: FakeEngine, config: RenderLoopConfig) -> Self {
        let log = engine.log.clone();
        let (provider, surface) = FakeSurface::new();
        let ui = Arc::new(RecordingUi::default());
        let render_loop = RenderLoop::new(engine, provider, ui.clone(), config);

        Self {
            coordinator: Coordinator::new(render_loop),
            log,
            surface,
            ui,
        }
    }

    pub fn render_loop(&self) -> &RenderLoop<FakeEngine, FakeSurface> {
        self.coordinator.render_loop()
    }

    pub fn calls(&self, call: &EngineCall) -> usize {
        self.log.lock().iter().filter(|c| *c == call).count()
    }

    pub fn logged(&self) -> Vec<EngineCall> {
        self.log.lock().clone()
    }

    /// Waits for `n` more presented frames.
    pub fn wait_frames(&self, n: u64) -> bool {
        let target = self.render_loop().frames_presented() + n;
        wait_until(WAIT, || self.render_loop().frames_presented() >= target)
    }
}
