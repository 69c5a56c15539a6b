use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;

use super::coordinator::{self, RecoveryOutcome, RecoveryPolicy};
use super::engine::{SimulationEngine, StartupConfig};
use super::frame_clock::FrameClock;
use super::surface::{
    PresentOutcome, SurfaceManager, SurfaceProvider, SurfaceSize,
};
use super::task_queue::{TaskQueue, panic_message};
use super::ui::{UiContext, UiEvent};
use crate::framework::util::AtomicF32;

const RENDER_THREAD_NAME: &str = "orrery-render";
const FPS_REPORT_INTERVAL: Duration = Duration::from_secs(2);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoopState {
    Stopped,
    Running,
    Recovering,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LossSignal {
    /// Recovery will run at the start of the next iteration.
    Accepted,
    /// A recovery is already pending or in progress.
    Coalesced,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderLoopConfig {
    pub startup: StartupConfig,
    pub max_fps: Option<f32>,
    pub recovery: RecoveryPolicy,
}

impl RenderLoopConfig {
    pub fn new(startup: StartupConfig) -> Self {
        Self {
            startup,
            max_fps: None,
            recovery: RecoveryPolicy::default(),
        }
    }
}

pub type PreRenderTask<E> = Box<dyn FnMut(&mut E) + Send + 'static>;

pub(crate) struct Lifecycle<E, P: SurfaceProvider> {
    pub(crate) surface: SurfaceManager<P>,
    pub(crate) engine: E,
    pub(crate) last_size: Option<SurfaceSize>,
    setup_complete: bool,
}

#[derive(Debug)]
pub(crate) struct LoopStatus {
    state: LoopState,
    /// Bumped by every start and stop. A worker only acts while the
    /// generation it was spawned with is still current.
    generation: u64,
    surface_valid: bool,
    pending_loss: bool,
    fatal: bool,
    consecutive_recoveries: u32,
    frames_since_recovery: u64,
}

impl LoopStatus {
    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            debug!("loop state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// State change from a worker; ignored once that worker was stopped.
    pub(crate) fn publish(&mut self, generation: u64, state: LoopState) {
        if self.is_current(generation) {
            self.set_state(state);
        }
    }

    fn signal_loss(&mut self) -> LossSignal {
        if self.state == LoopState::Recovering || self.pending_loss {
            return LossSignal::Coalesced;
        }
        self.pending_loss = true;
        LossSignal::Accepted
    }

    /// Moves a pending loss into the Recovering state and returns the
    /// 1-based attempt number.
    fn begin_recovery(&mut self, generation: u64) -> Option<u32> {
        if !self.pending_loss || !self.is_current(generation) {
            return None;
        }
        self.pending_loss = false;
        self.consecutive_recoveries += 1;
        self.frames_since_recovery = 0;
        self.set_state(LoopState::Recovering);
        Some(self.consecutive_recoveries)
    }

    pub(crate) fn abandon_recovery(&mut self, attempt: u32) {
        self.pending_loss = true;
        self.consecutive_recoveries = attempt.saturating_sub(1);
    }
}

/// Read-only view of the loop status that never touches the lifecycle lock,
/// so it is safe to query from inside surface or engine callbacks.
#[derive(Clone)]
pub struct LoopMonitor {
    status: Arc<Mutex<LoopStatus>>,
}

impl LoopMonitor {
    pub fn state(&self) -> LoopState {
        self.status.lock().state
    }

    pub fn surface_valid(&self) -> bool {
        self.status.lock().surface_valid
    }

    pub fn is_fatal(&self) -> bool {
        self.status.lock().fatal
    }
}

/// Cheap handle for reporting device loss from outside the render loop
/// (display reconfiguration callbacks, driver notifications).
#[derive(Clone)]
pub struct LossNotifier {
    status: Arc<Mutex<LoopStatus>>,
}

impl LossNotifier {
    pub fn signal(&self) -> LossSignal {
        let signal = self.status.lock().signal_loss();
        debug!("device loss signal {:?}", signal);
        signal
    }
}

pub(crate) struct Shared<E, P: SurfaceProvider> {
    pub(crate) lifecycle: Mutex<Lifecycle<E, P>>,
    pub(crate) status: Arc<Mutex<LoopStatus>>,
    pub(crate) config: RenderLoopConfig,
    pub(crate) ui: Arc<dyn UiContext>,
    tasks: TaskQueue<E>,
    pre_render: Mutex<Option<PreRenderTask<E>>>,
    frames_presented: AtomicU64,
    average_fps: AtomicF32,
}

impl<E, P: SurfaceProvider> Shared<E, P> {
    pub(crate) fn sync_surface_flag(&self, surface: &SurfaceManager<P>) {
        self.status.lock().surface_valid = surface.is_valid();
    }

    fn stop_requested(&self, generation: u64) -> bool {
        !self.status.lock().is_current(generation)
    }

    /// Returns false if a stop arrived before `duration` elapsed.
    pub(crate) fn sleep_unless_stopped(
        &self,
        generation: u64,
        duration: Duration,
    ) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested(generation) {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(STOP_POLL_INTERVAL));
        }
    }

    fn record_presented(&self) {
        self.frames_presented.fetch_add(1, Ordering::Relaxed);

        let mut status = self.status.lock();
        status.frames_since_recovery += 1;
        if status.consecutive_recoveries > 0
            && status.frames_since_recovery >= self.config.recovery.grace_frames
        {
            debug!(
                "presented {} frames since recovery; resetting recovery budget",
                status.frames_since_recovery
            );
            status.consecutive_recoveries = 0;
        }
    }
}

enum WorkerExit {
    Stopped,
    Fatal(String),
}

#[derive(Default)]
struct Workers {
    current: Option<JoinHandle<()>>,
    /// Stopped workers still finishing their last frame or setup.
    retiring: Vec<JoinHandle<()>>,
}

impl Workers {
    fn retire_current(&mut self) -> bool {
        match self.current.take() {
            Some(handle) => {
                self.retiring.push(handle);
                true
            }
            None => false,
        }
    }

    fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            mem::take(&mut self.retiring)
                .into_iter()
                .partition(|handle| handle.is_finished());
        self.retiring = running;
        finished.into_iter().for_each(join_worker);
    }

    fn is_alive(&self) -> bool {
        self.current
            .iter()
            .chain(&self.retiring)
            .any(|handle| !handle.is_finished())
    }
}

/// Owns the render thread and the state machine around it.
///
/// The worker takes the lifecycle lock when it starts and keeps it until it
/// exits, so nothing can mutate the surface or engine mid-frame. Everything
/// the UI thread needs while the loop runs (state, surface validity, the task
/// queue) lives outside that lock, and neither `start` nor `stop` ever waits
/// for a worker.
pub struct RenderLoop<E: SimulationEngine, P: SurfaceProvider> {
    shared: Arc<Shared<E, P>>,
    workers: Mutex<Workers>,
    workers_spawned: AtomicU64,
}

impl<E: SimulationEngine, P: SurfaceProvider> RenderLoop<E, P> {
    pub fn new(
        engine: E,
        provider: P,
        ui: Arc<dyn UiContext>,
        config: RenderLoopConfig,
    ) -> Self {
        let lifecycle = Lifecycle {
            surface: SurfaceManager::new(provider),
            engine,
            last_size: None,
            setup_complete: false,
        };

        let status = LoopStatus {
            state: LoopState::Stopped,
            generation: 0,
            surface_valid: false,
            pending_loss: false,
            fatal: false,
            consecutive_recoveries: 0,
            frames_since_recovery: 0,
        };

        Self {
            shared: Arc::new(Shared {
                lifecycle: Mutex::new(lifecycle),
                status: Arc::new(Mutex::new(status)),
                config,
                ui,
                tasks: TaskQueue::new(),
                pre_render: Mutex::new(None),
                frames_presented: AtomicU64::new(0),
                average_fps: AtomicF32::new(0.0),
            }),
            workers: Mutex::new(Workers::default()),
            workers_spawned: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> LoopState {
        self.shared.status.lock().state
    }

    pub fn surface_valid(&self) -> bool {
        self.shared.status.lock().surface_valid
    }

    /// True once setup or recovery has failed for good.
    pub fn is_fatal(&self) -> bool {
        self.shared.status.lock().fatal
    }

    pub fn monitor(&self) -> LoopMonitor {
        LoopMonitor {
            status: self.shared.status.clone(),
        }
    }

    /// True while any render thread, including one that was already told to
    /// stop, has yet to exit.
    pub fn worker_alive(&self) -> bool {
        self.workers.lock().is_alive()
    }

    /// A handle UI code uses to hand work to the render thread.
    pub fn tasks(&self) -> TaskQueue<E> {
        self.shared.tasks.clone()
    }

    pub fn loss_notifier(&self) -> LossNotifier {
        LossNotifier {
            status: self.shared.status.clone(),
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.shared.frames_presented.load(Ordering::Relaxed)
    }

    pub fn average_fps(&self) -> f32 {
        self.shared.average_fps.load(Ordering::Relaxed)
    }

    pub fn workers_spawned(&self) -> u64 {
        self.workers_spawned.load(Ordering::Relaxed)
    }

    /// Runs `task` once per frame on the render thread, after queued tasks
    /// and before the simulation ticks.
    pub fn set_pre_render_task<F>(&self, task: F)
    where
        F: FnMut(&mut E) + Send + 'static,
    {
        *self.shared.pre_render.lock() = Some(Box::new(task));
    }

    pub fn clear_pre_render_task(&self) {
        self.shared.pre_render.lock().take();
    }

    pub fn signal_device_lost(&self) -> LossSignal {
        self.loss_notifier().signal()
    }

    /// Spawns the render worker. Returns false without side effects when the
    /// loop is already running or recovering, when no valid surface exists,
    /// or after a fatal failure. A worker still winding down from an earlier
    /// stop is left to finish; the new one waits for it on the lifecycle lock.
    pub fn start(&self) -> bool {
        let mut workers = self.workers.lock();

        let generation = {
            let mut status = self.shared.status.lock();
            if status.fatal {
                warn!("render loop start refused after fatal failure");
                return false;
            }
            if status.state != LoopState::Stopped {
                debug!("render loop start ignored; already {:?}", status.state);
                return false;
            }
            if !status.surface_valid {
                warn!("render loop start skipped; no valid surface");
                return false;
            }
            status.generation += 1;
            status.set_state(LoopState::Running);
            status.generation
        };

        workers.retire_current();
        workers.reap_finished();

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(RENDER_THREAD_NAME.to_string())
            .spawn(move || run_worker(shared, generation));

        match spawned {
            Ok(handle) => {
                workers.current = Some(handle);
                self.workers_spawned.fetch_add(1, Ordering::Relaxed);
                info!("render loop started");
                true
            }
            Err(err) => {
                error!("failed to spawn render thread: {}", err);
                self.shared
                    .status
                    .lock()
                    .publish(generation, LoopState::Stopped);
                false
            }
        }
    }

    /// Publishes `Stopped` immediately and tells the worker to exit after its
    /// current frame. Never waits for the worker, so it is safe from the UI
    /// thread during a long setup and from a task on the render thread.
    pub fn stop(&self) {
        {
            let mut status = self.shared.status.lock();
            status.generation += 1;
            status.set_state(LoopState::Stopped);
        }

        let mut workers = self.workers.lock();
        if workers.retire_current() {
            info!("render loop stopping");
        }
        workers.reap_finished();
    }

    /// Runs `f` against the surface under the lifecycle lock. Blocks while
    /// a worker (even a stopped one finishing its frame) holds the lock, so
    /// callers only use it when the loop is stopped.
    pub(crate) fn with_surface<R>(
        &self,
        f: impl FnOnce(&mut SurfaceManager<P>) -> R,
    ) -> R {
        let mut lifecycle = self.shared.lifecycle.lock();
        let result = f(&mut lifecycle.surface);
        self.shared.sync_surface_flag(&lifecycle.surface);
        result
    }
}

impl<E: SimulationEngine, P: SurfaceProvider> Drop for RenderLoop<E, P> {
    fn drop(&mut self) {
        self.stop();

        let workers = mem::take(&mut *self.workers.lock());
        workers
            .current
            .into_iter()
            .chain(workers.retiring)
            .for_each(join_worker);
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("render thread panicked");
    }
}

fn run_worker<E: SimulationEngine, P: SurfaceProvider>(
    shared: Arc<Shared<E, P>>,
    generation: u64,
) {
    let mut lifecycle = shared.lifecycle.lock();

    // An older worker may have failed while this one waited for the lock.
    let already_fatal = shared.status.lock().fatal;
    if already_fatal {
        shared.status.lock().publish(generation, LoopState::Stopped);
        return;
    }

    let driven = panic::catch_unwind(AssertUnwindSafe(|| {
        drive(&shared, &mut lifecycle, generation)
    }));
    let exit = driven.unwrap_or_else(|payload| {
        WorkerExit::Fatal(format!(
            "render thread panicked: {}",
            panic_message(&*payload)
        ))
    });
    shared.sync_surface_flag(&lifecycle.surface);

    if let WorkerExit::Fatal(reason) = &exit {
        error!("render loop failed: {}", reason);
        shared.status.lock().fatal = true;
        shared.ui.post(UiEvent::Failed(reason.clone()));
    }

    shared.status.lock().publish(generation, LoopState::Stopped);
}

fn drive<E: SimulationEngine, P: SurfaceProvider>(
    shared: &Shared<E, P>,
    lifecycle: &mut Lifecycle<E, P>,
    generation: u64,
) -> WorkerExit {
    if !lifecycle.setup_complete {
        if let Err(err) = lifecycle.surface.make_current() {
            return WorkerExit::Fatal(format!(
                "could not bind graphics context: {}",
                err
            ));
        }
        if let Err(reason) = setup(shared, lifecycle) {
            return WorkerExit::Fatal(reason);
        }
        lifecycle.setup_complete = true;
    } else if let Err(err) = lifecycle.surface.make_current() {
        warn!("could not rebind graphics context: {}", err);
        shared.status.lock().signal_loss();
    }

    let mut clock = FrameClock::new(shared.config.max_fps);
    let mut last_fps_report = Instant::now();

    loop {
        if shared.stop_requested(generation) {
            return WorkerExit::Stopped;
        }

        let attempt = shared.status.lock().begin_recovery(generation);
        if let Some(attempt) = attempt {
            match coordinator::recover_surface(
                shared, lifecycle, attempt, generation,
            ) {
                Ok(RecoveryOutcome::Recovered) => {
                    clock.reset_timing();
                    continue;
                }
                Ok(RecoveryOutcome::Interrupted) => {
                    return WorkerExit::Stopped;
                }
                Err(reason) => return WorkerExit::Fatal(reason),
            }
        }

        let now = Instant::now();
        clock.begin_frame(now);

        match render_frame(shared, lifecycle) {
            PresentOutcome::Presented => shared.record_presented(),
            PresentOutcome::DeviceLost => {
                warn!("presentation failed; graphics device lost");
                shared.status.lock().signal_loss();
                continue;
            }
        }

        shared
            .average_fps
            .store(clock.average_fps(), Ordering::Relaxed);

        if now.duration_since(last_fps_report) >= FPS_REPORT_INTERVAL {
            trace!("average fps: {:.1}", clock.average_fps());
            last_fps_report = now;
        }

        if let Some(wait) = clock.remaining(Instant::now()) {
            shared.sleep_unless_stopped(generation, wait);
        }
    }
}

fn setup<E: SimulationEngine, P: SurfaceProvider>(
    shared: &Shared<E, P>,
    lifecycle: &mut Lifecycle<E, P>,
) -> Result<(), String> {
    let startup = &shared.config.startup;
    let engine = &mut lifecycle.engine;

    if !engine.initialize_graphics() {
        return Err("graphics initialization failed".to_string());
    }

    let ui = shared.ui.clone();
    let mut progress = move |message: &str| {
        ui.post(UiEvent::LoadingProgress(message.to_string()));
    };

    if !engine.start_simulation(
        &startup.config_path,
        &startup.extra_paths,
        &mut progress,
    ) {
        let Some(fallback) = startup.fallback() else {
            return Err(format!(
                "failed to load {}",
                startup.config_path.display()
            ));
        };

        warn!(
            "failed to load {}; retrying with {}",
            startup.config_path.display(),
            fallback.display()
        );
        shared.ui.post(UiEvent::Alert(
            "Error loading data, falling back to the default configuration."
                .to_string(),
        ));

        if !engine.start_simulation(
            fallback,
            &startup.extra_paths,
            &mut progress,
        ) {
            return Err(format!("failed to load {}", fallback.display()));
        }
    }

    if !engine.start_renderer() {
        return Err("renderer failed to start".to_string());
    }

    engine.set_dpi(startup.dpi());
    shared.ui.post(UiEvent::LoadingComplete);
    info!("simulation setup complete");

    Ok(())
}

fn render_frame<E: SimulationEngine, P: SurfaceProvider>(
    shared: &Shared<E, P>,
    lifecycle: &mut Lifecycle<E, P>,
) -> PresentOutcome {
    let report = shared.tasks.drain_and_run_all(&mut lifecycle.engine);
    if report.failed > 0 {
        debug!("{} of {} tasks failed", report.failed, report.executed);
    }

    let mut pre_render = shared.pre_render.lock();
    let panicked = pre_render.as_mut().and_then(|task| {
        let engine = &mut lifecycle.engine;
        panic::catch_unwind(AssertUnwindSafe(|| task(engine))).err()
    });
    if let Some(payload) = panicked {
        error!(
            "pre-render task panicked and was removed: {}",
            panic_message(&*payload)
        );
        *pre_render = None;
    }
    drop(pre_render);

    if let Some(size) = lifecycle.surface.current_size() {
        if lifecycle.last_size != Some(size) {
            debug!("surface size changed to {}", size);
            lifecycle.engine.resize(size.width, size.height);
            lifecycle.last_size = Some(size);
        }
    }

    lifecycle.engine.tick();
    lifecycle.engine.draw();
    lifecycle.surface.present()
}
