use std::time::Duration;

use log::{debug, info, warn};

use super::engine::SimulationEngine;
use super::render_loop::{
    Lifecycle, LoopState, LossSignal, RenderLoop, Shared,
};
use super::surface::SurfaceProvider;
use super::ui::UiEvent;

/// Bounds device-loss recovery so a persistently failing device ends in a
/// fatal error instead of rebuilding the surface forever.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecoveryPolicy {
    /// Recoveries allowed without `grace_frames` good frames in between.
    pub max_consecutive: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub grace_frames: u64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive: 3,
            backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            grace_frames: 120,
        }
    }
}

impl RecoveryPolicy {
    /// Delay before the `attempt`-th consecutive rebuild (1-based), doubling
    /// each time up to `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }
}

pub(crate) enum RecoveryOutcome {
    Recovered,
    /// A stop arrived during backoff. The loss stays pending for the next
    /// start.
    Interrupted,
}

/// Runs on the render thread with the lifecycle lock held and the loop in
/// [`LoopState::Recovering`].
pub(crate) fn recover_surface<E: SimulationEngine, P: SurfaceProvider>(
    shared: &Shared<E, P>,
    lifecycle: &mut Lifecycle<E, P>,
    attempt: u32,
    generation: u64,
) -> Result<RecoveryOutcome, String> {
    let policy = &shared.config.recovery;

    if attempt > policy.max_consecutive {
        return Err(format!(
            "graphics device lost {} times in a row; giving up",
            attempt
        ));
    }

    warn!(
        "recovering from device loss (attempt {}/{})",
        attempt, policy.max_consecutive
    );
    shared.ui.post(UiEvent::Recovering);

    let backoff = policy.backoff_for(attempt);
    if !shared.sleep_unless_stopped(generation, backoff) {
        shared.status.lock().abandon_recovery(attempt);
        return Ok(RecoveryOutcome::Interrupted);
    }

    lifecycle.surface.destroy_surface();
    shared.sync_surface_flag(&lifecycle.surface);

    lifecycle
        .surface
        .reset()
        .map_err(|err| format!("graphics reset failed: {}", err))?;

    let recreated = lifecycle.surface.recreate_surface();
    shared.sync_surface_flag(&lifecycle.surface);
    recreated?;

    lifecycle
        .surface
        .make_current()
        .map_err(|err| format!("could not bind recreated surface: {}", err))?;

    // Forces a resize notification on the next frame.
    lifecycle.last_size = None;

    // A stop during the rebuild keeps the loop Stopped; the surface is
    // already usable for the next start.
    shared.status.lock().publish(generation, LoopState::Running);
    shared.ui.post(UiEvent::Recovered);
    info!("surface recovered");

    Ok(RecoveryOutcome::Recovered)
}

/// Routes panel, visibility and device-loss signals from the UI thread into
/// the render loop.
pub struct Coordinator<E: SimulationEngine, P: SurfaceProvider> {
    render_loop: RenderLoop<E, P>,
}

impl<E: SimulationEngine, P: SurfaceProvider> Coordinator<E, P> {
    pub fn new(render_loop: RenderLoop<E, P>) -> Self {
        Self { render_loop }
    }

    pub fn render_loop(&self) -> &RenderLoop<E, P> {
        &self.render_loop
    }

    /// Creates the surface (once) and starts the loop. Returns whether the
    /// loop is now active. On false the caller retries on its next layout or
    /// visibility signal, though after a fatal failure it stays false.
    pub fn on_panel_ready(&self, panel: P::Panel) -> bool {
        if self.render_loop.state() != LoopState::Stopped {
            debug!("panel ready while loop is active; nothing to do");
            return self.render_loop.surface_valid();
        }

        // A stopped worker may still hold the lifecycle lock; only take it
        // when there is a surface to create.
        if !self.render_loop.surface_valid() {
            let valid = self.render_loop.with_surface(|surface| {
                surface.create_surface(panel);
                surface.is_valid()
            });

            if !valid {
                warn!("surface unavailable; waiting for the next panel signal");
                return false;
            }
        }

        if self.render_loop.start() {
            return true;
        }

        let active = self.render_loop.state() != LoopState::Stopped;
        if !active {
            warn!("surface is ready but the render loop did not start");
        }
        active
    }

    /// Hidden stops the loop but keeps the surface for a fast resume.
    pub fn on_visibility_changed(&self, visible: bool) {
        if !visible {
            debug!("application hidden");
            self.render_loop.stop();
            return;
        }

        debug!("application shown");
        if self.render_loop.surface_valid() {
            self.render_loop.start();
        } else {
            debug!("no valid surface yet; loop stays stopped");
        }
    }

    pub fn on_device_lost(&self) -> LossSignal {
        self.render_loop.signal_device_lost()
    }

    /// Stops the loop and releases the surface. Unlike a plain stop this
    /// waits for the render thread to let go of the surface.
    pub fn shutdown(&self) {
        self.render_loop.stop();
        self.render_loop
            .with_surface(|surface| surface.destroy_surface());
    }
}
