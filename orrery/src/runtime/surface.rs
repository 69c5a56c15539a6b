use std::fmt;

use log::{debug, info, warn};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PresentOutcome {
    Presented,
    DeviceLost,
}

/// Platform capability behind the surface lifecycle.
///
/// One implementation per surface technology (GL over a swap chain panel, a
/// wgpu surface, a headless buffer). Every method is called with the
/// lifecycle lock held; `make_current` and `present` additionally run on the
/// render thread.
pub trait SurfaceProvider: Send + 'static {
    /// Handle to the UI-provided drawing panel.
    type Panel: Clone + Send + 'static;

    fn create(&mut self, panel: &Self::Panel) -> Result<(), String>;

    fn destroy(&mut self);

    /// Tears down and reinitializes the graphics connection without touching
    /// the panel binding.
    fn reset(&mut self) -> Result<(), String>;

    /// Live pixel size of the panel.
    fn size(&self, panel: &Self::Panel) -> SurfaceSize;

    fn make_current(&mut self) -> Result<(), String>;

    fn present(&mut self) -> PresentOutcome;
}

/// Owns the provider and the one surface it may have bound to a panel.
pub struct SurfaceManager<P: SurfaceProvider> {
    provider: P,
    panel: Option<P::Panel>,
    valid: bool,
}

impl<P: SurfaceProvider> SurfaceManager<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            panel: None,
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Binds a surface to `panel`. No-op while a valid surface exists. On
    /// failure the surface stays invalid and the error is only logged;
    /// callers check [`Self::is_valid`].
    pub fn create_surface(&mut self, panel: P::Panel) {
        if self.valid {
            debug!("create_surface ignored; surface already valid");
            return;
        }

        match self.provider.create(&panel) {
            Ok(()) => {
                self.valid = true;
                info!(
                    "surface created ({})",
                    self.provider.size(&panel)
                );
            }
            Err(err) => {
                warn!("failed to create surface: {}", err);
            }
        }

        self.panel = Some(panel);
    }

    /// Rebinds to the most recently used panel.
    pub fn recreate_surface(&mut self) -> Result<(), String> {
        let panel = self
            .panel
            .clone()
            .ok_or_else(|| "no panel has been bound".to_string())?;

        self.create_surface(panel);

        if self.valid {
            Ok(())
        } else {
            Err("surface could not be recreated".to_string())
        }
    }

    pub fn destroy_surface(&mut self) {
        if !self.valid {
            return;
        }

        self.provider.destroy();
        self.valid = false;
        debug!("surface destroyed");
    }

    pub fn reset(&mut self) -> Result<(), String> {
        self.provider.reset()
    }

    pub fn current_size(&self) -> Option<SurfaceSize> {
        if !self.valid {
            return None;
        }

        self.panel
            .as_ref()
            .map(|panel| self.provider.size(panel))
    }

    pub fn make_current(&mut self) -> Result<(), String> {
        if !self.valid {
            return Err("no valid surface to bind".to_string());
        }

        self.provider.make_current()
    }

    pub fn present(&mut self) -> PresentOutcome {
        if !self.valid {
            return PresentOutcome::DeviceLost;
        }

        self.provider.present()
    }
}
