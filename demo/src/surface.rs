use std::sync::Arc;

use log::{debug, trace};
use orrery::prelude::*;
use parking_lot::Mutex;

/// Panel handle shared with the UI loop, which resizes it in place.
pub type Panel = Arc<Mutex<SurfaceSize>>;

/// Headless stand-in for a swap chain: a CPU framebuffer that follows the
/// panel's size.
#[derive(Default)]
pub struct SoftwareSurface {
    framebuffer: Option<Vec<u32>>,
    panel: Option<Panel>,
    generation: u32,
    bound: bool,
}

impl SoftwareSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn panel_size(&self) -> Option<SurfaceSize> {
        self.panel.as_ref().map(|panel| *panel.lock())
    }
}

impl SurfaceProvider for SoftwareSurface {
    type Panel = Panel;

    fn create(&mut self, panel: &Panel) -> Result<(), String> {
        let size = *panel.lock();
        if size.width == 0 || size.height == 0 {
            return Err(format!("panel has no area ({})", size));
        }

        self.framebuffer = Some(vec![0; (size.width * size.height) as usize]);
        self.panel = Some(panel.clone());
        Ok(())
    }

    fn destroy(&mut self) {
        self.framebuffer = None;
        self.bound = false;
    }

    fn reset(&mut self) -> Result<(), String> {
        self.generation += 1;
        debug!("software device reset; generation {}", self.generation);
        Ok(())
    }

    fn size(&self, panel: &Panel) -> SurfaceSize {
        *panel.lock()
    }

    fn make_current(&mut self) -> Result<(), String> {
        if self.framebuffer.is_none() {
            return Err("no framebuffer".to_string());
        }
        self.bound = true;
        Ok(())
    }

    fn present(&mut self) -> PresentOutcome {
        let Some(size) = self.panel_size() else {
            return PresentOutcome::DeviceLost;
        };
        let Some(framebuffer) = self.framebuffer.as_mut() else {
            return PresentOutcome::DeviceLost;
        };
        if !self.bound {
            return PresentOutcome::DeviceLost;
        }

        let pixels = (size.width * size.height) as usize;
        if framebuffer.len() != pixels {
            trace!("resizing framebuffer to {}", size);
            framebuffer.resize(pixels, 0);
        }

        PresentOutcome::Presented
    }
}
