use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

impl PointerButton {
    pub const ALL: [PointerButton; 3] =
        [PointerButton::Left, PointerButton::Middle, PointerButton::Right];

    pub(crate) fn index(self) -> usize {
        match self {
            PointerButton::Left => 0,
            PointerButton::Middle => 1,
            PointerButton::Right => 2,
        }
    }
}

/// Contract of the externally supplied simulation engine.
///
/// The render loop holds a handle implementing this trait and only ever calls
/// into it from the render thread. Implementors that wrap an engine owned
/// elsewhere implement the trait on their handle type. Every failure crosses
/// this boundary as a `bool`.
pub trait SimulationEngine: Send + 'static {
    fn initialize_graphics(&mut self) -> bool;

    fn start_simulation(
        &mut self,
        config_path: &Path,
        extra_paths: &[PathBuf],
        progress: &mut dyn FnMut(&str),
    ) -> bool;

    fn start_renderer(&mut self) -> bool;

    fn set_dpi(&mut self, _dpi: u32) {}

    fn resize(&mut self, width: u32, height: u32);

    fn tick(&mut self);

    fn draw(&mut self);

    fn pointer_down(&mut self, x: f32, y: f32, button: PointerButton);

    /// `dx`/`dy` are deltas since the previous move of the same button.
    fn pointer_move(&mut self, dx: f32, dy: f32, button: PointerButton);

    fn pointer_up(&mut self, x: f32, y: f32, button: PointerButton);

    fn key_down(&mut self, code: i32, modifiers: u32);

    fn key_up(&mut self, code: i32, modifiers: u32);

    fn char_entered(&mut self, ch: char, modifiers: u32);

    fn wheel(&mut self, direction: f32, axis: u32);
}

/// Everything one-time engine setup needs, resolved on the UI side before the
/// render loop starts.
#[derive(Clone, Debug, PartialEq)]
pub struct StartupConfig {
    pub config_path: PathBuf,
    /// Retried once with this path if `config_path` fails to load.
    pub fallback_config_path: Option<PathBuf>,
    pub extra_paths: Vec<PathBuf>,
    pub scale_factor: f32,
}

impl StartupConfig {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            fallback_config_path: None,
            extra_paths: vec![],
            scale_factor: 1.0,
        }
    }

    pub fn dpi(&self) -> u32 {
        (96.0 * self.scale_factor).round().max(1.0) as u32
    }

    pub(crate) fn fallback(&self) -> Option<&Path> {
        self.fallback_config_path
            .as_deref()
            .filter(|fallback| *fallback != self.config_path.as_path())
    }
}
