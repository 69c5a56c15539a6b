use std::mem;
use std::ops::RangeInclusive;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use super::engine::{PointerButton, SimulationEngine};
use super::task_queue::TaskQueue;
use crate::ternary;

pub const MODIFIER_SHIFT: u32 = 8;
pub const MODIFIER_CONTROL: u32 = 16;

/// Virtual-key codes reported for gamepad buttons; those are polled
/// separately and never reach the engine as keys.
pub const GAMEPAD_KEY_CODES: RangeInclusive<i32> = 195..=218;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LogicalPoint {
    pub x: f32,
    pub y: f32,
}

impl LogicalPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PointerKind {
    Mouse,
    Touch,
    Pen,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScrollAxis {
    Vertical,
    Horizontal,
}

impl ScrollAxis {
    fn code(self) -> u32 {
        match self {
            ScrollAxis::Vertical => 0,
            ScrollAxis::Horizontal => 1,
        }
    }
}

/// Buttons the UI reports as held during a pointer move.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HeldButtons {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

impl HeldButtons {
    pub fn only(button: PointerButton) -> Self {
        let mut held = Self::default();
        match button {
            PointerButton::Left => held.left = true,
            PointerButton::Middle => held.middle = true,
            PointerButton::Right => held.right = true,
        }
        held
    }

    pub fn contains(&self, button: PointerButton) -> bool {
        match button {
            PointerButton::Left => self.left,
            PointerButton::Middle => self.middle,
            PointerButton::Right => self.right,
        }
    }
}

/// Modifier keys as sampled on the UI thread when the key event arrives.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ModifierState {
    pub control: bool,
    pub shift: bool,
}

impl ModifierState {
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.control {
            bits |= MODIFIER_CONTROL;
        }
        if self.shift {
            bits |= MODIFIER_SHIFT;
        }
        bits
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PixelPoint {
    x: f32,
    y: f32,
}

/// Drag deltas that have not reached the render thread yet, summed per
/// button.
#[derive(Default)]
struct MoveBatch {
    deltas: [Option<(f32, f32)>; 3],
    flushed: bool,
}

impl MoveBatch {
    fn add(&mut self, button: PointerButton, dx: f32, dy: f32) {
        let (x, y) = self.deltas[button.index()].unwrap_or_default();
        self.deltas[button.index()] = Some((x + dx, y + dy));
    }

    fn flush(&mut self) -> [Option<(f32, f32)>; 3] {
        self.flushed = true;
        mem::take(&mut self.deltas)
    }
}

/// Turns UI pointer and keyboard events into tasks for the render thread.
///
/// Lives on the UI thread. Drag positions are kept in surface pixels per
/// button and only read here to compute deltas; the engine itself is only
/// touched inside the queued tasks.
///
/// Consecutive moves are merged into the move task still waiting in the
/// queue, so a stopped loop collects one pending move per drag instead of
/// one per UI event. Any other input seals the waiting batch, which keeps
/// moves ordered against presses, releases and keys.
pub struct InputTranslator<E> {
    tasks: TaskQueue<E>,
    scale_factor: f32,
    drag: [Option<PixelPoint>; 3],
    open_moves: Option<Arc<Mutex<MoveBatch>>>,
    keyboard_suppressed: bool,
}

impl<E: SimulationEngine> InputTranslator<E> {
    pub fn new(tasks: TaskQueue<E>, scale_factor: f32) -> Self {
        Self {
            tasks,
            scale_factor,
            drag: [None; 3],
            open_moves: None,
            keyboard_suppressed: false,
        }
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn set_scale_factor(&mut self, scale_factor: f32) {
        self.scale_factor = scale_factor;
    }

    /// While an overlay owns keyboard focus, key and character events are
    /// dropped. Pointer input is unaffected.
    pub fn set_keyboard_suppressed(&mut self, suppressed: bool) {
        self.keyboard_suppressed = suppressed;
    }

    pub fn is_dragging(&self, button: PointerButton) -> bool {
        self.drag[button.index()].is_some()
    }

    pub fn pointer_pressed(
        &mut self,
        kind: PointerKind,
        button: PointerButton,
        position: LogicalPoint,
    ) {
        if kind != PointerKind::Mouse {
            return;
        }

        let point = self.to_pixels(position);
        self.drag[button.index()] = Some(point);

        self.push(move |engine: &mut E| {
            engine.pointer_down(point.x, point.y, button);
        });
    }

    /// Moves every held button that has a recorded start. Held buttons
    /// without one (drag began off-surface) are ignored.
    pub fn pointer_moved(
        &mut self,
        kind: PointerKind,
        held: HeldButtons,
        position: LogicalPoint,
    ) {
        if kind != PointerKind::Mouse {
            return;
        }

        let point = self.to_pixels(position);

        for button in PointerButton::ALL {
            if !held.contains(button) {
                continue;
            }

            let Some(last) = self.drag[button.index()] else {
                trace!("dropping {:?} move without a press", button);
                continue;
            };

            let dx = point.x - last.x;
            let dy = point.y - last.y;
            self.drag[button.index()] = Some(point);
            self.queue_move(button, dx, dy);
        }
    }

    pub fn pointer_released(
        &mut self,
        kind: PointerKind,
        button: PointerButton,
        position: LogicalPoint,
    ) {
        if kind != PointerKind::Mouse {
            return;
        }

        if self.drag[button.index()].take().is_none() {
            return;
        }

        let point = self.to_pixels(position);
        self.push(move |engine: &mut E| {
            engine.pointer_up(point.x, point.y, button);
        });
    }

    /// Only the sign of `delta` survives; scrolling away from the user zooms
    /// in.
    pub fn wheel(&mut self, delta: f32, axis: ScrollAxis) {
        if delta == 0.0 || delta.is_nan() {
            return;
        }

        let direction: f32 = ternary!(delta > 0.0, -1.0, 1.0);
        let axis = axis.code();

        self.push(move |engine: &mut E| {
            engine.wheel(direction, axis);
        });
    }

    pub fn key_down(&mut self, code: i32, modifiers: ModifierState) {
        if self.ignores_key(code) {
            return;
        }

        let modifiers = modifiers.bits();
        self.push(move |engine: &mut E| {
            engine.key_down(code, modifiers);
        });
    }

    pub fn key_up(&mut self, code: i32, modifiers: ModifierState) {
        if self.ignores_key(code) {
            return;
        }

        let modifiers = modifiers.bits();
        self.push(move |engine: &mut E| {
            engine.key_up(code, modifiers);
        });
    }

    pub fn character(&mut self, ch: char, modifiers: ModifierState) {
        if self.keyboard_suppressed {
            return;
        }

        let modifiers = modifiers.bits();
        self.push(move |engine: &mut E| {
            engine.char_entered(ch, modifiers);
        });
    }

    fn push<F>(&mut self, task: F)
    where
        F: FnOnce(&mut E) + Send + 'static,
    {
        self.open_moves = None;
        self.tasks.enqueue(task);
    }

    fn queue_move(&mut self, button: PointerButton, dx: f32, dy: f32) {
        if let Some(open) = &self.open_moves {
            let mut batch = open.lock();
            if !batch.flushed {
                batch.add(button, dx, dy);
                return;
            }
        }

        let batch = Arc::new(Mutex::new(MoveBatch::default()));
        batch.lock().add(button, dx, dy);

        let pending = batch.clone();
        self.tasks.enqueue(move |engine: &mut E| {
            let deltas = pending.lock().flush();
            for button in PointerButton::ALL {
                if let Some((dx, dy)) = deltas[button.index()] {
                    engine.pointer_move(dx, dy, button);
                }
            }
        });
        self.open_moves = Some(batch);
    }

    fn ignores_key(&self, code: i32) -> bool {
        self.keyboard_suppressed || GAMEPAD_KEY_CODES.contains(&code)
    }

    fn to_pixels(&self, position: LogicalPoint) -> PixelPoint {
        PixelPoint {
            x: position.x * self.scale_factor,
            y: position.y * self.scale_factor,
        }
    }
}
