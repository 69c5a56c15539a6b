pub use crate::framework::logging::*;
pub use crate::runtime::coordinator::{Coordinator, RecoveryPolicy};
pub use crate::runtime::engine::{
    PointerButton, SimulationEngine, StartupConfig,
};
pub use crate::runtime::frame_clock::FrameClock;
pub use crate::runtime::input::{
    HeldButtons, InputTranslator, LogicalPoint, ModifierState, PointerKind,
    ScrollAxis,
};
pub use crate::runtime::render_loop::{
    LoopMonitor, LoopState, LossNotifier, LossSignal, RenderLoop,
    RenderLoopConfig,
};
pub use crate::runtime::settings::HostSettings;
pub use crate::runtime::storage;
pub use crate::runtime::surface::{
    PresentOutcome, SurfaceManager, SurfaceProvider, SurfaceSize,
};
pub use crate::runtime::task_queue::{DrainReport, TaskQueue};
pub use crate::runtime::ui::{
    ChannelUiContext, UiContext, UiEvent, UiEventReceiver, ui_channel,
};
