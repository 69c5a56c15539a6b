pub mod framework;
pub mod runtime;

pub use framework::prelude;
pub use runtime::coordinator::Coordinator;
pub use runtime::render_loop::{LoopState, RenderLoop};
