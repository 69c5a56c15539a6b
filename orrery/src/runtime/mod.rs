pub mod coordinator;
pub mod engine;
pub mod frame_clock;
pub mod input;
pub mod render_loop;
pub mod settings;
pub mod storage;
pub mod surface;
pub mod task_queue;
pub mod ui;
