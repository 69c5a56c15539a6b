use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::error;
use parking_lot::Mutex;

pub type TaskResult = Result<(), String>;

type Task<C> = Box<dyn FnOnce(&mut C) -> TaskResult + Send + 'static>;

/// Totals from a single [`TaskQueue::drain_and_run_all`] pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
}

/// Mailbox of deferred work that must run on the render thread.
///
/// Cloning yields another handle to the same queue, so the UI thread and the
/// render loop can each hold one. Tasks receive the render-thread context
/// (the simulation handle) as their only argument.
pub struct TaskQueue<C> {
    tasks: Arc<Mutex<Vec<Task<C>>>>,
}

impl<C> Clone for TaskQueue<C> {
    fn clone(&self) -> Self {
        Self {
            tasks: self.tasks.clone(),
        }
    }
}

impl<C> Default for TaskQueue<C> {
    fn default() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<C> fmt::Debug for TaskQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

impl<C> TaskQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` for the next drain. Never runs it inline.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.enqueue_fallible(move |ctx| {
            task(ctx);
            Ok(())
        });
    }

    pub fn enqueue_fallible<F>(&self, task: F)
    where
        F: FnOnce(&mut C) -> TaskResult + Send + 'static,
    {
        self.tasks.lock().push(Box::new(task));
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Runs every task queued at the moment of the call, oldest first.
    ///
    /// The queue is swapped out before anything executes, so tasks that
    /// enqueue more work push it onto the fresh queue for the next drain. A
    /// task that errors or panics is logged and skipped.
    pub fn drain_and_run_all(&self, ctx: &mut C) -> DrainReport {
        let batch = std::mem::take(&mut *self.tasks.lock());
        let mut report = DrainReport::default();

        for task in batch {
            report.executed += 1;

            match panic::catch_unwind(AssertUnwindSafe(|| task(ctx))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    report.failed += 1;
                    error!("render task failed: {}", err);
                }
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        "render task panicked: {}",
                        panic_message(&*payload)
                    );
                }
            }
        }

        report
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
