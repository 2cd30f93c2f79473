// =============================================================================
// Scheduler
// =============================================================================
//
// A cooperative, single-threaded event loop running named recurring tasks
// (spec §4.11). Tasks never overlap with themselves; a slow tick runs the
// next immediately after completion. Errors in a task are logged but never
// terminate the scheduler.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::error;

use crate::retry::CancelToken;

pub struct Task {
    pub name: &'static str,
    pub interval: Duration,
    pub immediate: bool,
    action: Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), crate::error::EngineError>> + Send>> + Send + Sync>,
}

impl Task {
    pub fn new<F, Fut>(name: &'static str, interval: Duration, immediate: bool, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), crate::error::EngineError>> + Send + 'static,
    {
        Self { name, interval, immediate, action: Box::new(move || Box::pin(action())) }
    }
}

pub struct Scheduler {
    tasks: Vec<Task>,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(cancel: CancelToken) -> Self {
        Self { tasks: Vec::new(), cancel }
    }

    pub fn register(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Runs every registered task as its own cooperative loop; each loop
    /// only ever has one tick in flight (a slow tick delays, never
    /// overlaps, the next).
    pub async fn run(self) {
        let mut handles = Vec::new();
        for task in self.tasks {
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                if task.immediate {
                    if let Err(e) = (task.action)().await {
                        error!(task = task.name, error = %e, "scheduled task failed");
                    }
                }
                let mut ticker = tokio::time::interval(task.interval);
                ticker.tick().await; // consume the immediate first tick
                while !cancel.is_cancelled() {
                    ticker.tick().await;
                    if cancel.is_cancelled() {
                        break;
                    }
                    if let Err(e) = (task.action)().await {
                        error!(task = task.name, error = %e, "scheduled task failed");
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
