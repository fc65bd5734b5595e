//! Health scheduler: three independent periodic tasks.
//!
//! Each firing runs on its own task behind a reentrancy guard, so a slow
//! run makes the next firing skip instead of queueing. Stopping the
//! scheduler cancels future firings only; a run in flight completes.

use std::future::Future;
use std::time::Duration;

use nodebox_core::event::{events, NodeEvent};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Manager, TaskGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    AddressCheck,
    KeepAlive,
    ImagePull,
}

impl Task {
    fn name(&self) -> &'static str {
        match self {
            Task::AddressCheck => "address-check",
            Task::KeepAlive => "keep-alive",
            Task::ImagePull => "image-pull",
        }
    }

    /// Keep-alive also fires as soon as it is scheduled.
    fn fires_immediately(&self) -> bool {
        matches!(self, Task::KeepAlive)
    }
}

impl Manager {
    /// Start the periodic tasks, replacing any already scheduled.
    pub fn start_scheduler(&self) {
        let timings = &self.inner.config.timings;
        let handles = vec![
            self.schedule(Task::AddressCheck, timings.address_check()),
            self.schedule(Task::KeepAlive, timings.keep_alive()),
            self.schedule(Task::ImagePull, timings.image_pull()),
        ];

        let previous = std::mem::replace(&mut *self.inner.scheduler.lock(), handles);
        for handle in previous {
            handle.abort();
        }

        tracing::info!("Health scheduler started");
        self.emit(NodeEvent::empty(events::SCHEDULER_STARTED));
    }

    /// Cancel future firings of every periodic task.
    pub fn stop_scheduler(&self) {
        let handles = std::mem::take(&mut *self.inner.scheduler.lock());
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            handle.abort();
        }
        tracing::info!("Health scheduler stopped");
        self.emit(NodeEvent::empty(events::SCHEDULER_STOPPED));
    }

    pub fn is_scheduler_running(&self) -> bool {
        !self.inner.scheduler.lock().is_empty()
    }

    fn schedule(&self, task: Task, period: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if !task.fires_immediately() {
                // The first tick completes at once.
                interval.tick().await;
            }
            loop {
                interval.tick().await;
                manager.fire(task);
            }
        })
    }

    /// Run one firing on its own task unless the previous one is still going.
    fn fire(&self, task: Task) {
        let manager = self.clone();
        tokio::spawn(async move {
            let inner = &manager.inner;
            match task {
                Task::AddressCheck => {
                    guarded(task, &inner.guards.address, manager.check_address()).await
                }
                Task::KeepAlive => {
                    guarded(task, &inner.guards.keep_alive, manager.keep_alive()).await
                }
                Task::ImagePull => guarded(task, &inner.guards.pull, manager.pull_all()).await,
            }
        });
    }
}

async fn guarded<T>(
    task: Task,
    guard: &TaskGuard,
    run: impl Future<Output = nodebox_core::Result<T>>,
) {
    let Some(_token) = guard.try_enter() else {
        tracing::debug!(task = task.name(), "Previous run still in flight, skipping");
        return;
    };
    tracing::debug!(task = task.name(), "Running periodic task");
    if let Err(e) = run.await {
        tracing::warn!(task = task.name(), error = %e, "Periodic task failed");
    }
}
