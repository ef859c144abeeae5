//! Progress driver - advances one downloading task on a fixed tick
//!
//! A driver owns nothing but its task id. Every tick is a single atomic
//! update against the store, and the driver stops itself as soon as the
//! task is gone or no longer downloading.

use super::manager::EngineInner;
use super::registry::Registration;
use super::transfer::{format_speed, Step};
use super::transition;
use crate::error::EngineError;
use mediadl_types::{EngineEvent, TaskStatus};
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// What a single tick did to the task
#[derive(Debug, Clone, PartialEq)]
enum TickOutcome {
    Advanced { progress: f64, speed: String },
    Completed,
    Failed(String),
    /// Task vanished or left the downloading state
    Stopped,
}

pub(crate) struct ProgressDriver {
    id: Uuid,
    inner: Arc<EngineInner>,
}

impl ProgressDriver {
    pub(crate) fn new(id: Uuid, inner: Arc<EngineInner>) -> Self {
        Self { id, inner }
    }

    /// Run until the task completes, fails, or the registration is cancelled
    pub(crate) async fn run(self, registration: Registration) {
        let id = self.id;
        let token = registration.token.clone();

        if !token.is_cancelled() && self.begin() {
            let period = self.inner.config.tick_interval();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(task_id = %id, "Progress driver cancelled");
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                if !self.handle(self.tick()) {
                    break;
                }
            }
        }

        self.inner.registry.release(id, registration.generation);
    }

    /// Connecting -> Downloading, with a freshly drawn speed
    fn begin(&self) -> bool {
        let speed = format_speed(
            self.inner.model.start_speed(),
            &self.inner.config.speed_unit,
        );

        let started = self.inner.store.update(self.id, |task| -> Result<f64, EngineError> {
            transition(task, TaskStatus::Downloading)?;
            task.speed = speed.clone();
            Ok(task.progress)
        });

        match started {
            Ok(Ok(progress)) => {
                info!(task_id = %self.id, speed = %speed, "Download started");
                self.inner.emit(EngineEvent::TaskStatusChanged {
                    id: self.id,
                    status: TaskStatus::Downloading,
                });
                self.inner.emit(EngineEvent::TaskProgress {
                    id: self.id,
                    progress,
                    speed,
                });
                true
            }
            Ok(Err(e)) => {
                debug!(task_id = %self.id, "Not starting driver: {}", e);
                false
            }
            Err(_) => {
                debug!(task_id = %self.id, "Not starting driver: task removed");
                false
            }
        }
    }

    fn tick(&self) -> TickOutcome {
        // Draw before taking the task lock
        let step = self.inner.model.next_step();

        let outcome = self.inner.store.update(self.id, |task| {
            if task.status != TaskStatus::Downloading {
                return TickOutcome::Stopped;
            }

            match step {
                Step::Advance(delta) => {
                    let progress = task.progress + delta.max(0.0);
                    if progress >= 100.0 {
                        task.progress = 100.0;
                        task.status = TaskStatus::Completed;
                        task.speed.clear();
                        TickOutcome::Completed
                    } else {
                        task.progress = progress;
                        TickOutcome::Advanced {
                            progress,
                            speed: task.speed.clone(),
                        }
                    }
                }
                Step::Fail(reason) => {
                    task.status = TaskStatus::Failed;
                    task.speed.clear();
                    TickOutcome::Failed(reason)
                }
            }
        });

        outcome.unwrap_or(TickOutcome::Stopped)
    }

    /// Publish a tick's effect; returns whether to keep ticking
    fn handle(&self, outcome: TickOutcome) -> bool {
        match outcome {
            TickOutcome::Advanced { progress, speed } => {
                trace!(task_id = %self.id, progress, "Tick");
                self.inner.emit(EngineEvent::TaskProgress {
                    id: self.id,
                    progress,
                    speed,
                });
                true
            }
            TickOutcome::Completed => {
                info!(task_id = %self.id, "Download completed");
                self.inner.emit(EngineEvent::TaskProgress {
                    id: self.id,
                    progress: 100.0,
                    speed: String::new(),
                });
                self.inner.emit(EngineEvent::TaskStatusChanged {
                    id: self.id,
                    status: TaskStatus::Completed,
                });
                false
            }
            TickOutcome::Failed(reason) => {
                warn!(task_id = %self.id, "Download failed: {}", reason);
                self.inner.emit(EngineEvent::TaskStatusChanged {
                    id: self.id,
                    status: TaskStatus::Failed,
                });
                false
            }
            TickOutcome::Stopped => {
                debug!(task_id = %self.id, "Task left downloading state, driver stopping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use mediadl_types::{EngineConfig, Task};

    fn connecting_task(engine: &Engine) -> Uuid {
        let inner = engine.inner();
        let task = Task::new(
            "Cat Video".to_string(),
            "thumb1".to_string(),
            "720p".to_string(),
            "65 MB".to_string(),
        );
        let id = task.id;
        inner.store.insert(task).unwrap();
        inner
            .store
            .update(id, |task| transition(task, TaskStatus::Connecting))
            .unwrap()
            .unwrap();
        id
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_connecting_wins() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let inner = Arc::clone(engine.inner());
        let id = connecting_task(&engine);

        engine.cancel(id);

        let registration = inner.registry.register(id);
        ProgressDriver::new(id, Arc::clone(&inner))
            .run(registration)
            .await;

        let task = engine.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.speed.is_empty());
        assert_eq!(task.progress, 0.0);
        assert!(!engine.is_scheduled(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_registration_never_begins() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let inner = Arc::clone(engine.inner());
        let id = connecting_task(&engine);

        let registration = inner.registry.register(id);
        engine.cancel(id);
        assert!(registration.token.is_cancelled());

        ProgressDriver::new(id, Arc::clone(&inner))
            .run(registration)
            .await;

        let task = engine.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.speed.is_empty());
        assert!(!engine.is_scheduled(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connecting_task_starts_downloading() {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        let inner = Arc::clone(engine.inner());
        let id = connecting_task(&engine);

        let registration = inner.registry.register(id);
        let handle = tokio::spawn(ProgressDriver::new(id, Arc::clone(&inner)).run(registration));
        tokio::task::yield_now().await;

        let task = engine.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Downloading);
        assert!(!task.speed.is_empty());

        engine.cancel(id);
        handle.await.unwrap();
        assert_eq!(engine.get(id).unwrap().status, TaskStatus::Cancelled);
        assert!(!engine.is_scheduled(id));
    }
}
