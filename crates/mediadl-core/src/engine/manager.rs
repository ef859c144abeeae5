//! Engine - the single writer for task state
//!
//! This is the top-level coordinator that:
//! - Creates tasks and schedules their connection delay
//! - Starts a progress driver once a task connects
//! - Cancels and deletes tasks, stopping their scheduled work
//! - Tears everything down on shutdown

use super::driver::ProgressDriver;
use super::registry::DriverRegistry;
use super::transfer::{SimulatedTransfer, TransferModel};
use super::transition;
use crate::error::EngineError;
use crate::resolver::Resolver;
use crate::store::TaskStore;
use mediadl_types::{EngineConfig, EngineEvent, MediaVariant, ResolvedMedia, Task, TaskStatus};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// State shared between the engine handles and their spawned work
pub(crate) struct EngineInner {
    pub(crate) store: TaskStore,
    pub(crate) registry: DriverRegistry,
    pub(crate) config: EngineConfig,
    pub(crate) model: Arc<dyn TransferModel>,
    event_tx: broadcast::Sender<EngineEvent>,
    tracker: TaskTracker,
}

impl EngineInner {
    pub(crate) fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Cancels all scheduled work once the last engine handle is dropped.
///
/// Spawned timers and drivers hold `EngineInner` but never this guard.
struct TeardownGuard {
    root: CancellationToken,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

/// Download task engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
    _teardown: Arc<TeardownGuard>,
}

impl Engine {
    /// Create an engine with the simulated transfer model
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let model = Arc::new(SimulatedTransfer::from_config(&config));
        Self::with_model(config, model)
    }

    /// Create an engine with a custom transfer model
    pub fn with_model(
        config: EngineConfig,
        model: Arc<dyn TransferModel>,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;

        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let registry = DriverRegistry::new();
        let root = registry.root().clone();

        Ok(Self {
            inner: Arc::new(EngineInner {
                store: TaskStore::new(),
                registry,
                config,
                model,
                event_tx,
                tracker: TaskTracker::new(),
            }),
            _teardown: Arc::new(TeardownGuard { root }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.event_tx.subscribe()
    }

    // ========================================================================
    // Task Operations
    // ========================================================================

    /// Queue a new download job.
    ///
    /// Returns immediately. The task starts in `Pending` and connects once
    /// the connection delay has elapsed. Must be called inside a Tokio runtime.
    pub fn enqueue(
        &self,
        title: impl Into<String>,
        thumbnail: impl Into<String>,
        variant: impl Into<String>,
        total_size: impl Into<String>,
    ) -> Uuid {
        let task = Task::new(title.into(), thumbnail.into(), variant.into(), total_size.into());
        self.admit(task)
    }

    /// Queue a download for one variant of resolved media
    pub fn enqueue_variant(&self, media: &ResolvedMedia, variant: &MediaVariant) -> Uuid {
        self.enqueue(
            media.title.clone(),
            media.thumbnail.clone(),
            variant.label.clone(),
            variant.size.clone(),
        )
    }

    /// Store a new task and schedule its connection delay.
    ///
    /// An id collision is an id-generation bug: it is logged and the task is
    /// stored under a fresh id, so the returned id always names this task.
    fn admit(&self, mut task: Task) -> Uuid {
        while let Err(e) = self.inner.store.insert(task.clone()) {
            let fresh = Uuid::new_v4();
            error!(task_id = %task.id, reissued = %fresh, "Failed to register task: {}", e);
            task.id = fresh;
        }
        let id = task.id;

        info!(task_id = %id, title = %task.title, variant = %task.variant, "Task queued");
        self.inner.emit(EngineEvent::TaskAdded { task });

        if self.inner.registry.is_shutdown() {
            warn!(task_id = %id, "Engine is shut down, task will not start");
            return id;
        }

        let registration = self.inner.registry.register(id);
        let inner = Arc::clone(&self.inner);

        self.inner.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = registration.token.cancelled() => {
                    trace!(task_id = %id, "Connection delay cancelled");
                    return;
                }
                _ = tokio::time::sleep(inner.config.connect_delay()) => {}
            }

            Self::connect(&inner, id, registration.generation);
        });

        id
    }

    /// Cancel a task that has not finished yet.
    ///
    /// No-op for unknown or already terminal tasks.
    pub fn cancel(&self, id: Uuid) {
        self.inner.registry.stop(id);

        let cancelled = self.inner.store.update(id, |task| {
            let result = transition(task, TaskStatus::Cancelled);
            if result.is_ok() {
                task.speed.clear();
            }
            result
        });

        match cancelled {
            Ok(Ok(())) => {
                info!(task_id = %id, "Task cancelled");
                self.inner.emit(EngineEvent::TaskStatusChanged {
                    id,
                    status: TaskStatus::Cancelled,
                });
            }
            Ok(Err(e)) => debug!(task_id = %id, "Cancel ignored: {}", e),
            Err(_) => debug!(task_id = %id, "Cancel ignored: unknown task"),
        }
    }

    /// Stop any scheduled work for a task and remove it. No-op if absent.
    pub fn delete(&self, id: Uuid) {
        self.inner.registry.stop(id);

        if self.inner.store.remove(id).is_some() {
            info!(task_id = %id, "Task deleted");
            self.inner.emit(EngineEvent::TaskRemoved { id });
        }
    }

    /// All tasks, most recently queued first
    pub fn snapshot(&self) -> Vec<Task> {
        self.inner.store.snapshot()
    }

    /// A single task
    pub fn get(&self, id: Uuid) -> Result<Task, EngineError> {
        self.inner.store.get(id).ok_or(EngineError::NotFound(id))
    }

    /// Number of tasks that have not reached a terminal state
    pub fn active_count(&self) -> usize {
        self.snapshot().iter().filter(|t| t.is_active()).count()
    }

    /// Whether a timer or driver is currently registered for `id`
    pub fn is_scheduled(&self, id: Uuid) -> bool {
        self.inner.registry.is_live(id)
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Ask `resolver` what can be downloaded from `source`.
    ///
    /// Resolver failures and empty results both mean nothing is offered.
    pub async fn resolve_offer(
        &self,
        resolver: &dyn Resolver,
        source: &str,
    ) -> Option<ResolvedMedia> {
        match resolver.resolve(source).await {
            Ok(Some(media)) if !media.variants.is_empty() => Some(media),
            Ok(_) => {
                debug!(source = %source, "No downloadable media found");
                None
            }
            Err(e) => {
                warn!(source = %source, "Resolver failed: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Wait until no task is pending, connecting or downloading.
    ///
    /// Also returns once the engine shuts down.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        let root = self.inner.registry.root().clone();

        loop {
            if self.active_count() == 0 || root.is_cancelled() {
                return;
            }

            tokio::select! {
                _ = root.cancelled() => return,
                received = rx.recv() => match received {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    }

    /// Cancel every timer and driver and wait for them to exit
    pub async fn shutdown(&self) {
        info!("Shutting down engine");
        self.inner.registry.stop_all();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("All scheduled work has exited");
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<EngineInner> {
        &self.inner
    }

    /// Connection delay elapsed: Pending -> Connecting, then start a driver
    fn connect(inner: &Arc<EngineInner>, id: Uuid, generation: u64) {
        let connected = inner
            .store
            .update(id, |task| transition(task, TaskStatus::Connecting));

        match connected {
            Ok(Ok(())) => {
                debug!(task_id = %id, "Task connecting");
                inner.emit(EngineEvent::TaskStatusChanged {
                    id,
                    status: TaskStatus::Connecting,
                });
                Self::start_driver(inner, id);
            }
            Ok(Err(e)) => {
                debug!(task_id = %id, "Skipping connect: {}", e);
                inner.registry.release(id, generation);
            }
            Err(_) => {
                debug!(task_id = %id, "Skipping connect: task removed");
                inner.registry.release(id, generation);
            }
        }
    }

    /// Register a fresh driver for `id`; any earlier registration is cancelled first
    fn start_driver(inner: &Arc<EngineInner>, id: Uuid) {
        let registration = inner.registry.register(id);
        let driver = ProgressDriver::new(id, Arc::clone(inner));
        inner.tracker.spawn(driver.run(registration));
    }
}
