use async_trait::async_trait;
use mediadl_core::{
    Engine, EngineError, ResolveError, Resolver, StaticResolver, Step, TransferModel,
};
use mediadl_types::{EngineConfig, EngineEvent, ResolvedMedia, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Constant speed and a fixed increment per tick
struct FixedTransfer {
    speed: f64,
    step: f64,
}

impl TransferModel for FixedTransfer {
    fn start_speed(&self) -> f64 {
        self.speed
    }

    fn next_step(&self) -> Step {
        Step::Advance(self.step)
    }
}

fn fixed_engine(step: f64) -> Engine {
    Engine::with_model(
        EngineConfig::default(),
        Arc::new(FixedTransfer { speed: 2.5, step }),
    )
    .unwrap()
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn test_cat_video_scenario() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let id = engine.enqueue("Cat Video", "thumb1", "720p", "65 MB");

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].status, TaskStatus::Pending);
    assert_eq!(snapshot[0].progress, 0.0);
    assert_eq!(snapshot[0].title, "Cat Video");
    assert_eq!(snapshot[0].total_size, "65 MB");

    sleep(ms(1001)).await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Downloading);
    assert!(task.speed.ends_with(" MB/s"), "speed label: {}", task.speed);

    let speed: f64 = task.speed.trim_end_matches(" MB/s").parse().unwrap();
    assert!((1.0..=5.0).contains(&speed));

    engine.wait_idle().await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100.0);
    assert!(task.speed.is_empty());
    assert!(!engine.is_scheduled(id));
}

#[tokio::test(start_paused = true)]
async fn test_exact_tick_schedule() {
    let engine = fixed_engine(25.0);
    let id = engine.enqueue("a", "b", "720p", "65 MB");

    sleep(ms(999)).await;
    assert_eq!(engine.get(id).unwrap().status, TaskStatus::Pending);

    // Connected at 1000ms, ticks at 1500, 2000, 2500, 3000
    sleep(ms(2)).await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Downloading);
    assert_eq!(task.speed, "2.5 MB/s");
    assert_eq!(task.progress, 0.0);

    sleep(ms(500)).await;
    assert_eq!(engine.get(id).unwrap().progress, 25.0);

    sleep(ms(1000)).await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.progress, 75.0);
    assert_eq!(task.status, TaskStatus::Downloading);
    assert_eq!(task.speed, "2.5 MB/s");

    sleep(ms(500)).await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.progress, 100.0);
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.speed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_progress_is_clamped_at_completion() {
    let engine = fixed_engine(40.0);
    let id = engine.enqueue("a", "b", "c", "d");

    engine.wait_idle().await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_progress_never_decreases() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let mut rx = engine.subscribe();
    let id = engine.enqueue("a", "b", "c", "d");

    let mut last = 0.0;
    loop {
        match rx.recv().await.unwrap() {
            EngineEvent::TaskProgress { progress, .. } => {
                assert!(progress >= last, "{} after {}", progress, last);
                last = progress;
            }
            EngineEvent::TaskStatusChanged {
                status: TaskStatus::Completed,
                ..
            } => break,
            _ => {}
        }
    }

    assert_eq!(last, 100.0);
    assert_eq!(engine.get(id).unwrap().progress, 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_connection_delay() {
    let engine = fixed_engine(10.0);
    let mut rx = engine.subscribe();
    let id = engine.enqueue("a", "b", "c", "d");

    sleep(ms(500)).await;
    engine.cancel(id);
    assert!(!engine.is_scheduled(id));

    sleep(ms(3000)).await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.progress, 0.0);
    assert!(task.speed.is_empty());

    while let Ok(event) = rx.try_recv() {
        if let EngineEvent::TaskStatusChanged { status, .. } = event {
            assert!(
                !matches!(status, TaskStatus::Connecting | TaskStatus::Downloading),
                "task reached {}",
                status
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_freezes_progress() {
    let engine = fixed_engine(10.0);
    let id = engine.enqueue("a", "b", "c", "d");

    sleep(ms(2501)).await;
    assert_eq!(engine.get(id).unwrap().progress, 30.0);

    engine.cancel(id);
    let cancelled = engine.get(id).unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(cancelled.speed.is_empty());

    sleep(ms(10_000)).await;
    assert_eq!(engine.get(id).unwrap(), cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_delete_prevents_reinsert() {
    let engine = fixed_engine(10.0);
    let id = engine.enqueue("a", "b", "c", "d");

    sleep(ms(1600)).await;
    assert_eq!(engine.get(id).unwrap().status, TaskStatus::Downloading);

    engine.delete(id);
    assert!(engine.snapshot().is_empty());

    sleep(ms(10_000)).await;
    assert!(engine.snapshot().is_empty());
    assert!(matches!(engine.get(id), Err(EngineError::NotFound(_))));
    assert!(!engine.is_scheduled(id));
}

#[tokio::test(start_paused = true)]
async fn test_delete_during_connection_delay() {
    let engine = fixed_engine(10.0);
    let id = engine.enqueue("a", "b", "c", "d");

    sleep(ms(200)).await;
    engine.delete(id);

    sleep(ms(5000)).await;
    assert!(engine.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_and_delete_are_idempotent() {
    let engine = fixed_engine(10.0);
    let id = engine.enqueue("a", "b", "c", "d");
    let other = engine.enqueue("e", "f", "g", "h");

    sleep(ms(1600)).await;
    engine.cancel(id);
    let once = engine.snapshot();
    engine.cancel(id);
    assert_eq!(engine.snapshot(), once);

    engine.delete(other);
    let once = engine.snapshot();
    engine.delete(other);
    assert_eq!(engine.snapshot(), once);
    assert_eq!(once.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_completion_is_noop() {
    let engine = fixed_engine(50.0);
    let id = engine.enqueue("a", "b", "c", "d");

    engine.wait_idle().await;
    engine.cancel(id);

    assert_eq!(engine.get(id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_many_tasks_complete() {
    for n in [0usize, 1, 25] {
        let engine = Engine::new(EngineConfig::default()).unwrap();
        for i in 0..n {
            engine.enqueue(format!("task {}", i), "thumb", "720p", "65 MB");
        }

        engine.wait_idle().await;

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), n);
        assert!(snapshot
            .iter()
            .all(|t| t.status == TaskStatus::Completed && t.progress == 100.0));
        assert_eq!(engine.active_count(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_newest_first() {
    let engine = fixed_engine(10.0);
    engine.enqueue("first", "", "", "");
    engine.enqueue("second", "", "", "");
    engine.enqueue("third", "", "", "");

    let titles: Vec<_> = engine.snapshot().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
}

#[tokio::test(start_paused = true)]
async fn test_active_count() {
    let engine = fixed_engine(10.0);
    let a = engine.enqueue("a", "", "", "");
    engine.enqueue("b", "", "", "");
    assert_eq!(engine.active_count(), 2);

    engine.cancel(a);
    assert_eq!(engine.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failure_policy() {
    let config = EngineConfig {
        failure_rate: 1.0,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config).unwrap();
    let id = engine.enqueue("a", "b", "c", "d");

    sleep(ms(1501)).await;
    let task = engine.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.progress, 0.0);
    assert!(task.speed.is_empty());
    assert!(!engine.is_scheduled(id));

    // Failed tasks stay visible until deleted
    sleep(ms(5000)).await;
    assert_eq!(engine.snapshot().len(), 1);
    engine.delete(id);
    assert!(engine.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_all_work() {
    let engine = fixed_engine(10.0);
    let downloading = engine.enqueue("a", "", "", "");
    sleep(ms(1600)).await;
    let pending = engine.enqueue("b", "", "", "");

    engine.shutdown().await;
    assert!(!engine.is_scheduled(downloading));
    assert!(!engine.is_scheduled(pending));

    let frozen = engine.snapshot();
    sleep(ms(10_000)).await;
    assert_eq!(engine.snapshot(), frozen);
    assert_eq!(engine.get(pending).unwrap().status, TaskStatus::Pending);

    // Accepted, but never scheduled
    let late = engine.enqueue("c", "", "", "");
    assert!(!engine.is_scheduled(late));
    engine.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropping_engine_tears_down() {
    let engine = fixed_engine(1.0);
    let mut rx = engine.subscribe();
    engine.enqueue("a", "", "", "");
    engine.enqueue("b", "", "", "");

    sleep(ms(1600)).await;
    drop(engine);

    let drained = tokio::time::timeout(Duration::from_secs(60), async {
        while rx.recv().await.is_ok() {}
    })
    .await;
    assert!(drained.is_ok(), "drivers kept running after the engine was dropped");
}

struct BrokenResolver;

#[async_trait]
impl Resolver for BrokenResolver {
    async fn resolve(&self, _source: &str) -> Result<Option<ResolvedMedia>, ResolveError> {
        Err(ResolveError::Unavailable("offline".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_resolver_failures_offer_nothing() {
    let engine = fixed_engine(10.0);

    assert!(engine
        .resolve_offer(&BrokenResolver, "https://vimeo.com/1")
        .await
        .is_none());
    assert!(engine
        .resolve_offer(&StaticResolver::new(), "https://www.google.com")
        .await
        .is_none());
    assert!(engine.snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_resolved_variant() {
    let engine = fixed_engine(10.0);
    let resolver = StaticResolver::with_latency(ms(1500));

    let media = engine
        .resolve_offer(&resolver, "https://vimeo.com/funny-cat-video")
        .await
        .unwrap();
    let variant = media.variant("Audio").unwrap();
    let id = engine.enqueue_variant(&media, variant);

    let task = engine.get(id).unwrap();
    assert_eq!(task.title, "Funny Cat Video");
    assert_eq!(task.variant, "Audio");
    assert_eq!(task.total_size, "4 MB");
    assert_eq!(task.thumbnail, media.thumbnail);
    assert!(task.is_audio());
}
