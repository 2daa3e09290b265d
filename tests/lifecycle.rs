mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use submitvisor::{
    Event, EventKind, IdempotencyKey, OperationError, Pipeline, PipelineConfig, Subscribe,
};
use tokio_util::sync::CancellationToken;

use common::{quiet_config, retry};

#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        self.kinds.lock().unwrap().push(event.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_receive_events_published_before_shutdown() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = Pipeline::<u8>::builder(quiet_config())
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build();

    pipeline
        .execute(
            |_: CancellationToken| async { Ok::<_, OperationError>(1) },
            &retry(1, 10),
            None,
        )
        .await
        .expect("ok");
    pipeline.shutdown().await;

    let kinds = recorder.kinds.lock().unwrap().clone();
    assert_eq!(
        kinds,
        vec![EventKind::AttemptStarting, EventKind::OperationSucceeded]
    );
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_expired_entries_and_windows() {
    let mut cfg: PipelineConfig = quiet_config();
    cfg.sweep_interval = Duration::from_secs(1);
    cfg.idempotency_ttl = Duration::from_millis(500);
    cfg.rate_limit.window = Duration::from_millis(500);
    let pipeline = Pipeline::<u8>::new(cfg);
    let mut rx = pipeline.bus().subscribe();

    pipeline.check_and_consume("caller");
    pipeline
        .execute(
            |_: CancellationToken| async { Ok::<_, OperationError>(1) },
            &retry(1, 10),
            Some(&IdempotencyKey::new("k")),
        )
        .await
        .expect("ok");
    assert_eq!(pipeline.cache().len(), 1);

    loop {
        let ev = rx.recv().await.expect("bus open");
        if ev.kind == EventKind::SweepCompleted {
            assert_eq!(ev.count, Some(2));
            break;
        }
    }
    assert!(pipeline.cache().is_empty());
    pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn denied_checks_publish_rate_limited() {
    let mut cfg = quiet_config();
    cfg.rate_limit.limit = 2;
    let pipeline = Pipeline::<u8>::new(cfg);
    let mut rx = pipeline.bus().subscribe();

    assert!(pipeline.check_and_consume("10.1.1.1").allowed);
    assert!(pipeline.check_and_consume("10.1.1.1").allowed);
    let denied = pipeline.check_and_consume("10.1.1.1");
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert!(pipeline.check_and_consume("10.1.1.2").allowed);

    let ev = rx.try_recv().expect("one event");
    assert_eq!(ev.kind, EventKind::RateLimited);
    assert_eq!(ev.caller.as_deref(), Some("10.1.1.1"));
    assert!(rx.try_recv().is_err());
}
