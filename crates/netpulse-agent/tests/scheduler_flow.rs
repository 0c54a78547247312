use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use netpulse_agent::probe::ScheduledProbe;
use netpulse_agent::scheduler::Scheduler;
use netpulse_agent::sink::{MetricSink, SinkError, SinkState};
use netpulse_collector::Collector;
use netpulse_common::error::ConfigError;
use netpulse_common::types::Measurement;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Counts ERROR events emitted while installed.
#[derive(Clone, Default)]
struct ErrorCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ErrorCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collector that always produces an empty disk measurement, or always fails.
struct Fixed {
    label: &'static str,
    fail: bool,
}

#[async_trait]
impl Collector for Fixed {
    fn name(&self) -> &str {
        self.label
    }

    async fn collect(&mut self) -> anyhow::Result<Measurement> {
        if self.fail {
            anyhow::bail!("{} is unavailable", self.label);
        }
        Ok(Measurement::Disk(Vec::new()))
    }
}

#[derive(Clone, Copy, PartialEq)]
enum WriteMode {
    Accept,
    Transient,
    Fatal,
}

struct RecordingSink {
    mode: WriteMode,
    writes: Vec<&'static str>,
    closed: usize,
}

impl RecordingSink {
    fn new(mode: WriteMode) -> Self {
        Self {
            mode,
            writes: Vec::new(),
            closed: 0,
        }
    }
}

#[async_trait]
impl MetricSink for RecordingSink {
    async fn health_check(&mut self) -> bool {
        true
    }

    async fn connect(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write(&mut self, measurement: &Measurement) -> Result<usize, SinkError> {
        match self.mode {
            WriteMode::Accept => {
                self.writes.push(measurement.kind());
                Ok(1)
            }
            WriteMode::Transient => Err(SinkError::Rejected {
                status: 500,
                body: "internal error".to_string(),
            }),
            WriteMode::Fatal => Err(SinkError::InvalidState {
                operation: "write",
                state: SinkState::Closed,
            }),
        }
    }

    async fn close(&mut self) {
        self.closed += 1;
    }
}

fn probe(name: &'static str, rate: &str, fail: bool) -> ScheduledProbe {
    ScheduledProbe::new(name, rate, Box::new(Fixed { label: name, fail })).unwrap()
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

#[tokio::test]
async fn failing_probe_is_logged_every_time_and_never_written() {
    let counter = ErrorCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    let mut scheduler = Scheduler::new(
        vec![probe("broken", "1s", true)],
        RecordingSink::new(WriteMode::Accept),
    )
    .unwrap();

    let t0 = start();
    for now in [t0, t0 + TimeDelta::milliseconds(1500), t0 + TimeDelta::seconds(3)] {
        let outcome = scheduler.tick(now).await.unwrap();
        assert_eq!(outcome.sampled, 1);
        assert_eq!(outcome.probe_failures, 1);
        assert_eq!(outcome.writes, 0);
    }

    assert_eq!(counter.count(), 3);
    assert!(scheduler.sink().writes.is_empty());
}

#[tokio::test]
async fn due_probes_are_written_in_registration_order() {
    let mut scheduler = Scheduler::new(
        vec![
            probe("first", "1m", false),
            probe("broken", "1m", true),
            probe("second", "1s", false),
        ],
        RecordingSink::new(WriteMode::Accept),
    )
    .unwrap();

    let t0 = start();
    let outcome = scheduler.tick(t0).await.unwrap();
    assert_eq!(outcome.sampled, 3);
    assert_eq!(outcome.writes, 2);
    assert_eq!(outcome.probe_failures, 1);
    let names: Vec<&str> = scheduler.probes().iter().map(|p| p.name()).collect();
    assert_eq!(names, ["first", "broken", "second"]);

    // Only the fast probe is due two seconds later.
    let outcome = scheduler.tick(t0 + TimeDelta::seconds(2)).await.unwrap();
    assert_eq!(outcome.sampled, 1);
    assert_eq!(scheduler.sink().writes.len(), 3);
}

#[tokio::test]
async fn sampling_stamps_dispatch_time() {
    let mut scheduler = Scheduler::new(
        vec![probe("broken", "30s", true)],
        RecordingSink::new(WriteMode::Accept),
    )
    .unwrap();

    let t0 = start();
    scheduler.tick(t0).await.unwrap();
    assert_eq!(scheduler.probes()[0].last_sampled_at(), t0);

    // Not due again on the exact boundary.
    let outcome = scheduler.tick(t0 + TimeDelta::seconds(30)).await.unwrap();
    assert_eq!(outcome.sampled, 0);
}

#[tokio::test]
async fn next_sleep_tracks_closest_probe() {
    let mut scheduler = Scheduler::new(
        vec![probe("slow", "1m", false), probe("fast", "10s", false)],
        RecordingSink::new(WriteMode::Accept),
    )
    .unwrap();

    let t0 = start();
    // Never sampled: overdue, so no sleep at all.
    assert_eq!(scheduler.next_sleep(t0), Duration::ZERO);

    let outcome = scheduler.tick(t0).await.unwrap();
    assert_eq!(outcome.sleep, Duration::from_secs(10));
    assert_eq!(
        scheduler.next_sleep(t0 + TimeDelta::seconds(4)),
        Duration::from_secs(6)
    );
    assert_eq!(
        scheduler.next_sleep(t0 + TimeDelta::seconds(25)),
        Duration::ZERO
    );
}

#[tokio::test]
async fn transient_write_failure_is_contained() {
    let counter = ErrorCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    let mut scheduler = Scheduler::new(
        vec![probe("disk", "1s", false), probe("net", "1s", false)],
        RecordingSink::new(WriteMode::Transient),
    )
    .unwrap();

    let outcome = scheduler.tick(start()).await.unwrap();
    assert_eq!(outcome.sampled, 2);
    assert_eq!(outcome.write_failures, 2);
    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn fatal_write_failure_ends_the_tick() {
    let mut scheduler = Scheduler::new(
        vec![probe("disk", "1s", false), probe("net", "1s", false)],
        RecordingSink::new(WriteMode::Fatal),
    )
    .unwrap();

    let err = scheduler.tick(start()).await.unwrap_err();
    assert!(err.is_fatal());
    // The second probe was never dispatched.
    assert_eq!(scheduler.probes()[1].last_sampled_at(), DateTime::UNIX_EPOCH);
}

#[tokio::test]
async fn run_until_returns_on_shutdown() {
    let mut scheduler = Scheduler::new(
        vec![probe("disk", "1h", false)],
        RecordingSink::new(WriteMode::Accept),
    )
    .unwrap();

    scheduler.run_until(async {}).await.unwrap();
    assert_eq!(scheduler.sink().writes, ["disk"]);

    scheduler.close().await;
    scheduler.close().await;
    assert_eq!(scheduler.sink().closed, 2);
}

#[tokio::test]
async fn run_until_surfaces_fatal_errors() {
    let mut scheduler = Scheduler::new(
        vec![probe("disk", "1s", false)],
        RecordingSink::new(WriteMode::Fatal),
    )
    .unwrap();

    let pending = std::future::pending::<()>();
    let err = scheduler.run_until(pending).await.unwrap_err();
    assert!(matches!(err, SinkError::InvalidState { .. }));
}

#[test]
fn scheduler_requires_probes() {
    let err = Scheduler::new(Vec::new(), RecordingSink::new(WriteMode::Accept))
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::EmptyList(_)));
}
