use crate::probe::ScheduledProbe;
use crate::sink::{MetricSink, SinkError};
use chrono::{DateTime, TimeDelta, Utc};
use netpulse_common::error::ConfigError;
use std::future::Future;
use std::time::Duration;

/// What a single pass over the probes did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Probes that were due and dispatched.
    pub sampled: usize,
    /// Measurements the sink accepted.
    pub writes: usize,
    /// Records contained in those measurements.
    pub records: usize,
    pub probe_failures: usize,
    pub write_failures: usize,
    /// Sleep until the next probe is due, as of the tick's `now`.
    pub sleep: Duration,
}

/// Cooperative single-task poll loop over a fixed set of probes.
///
/// Probes are visited in registration order, so when several are due at the
/// same time the earlier-registered one is sampled and written first. Between
/// passes the loop sleeps until the next probe is due.
pub struct Scheduler<S: MetricSink> {
    probes: Vec<ScheduledProbe>,
    sink: S,
}

impl<S: MetricSink> Scheduler<S> {
    pub fn new(probes: Vec<ScheduledProbe>, sink: S) -> Result<Self, ConfigError> {
        if probes.is_empty() {
            return Err(ConfigError::EmptyList("probes".to_string()));
        }
        Ok(Self { probes, sink })
    }

    pub fn probes(&self) -> &[ScheduledProbe] {
        &self.probes
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Sample and write every probe that is due at `now`.
    ///
    /// Sampling failures and transient write failures are logged and counted;
    /// only a fatal sink error is returned.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, SinkError> {
        let mut outcome = TickOutcome::default();

        for probe in &mut self.probes {
            if !probe.is_ready(now) {
                continue;
            }
            probe.mark_sampled(now);
            outcome.sampled += 1;
            tracing::info!(probe = probe.name(), "Taking measurement");

            let measurement = match probe.sample().await {
                Ok(measurement) => measurement,
                Err(e) => {
                    tracing::error!(probe = probe.name(), error = %format!("{e:#}"), "Measurement failed");
                    outcome.probe_failures += 1;
                    continue;
                }
            };

            match self.sink.write(&measurement).await {
                Ok(records) => {
                    outcome.writes += 1;
                    outcome.records += records;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!(
                        probe = probe.name(),
                        error = %e,
                        "Could not write data for measurement"
                    );
                    outcome.write_failures += 1;
                }
            }
        }

        outcome.sleep = self.next_sleep(now);
        Ok(outcome)
    }

    /// Time until the closest probe is due, clamped at zero.
    pub fn next_sleep(&self, now: DateTime<Utc>) -> Duration {
        self.probes
            .iter()
            .map(|probe| probe.time_to_next(now))
            .min()
            .unwrap_or_else(TimeDelta::zero)
            .max(TimeDelta::zero())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Run until `shutdown` resolves or a fatal sink error occurs.
    ///
    /// Shutdown is observed while sleeping between ticks; a tick in progress
    /// always runs to completion first. The sink is left open for the caller
    /// to [`Scheduler::close`].
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), SinkError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(probes = self.probes.len(), "Starting monitoring loop");

        loop {
            let outcome = self.tick(Utc::now()).await?;
            // Sampling takes real time; measure from after the tick.
            let sleep = self.next_sleep(Utc::now());
            tracing::debug!(
                sampled = outcome.sampled,
                writes = outcome.writes,
                sleep_secs = sleep.as_secs_f64(),
                "Sleeping until next probe is due"
            );

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, leaving monitoring loop");
                    return Ok(());
                }
                _ = tokio::time::sleep(sleep) => {}
            }
        }
    }

    pub async fn close(&mut self) {
        self.sink.close().await;
    }
}
