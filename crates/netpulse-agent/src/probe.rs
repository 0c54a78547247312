use crate::config::AgentConfig;
use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use netpulse_collector::cpu::CpuCollector;
use netpulse_collector::disk::DiskCollector;
use netpulse_collector::memory::MemoryCollector;
use netpulse_collector::network::NetworkIoCollector;
use netpulse_collector::speedtest::{HttpSpeedTester, SpeedTestCollector};
use netpulse_collector::Collector;
use netpulse_common::error::ConfigError;
use netpulse_common::rate::parse_refresh_rate;
use netpulse_common::types::Measurement;

/// One periodically sampled stat source with its own refresh interval.
///
/// `last_sampled_at` starts at the Unix epoch so the first tick always fires.
/// The scheduler stamps it when it dispatches a sample, not when the sample
/// completes: a slow probe keeps its cadence instead of drifting by its own
/// runtime.
pub struct ScheduledProbe {
    name: String,
    refresh_interval: TimeDelta,
    last_sampled_at: DateTime<Utc>,
    collector: Box<dyn Collector>,
}

impl ScheduledProbe {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRefreshRate`] if `rate` has an unknown
    /// unit, a non-numeric prefix, or is not positive.
    pub fn new(
        name: impl Into<String>,
        rate: &str,
        collector: Box<dyn Collector>,
    ) -> Result<Self, ConfigError> {
        let interval = parse_refresh_rate(rate)?;
        let refresh_interval =
            TimeDelta::from_std(interval).map_err(|e| ConfigError::InvalidRefreshRate {
                rate: rate.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: name.into(),
            refresh_interval,
            last_sampled_at: DateTime::UNIX_EPOCH,
            collector,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refresh_interval(&self) -> TimeDelta {
        self.refresh_interval
    }

    pub fn last_sampled_at(&self) -> DateTime<Utc> {
        self.last_sampled_at
    }

    /// Strictly after the interval elapses; not ready exactly on the boundary.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        now - self.last_sampled_at > self.refresh_interval
    }

    /// Negative when the probe is already overdue. Saturates at the latest
    /// representable instant.
    pub fn time_to_next(&self, now: DateTime<Utc>) -> TimeDelta {
        let due = self
            .last_sampled_at
            .checked_add_signed(self.refresh_interval)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        due.signed_duration_since(now)
    }

    pub fn mark_sampled(&mut self, now: DateTime<Utc>) {
        self.last_sampled_at = now;
    }

    pub async fn sample(&mut self) -> Result<Measurement> {
        self.collector.collect().await
    }
}

/// Build the probes for every configured monitor, in dispatch order.
pub fn build_probes(config: &AgentConfig) -> Result<Vec<ScheduledProbe>> {
    let speed_tester = HttpSpeedTester::new(config.speedtest_settings())?;

    let probes = vec![
        ScheduledProbe::new(
            "disk-monitor",
            &config.disk_monitor.monitor_rate,
            Box::new(DiskCollector::new(config.disk_monitor.directories.clone())),
        )?,
        ScheduledProbe::new(
            "network-io",
            &config.network.io.monitor_rate,
            Box::new(NetworkIoCollector::new(config.network.io.interfaces.clone())),
        )?,
        ScheduledProbe::new(
            "network-speedtest",
            &config.network.speedtest.monitor_rate,
            Box::new(SpeedTestCollector::new(Box::new(speed_tester))),
        )?,
        ScheduledProbe::new(
            "cpu-stat",
            &config.cpu_monitor.monitor_rate,
            Box::new(CpuCollector::new()),
        )?,
        ScheduledProbe::new(
            "memory-monitor",
            &config.memory_monitor.monitor_rate,
            Box::new(MemoryCollector::new()),
        )?,
    ];

    for probe in &probes {
        tracing::info!(
            probe = probe.name(),
            interval_secs = probe.refresh_interval().num_seconds(),
            "Registered probe"
        );
    }
    Ok(probes)
}
