use crate::procfs::{self, CpuActivity};
use crate::Collector;
use anyhow::Result;
use async_trait::async_trait;
use netpulse_common::types::{CpuStats, Measurement};
use std::time::Duration;
use sysinfo::{LoadAvg, System};

/// Utilization is measured as the delta between two refreshes this far apart.
const SAMPLE_WINDOW: Duration = Duration::from_millis(500);

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    async fn collect(&mut self) -> Result<Measurement> {
        self.system.refresh_cpu_all();
        tokio::time::sleep(SAMPLE_WINDOW.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        self.system.refresh_cpu_all();

        let cpus = self.system.cpus();
        if cpus.is_empty() {
            anyhow::bail!("no CPUs reported by the system");
        }

        let activity = procfs::read_proc(procfs::PROC_STAT, procfs::parse_stat).unwrap_or_default();
        let stats = build_stats(
            cpus.iter().map(|cpu| cpu.cpu_usage()).collect(),
            cpus.iter().map(|cpu| cpu.frequency()).collect(),
            activity,
            System::load_average(),
        );
        tracing::debug!(?stats, "Sampled CPU");
        Ok(Measurement::Cpu(stats))
    }
}

fn build_stats(
    utilization_percents: Vec<f32>,
    freq_mhz: Vec<u64>,
    activity: CpuActivity,
    load: LoadAvg,
) -> CpuStats {
    let cores = utilization_percents.len();
    CpuStats {
        utilization_percents,
        freq_mhz,
        context_switches: activity.context_switches,
        interrupts: activity.interrupts,
        software_interrupts: activity.software_interrupts,
        load_avg_1m_percent: load_percent(load.one, cores),
        load_avg_5m_percent: load_percent(load.five, cores),
        load_avg_15m_percent: load_percent(load.fifteen, cores),
    }
}

/// Normalise a load average onto the core count, in percent.
///
/// Sustained overload legitimately exceeds 100.
pub fn load_percent(load: f64, cores: usize) -> f64 {
    if cores == 0 {
        return 0.0;
    }
    load / cores as f64 * 100.0
}
