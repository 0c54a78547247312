use crate::procfs::{self, MemInfo, SwapActivity};
use crate::Collector;
use anyhow::Result;
use async_trait::async_trait;
use netpulse_common::types::{Measurement, MemoryStats};
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals as reported by `sysinfo`, in bytes.
#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    ram_total: u64,
    ram_available: u64,
    ram_used: u64,
    ram_free: u64,
    swap_total: u64,
    swap_used: u64,
    swap_free: u64,
}

#[async_trait]
impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn collect(&mut self) -> Result<Measurement> {
        self.system.refresh_memory();
        let totals = Totals {
            ram_total: self.system.total_memory(),
            ram_available: self.system.available_memory(),
            ram_used: self.system.used_memory(),
            ram_free: self.system.free_memory(),
            swap_total: self.system.total_swap(),
            swap_used: self.system.used_swap(),
            swap_free: self.system.free_swap(),
        };
        if totals.ram_total == 0 {
            anyhow::bail!("system reported zero total memory");
        }

        let meminfo = procfs::read_proc(procfs::PROC_MEMINFO, procfs::parse_meminfo).unwrap_or_default();
        let swap_activity =
            procfs::read_proc(procfs::PROC_VMSTAT, procfs::parse_vmstat).unwrap_or_default();

        Ok(Measurement::Memory(build_stats(totals, meminfo, swap_activity)))
    }
}

fn build_stats(totals: Totals, meminfo: MemInfo, swap: SwapActivity) -> MemoryStats {
    MemoryStats {
        ram_total_bytes: totals.ram_total,
        ram_available_bytes: totals.ram_available,
        ram_used_bytes: totals.ram_used,
        ram_free_bytes: totals.ram_free,
        ram_active_bytes: meminfo.active_bytes,
        ram_inactive_bytes: meminfo.inactive_bytes,
        ram_buffers_bytes: meminfo.buffers_bytes,
        ram_cached_bytes: meminfo.cached_bytes,
        ram_shared_bytes: meminfo.shared_bytes,
        ram_slab_bytes: meminfo.slab_bytes,
        // Historically named: the series carries the share of RAM in use.
        ram_available_percent: percent(
            totals.ram_total.saturating_sub(totals.ram_available),
            totals.ram_total,
        ),
        swap_total_bytes: totals.swap_total,
        swap_used_bytes: totals.swap_used,
        swap_free_bytes: totals.swap_free,
        swap_used_percent: percent(totals.swap_used, totals.swap_total),
        swap_in_total_bytes: swap.swap_in_bytes,
        swap_out_total_bytes: swap.swap_out_bytes,
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
