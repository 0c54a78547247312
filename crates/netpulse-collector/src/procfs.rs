//! Parsers for the Linux `/proc` files that `sysinfo` does not cover.
//!
//! Parsers take file content so they can be tested against fixtures; callers
//! use [`read_proc`] and fall back to zeroed counters on other platforms.

use std::collections::HashMap;

pub const PROC_STAT: &str = "/proc/stat";
pub const PROC_MEMINFO: &str = "/proc/meminfo";
pub const PROC_VMSTAT: &str = "/proc/vmstat";
pub const PROC_DISKSTATS: &str = "/proc/diskstats";
pub const PROC_NET_DEV: &str = "/proc/net/dev";

/// `/proc/diskstats` counts in 512-byte sectors regardless of device.
const SECTOR_SIZE: u64 = 512;
/// `/proc/vmstat` swap counters are in pages.
const PAGE_SIZE: u64 = 4096;

/// Read and parse a proc file, returning `None` when it is unavailable.
pub fn read_proc<T>(path: &str, parse: fn(&str) -> T) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(parse(&content)),
        Err(e) => {
            tracing::debug!(path, error = %e, "proc file unavailable");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuActivity {
    pub context_switches: u64,
    pub interrupts: u64,
    pub software_interrupts: u64,
}

/// Parse the `ctxt`, `intr` and `softirq` totals from `/proc/stat`.
pub fn parse_stat(content: &str) -> CpuActivity {
    let mut activity = CpuActivity::default();
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let value = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        match key {
            Some("ctxt") => activity.context_switches = value,
            Some("intr") => activity.interrupts = value,
            Some("softirq") => activity.software_interrupts = value,
            _ => {}
        }
    }
    activity
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemInfo {
    pub active_bytes: u64,
    pub inactive_bytes: u64,
    pub buffers_bytes: u64,
    pub cached_bytes: u64,
    pub shared_bytes: u64,
    pub slab_bytes: u64,
}

/// Parse `/proc/meminfo`, converting kB values to bytes.
pub fn parse_meminfo(content: &str) -> MemInfo {
    let values: HashMap<&str, u64> = content
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim(), kb * 1024))
        })
        .collect();
    let get = |key: &str| values.get(key).copied().unwrap_or(0);

    MemInfo {
        active_bytes: get("Active"),
        inactive_bytes: get("Inactive"),
        buffers_bytes: get("Buffers"),
        cached_bytes: get("Cached") + get("SReclaimable"),
        shared_bytes: get("Shmem"),
        slab_bytes: get("Slab"),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapActivity {
    pub swap_in_bytes: u64,
    pub swap_out_bytes: u64,
}

/// Parse cumulative swap-in/out from `/proc/vmstat`.
pub fn parse_vmstat(content: &str) -> SwapActivity {
    let mut activity = SwapActivity::default();
    for line in content.lines() {
        let Some((key, value)) = line.split_once(' ') else {
            continue;
        };
        let pages: u64 = value.trim().parse().unwrap_or(0);
        match key {
            "pswpin" => activity.swap_in_bytes = pages * PAGE_SIZE,
            "pswpout" => activity.swap_out_bytes = pages * PAGE_SIZE,
            _ => {}
        }
    }
    activity
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskIoCounters {
    pub read_count: u64,
    pub read_merged_count: u64,
    pub read_bytes: u64,
    pub read_time_ms: u64,
    pub write_count: u64,
    pub write_merged_count: u64,
    pub write_bytes: u64,
    pub write_time_ms: u64,
    pub busy_time_ms: u64,
}

/// Parse `/proc/diskstats` into counters keyed by device name (e.g. `sda1`).
pub fn parse_diskstats(content: &str) -> HashMap<String, DiskIoCounters> {
    let mut devices = HashMap::new();
    for line in content.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        // major minor name + at least 11 counters
        if cols.len() < 14 {
            continue;
        }
        let n = |i: usize| cols[i].parse::<u64>().unwrap_or(0);
        devices.insert(
            cols[2].to_string(),
            DiskIoCounters {
                read_count: n(3),
                read_merged_count: n(4),
                read_bytes: n(5) * SECTOR_SIZE,
                read_time_ms: n(6),
                write_count: n(7),
                write_merged_count: n(8),
                write_bytes: n(9) * SECTOR_SIZE,
                write_time_ms: n(10),
                busy_time_ms: n(12),
            },
        );
    }
    devices
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceDrops {
    pub drop_in: u64,
    pub drop_out: u64,
}

/// Parse per-interface drop counters from `/proc/net/dev`.
pub fn parse_net_dev(content: &str) -> HashMap<String, InterfaceDrops> {
    let mut interfaces = HashMap::new();
    // First two lines are headers.
    for line in content.lines().skip(2) {
        let Some((name, rest)) = line.split_once(':') else {
            continue;
        };
        let cols: Vec<u64> = rest
            .split_whitespace()
            .map(|c| c.parse().unwrap_or(0))
            .collect();
        if cols.len() < 16 {
            continue;
        }
        interfaces.insert(
            name.trim().to_string(),
            InterfaceDrops {
                drop_in: cols[3],
                drop_out: cols[11],
            },
        );
    }
    interfaces
}
