use crate::procfs::{self, DiskIoCounters};
use crate::Collector;
use anyhow::Result;
use async_trait::async_trait;
use netpulse_common::types::{DiskUnitStats, Measurement};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// A mounted filesystem as seen in the live partition list.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub device: String,
    pub mount_point: PathBuf,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

pub struct DiskCollector {
    directories: Vec<String>,
    disks: Disks,
}

impl DiskCollector {
    pub fn new(directories: Vec<String>) -> Self {
        Self {
            directories,
            disks: Disks::new_with_refreshed_list(),
        }
    }

    fn partitions(&mut self) -> Vec<Partition> {
        self.disks.refresh_list();
        self.disks
            .list()
            .iter()
            .map(|disk| Partition {
                device: disk.name().to_string_lossy().to_string(),
                mount_point: disk.mount_point().to_path_buf(),
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            })
            .collect()
    }
}

#[async_trait]
impl Collector for DiskCollector {
    fn name(&self) -> &str {
        "disk"
    }

    async fn collect(&mut self) -> Result<Measurement> {
        let partitions = self.partitions();
        let io = procfs::read_proc(procfs::PROC_DISKSTATS, procfs::parse_diskstats)
            .unwrap_or_default();
        let units = resolve_units(&self.directories, &partitions, &io, is_mount_boundary);
        Ok(Measurement::Disk(units))
    }
}

/// Build one stats unit per configured directory that resolves to a partition.
///
/// Directories whose mount point has no backing partition are skipped.
pub fn resolve_units(
    directories: &[String],
    partitions: &[Partition],
    io: &HashMap<String, DiskIoCounters>,
    is_mount: impl Fn(&Path) -> bool,
) -> Vec<DiskUnitStats> {
    let mut units = Vec::with_capacity(directories.len());
    for directory in directories {
        let mount_point = resolve_mount_point(Path::new(directory), &is_mount);
        let Some(partition) = partitions.iter().find(|p| p.mount_point == mount_point) else {
            tracing::warn!(
                directory = %directory,
                mount_point = %mount_point.display(),
                "No partition backs the configured directory, skipping"
            );
            continue;
        };

        let device_key = device_basename(&partition.device);
        let counters = match io.get(device_key) {
            Some(counters) => *counters,
            None => {
                tracing::warn!(device = %partition.device, "No I/O counters for device");
                DiskIoCounters::default()
            }
        };
        units.push(unit_stats(directory, partition, counters));
    }
    units
}

/// `sysinfo` reports only total and available space, so blocks reserved for
/// root count as used here.
fn unit_stats(directory: &str, partition: &Partition, io: DiskIoCounters) -> DiskUnitStats {
    let total = partition.total_bytes;
    let free = partition.available_bytes;
    let used = total.saturating_sub(free);
    let percent_used = if total > 0 {
        (used as f64 / total as f64) * 100.0
    } else {
        0.0
    };

    DiskUnitStats {
        device: partition.device.clone(),
        directory: directory.to_string(),
        total_bytes: total,
        used_bytes: used,
        free_bytes: free,
        percent_used,
        read_count: io.read_count,
        write_count: io.write_count,
        read_bytes: io.read_bytes,
        write_bytes: io.write_bytes,
        read_time_ms: io.read_time_ms,
        write_time_ms: io.write_time_ms,
        busy_time_ms: io.busy_time_ms,
        read_merged_count: io.read_merged_count,
        write_merged_count: io.write_merged_count,
    }
}

/// Walk up from `directory` until `is_mount` reports a mount boundary.
///
/// The filesystem root is always a boundary.
pub fn resolve_mount_point(directory: &Path, is_mount: impl Fn(&Path) -> bool) -> PathBuf {
    let mut current = directory;
    loop {
        if is_mount(current) {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return current.to_path_buf(),
        }
    }
}

/// A path is a mount point when it lives on a different device than its parent,
/// or when it is its own parent (the root).
#[cfg(unix)]
pub fn is_mount_boundary(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Some(parent) = path.parent() else {
        return true;
    };
    match (std::fs::metadata(path), std::fs::metadata(parent)) {
        (Ok(own), Ok(up)) => own.dev() != up.dev() || own.ino() == up.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub fn is_mount_boundary(path: &Path) -> bool {
    path.parent().is_none()
}

fn device_basename(device: &str) -> &str {
    device.rsplit('/').next().unwrap_or(device)
}
