use crate::procfs::{self, InterfaceDrops};
use crate::Collector;
use anyhow::Result;
use async_trait::async_trait;
use netpulse_common::types::{InterfaceStats, Measurement};
use std::collections::HashMap;
use sysinfo::Networks;

/// Cumulative counters for one live interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub err_in: u64,
    pub err_out: u64,
}

/// Samples cumulative I/O counters for a configured set of interfaces.
pub struct NetworkIoCollector {
    interfaces: Vec<String>,
    networks: Networks,
}

impl NetworkIoCollector {
    pub fn new(interfaces: Vec<String>) -> Self {
        Self {
            interfaces,
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn live_counters(&mut self) -> HashMap<String, InterfaceCounters> {
        self.networks.refresh_list();
        self.networks
            .list()
            .iter()
            .map(|(name, data)| {
                (
                    name.clone(),
                    InterfaceCounters {
                        bytes_sent: data.total_transmitted(),
                        bytes_recv: data.total_received(),
                        packets_sent: data.total_packets_transmitted(),
                        packets_recv: data.total_packets_received(),
                        err_in: data.total_errors_on_received(),
                        err_out: data.total_errors_on_transmitted(),
                    },
                )
            })
            .collect()
    }
}

#[async_trait]
impl Collector for NetworkIoCollector {
    fn name(&self) -> &str {
        "network_io"
    }

    async fn collect(&mut self) -> Result<Measurement> {
        let live = self.live_counters();
        let drops = procfs::read_proc(procfs::PROC_NET_DEV, procfs::parse_net_dev).unwrap_or_default();
        Ok(Measurement::NetworkIo(select_interfaces(
            &self.interfaces,
            &live,
            &drops,
        )))
    }
}

/// Keep configured interfaces that are present, in configuration order.
/// Missing interfaces are logged and skipped.
pub fn select_interfaces(
    configured: &[String],
    live: &HashMap<String, InterfaceCounters>,
    drops: &HashMap<String, InterfaceDrops>,
) -> Vec<InterfaceStats> {
    configured
        .iter()
        .filter_map(|iface| {
            let Some(counters) = live.get(iface) else {
                tracing::warn!(interface = %iface, "Could not find interface");
                return None;
            };
            let dropped = drops.get(iface).copied().unwrap_or_default();
            Some(InterfaceStats {
                interface: iface.clone(),
                bytes_sent: counters.bytes_sent,
                bytes_recv: counters.bytes_recv,
                packets_sent: counters.packets_sent,
                packets_recv: counters.packets_recv,
                err_in: counters.err_in,
                err_out: counters.err_out,
                drop_in: dropped.drop_in,
                drop_out: dropped.drop_out,
            })
        })
        .collect()
}
