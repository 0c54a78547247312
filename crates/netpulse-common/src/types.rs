use std::collections::BTreeMap;

const BITS_PER_MEGABIT: f64 = 1024.0 * 1024.0;

/// A single field value carried by a [`WireRecord`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Str(String),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// One time-series point: a measurement name, the tags identifying the series
/// and the sampled fields. The timestamp is assigned by the sink at write time.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
}

impl WireRecord {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, key: &str, value: impl ToString) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Measurement names for each series, taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesNames {
    pub cpu: String,
    pub ram: String,
    pub swap: String,
    pub disk: String,
    pub network_io: String,
    pub network_speed: String,
}

impl Default for SeriesNames {
    fn default() -> Self {
        Self {
            cpu: "cpu".to_string(),
            ram: "ram".to_string(),
            swap: "swap".to_string(),
            disk: "disk".to_string(),
            network_io: "net-io".to_string(),
            network_speed: "net-updown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuStats {
    pub utilization_percents: Vec<f32>,
    pub freq_mhz: Vec<u64>,
    pub context_switches: u64,
    pub interrupts: u64,
    pub software_interrupts: u64,
    /// Load averages normalised by logical core count, in percent. May exceed 100.
    pub load_avg_1m_percent: f64,
    pub load_avg_5m_percent: f64,
    pub load_avg_15m_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStats {
    pub ram_total_bytes: u64,
    pub ram_available_bytes: u64,
    pub ram_used_bytes: u64,
    pub ram_free_bytes: u64,
    pub ram_active_bytes: u64,
    pub ram_inactive_bytes: u64,
    pub ram_buffers_bytes: u64,
    pub ram_cached_bytes: u64,
    pub ram_shared_bytes: u64,
    pub ram_slab_bytes: u64,
    /// `(total - available) / total * 100`, the in-use share despite the name.
    pub ram_available_percent: f64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_free_bytes: u64,
    pub swap_used_percent: f64,
    pub swap_in_total_bytes: u64,
    pub swap_out_total_bytes: u64,
}

/// Usage and I/O counters for one configured directory.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskUnitStats {
    pub device: String,
    pub directory: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent_used: f64,
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_time_ms: u64,
    pub write_time_ms: u64,
    pub busy_time_ms: u64,
    pub read_merged_count: u64,
    pub write_merged_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceStats {
    pub interface: String,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub err_in: u64,
    pub err_out: u64,
    pub drop_in: u64,
    pub drop_out: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestServer {
    pub city: String,
    pub country: String,
    pub vendor: String,
    pub lat: f64,
    pub lon: f64,
}

/// Raw speed test result. Throughput is in bits per second, ping in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedTestStats {
    pub download_bps: f64,
    pub upload_bps: f64,
    pub ping_ms: f64,
    pub server: SpeedTestServer,
    pub client_lat: f64,
    pub client_lon: f64,
}

impl SpeedTestStats {
    pub fn download_mbps(&self) -> f64 {
        round3(self.download_bps / BITS_PER_MEGABIT)
    }

    pub fn upload_mbps(&self) -> f64 {
        round3(self.upload_bps / BITS_PER_MEGABIT)
    }
}

/// A typed snapshot of one stat domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Cpu(CpuStats),
    Memory(MemoryStats),
    Disk(Vec<DiskUnitStats>),
    NetworkIo(Vec<InterfaceStats>),
    NetworkSpeed(SpeedTestStats),
}

impl Measurement {
    /// Short domain name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Measurement::Cpu(_) => "cpu",
            Measurement::Memory(_) => "memory",
            Measurement::Disk(_) => "disk",
            Measurement::NetworkIo(_) => "network_io",
            Measurement::NetworkSpeed(_) => "network_speed",
        }
    }

    /// Convert into wire records. Deterministic and infallible.
    ///
    /// # Examples
    ///
    /// ```
    /// use netpulse_common::types::{Measurement, SeriesNames, SpeedTestServer, SpeedTestStats, FieldValue};
    ///
    /// let m = Measurement::NetworkSpeed(SpeedTestStats {
    ///     download_bps: 100_000_000.0,
    ///     upload_bps: 10_000_000.0,
    ///     ping_ms: 12.3456,
    ///     server: SpeedTestServer {
    ///         city: "Oslo".into(),
    ///         country: "Norway".into(),
    ///         vendor: "Telia".into(),
    ///         lat: 59.91,
    ///         lon: 10.75,
    ///     },
    ///     client_lat: 59.9,
    ///     client_lon: 10.7,
    /// });
    /// let records = m.to_records(&SeriesNames::default());
    /// assert_eq!(records.len(), 1);
    /// assert_eq!(records[0].fields["download-mbps"], FieldValue::Float(95.367));
    /// ```
    pub fn to_records(&self, names: &SeriesNames) -> Vec<WireRecord> {
        match self {
            Measurement::Cpu(stats) => cpu_records(&names.cpu, stats),
            Measurement::Memory(stats) => memory_records(&names.ram, &names.swap, stats),
            Measurement::Disk(units) => units
                .iter()
                .map(|unit| disk_record(&names.disk, unit))
                .collect(),
            Measurement::NetworkIo(interfaces) => interfaces
                .iter()
                .map(|iface| interface_record(&names.network_io, iface))
                .collect(),
            Measurement::NetworkSpeed(stats) => vec![speed_record(&names.network_speed, stats)],
        }
    }
}

fn cpu_records(name: &str, stats: &CpuStats) -> Vec<WireRecord> {
    let mut records: Vec<WireRecord> = stats
        .utilization_percents
        .iter()
        .zip(&stats.freq_mhz)
        .enumerate()
        .map(|(core, (utilization, freq))| {
            WireRecord::new(name)
                .tag("core", core)
                .field("utilization-percent", *utilization)
                .field("freq-mhz", *freq as f64)
        })
        .collect();

    records.push(
        WireRecord::new(name)
            .field("context_switches", stats.context_switches)
            .field("interrupts", stats.interrupts)
            .field("software_interrupts", stats.software_interrupts)
            .field("load_avg_1m_percent", stats.load_avg_1m_percent)
            .field("load_avg_5m_percent", stats.load_avg_5m_percent)
            .field("load_avg_15m_percent", stats.load_avg_15m_percent),
    );
    records
}

fn memory_records(ram_name: &str, swap_name: &str, stats: &MemoryStats) -> Vec<WireRecord> {
    let mut records = vec![WireRecord::new(ram_name)
        .field("total-bytes", stats.ram_total_bytes)
        .field("available-bytes", stats.ram_available_bytes)
        .field("used-bytes", stats.ram_used_bytes)
        .field("free-bytes", stats.ram_free_bytes)
        .field("active-bytes", stats.ram_active_bytes)
        .field("inactive-bytes", stats.ram_inactive_bytes)
        .field("buffers-bytes", stats.ram_buffers_bytes)
        .field("cached-bytes", stats.ram_cached_bytes)
        .field("shared-bytes", stats.ram_shared_bytes)
        .field("slab-bytes", stats.ram_slab_bytes)
        .field("available-percent", stats.ram_available_percent)];

    // Hosts without swap get no swap series at all.
    if stats.swap_total_bytes != 0 {
        records.push(
            WireRecord::new(swap_name)
                .field("total-bytes", stats.swap_total_bytes)
                .field("used-bytes", stats.swap_used_bytes)
                .field("free-bytes", stats.swap_free_bytes)
                .field("used-percent", stats.swap_used_percent)
                .field("swap-in-bytes", stats.swap_in_total_bytes)
                .field("swap-out-bytes", stats.swap_out_total_bytes),
        );
    }
    records
}

fn disk_record(name: &str, unit: &DiskUnitStats) -> WireRecord {
    WireRecord::new(name)
        .tag("directory", &unit.directory)
        .field("device", unit.device.as_str())
        .field("directory", unit.directory.as_str())
        .field("total-bytes", unit.total_bytes)
        .field("used-bytes", unit.used_bytes)
        .field("free-bytes", unit.free_bytes)
        .field("percent-used", unit.percent_used)
        .field("read-count", unit.read_count)
        .field("write-count", unit.write_count)
        .field("read-bytes", unit.read_bytes)
        .field("write-bytes", unit.write_bytes)
        .field("read-time-ms", unit.read_time_ms)
        .field("write-time-ms", unit.write_time_ms)
        .field("busy-time-ms", unit.busy_time_ms)
        .field("read-merged-count", unit.read_merged_count)
        .field("write-merged-count", unit.write_merged_count)
}

fn interface_record(name: &str, iface: &InterfaceStats) -> WireRecord {
    WireRecord::new(name)
        .tag("interface", &iface.interface)
        .field("bytes-sent", iface.bytes_sent)
        .field("bytes-recv", iface.bytes_recv)
        .field("packets-sent", iface.packets_sent)
        .field("packets-recv", iface.packets_recv)
        .field("err-in", iface.err_in)
        .field("err-out", iface.err_out)
        .field("drop-in", iface.drop_in)
        .field("drop-out", iface.drop_out)
}

fn speed_record(name: &str, stats: &SpeedTestStats) -> WireRecord {
    WireRecord::new(name)
        .tag("server_city", &stats.server.city)
        .tag("server_country", &stats.server.country)
        .tag("server_vendor", &stats.server.vendor)
        .tag("server_lat", stats.server.lat)
        .tag("server_long", stats.server.lon)
        .tag("client_lat", stats.client_lat)
        .tag("client_long", stats.client_lon)
        .field("download-mbps", stats.download_mbps())
        .field("upload-mbps", stats.upload_mbps())
        .field("ping-ms", round3(stats.ping_ms))
}

/// Round to three decimal places.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_stats() -> CpuStats {
        CpuStats {
            utilization_percents: vec![10.0, 20.0, 30.0, 40.0],
            freq_mhz: vec![1000, 1100, 1200, 1300],
            context_switches: 5_000,
            interrupts: 1_200,
            software_interrupts: 300,
            load_avg_1m_percent: 25.0,
            load_avg_5m_percent: 50.0,
            load_avg_15m_percent: 125.0,
        }
    }

    fn memory_stats(swap_total: u64) -> MemoryStats {
        MemoryStats {
            ram_total_bytes: 8_000,
            ram_available_bytes: 6_000,
            ram_used_bytes: 2_000,
            ram_free_bytes: 4_000,
            ram_active_bytes: 1_000,
            ram_inactive_bytes: 500,
            ram_buffers_bytes: 100,
            ram_cached_bytes: 1_500,
            ram_shared_bytes: 50,
            ram_slab_bytes: 25,
            ram_available_percent: 75.0,
            swap_total_bytes: swap_total,
            swap_used_bytes: swap_total / 4,
            swap_free_bytes: swap_total - swap_total / 4,
            swap_used_percent: 25.0,
            swap_in_total_bytes: 4096,
            swap_out_total_bytes: 8192,
        }
    }

    fn speed_stats(download_bps: f64) -> SpeedTestStats {
        SpeedTestStats {
            download_bps,
            upload_bps: 20_971_520.0,
            ping_ms: 8.12345,
            server: SpeedTestServer {
                city: "Berlin".into(),
                country: "Germany".into(),
                vendor: "Example ISP".into(),
                lat: 52.52,
                lon: 13.405,
            },
            client_lat: 52.5,
            client_lon: 13.4,
        }
    }

    #[test]
    fn cpu_emits_one_record_per_core_plus_aggregate() {
        let records = Measurement::Cpu(cpu_stats()).to_records(&SeriesNames::default());
        assert_eq!(records.len(), 5);

        for (core, record) in records[..4].iter().enumerate() {
            assert_eq!(record.measurement, "cpu");
            assert_eq!(record.tags["core"], core.to_string());
            assert!(record.fields.contains_key("utilization-percent"));
            assert!(record.fields.contains_key("freq-mhz"));
        }
        assert_eq!(records[2].fields["utilization-percent"], FieldValue::Float(30.0));
        assert_eq!(records[3].fields["freq-mhz"], FieldValue::Float(1300.0));

        let aggregate = &records[4];
        assert!(aggregate.tags.is_empty());
        assert_eq!(aggregate.fields["context_switches"], FieldValue::Integer(5_000));
        assert_eq!(aggregate.fields["load_avg_15m_percent"], FieldValue::Float(125.0));
        assert_eq!(aggregate.fields.len(), 6);
    }

    #[test]
    fn cpu_core_count_follows_shorter_list() {
        let mut stats = cpu_stats();
        stats.freq_mhz.truncate(2);
        let records = Measurement::Cpu(stats).to_records(&SeriesNames::default());
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn memory_without_swap_emits_only_ram() {
        let records = Measurement::Memory(memory_stats(0)).to_records(&SeriesNames::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].measurement, "ram");
        assert_eq!(records[0].fields.len(), 11);
        assert_eq!(records[0].fields["available-percent"], FieldValue::Float(75.0));
    }

    #[test]
    fn memory_with_swap_emits_ram_and_swap() {
        let names = SeriesNames {
            swap: "host-swap".into(),
            ..SeriesNames::default()
        };
        let records = Measurement::Memory(memory_stats(4_000)).to_records(&names);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].measurement, "host-swap");
        assert_eq!(records[1].fields["used-bytes"], FieldValue::Integer(1_000));
        assert_eq!(records[1].fields["swap-out-bytes"], FieldValue::Integer(8192));
    }

    #[test]
    fn speed_test_converts_bits_to_rounded_megabits() {
        let records =
            Measurement::NetworkSpeed(speed_stats(100_000_000.0)).to_records(&SeriesNames::default());
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.measurement, "net-updown");
        assert_eq!(record.fields["download-mbps"], FieldValue::Float(95.367));
        assert_eq!(record.fields["upload-mbps"], FieldValue::Float(20.0));
        assert_eq!(record.fields["ping-ms"], FieldValue::Float(8.123));
        assert_eq!(record.tags["server_city"], "Berlin");
        assert_eq!(record.tags["server_lat"], "52.52");
        assert_eq!(record.tags["client_long"], "13.4");
        assert_eq!(record.tags.len(), 7);
    }

    #[test]
    fn disk_and_network_emit_one_record_per_unit() {
        let unit = DiskUnitStats {
            device: "/dev/sda1".into(),
            directory: "/data".into(),
            total_bytes: 100,
            used_bytes: 40,
            free_bytes: 60,
            percent_used: 40.0,
            read_count: 1,
            write_count: 2,
            read_bytes: 512,
            write_bytes: 1024,
            read_time_ms: 3,
            write_time_ms: 4,
            busy_time_ms: 5,
            read_merged_count: 6,
            write_merged_count: 7,
        };
        let records = Measurement::Disk(vec![unit.clone(), unit]).to_records(&SeriesNames::default());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields["device"], FieldValue::Str("/dev/sda1".into()));
        assert_eq!(records[0].tags["directory"], "/data");

        let iface = InterfaceStats {
            interface: "eth0".into(),
            bytes_sent: 10,
            bytes_recv: 20,
            packets_sent: 1,
            packets_recv: 2,
            err_in: 0,
            err_out: 0,
            drop_in: 3,
            drop_out: 4,
        };
        let records = Measurement::NetworkIo(vec![iface]).to_records(&SeriesNames::default());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tags["interface"], "eth0");
        assert_eq!(records[0].fields["drop-in"], FieldValue::Integer(3));
    }

    #[test]
    fn conversion_is_deterministic() {
        let m = Measurement::Cpu(cpu_stats());
        let names = SeriesNames::default();
        assert_eq!(m.to_records(&names), m.to_records(&names));
    }
}
