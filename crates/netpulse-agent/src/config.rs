use netpulse_collector::speedtest::SpeedTestSettings;
use netpulse_common::error::ConfigError;
use netpulse_common::rate::parse_refresh_rate;
use netpulse_common::types::SeriesNames;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub influxdb: InfluxConfig,
    pub cpu_monitor: CpuMonitorConfig,
    pub memory_monitor: MemoryMonitorConfig,
    pub network: NetworkConfig,
    pub disk_monitor: DiskMonitorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    /// `host:port`, or a full URL when a scheme is given.
    pub server: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CpuMonitorConfig {
    pub measurement: String,
    pub monitor_rate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryMonitorConfig {
    pub ram_measurement: String,
    pub swap_measurement: String,
    pub monitor_rate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub speedtest: SpeedtestConfig,
    pub io: NetworkIoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeedtestConfig {
    pub measurement: String,
    pub monitor_rate: String,
    /// Override for the candidate server list endpoint.
    pub servers_url: Option<String>,
    /// Override for the endpoint reporting the client's location.
    pub config_url: Option<String>,
    pub threads: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkIoConfig {
    pub interfaces: Vec<String>,
    pub measurement: String,
    pub monitor_rate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiskMonitorConfig {
    pub directories: Vec<String>,
    #[serde(default = "default_disk_measurement")]
    pub measurement: String,
    pub monitor_rate: String,
}

fn default_write_timeout() -> u64 {
    10
}

fn default_health_check_interval() -> u64 {
    3
}

fn default_disk_measurement() -> String {
    "disk".to_string()
}

impl AgentConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty required values and malformed refresh rates up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("influxdb.server", &self.influxdb.server),
            ("influxdb.token", &self.influxdb.token),
            ("influxdb.org", &self.influxdb.org),
            ("influxdb.bucket", &self.influxdb.bucket),
            ("cpu_monitor.measurement", &self.cpu_monitor.measurement),
            ("memory_monitor.ram_measurement", &self.memory_monitor.ram_measurement),
            ("memory_monitor.swap_measurement", &self.memory_monitor.swap_measurement),
            ("network.speedtest.measurement", &self.network.speedtest.measurement),
            ("network.io.measurement", &self.network.io.measurement),
            ("disk_monitor.measurement", &self.disk_monitor.measurement),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingKey(key.to_string()));
            }
        }

        for (key, secs) in [
            ("influxdb.write_timeout_secs", self.influxdb.write_timeout_secs),
            ("influxdb.health_check_interval_secs", self.influxdb.health_check_interval_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be at least 1 second".to_string(),
                });
            }
        }

        if self.network.io.interfaces.is_empty() {
            return Err(ConfigError::EmptyList("network.io.interfaces".to_string()));
        }
        if self.disk_monitor.directories.is_empty() {
            return Err(ConfigError::EmptyList("disk_monitor.directories".to_string()));
        }

        for rate in [
            &self.cpu_monitor.monitor_rate,
            &self.memory_monitor.monitor_rate,
            &self.network.speedtest.monitor_rate,
            &self.network.io.monitor_rate,
            &self.disk_monitor.monitor_rate,
        ] {
            parse_refresh_rate(rate)?;
        }
        Ok(())
    }

    pub fn series_names(&self) -> SeriesNames {
        SeriesNames {
            cpu: self.cpu_monitor.measurement.clone(),
            ram: self.memory_monitor.ram_measurement.clone(),
            swap: self.memory_monitor.swap_measurement.clone(),
            disk: self.disk_monitor.measurement.clone(),
            network_io: self.network.io.measurement.clone(),
            network_speed: self.network.speedtest.measurement.clone(),
        }
    }

    pub fn speedtest_settings(&self) -> SpeedTestSettings {
        let cfg = &self.network.speedtest;
        let defaults = SpeedTestSettings::default();
        SpeedTestSettings {
            servers_url: cfg.servers_url.clone().unwrap_or(defaults.servers_url),
            config_url: cfg.config_url.clone().unwrap_or(defaults.config_url),
            threads: cfg.threads.unwrap_or(defaults.threads),
            ..defaults
        }
    }
}

impl InfluxConfig {
    /// Build the HTTP base URL from `server`.
    pub fn base_url(&self) -> String {
        let addr = self.server.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
[influxdb]
server = "localhost:8086"
token = "secret-token"
org = "home"
bucket = "netpulse"

[cpu_monitor]
measurement = "cpu"
monitor_rate = "30s"

[memory_monitor]
ram_measurement = "ram"
swap_measurement = "swap"
monitor_rate = "1m"

[network.speedtest]
measurement = "net-updown"
monitor_rate = "1h"

[network.io]
interfaces = ["eth0", "wlan0"]
measurement = "net-io"
monitor_rate = "30s"

[disk_monitor]
directories = ["/", "/data"]
monitor_rate = "5m"
"#;

    #[test]
    fn sample_config_parses_with_defaults() {
        let config = AgentConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.influxdb.bucket, "netpulse");
        assert_eq!(config.influxdb.write_timeout(), Duration::from_secs(10));
        assert_eq!(config.influxdb.health_check_interval(), Duration::from_secs(3));
        assert_eq!(config.network.io.interfaces, vec!["eth0", "wlan0"]);
        assert_eq!(config.disk_monitor.measurement, "disk");

        let names = config.series_names();
        assert_eq!(names.network_speed, "net-updown");
        assert_eq!(names.swap, "swap");
    }

    #[test]
    fn missing_key_fails_to_parse() {
        let without_token = SAMPLE.replace("token = \"secret-token\"\n", "");
        let err = AgentConfig::from_toml_str(&without_token).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn empty_value_is_a_missing_key() {
        let blank_org = SAMPLE.replace("org = \"home\"", "org = \"  \"");
        let err = AgentConfig::from_toml_str(&blank_org).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "influxdb.org"));
    }

    #[test]
    fn zero_second_timings_are_rejected() {
        let with = |line: &str| SAMPLE.replace("bucket = \"netpulse\"\n", &format!("bucket = \"netpulse\"\n{line}\n"));

        let err = AgentConfig::from_toml_str(&with("write_timeout_secs = 0")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "influxdb.write_timeout_secs"));

        let err = AgentConfig::from_toml_str(&with("health_check_interval_secs = 0")).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "influxdb.health_check_interval_secs")
        );

        let config = AgentConfig::from_toml_str(&with("health_check_interval_secs = 1")).unwrap();
        assert_eq!(config.influxdb.health_check_interval(), Duration::from_secs(1));
    }

    #[test]
    fn bad_rate_fails_validation() {
        let bad = SAMPLE.replace("monitor_rate = \"5m\"", "monitor_rate = \"5y\"");
        let err = AgentConfig::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRefreshRate { .. }));
    }

    #[test]
    fn empty_directory_list_is_rejected() {
        let bad = SAMPLE.replace("directories = [\"/\", \"/data\"]", "directories = []");
        let err = AgentConfig::from_toml_str(&bad).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyList(_)));
    }

    #[test]
    fn base_url_adds_scheme_only_when_missing() {
        let mut config = AgentConfig::from_toml_str(SAMPLE).unwrap().influxdb;
        assert_eq!(config.base_url(), "http://localhost:8086");
        config.server = "https://influx.example.com/".to_string();
        assert_eq!(config.base_url(), "https://influx.example.com");
    }

    #[test]
    fn speedtest_overrides_fall_back_to_defaults() {
        let config = AgentConfig::from_toml_str(SAMPLE).unwrap();
        let settings = config.speedtest_settings();
        assert_eq!(settings.servers_url, SpeedTestSettings::default().servers_url);
        assert_eq!(settings.threads, 4);
    }

    #[test]
    fn load_reports_unreadable_path() {
        let err = AgentConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = AgentConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.cpu_monitor.monitor_rate, "30s");
    }
}
