//! Active throughput test against speedtest.net-compatible HTTP servers.
//!
//! The test picks the lowest-latency server from a candidate list, then runs
//! parallel download and upload streams against it. Throughput is reported in
//! bits per second; conversion to megabits happens in the measurement model.

use crate::Collector;
use anyhow::Result;
use async_trait::async_trait;
use netpulse_common::types::{Measurement, SpeedTestServer, SpeedTestStats};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

const LATENCY_PROBES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SpeedTestError {
    #[error("SpeedTest: server list is empty")]
    NoServers,

    /// None of the candidate servers answered a latency probe.
    #[error("SpeedTest: failed to find a reachable server among {0} candidates")]
    NoBestServer(usize),

    #[error("SpeedTest: {0} phase transferred no data")]
    NoData(&'static str),

    #[error("SpeedTest: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct SpeedTestSettings {
    pub servers_url: String,
    pub config_url: String,
    /// Parallel streams per download/upload round.
    pub threads: usize,
    /// How many servers from the list are latency-probed.
    pub candidates: usize,
    /// Edge lengths of the `random{N}x{N}.jpg` images to fetch.
    pub download_sizes: Vec<u32>,
    /// Upload payload sizes in bytes.
    pub upload_sizes: Vec<usize>,
    pub timeout: Duration,
}

impl Default for SpeedTestSettings {
    fn default() -> Self {
        Self {
            servers_url: "https://www.speedtest.net/api/js/servers?engine=js&limit=10".to_string(),
            config_url: "https://www.speedtest.net/speedtest-config.php".to_string(),
            threads: 4,
            candidates: 5,
            download_sizes: vec![350, 500, 750, 1000, 1500, 2000],
            upload_sizes: vec![262_144, 524_288, 1_048_576, 2_097_152],
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ServerEntry {
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    sponsor: String,
    #[serde(default)]
    lat: Value,
    #[serde(default)]
    lon: Value,
}

impl ServerEntry {
    /// Directory of the upload URL; test files live alongside it.
    fn base_url(&self) -> String {
        match self.url.rfind('/') {
            Some(idx) => self.url[..=idx].to_string(),
            None => format!("{}/", self.url),
        }
    }

    fn to_server(&self) -> SpeedTestServer {
        SpeedTestServer {
            city: self.name.clone(),
            country: self.country.clone(),
            vendor: self.sponsor.clone(),
            lat: lenient_f64(&self.lat),
            lon: lenient_f64(&self.lon),
        }
    }
}

/// The server list encodes coordinates as strings; accept either form.
fn lenient_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Runs one complete speed test.
#[async_trait]
pub trait SpeedTester: Send + Sync {
    async fn run(&self) -> std::result::Result<SpeedTestStats, SpeedTestError>;
}

pub struct HttpSpeedTester {
    client: reqwest::Client,
    settings: SpeedTestSettings,
}

impl HttpSpeedTester {
    pub fn new(settings: SpeedTestSettings) -> std::result::Result<Self, SpeedTestError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("netpulse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, settings })
    }

    async fn fetch_servers(&self) -> std::result::Result<Vec<ServerEntry>, SpeedTestError> {
        let servers = self
            .client
            .get(&self.settings.servers_url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ServerEntry>>()
            .await?;
        Ok(servers)
    }

    /// Best of [`LATENCY_PROBES`] round trips, in milliseconds.
    async fn latency_ms(&self, server: &ServerEntry) -> Option<f64> {
        let url = format!("{}latency.txt", server.base_url());
        let mut best: Option<f64> = None;
        for _ in 0..LATENCY_PROBES {
            let started = Instant::now();
            let outcome = match self.client.get(&url).send().await {
                Ok(resp) => match resp.error_for_status() {
                    Ok(resp) => resp.bytes().await.map(|_| ()),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    let ms = started.elapsed().as_secs_f64() * 1000.0;
                    best = Some(best.map_or(ms, |b| b.min(ms)));
                }
                Err(e) => tracing::debug!(url = %url, error = %e, "Latency probe failed"),
            }
        }
        best
    }

    async fn best_server(
        &self,
        servers: &[ServerEntry],
    ) -> std::result::Result<(ServerEntry, f64), SpeedTestError> {
        tracing::info!(candidates = servers.len(), "Finding the best server");
        let mut best: Option<(ServerEntry, f64)> = None;
        for server in servers {
            let Some(latency) = self.latency_ms(server).await else {
                continue;
            };
            tracing::debug!(server = %server.name, latency_ms = latency, "Probed server");
            if best.as_ref().map_or(true, |(_, b)| latency < *b) {
                best = Some((server.clone(), latency));
            }
        }
        best.ok_or(SpeedTestError::NoBestServer(servers.len()))
    }

    async fn client_location(&self) -> (f64, f64) {
        let body = match self.fetch_text(&self.settings.config_url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch client location");
                return (0.0, 0.0);
            }
        };
        parse_client_location(&body).unwrap_or_else(|| {
            tracing::warn!("Client location missing from speed test config");
            (0.0, 0.0)
        })
    }

    async fn fetch_text(&self, url: &str) -> std::result::Result<String, reqwest::Error> {
        self.client.get(url).send().await?.error_for_status()?.text().await
    }

    async fn download_bps(&self, base: &str) -> std::result::Result<f64, SpeedTestError> {
        tracing::info!("Downloading");
        let started = Instant::now();
        let mut total_bytes = 0u64;
        for size in &self.settings.download_sizes {
            let mut streams = JoinSet::new();
            for _ in 0..self.settings.threads.max(1) {
                let client = self.client.clone();
                let url = format!("{base}random{size}x{size}.jpg");
                streams.spawn(async move {
                    let resp = client.get(url).send().await?.error_for_status()?;
                    let body = resp.bytes().await?;
                    Ok::<u64, reqwest::Error>(body.len() as u64)
                });
            }
            total_bytes += drain_streams(&mut streams, "download").await;
        }
        throughput_bps(total_bytes, started.elapsed()).ok_or(SpeedTestError::NoData("download"))
    }

    async fn upload_bps(&self, url: &str) -> std::result::Result<f64, SpeedTestError> {
        tracing::info!("Uploading");
        let started = Instant::now();
        let mut total_bytes = 0u64;
        for size in &self.settings.upload_sizes {
            let payload: Vec<u8> = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(*size)
                .collect();
            let mut streams = JoinSet::new();
            for _ in 0..self.settings.threads.max(1) {
                let client = self.client.clone();
                let url = url.to_string();
                let body = payload.clone();
                streams.spawn(async move {
                    let sent = body.len() as u64;
                    client.post(url).body(body).send().await?.error_for_status()?;
                    Ok::<u64, reqwest::Error>(sent)
                });
            }
            total_bytes += drain_streams(&mut streams, "upload").await;
        }
        throughput_bps(total_bytes, started.elapsed()).ok_or(SpeedTestError::NoData("upload"))
    }
}

async fn drain_streams(
    streams: &mut JoinSet<std::result::Result<u64, reqwest::Error>>,
    phase: &'static str,
) -> u64 {
    let mut bytes = 0;
    while let Some(joined) = streams.join_next().await {
        match joined {
            Ok(Ok(n)) => bytes += n,
            Ok(Err(e)) => tracing::debug!(phase, error = %e, "Transfer stream failed"),
            Err(e) => tracing::warn!(phase, error = %e, "Transfer task aborted"),
        }
    }
    bytes
}

fn throughput_bps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return None;
    }
    Some(bytes as f64 * 8.0 / secs)
}

#[async_trait]
impl SpeedTester for HttpSpeedTester {
    async fn run(&self) -> std::result::Result<SpeedTestStats, SpeedTestError> {
        let mut servers = self.fetch_servers().await?;
        if servers.is_empty() {
            return Err(SpeedTestError::NoServers);
        }
        servers.truncate(self.settings.candidates.max(1));

        let (server, ping_ms) = self.best_server(&servers).await?;
        let (client_lat, client_lon) = self.client_location().await;
        let download_bps = self.download_bps(&server.base_url()).await?;
        let upload_bps = self.upload_bps(&server.url).await?;

        Ok(SpeedTestStats {
            download_bps,
            upload_bps,
            ping_ms,
            server: server.to_server(),
            client_lat,
            client_lon,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConfigDocument {
    client: Option<ClientElement>,
}

#[derive(Debug, Deserialize)]
struct ClientElement {
    #[serde(rename = "@lat")]
    lat: f64,
    #[serde(rename = "@lon")]
    lon: f64,
}

/// Extract `lat`/`lon` from the `<client .../>` element of the speedtest config.
pub fn parse_client_location(xml: &str) -> Option<(f64, f64)> {
    match quick_xml::de::from_str::<ConfigDocument>(xml) {
        Ok(doc) => doc.client.map(|client| (client.lat, client.lon)),
        Err(e) => {
            tracing::debug!(error = %e, "Speed test config is not valid XML");
            None
        }
    }
}

pub struct SpeedTestCollector {
    tester: Box<dyn SpeedTester>,
}

impl SpeedTestCollector {
    pub fn new(tester: Box<dyn SpeedTester>) -> Self {
        Self { tester }
    }
}

#[async_trait]
impl Collector for SpeedTestCollector {
    fn name(&self) -> &str {
        "network_speed"
    }

    async fn collect(&mut self) -> Result<Measurement> {
        let stats = self.tester.run().await?;
        tracing::info!(
            download_mbps = stats.download_mbps(),
            upload_mbps = stats.upload_mbps(),
            ping_ms = stats.ping_ms,
            server = %stats.server.city,
            "Speed test finished"
        );
        Ok(Measurement::NetworkSpeed(stats))
    }
}
