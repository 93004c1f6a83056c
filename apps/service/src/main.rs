mod config;
mod device;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use logger::LogFormat;
use netpulse::segments::zone_for;
use netpulse::{
    GaugeReading, MonitorParams, MonitoringScheduler, ProbeExecutor, Sample, SessionSnapshot, Zone,
};
use tracing::{debug, info, level_filters::LevelFilter, warn};

/// Measure latency and bandwidth to an HTTP endpoint over a timed session
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Endpoint to probe
    #[arg(long)]
    url: Option<String>,

    /// Seconds between probes (1-10)
    #[arg(long)]
    interval: Option<String>,

    /// Session length in seconds
    #[arg(long)]
    duration: Option<String>,

    /// Latency gauge upper bound in ms (1-1000)
    #[arg(long)]
    latency_max: Option<String>,

    /// HTTP method for every probe
    #[arg(long)]
    method: Option<String>,

    /// Request header as `Name: value`, may be repeated
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Request body
    #[arg(long)]
    body: Option<String>,

    /// Per-probe timeout in ms
    #[arg(long)]
    timeout_ms: Option<String>,

    /// Device label attached to every heartbeat
    #[arg(long)]
    device: Option<String>,

    /// Size payloads by their compact JSON form
    #[arg(long)]
    json_size: bool,

    /// Write the heartbeat log as JSON when the session ends
    #[arg(long)]
    export: Option<PathBuf>,

    /// Config file, default $XDG_CONFIG_HOME/netpulse/config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layer the flags that were given over `params`
    fn apply(&self, params: &mut MonitorParams) {
        let overrides = [
            (&mut params.url, &self.url),
            (&mut params.interval, &self.interval),
            (&mut params.duration, &self.duration),
            (&mut params.latency_max, &self.latency_max),
            (&mut params.method, &self.method),
            (&mut params.timeout_ms, &self.timeout_ms),
        ];
        for (field, flag) in overrides {
            if let Some(value) = flag {
                *field = value.clone();
            }
        }

        if !self.headers.is_empty() {
            params.headers = self.headers.clone();
        }
        if self.body.is_some() {
            params.body = self.body.clone();
        }
        if self.device.is_some() {
            params.device = self.device.clone();
        }
        params.json_size |= self.json_size;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::from_config(cli.config.as_ref()).context("Failed to load config")?;

    let (level, format, rejected) = logging_settings(&config.logging);
    logger::init_with(level, format);
    for complaint in rejected {
        warn!("{complaint}");
    }
    debug!("{config}");

    let mut params = config.monitor.to_params(Some(device::default_label()));
    cli.apply(&mut params);

    let executor = Arc::new(ProbeExecutor::http().context("Failed to build HTTP client")?);
    let mut scheduler = MonitoringScheduler::new(executor);
    let handle = scheduler
        .start_with_params(&params)
        .await
        .context("Invalid monitoring parameters")?;

    let mut updates = handle.watch();
    let mut reported = 0;
    let mut interrupted = false;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                reported = report_heartbeats(&snapshot, reported);
                if snapshot.state.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                info!("Interrupt received, cancelling session");
                handle.stop();
                interrupted = true;
            }
        }
    }

    let report = handle.wait().await;
    scheduler.stop().await;

    let snapshot = handle.snapshot();
    let status = snapshot.status();
    info!(
        state = %status.state,
        heartbeats = status.heartbeats,
        expected = status.expected_heartbeats,
        elapsed_secs = status.elapsed_secs,
        avg_latency_ms = report.averages.avg_latency_ms,
        avg_bandwidth_kbs = report.averages.avg_bandwidth_kbs,
        failure_rate = report.averages.failure_rate,
        "Monitoring finished"
    );
    log_gauge("latency", &snapshot.latency_gauge());
    log_gauge("bandwidth", &snapshot.bandwidth_gauge());

    if let Some(path) = &cli.export {
        export_heartbeats(path, &report.samples).await?;
    }

    Ok(())
}

/// Level and format from the `[logging]` section, plus a note for every
/// value that had to fall back to its default
fn logging_settings(logging: &config::Logging) -> (LevelFilter, LogFormat, Vec<String>) {
    let mut rejected = Vec::new();

    let level = logging.level.parse().unwrap_or_else(|_| {
        rejected.push(format!("Unknown log level: {}, falling back to info", logging.level));
        LevelFilter::INFO
    });
    let format = logging.format.parse().unwrap_or_else(|error| {
        rejected.push(format!("{error}, falling back to compact"));
        LogFormat::Compact
    });

    (level, format, rejected)
}

/// Write the heartbeat log as pretty JSON. An empty log writes nothing.
///
/// Returns whether the file was written.
async fn export_heartbeats(path: &Path, samples: &[Sample]) -> Result<bool> {
    if samples.is_empty() {
        warn!(path = %path.display(), "No heartbeats to export");
        return Ok(false);
    }

    let json = serde_json::to_string_pretty(samples)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), heartbeats = samples.len(), "Exported heartbeats");
    Ok(true)
}

/// Log the samples past `reported`, returning the new count
fn report_heartbeats(snapshot: &SessionSnapshot, reported: usize) -> usize {
    let expected = snapshot.expected_heartbeats();
    let latency_segments = snapshot.latency_segments();
    let bandwidth_segments = snapshot.bandwidth_segments();

    for (index, sample) in snapshot.samples.iter().enumerate().skip(reported) {
        match &sample.error {
            Some(error) => warn!(
                heartbeat = index + 1,
                expected,
                time = %sample.timestamp,
                "Probe failed: {error}"
            ),
            None => info!(
                heartbeat = index + 1,
                expected,
                time = %sample.timestamp,
                latency_ms = sample.latency_ms,
                latency_zone = zone_name(zone_for(sample.latency_ms, &latency_segments)),
                bandwidth_kbs = sample.bandwidth_kbs,
                bandwidth_zone = zone_name(zone_for(sample.bandwidth_kbs, &bandwidth_segments)),
                "Heartbeat"
            ),
        }
    }

    snapshot.samples.len()
}

fn log_gauge(metric: &str, reading: &GaugeReading) {
    info!(
        metric,
        value = %reading.display_value(),
        angle_degrees = reading.angle_degrees,
        zone = zone_name(reading.zone),
        color = reading.color_hex(),
        "Gauge"
    );
}

fn zone_name(zone: Option<Zone>) -> &'static str {
    zone.map(|zone| zone.name()).unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file_params() -> MonitorParams {
        let monitor = config::Monitor {
            url: "https://example.com/from-file".into(),
            interval: 4,
            headers: vec!["X-From: file".into()],
            body: Some("{}".into()),
            ..config::Monitor::default()
        };
        monitor.to_params(Some("Unix Desktop (Linux)".into()))
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("netpulse").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut params = file_params();
        parse(&["--url", "https://example.com/from-flag", "--interval", "7", "--json-size"])
            .apply(&mut params);

        assert_eq!(params.url, "https://example.com/from-flag");
        assert_eq!(params.interval, "7");
        assert!(params.json_size);
    }

    #[test]
    fn test_missing_flags_keep_file_values() {
        let mut params = file_params();
        parse(&[]).apply(&mut params);

        assert_eq!(params, file_params());
        assert_eq!(params.duration, "30");
        assert_eq!(params.device.as_deref(), Some("Unix Desktop (Linux)"));
    }

    #[test]
    fn test_repeated_headers_replace_file_headers() {
        let mut params = file_params();
        parse(&["-H", "Accept: text/plain", "--header", "X-Trace: 1"]).apply(&mut params);

        assert_eq!(params.headers, vec!["Accept: text/plain".to_string(), "X-Trace: 1".to_string()]);
        assert_eq!(params.body.as_deref(), Some("{}"));
    }

    #[test]
    fn test_invalid_logging_values_fall_back() {
        let logging = config::Logging { level: "loud".into(), format: "yaml".into() };
        let (level, format, rejected) = logging_settings(&logging);

        assert_eq!(level, LevelFilter::INFO);
        assert_eq!(format, LogFormat::Compact);
        assert_eq!(rejected.len(), 2);
        assert!(rejected[0].contains("loud"));
        assert!(rejected[1].contains("yaml"));
    }

    #[test]
    fn test_valid_logging_values_are_kept() {
        let logging = config::Logging { level: "debug".into(), format: "json".into() };
        let (level, format, rejected) = logging_settings(&logging);

        assert_eq!(level, LevelFilter::DEBUG);
        assert_eq!(format, LogFormat::Json);
        assert!(rejected.is_empty());
    }

    #[tokio::test]
    async fn test_empty_log_is_not_exported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("heartbeats.json");

        assert!(!export_heartbeats(&path, &[]).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_log_exports_heartbeat_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("heartbeats.json");
        let samples = vec![Sample::success(42.0, 12.5), Sample::failure("HTTP error! status: 500")];

        assert!(export_heartbeats(&path, &samples).await.unwrap());

        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(exported.as_array().unwrap().len(), 2);
        assert_eq!(exported[0]["latency"], 42.0);
        assert_eq!(exported[1]["error"], "HTTP error! status: 500");
    }
}
