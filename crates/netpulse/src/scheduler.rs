use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{Averages, SessionAggregator, ViewModel};
use crate::calibrator::{BandwidthCalibrator, FALLBACK_SCALE_KBS};
use crate::error::ValidationError;
use crate::gauge::{GaugeReading, project};
use crate::probe::ProbeExecutor;
use crate::segments::{Metric, Segment, segments_for};
use crate::types::{MonitorConfig, Sample, SessionState};
use crate::validation::MonitorParams;

const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// Published state of one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub config: MonitorConfig,
    pub state: SessionState,
    pub started_at: DateTime<Local>,
    pub last_measured_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    pub elapsed: Duration,
    pub samples: Vec<Sample>,
    pub bandwidth_scale_max: Option<f64>,
    pub view: ViewModel,
    /// Statistics over the samples so far
    pub running: Averages,
    /// Final statistics, set once the session is finalized
    pub averages: Option<Averages>,
}

impl SessionSnapshot {
    fn new(id: Uuid, config: MonitorConfig) -> Self {
        Self {
            id,
            config,
            state: SessionState::Running,
            started_at: Local::now(),
            last_measured_at: None,
            finished_at: None,
            elapsed: Duration::ZERO,
            samples: Vec::new(),
            bandwidth_scale_max: None,
            view: ViewModel { is_running: true, ..ViewModel::default() },
            running: Averages::default(),
            averages: None,
        }
    }

    pub fn expected_heartbeats(&self) -> usize {
        self.config.expected_heartbeats()
    }

    pub fn latency_segments(&self) -> Vec<Segment> {
        segments_for(Metric::Latency, self.config.latency_scale_max)
    }

    /// Empty until the first successful probe calibrates the scale
    pub fn bandwidth_segments(&self) -> Vec<Segment> {
        self.bandwidth_scale_max
            .map(|scale| segments_for(Metric::Bandwidth, scale))
            .unwrap_or_default()
    }

    pub fn latency_gauge(&self) -> GaugeReading {
        project(self.view.display_latency, self.config.latency_scale_max, &self.latency_segments())
    }

    pub fn bandwidth_gauge(&self) -> GaugeReading {
        let scale = self.bandwidth_scale_max.unwrap_or(FALLBACK_SCALE_KBS);
        project(self.view.display_bandwidth, scale, &self.bandwidth_segments())
    }

    /// Structured status for progress and completion displays
    pub fn status(&self) -> StatusRecord {
        StatusRecord {
            state: self.state,
            target_url: self.config.target_url.to_string(),
            interval_seconds: self.config.interval_seconds,
            duration_seconds: self.config.duration_seconds,
            started_at: self.started_at,
            last_measured_at: self.last_measured_at,
            elapsed_secs: self.elapsed.as_secs_f64(),
            heartbeats: self.samples.len(),
            expected_heartbeats: self.expected_heartbeats(),
            last_error: self.samples.last().and_then(|sample| sample.error.clone()),
            averages: self.averages,
        }
    }
}

/// Progress of a session, as shown next to the gauges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRecord {
    pub state: SessionState,
    pub target_url: String,
    pub interval_seconds: u64,
    pub duration_seconds: u64,
    pub started_at: DateTime<Local>,
    pub last_measured_at: Option<DateTime<Local>>,
    pub elapsed_secs: f64,
    pub heartbeats: usize,
    pub expected_heartbeats: usize,
    /// Error of the most recent probe, if it failed
    pub last_error: Option<String>,
    pub averages: Option<Averages>,
}

/// Everything a finished session produced
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub id: Uuid,
    pub state: SessionState,
    pub config: MonitorConfig,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub samples: Vec<Sample>,
    pub averages: Averages,
    pub bandwidth_scale_max: Option<f64>,
}

impl From<SessionSnapshot> for SessionReport {
    fn from(snapshot: SessionSnapshot) -> Self {
        let averages = snapshot
            .averages
            .unwrap_or_else(|| SessionAggregator::from_samples(&snapshot.samples).running());
        Self {
            id: snapshot.id,
            state: snapshot.state,
            config: snapshot.config,
            started_at: snapshot.started_at,
            finished_at: snapshot.finished_at,
            samples: snapshot.samples,
            averages,
            bandwidth_scale_max: snapshot.bandwidth_scale_max,
        }
    }
}

/// Observer and control side of a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    stop_tx: Arc<watch::Sender<bool>>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    sample_tx: broadcast::Sender<Sample>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cancellation. An in-flight probe still completes and is kept,
    /// but no further probe starts.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn state(&self) -> SessionState {
        self.snapshot_rx.borrow().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Copy of the latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every published change
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Live stream of samples recorded after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Sample> {
        self.sample_tx.subscribe()
    }

    /// Wait for the session to reach a terminal state
    pub async fn wait(&self) -> SessionReport {
        let mut rx = self.snapshot_rx.clone();
        let terminal = rx
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .map(|snapshot| snapshot.clone());
        let snapshot = match terminal {
            Ok(snapshot) => snapshot,
            // Session task is gone, report whatever it last published
            Err(_) => rx.borrow().clone(),
        };
        snapshot.into()
    }
}

/// Monitoring scheduler - owns at most one running session at a time
pub struct MonitoringScheduler {
    executor: Arc<ProbeExecutor>,
    calibrator: BandwidthCalibrator,
    active: Option<(SessionHandle, JoinHandle<()>)>,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(executor: Arc<ProbeExecutor>) -> Self {
        Self { executor, calibrator: BandwidthCalibrator::new(), active: None }
    }

    /// Calibrate bandwidth scales with custom target time and headroom.
    ///
    /// Any scale already held by `calibrator` is cleared at every session start.
    pub fn with_calibrator(mut self, calibrator: BandwidthCalibrator) -> Self {
        self.calibrator = calibrator;
        self
    }

    /// Validate raw parameters and start a session with them
    pub async fn start_with_params(
        &mut self,
        params: &MonitorParams,
    ) -> Result<SessionHandle, ValidationError> {
        let config = params.validate()?;
        self.start(config).await
    }

    /// Start a session, stopping any previous one first.
    ///
    /// The first probe fires immediately. A config that fails validation
    /// starts nothing and leaves any running session alone.
    pub async fn start(&mut self, config: MonitorConfig) -> Result<SessionHandle, ValidationError> {
        config.validate()?;
        self.stop().await;

        let mut calibrator = self.calibrator.clone();
        calibrator.reset();

        let id = Uuid::new_v4();
        let (stop_tx, stop_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::new(id, config.clone()));
        let (sample_tx, _) = broadcast::channel(SAMPLE_CHANNEL_CAPACITY);

        let handle = SessionHandle {
            id,
            stop_tx: Arc::new(stop_tx),
            snapshot_rx,
            sample_tx: sample_tx.clone(),
        };

        info!(
            session = %id,
            url = %config.target_url,
            interval_seconds = config.interval_seconds,
            duration_seconds = config.duration_seconds,
            expected_heartbeats = config.expected_heartbeats(),
            "Starting monitoring session"
        );

        let task = tokio::spawn(run_session(
            self.executor.clone(),
            config,
            calibrator,
            stop_rx,
            snapshot_tx,
            sample_tx,
        ));

        self.active = Some((handle.clone(), task));
        Ok(handle)
    }

    /// Stop the active session, if any, and wait for its loop to exit
    pub async fn stop(&mut self) {
        if let Some((handle, task)) = self.active.take() {
            handle.stop();
            if let Err(e) = task.await {
                warn!(session = %handle.id(), "Session task ended abnormally: {e}");
            }
        }
    }

    /// Handle of the most recently started session
    pub fn current(&self) -> Option<&SessionHandle> {
        self.active.as_ref().map(|(handle, _)| handle)
    }

    /// State of the most recent session, Idle if none was started
    pub fn state(&self) -> SessionState {
        self.current().map(SessionHandle::state).unwrap_or(SessionState::Idle)
    }
}

async fn run_session(
    executor: Arc<ProbeExecutor>,
    config: MonitorConfig,
    mut calibrator: BandwidthCalibrator,
    mut stop_rx: watch::Receiver<bool>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    sample_tx: broadcast::Sender<Sample>,
) {
    let started = Instant::now();
    let expected = config.expected_heartbeats();
    let mut aggregator = SessionAggregator::new();

    let mut ticker = interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let final_state = loop {
        tokio::select! {
            biased;
            Ok(_) = stop_rx.wait_for(|stopped| *stopped) => break SessionState::Cancelled,
            _ = ticker.tick() => {}
        }

        let sample = executor.execute(&config, &mut calibrator).await;
        aggregator.record(&sample);

        let elapsed = started.elapsed();
        let mut heartbeats = 0;
        snapshot_tx.send_modify(|snapshot| {
            snapshot.samples.push(sample.clone());
            snapshot.elapsed = elapsed;
            snapshot.last_measured_at = Some(Local::now());
            snapshot.bandwidth_scale_max = calibrator.scale_max();
            snapshot.view = aggregator.view(SessionState::Running);
            snapshot.running = aggregator.running();
            heartbeats = snapshot.samples.len();
        });
        // No subscribers is fine
        let _ = sample_tx.send(sample);

        debug!(
            heartbeats,
            expected,
            elapsed_secs = elapsed.as_secs_f64(),
            duration_seconds = config.duration_seconds,
            "Heartbeat added"
        );

        if *stop_rx.borrow() {
            break SessionState::Cancelled;
        }
        if heartbeats >= expected || elapsed >= config.duration() {
            break SessionState::Completed;
        }
    };

    let averages = aggregator.finalize();
    let view = aggregator.view(final_state);
    snapshot_tx.send_modify(|snapshot| {
        snapshot.state = final_state;
        snapshot.elapsed = started.elapsed();
        snapshot.finished_at = Some(Local::now());
        snapshot.view = view;
        snapshot.running = averages;
        snapshot.averages = Some(averages);
    });

    info!(
        state = %final_state,
        heartbeats = averages.samples,
        failures = averages.failure_count,
        avg_latency_ms = averages.avg_latency_ms,
        avg_bandwidth_kbs = averages.avg_bandwidth_kbs,
        "Monitoring session finished"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use url::Url;

    use super::*;
    use crate::error::ProbeError;
    use crate::probe::{ProbeResponse, Prober};
    use crate::types::RequestSpec;

    /// Endpoint with a fixed latency that records every URL it is asked for
    struct FakeEndpoint {
        latency: Duration,
        body_len: usize,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeEndpoint {
        fn ok(latency_ms: u64, body_len: usize) -> Arc<Self> {
            Arc::new(Self {
                latency: Duration::from_millis(latency_ms),
                body_len,
                fail: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(latency_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                latency: Duration::from_millis(latency_ms),
                body_len: 0,
                fail: true,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Prober for FakeEndpoint {
        async fn fetch(
            &self,
            target: &Url,
            _request: &RequestSpec,
            _timeout: Duration,
        ) -> Result<ProbeResponse, ProbeError> {
            self.calls.lock().unwrap().push(target.to_string());
            tokio::time::sleep(self.latency).await;
            if self.fail {
                return Err(ProbeError::Network("connection refused".into()));
            }
            Ok(ProbeResponse { status: 200, body: vec![b'a'; self.body_len] })
        }
    }

    fn scheduler(endpoint: Arc<FakeEndpoint>) -> MonitoringScheduler {
        MonitoringScheduler::new(Arc::new(ProbeExecutor::new(endpoint)))
    }

    fn config(url: &str, interval_seconds: u64, duration_seconds: u64) -> MonitorConfig {
        let mut config = MonitorConfig::new(Url::parse(url).unwrap());
        config.interval_seconds = interval_seconds;
        config.duration_seconds = duration_seconds;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_natural_completion_collects_expected_heartbeats() {
        let endpoint = FakeEndpoint::ok(50, 1024);
        let mut scheduler = scheduler(endpoint.clone());

        let handle = scheduler.start(config("https://example.com/a", 2, 6)).await.unwrap();
        let report = handle.wait().await;

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.samples.len(), 4);
        assert!(report.samples.iter().all(|sample| sample.error.is_none()));
        assert!((report.averages.avg_latency_ms - 50.0).abs() < 1.0);
        assert_eq!(endpoint.calls().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_endpoint_still_completes() {
        let mut scheduler = scheduler(FakeEndpoint::failing(10));

        let report = scheduler.start(config("https://example.com/a", 2, 6)).await.unwrap().wait().await;

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.samples.len(), 4);
        assert!(report.samples.iter().all(|sample| sample.error.is_some()));
        assert_eq!(report.averages.avg_latency_ms, 0.0);
        assert_eq!(report.averages.avg_bandwidth_kbs, 0.0);
        assert_eq!(report.averages.failure_rate, 1.0);
        assert_eq!(report.bandwidth_scale_max, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_second_heartbeat() {
        let mut scheduler = scheduler(FakeEndpoint::ok(50, 1024));
        let handle = scheduler.start(config("https://example.com/a", 1, 9)).await.unwrap();
        assert_eq!(handle.snapshot().expected_heartbeats(), 10);

        let mut rx = handle.watch();
        rx.wait_for(|snapshot| snapshot.samples.len() >= 2).await.unwrap();
        handle.stop();

        let report = handle.wait().await;
        assert_eq!(report.state, SessionState::Cancelled);
        assert_eq!(report.samples.len(), 2);
        assert!((report.averages.avg_latency_ms - 50.0).abs() < 1.0);
        assert!(!handle.snapshot().view.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_in_flight_probe() {
        let endpoint = FakeEndpoint::ok(500, 256);
        let mut scheduler = scheduler(endpoint.clone());
        let handle = scheduler.start(config("https://example.com/a", 1, 10)).await.unwrap();

        // First probe is still waiting on the endpoint
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();

        let report = handle.wait().await;
        assert_eq!(report.state, SessionState::Cancelled);
        assert_eq!(report.samples.len(), 1);
        assert!(report.samples[0].error.is_none());

        // Nothing else fires afterwards
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_records_nothing_extra() {
        let mut scheduler = scheduler(FakeEndpoint::ok(10, 10));
        let handle = scheduler.start(config("https://example.com/a", 1, 10)).await.unwrap();
        handle.stop();

        let report = handle.wait().await;
        assert_eq!(report.state, SessionState::Cancelled);
        assert!(report.samples.is_empty());
        assert_eq!(report.averages.samples, 0);
        assert_eq!(report.averages.avg_latency_ms, 0.0);
        assert_eq!(report.averages.failure_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_duration_ends_session_early() {
        // Probes slower than the interval: the clock runs out before the count
        let mut scheduler = scheduler(FakeEndpoint::ok(1_500, 64));
        let report = scheduler.start(config("https://example.com/a", 1, 2)).await.unwrap().wait().await;

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.samples.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_stops_previous_loop() {
        let endpoint = FakeEndpoint::ok(20, 128);
        let mut scheduler = scheduler(endpoint.clone());

        let first = scheduler.start(config("https://first.example.com/", 1, 10)).await.unwrap();
        first.watch().wait_for(|snapshot| snapshot.samples.len() >= 2).await.unwrap();

        let second = scheduler.start(config("https://second.example.com/", 2, 4)).await.unwrap();
        assert_eq!(first.state(), SessionState::Cancelled);

        let report = second.wait().await;
        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.samples.len(), 3);

        let calls = endpoint.calls();
        let first_calls = first.snapshot().samples.len();
        assert!(calls[..first_calls].iter().all(|url| url.contains("first")));
        assert!(calls[first_calls..].iter().all(|url| url.contains("second")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bandwidth_scale_set_by_first_success() {
        let mut scheduler = scheduler(FakeEndpoint::ok(100, 2048));
        let handle = scheduler.start(config("https://example.com/a", 1, 1)).await.unwrap();

        let report = handle.wait().await;
        let scale = report.bandwidth_scale_max.unwrap();
        assert!((scale - 40.0).abs() < 1e-9);

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.bandwidth_segments().len(), 5);
        assert_eq!(snapshot.bandwidth_segments()[4].upper_bound, scale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_record_tracks_progress() {
        let mut scheduler = scheduler(FakeEndpoint::ok(50, 512));
        let handle = scheduler.start(config("https://example.com/a", 2, 6)).await.unwrap();

        let mut rx = handle.watch();
        let status = rx
            .wait_for(|snapshot| snapshot.samples.len() == 1)
            .await
            .unwrap()
            .status();
        assert_eq!(status.state, SessionState::Running);
        assert_eq!(status.heartbeats, 1);
        assert_eq!(status.expected_heartbeats, 4);
        assert!(status.last_measured_at.is_some());
        assert!(status.averages.is_none());

        handle.wait().await;
        let status = handle.snapshot().status();
        assert_eq!(status.state, SessionState::Completed);
        assert_eq!(status.heartbeats, 4);
        assert!(status.averages.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_params_never_start() {
        let mut scheduler = scheduler(FakeEndpoint::ok(10, 10));
        let mut params = MonitorParams::new("https://example.com");
        params.interval = "20".into();

        let result = scheduler.start_with_params(&params).await;
        assert!(matches!(result, Err(ValidationError::IntervalOutOfRange { .. })));
        assert_eq!(scheduler.state(), SessionState::Idle);
        assert!(scheduler.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gauges_show_averages_after_completion() {
        let mut scheduler = scheduler(FakeEndpoint::ok(300, 1024));
        let mut config = config("https://example.com/a", 1, 1);
        config.latency_scale_max = 250.0;
        let handle = scheduler.start(config).await.unwrap();
        handle.wait().await;

        let latency = handle.snapshot().latency_gauge();
        assert_eq!(latency.fraction, 1.0);
        assert!(latency.display_value().starts_with("300."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_receive_every_heartbeat() {
        let mut scheduler = scheduler(FakeEndpoint::ok(50, 512));
        let handle = scheduler.start(config("https://example.com/a", 1, 2)).await.unwrap();
        let mut samples = handle.subscribe();

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(samples.recv().await.unwrap());
        }
        let report = handle.wait().await;

        assert_eq!(received, report.samples);
        assert!(received.iter().all(|sample| sample.latency_ms >= 50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_config_never_starts() {
        let endpoint = FakeEndpoint::ok(10, 10);
        let mut scheduler = scheduler(endpoint.clone());
        let mut config = config("https://example.com/a", 0, 0);
        config.latency_scale_max = 5000.0;

        let result = scheduler.start(config).await;
        assert!(matches!(result, Err(ValidationError::IntervalOutOfRange { value: 0, .. })));
        assert_eq!(scheduler.state(), SessionState::Idle);
        assert!(scheduler.current().is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_restart_keeps_running_session() {
        let mut scheduler = scheduler(FakeEndpoint::ok(20, 128));
        let running = scheduler.start(config("https://example.com/a", 1, 10)).await.unwrap();

        let mut bad = config("https://example.com/b", 2, 6);
        bad.duration_seconds = 1;
        assert!(scheduler.start(bad).await.is_err());

        assert!(running.is_running());
        assert_eq!(scheduler.current().map(SessionHandle::id), Some(running.id()));
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_session_starts_with_cleared_scale() {
        let mut seeded = BandwidthCalibrator::with_target(0.2, 1.0);
        seeded.observe(1_000_000);

        let mut scheduler = scheduler(FakeEndpoint::ok(100, 2048)).with_calibrator(seeded);
        let report = scheduler.start(config("https://example.com/a", 1, 1)).await.unwrap().wait().await;

        // 2048 bytes over 0.2 s without headroom
        let scale = report.bandwidth_scale_max.unwrap();
        assert!((scale - 10.0).abs() < 1e-9);
    }
}
