// Fraud-risk aggregation.
//
// The aggregator owns one instance of each detector, runs them against the
// collected telemetry and a single geolocation fix, and folds every score
// into one consolidated report. A small set of critical override signals
// forces the location verdict regardless of the numeric total.
//
// Background monitors (devtools polling, DOM mutation watch, the behavior
// watch) keep writing into the shared state after a report is produced.
// The event model serializes individual mutations, but their ordering
// relative to a foreground analysis is unspecified; consumers wanting live
// data re-query the aggregator instead of trusting a snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::device_fingerprint::DeviceFingerprintDetector;
use crate::devtools_monitor::{DevToolsTamperMonitor, TamperChannel, TamperProbe};
use crate::distance::great_circle_distance_m;
use crate::environment_signature::EnvironmentSignatureDetector;
use crate::error::{AnalysisError, GeolocationError};
use crate::extension_signature::ExtensionSignatureDetector;
use crate::geo_time;
use crate::geolocation::{GeolocationProvider, PositionOptions};
use crate::location_behavior::LocationBehaviorAnalyzer;
use crate::lock_utils::lock_or_recover;
use crate::report::{
    CriticalOverrideSignal, DetectionResult, FraudRiskReport, LocationAssessment,
    OverallAssessment, RiskLevel,
};
use crate::signature;
use crate::telemetry::{DomMutationEvent, EnvironmentTelemetry, LocationFix};
use crate::vpn_signature::VpnSignatureDetector;

const FAST_RESPONSE_POINTS: u32 = 15;
const ACCURACY_BOUNDS_POINTS: u32 = 10;
const ROUNDED_COORD_POINTS: u32 = 15;
const TIMEZONE_MISMATCH_POINTS: u32 = 25;
const NULL_ISLAND_POINTS: u32 = 30;
const CENTROID_POINTS: u32 = 10;
const SIGNATURE_COORD_POINTS: u32 = 40;
const ACCURACY_150_POINTS: u32 = 30;
const CONSOLE_OVERRIDE_POINTS: u32 = 15;

/// Default map centers of the DevTools sensor override panel. A fix landing
/// on one of these was almost certainly typed into a dropdown.
const DEVTOOLS_PRESET_COORDS: &[(&str, f64, f64)] = &[
    ("Mountain View (Googleplex)", 37.4224764, -122.0842499),
    ("Berlin", 52.520007, 13.404954),
    ("London", 51.507351, -0.127758),
    ("Moscow", 55.755826, 37.617300),
    ("Mumbai", 19.075984, 72.877656),
    ("San Francisco", 37.774929, -122.419416),
    ("Shanghai", 31.230416, 121.473701),
    ("Sao Paulo", -23.550520, -46.633309),
    ("Tokyo", 35.689487, 139.691706),
];

const EMULATOR_COORDS: &[(&str, f64, f64)] =
    &[("Android emulator default", 37.4219983, -122.084)];

/// City centroids that spoofing tutorials hand out as copy-paste examples.
const SPOOFED_CENTROIDS: &[(&str, f64, f64)] = &[
    ("New York", 40.7128, -74.0060),
    ("Los Angeles", 34.0522, -118.2437),
    ("Chicago", 41.8781, -87.6298),
    ("Paris", 48.8566, 2.3522),
    ("Sydney", -33.8688, 151.2093),
];

/// Coordinates within 0.1 degree of (0, 0): the classic uninitialized or
/// zeroed-out position.
pub fn is_null_island(latitude: f64, longitude: f64) -> bool {
    latitude.abs() <= 0.1 && longitude.abs() <= 0.1
}

/// Live state changes pushed to the embedding layer so it can refresh
/// without re-running the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveUpdate {
    DevToolsDetected,
    LocationSpoofedByDevTools,
    LocationSpoofedByBehavior,
}

/// Receives live updates from the background monitors. Injected at
/// construction; monitors never reach into shared globals.
pub trait LiveUpdateSink: Send + Sync {
    fn on_update(&self, update: LiveUpdate);
}

/// Sink for embedders that do not consume live updates.
pub struct NullSink;

impl LiveUpdateSink for NullSink {
    fn on_update(&self, _update: LiveUpdate) {}
}

#[derive(Default)]
struct AggregatorState {
    current_fix: Option<LocationFix>,
    cached_timezone: Option<String>,
    cached_local_offset_hours: f64,
    extensions: DetectionResult,
    vpn: DetectionResult,
    console: DetectionResult,
    behavior_score: u32,
    behavior_indicators: Vec<String>,
    behavior_spoofed: bool,
    overrides: Vec<CriticalOverrideSignal>,
}

/// Central orchestrator: owns the detectors, the monitors' shared state,
/// and the only copy of the current location fix.
pub struct FraudRiskAggregator {
    config: RiskConfig,
    device_detector: DeviceFingerprintDetector,
    environment_detector: EnvironmentSignatureDetector,
    extension_detector: ExtensionSignatureDetector,
    vpn_detector: VpnSignatureDetector,
    monitor: Arc<DevToolsTamperMonitor>,
    behavior: Arc<Mutex<LocationBehaviorAnalyzer>>,
    provider: Arc<dyn GeolocationProvider>,
    sink: Arc<dyn LiveUpdateSink>,
    state: Arc<Mutex<AggregatorState>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FraudRiskAggregator {
    pub fn new(
        config: RiskConfig,
        provider: Arc<dyn GeolocationProvider>,
        sink: Arc<dyn LiveUpdateSink>,
    ) -> Self {
        Self {
            device_detector: DeviceFingerprintDetector::new(config.device.clone()),
            environment_detector: EnvironmentSignatureDetector::new(config.environment.clone()),
            extension_detector: ExtensionSignatureDetector::new(),
            vpn_detector: VpnSignatureDetector::new(),
            monitor: Arc::new(DevToolsTamperMonitor::new(config.monitor.clone())),
            behavior: Arc::new(Mutex::new(LocationBehaviorAnalyzer::new(
                config.behavior.clone(),
            ))),
            provider,
            sink,
            state: Arc::new(Mutex::new(AggregatorState::default())),
            tasks: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Run the synchronous best-effort checks: extension scan, VPN scan,
    /// console-override check, and the initial devtools evaluation from the
    /// tamper sample taken at collection time.
    pub fn run_passive_checks(&self, tel: &EnvironmentTelemetry) {
        let extensions = self.extension_detector.scan(tel);
        let vpn = self.vpn_detector.scan(tel);
        let console = check_console_override(tel);

        {
            let mut state = lock_or_recover(&self.state, "aggregator state");
            state.extensions = extensions;
            state.vpn = vpn;
            state.console = console;
            state.cached_timezone = tel.timezone.clone();
            state.cached_local_offset_hours = tel.local_utc_offset_hours;
        }

        let newly_fired = self.monitor.evaluate_sample(&tel.tamper);
        if !newly_fired.is_empty() {
            note_devtools_override(&self.state, &self.sink);
        }

        info!("passive checks complete");
    }

    /// Arm the continuous devtools poll. Samples arrive on a randomized
    /// 2-7 s cadence until the bounded watch duration elapses.
    pub fn start_monitors(&self, probe: Arc<dyn TamperProbe>) {
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);

        let handle = self.monitor.spawn_polling(
            probe,
            Arc::new(move |_channels: &[TamperChannel]| {
                note_devtools_override(&state, &sink);
            }),
        );
        lock_or_recover(&self.tasks, "aggregator tasks").push(handle);
    }

    /// Watch post-load DOM mutations for extension markers injected after
    /// the initial scan ran.
    pub fn start_mutation_watch(&self, mut rx: mpsc::Receiver<DomMutationEvent>) {
        let state = Arc::clone(&self.state);
        let detector = ExtensionSignatureDetector::new();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Some((name, points)) = detector.match_mutation(&event) {
                    let mut s = lock_or_recover(&state, "aggregator state");
                    s.extensions
                        .add(points, format!("Extension marker injected after load: {}", name));
                    s.extensions.provider.get_or_insert(name);
                }
            }
            debug!("mutation watch stream closed");
        });
        lock_or_recover(&self.tasks, "aggregator tasks").push(handle);
    }

    /// Arm the continuous location watch feeding the behavior analyzer.
    /// Auto-stops after the configured duration to cap resource use.
    pub fn start_behavior_watch(&self) {
        let provider = Arc::clone(&self.provider);
        let behavior = Arc::clone(&self.behavior);
        let state = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let config = self.config.behavior.clone();

        let handle = tokio::spawn(async move {
            let mut rx = match provider.watch_positions().await {
                Ok(rx) => rx,
                Err(err) => {
                    warn!(%err, "behavior watch unavailable");
                    return;
                }
            };

            let deadline =
                tokio::time::Instant::now() + Duration::from_secs(config.watch_duration_secs);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    maybe_fix = rx.recv() => {
                        let Some(fix) = maybe_fix else { break };

                        let (assessment, cumulative) = {
                            let mut analyzer =
                                lock_or_recover(&behavior, "behavior analyzer");
                            let assessment = analyzer.record_fix(fix);
                            (assessment, analyzer.cumulative_score())
                        };

                        let newly_spoofed = {
                            let mut s = lock_or_recover(&state, "aggregator state");
                            s.behavior_score = cumulative;
                            for indicator in assessment.indicators {
                                if !s.behavior_indicators.contains(&indicator) {
                                    s.behavior_indicators.push(indicator);
                                }
                            }
                            let crossed = cumulative >= config.behavior_spoof_threshold;
                            if crossed && !s.behavior_spoofed {
                                s.behavior_spoofed = true;
                                true
                            } else {
                                false
                            }
                        };

                        if newly_spoofed {
                            warn!(cumulative, "behavioral score crossed the spoof threshold");
                            sink.on_update(LiveUpdate::LocationSpoofedByBehavior);
                        }
                    }
                }
            }
            info!("location behavior watch stopped");
        });
        lock_or_recover(&self.tasks, "aggregator tasks").push(handle);
    }

    /// Request exactly one high-accuracy fix with a bounded timeout and no
    /// cached result, and store it as the session's current fix.
    pub async fn analyze_location_once(&self) -> Result<LocationFix, GeolocationError> {
        let options = PositionOptions::default();
        let fix = self.provider.request_current_position(&options).await?;

        lock_or_recover(&self.state, "aggregator state").current_fix = Some(fix);
        debug!(
            accuracy_m = fix.accuracy_m,
            response_ms = fix.fix_response_ms,
            "location fix captured"
        );
        Ok(fix)
    }

    /// Score the stored fix against every spoofing heuristic. Fails if no
    /// fix was captured yet.
    pub fn evaluate_location_spoofing(&self) -> Result<LocationAssessment, AnalysisError> {
        let cfg = &self.config.spoofing;
        let state = lock_or_recover(&self.state, "aggregator state");
        let fix = state.current_fix.ok_or(AnalysisError::NoFix)?;

        let mut score: u32 = 0;
        let mut indicators: Vec<String> = Vec::new();
        let mut overrides = state.overrides.clone();

        // 1. Response time: a real radio fix takes longer than this
        if fix.fix_response_ms < cfg.min_fix_response_ms {
            score += FAST_RESPONSE_POINTS;
            indicators.push(format!(
                "Geolocation answered in {} ms (pre-computed?)",
                fix.fix_response_ms
            ));
        }

        // 2. Accuracy plausibility window
        if fix.accuracy_m < cfg.min_plausible_accuracy_m {
            score += ACCURACY_BOUNDS_POINTS;
            indicators.push(format!(
                "Accuracy {:.1} m is better than consumer GPS delivers",
                fix.accuracy_m
            ));
        } else if fix.accuracy_m > cfg.max_plausible_accuracy_m {
            score += ACCURACY_BOUNDS_POINTS;
            indicators.push(format!(
                "Accuracy {:.0} m is too coarse to trust",
                fix.accuracy_m
            ));
        }

        // 3. Hand-typed round coordinates
        let lat_rounded = fix.latitude.abs() % 1.0 < cfg.rounded_coord_epsilon;
        let lon_rounded = fix.longitude.abs() % 1.0 < cfg.rounded_coord_epsilon;
        if lat_rounded && lon_rounded {
            score += ROUNDED_COORD_POINTS;
            indicators.push("Coordinates land on whole degrees".to_string());
        }

        // 4. Timezone vs longitude, by numeric offset comparison
        let browser_offset = match &state.cached_timezone {
            Some(name) => {
                geo_time::offset_hours_from_timezone_name(name, state.cached_local_offset_hours)
            }
            None => state.cached_local_offset_hours,
        };
        if let Some(delta) = timezone_mismatch_delta(
            browser_offset,
            fix.longitude,
            cfg.timezone_tolerance_hours,
        ) {
            score += TIMEZONE_MISMATCH_POINTS;
            push_override(&mut overrides, CriticalOverrideSignal::TimezoneMismatch);
            indicators.push(format!(
                "Timezone mismatch: browser UTC{:+.1} vs longitude-implied UTC{:+} ({:.1} h apart)",
                browser_offset,
                geo_time::approx_offset_hours_from_longitude(fix.longitude),
                delta
            ));
        }

        // 5. Known-suspicious coordinates
        if is_null_island(fix.latitude, fix.longitude) {
            score += NULL_ISLAND_POINTS;
            push_override(&mut overrides, CriticalOverrideSignal::NullIsland);
            indicators.push("Coordinates sit on null island (0, 0)".to_string());
        }
        for (name, lat, lon) in SPOOFED_CENTROIDS {
            if great_circle_distance_m(fix.latitude, fix.longitude, *lat, *lon)
                <= cfg.centroid_radius_m
            {
                score += CENTROID_POINTS;
                indicators.push(format!("Commonly spoofed city centroid: {}", name));
                break;
            }
        }

        // 6. Signature coordinates
        for (name, lat, lon) in DEVTOOLS_PRESET_COORDS {
            if great_circle_distance_m(fix.latitude, fix.longitude, *lat, *lon)
                <= cfg.signature_radius_m
            {
                score += SIGNATURE_COORD_POINTS;
                push_override(
                    &mut overrides,
                    CriticalOverrideSignal::DevToolsDefaultCoordinates,
                );
                indicators.push(format!(
                    "DevTools signature: default location preset '{}'",
                    name
                ));
                break;
            }
        }
        for (name, lat, lon) in EMULATOR_COORDS {
            if great_circle_distance_m(fix.latitude, fix.longitude, *lat, *lon)
                <= cfg.signature_radius_m
            {
                score += SIGNATURE_COORD_POINTS;
                push_override(&mut overrides, CriticalOverrideSignal::EmulatorCoordinates);
                indicators.push(format!("Emulator signature: {}", name));
                break;
            }
        }
        // Exact equality is the signature: spoofing layers hard-code 150
        if fix.accuracy_m == 150.0 {
            score += ACCURACY_150_POINTS;
            push_override(&mut overrides, CriticalOverrideSignal::AccuracyExactly150);
            indicators.push("DevTools signature: accuracy exactly 150m".to_string());
        }

        // 7. Fold pending monitor and behavior findings
        if overrides.contains(&CriticalOverrideSignal::DevToolsLiveDetection) {
            score += cfg.devtools_penalty;
            indicators.push(
                "Developer tools active during session; geolocation output is attacker-controllable"
                    .to_string(),
            );
        }
        if state.behavior_score > 0 {
            score += state.behavior_score;
            indicators.extend(state.behavior_indicators.iter().cloned());
        }

        let is_spoofed =
            score >= cfg.spoof_threshold || !overrides.is_empty() || state.behavior_spoofed;

        if is_spoofed {
            warn!(score, ?overrides, "location classified as spoofed");
        }

        Ok(LocationAssessment {
            fix: Some(fix),
            spoofing_score: score,
            indicators,
            overrides,
            is_spoofed,
        })
    }

    /// Full pipeline: environment signature, device masking, one location
    /// fix, spoofing evaluation, then one consolidated report.
    ///
    /// All-or-nothing: a fix failure aborts with a wrapped error and no
    /// partial report. Consumers are expected to fail closed and treat the
    /// location as untrusted in that case.
    pub async fn run_full_analysis(
        &self,
        tel: &EnvironmentTelemetry,
    ) -> Result<FraudRiskReport, AnalysisError> {
        // Environment and device checks run first; the spoofing
        // evaluation's timezone check reads the navigator data they cache.
        let environment = self.environment_detector.analyze(tel);
        let device_masking = self.device_detector.analyze(tel);
        {
            let mut state = lock_or_recover(&self.state, "aggregator state");
            state.cached_timezone = tel.timezone.clone();
            state.cached_local_offset_hours = tel.local_utc_offset_hours;
        }

        self.analyze_location_once().await?;
        let location = self.evaluate_location_spoofing()?;

        let (extensions, vpn, console) = {
            let state = lock_or_recover(&self.state, "aggregator state");
            (
                state.extensions.clone(),
                state.vpn.clone(),
                state.console.clone(),
            )
        };
        let dev_tools = self.monitor.result();

        let suspicion_score = location.spoofing_score
            + environment.detection_points()
            + device_masking.result.score
            + dev_tools.score
            + console.score
            + extensions.score
            + vpn.score;
        let risk_level = RiskLevel::from_score(suspicion_score, &self.config.bands);

        let mut all_indicators = Vec::new();
        all_indicators.extend(location.indicators.iter().cloned());
        all_indicators.extend(environment.all_factors());
        all_indicators.extend(device_masking.result.indicators.iter().cloned());
        all_indicators.extend(dev_tools.indicators.iter().cloned());
        all_indicators.extend(console.indicators.iter().cloned());
        all_indicators.extend(extensions.indicators.iter().cloned());
        all_indicators.extend(vpn.indicators.iter().cloned());

        info!(suspicion_score, ?risk_level, "full analysis complete");

        Ok(FraudRiskReport {
            location,
            environment,
            dev_tools,
            console,
            extensions,
            vpn,
            device_masking,
            overall: OverallAssessment {
                suspicion_score,
                risk_level,
                all_indicators,
            },
        })
    }

    /// Sticky devtools flag, live.
    pub fn devtools_detected(&self) -> bool {
        self.monitor.devtools_detected()
    }

    /// Whether a devtools override is pending against the location verdict.
    pub fn location_spoofed_by_devtools(&self) -> bool {
        lock_or_recover(&self.state, "aggregator state")
            .overrides
            .contains(&CriticalOverrideSignal::DevToolsLiveDetection)
    }

    /// Sticky behavioral spoof flag, live.
    pub fn location_spoofed_by_behavior(&self) -> bool {
        lock_or_recover(&self.state, "aggregator state").behavior_spoofed
    }

    /// Console-tamper channels accumulated by the monitor, for live UI use.
    pub fn console_tamper_result(&self) -> DetectionResult {
        self.monitor.console_result()
    }

    /// Stop every armed background monitor.
    pub fn stop(&self) {
        let mut tasks = lock_or_recover(&self.tasks, "aggregator tasks");
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for FraudRiskAggregator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Delta between the browser's resolved offset and the longitude-implied
/// one, when it exceeds the tolerance.
fn timezone_mismatch_delta(
    browser_offset_hours: f64,
    longitude: f64,
    tolerance_hours: f64,
) -> Option<f64> {
    let implied = f64::from(geo_time::approx_offset_hours_from_longitude(longitude));
    let delta = (browser_offset_hours - implied).abs();
    (delta > tolerance_hours).then_some(delta)
}

fn check_console_override(tel: &EnvironmentTelemetry) -> DetectionResult {
    let mut console = DetectionResult::default();
    if signature::looks_native(&tel.runtime.console_error_source) == Some(false) {
        console.add(
            CONSOLE_OVERRIDE_POINTS,
            "console.error lacks the native-code marker (overridden)",
        );
    }
    console
}

fn push_override(overrides: &mut Vec<CriticalOverrideSignal>, signal: CriticalOverrideSignal) {
    if !overrides.contains(&signal) {
        overrides.push(signal);
    }
}

/// Record the devtools critical override once and notify the sink on the
/// first occurrence.
fn note_devtools_override(state: &Arc<Mutex<AggregatorState>>, sink: &Arc<dyn LiveUpdateSink>) {
    let first = {
        let mut s = lock_or_recover(state, "aggregator state");
        if s.overrides
            .contains(&CriticalOverrideSignal::DevToolsLiveDetection)
        {
            false
        } else {
            s.overrides
                .push(CriticalOverrideSignal::DevToolsLiveDetection);
            true
        }
    };
    if first {
        warn!("developer tools detected; location output no longer trusted");
        sink.on_update(LiveUpdate::DevToolsDetected);
        sink.on_update(LiveUpdate::LocationSpoofedByDevTools);
    }
}
