// End-to-end analysis scenarios against the full pipeline.

use std::sync::Arc;

use veriloc::aggregator::{FraudRiskAggregator, NullSink};
use veriloc::config::RiskConfig;
use veriloc::geolocation::ChannelGeolocationProvider;
use veriloc::report::{CriticalOverrideSignal, RiskLevel};
use veriloc::telemetry::{
    AudioCapture, CanvasCapture, EnvironmentTelemetry, LocationFix, MediaDeviceInfo, PluginInfo,
    ScreenInfo, WebglInfo,
};

fn clean_telemetry(timezone: &str, local_offset_hours: f64) -> EnvironmentTelemetry {
    let mut tel = EnvironmentTelemetry::default();
    tel.navigator.user_agent =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            .to_string();
    tel.navigator.platform = "Win32".to_string();
    tel.navigator.languages = vec!["en-US".to_string(), "en".to_string()];
    tel.navigator.hardware_concurrency = Some(8);
    tel.navigator.device_memory_gb = Some(16.0);
    tel.screen = ScreenInfo {
        width: 1920,
        height: 1080,
        color_depth: 24,
        device_pixel_ratio: 1.0,
    };
    tel.webgl = Some(WebglInfo {
        vendor: "Google Inc. (NVIDIA)".to_string(),
        renderer: "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Direct3D11 vs_5_0 ps_5_0)".to_string(),
        debug_info_available: true,
    });
    tel.canvas = Some(CanvasCapture {
        image_data: format!(
            "data:image/png;base64,{}",
            "iVBORw0KGgoAAAANSUhEUgAAAPAAAAA8".repeat(12)
        ),
    });
    tel.audio = Some(AudioCapture {
        frequency_bins: vec![14, 52, 97, 121, 87, 44, 18, 6, 3, 1],
    });
    tel.timezone = Some(timezone.to_string());
    tel.local_utc_offset_hours = local_offset_hours;
    tel.media_devices = Some(vec![
        MediaDeviceInfo {
            kind: "audioinput".to_string(),
            label: "Built-in Microphone".to_string(),
        },
        MediaDeviceInfo {
            kind: "videoinput".to_string(),
            label: "Integrated Webcam".to_string(),
        },
    ]);
    tel.plugins = vec![
        PluginInfo {
            name: "PDF Viewer".to_string(),
        },
        PluginInfo {
            name: "Chromium PDF Viewer".to_string(),
        },
    ];
    tel
}

fn fix(lat: f64, lon: f64, accuracy: f64, response_ms: i64) -> LocationFix {
    LocationFix {
        latitude: lat,
        longitude: lon,
        accuracy_m: accuracy,
        captured_at_epoch_ms: 1_700_000_000_000,
        fix_response_ms: response_ms,
    }
}

/// A DevTools-spoofed session: the fix sits on the Googleplex preset with
/// the hard-coded 150 m accuracy, browser timezone Los Angeles.
#[tokio::test]
async fn test_spoofed_devtools_session() {
    let provider = Arc::new(ChannelGeolocationProvider::new(4));
    let agg = FraudRiskAggregator::new(
        RiskConfig::default(),
        provider.clone(),
        Arc::new(NullSink),
    );

    let tel = clean_telemetry("America/Los_Angeles", -8.0);
    agg.run_passive_checks(&tel);

    provider.push_fix(fix(37.4224764, -122.0842499, 150.0, 420));
    let report = agg.run_full_analysis(&tel).await.unwrap();

    assert!(report.location.is_spoofed);
    assert!(report
        .location
        .indicators
        .iter()
        .any(|i| i == "DevTools signature: accuracy exactly 150m"));
    assert!(report
        .location
        .indicators
        .iter()
        .any(|i| i.contains("default location preset")));
    assert!(report
        .location
        .overrides
        .contains(&CriticalOverrideSignal::AccuracyExactly150));
    assert!(report
        .location
        .overrides
        .contains(&CriticalOverrideSignal::DevToolsDefaultCoordinates));
    assert!(
        report.overall.risk_level >= RiskLevel::High,
        "expected at least HIGH, got {:?} at score {}",
        report.overall.risk_level,
        report.overall.suspicion_score
    );
}

/// A clean session: real-world coordinates, plausible accuracy, timezone
/// consistent with the longitude, no tamper signals anywhere.
#[tokio::test]
async fn test_clean_session_is_low_risk() {
    let provider = Arc::new(ChannelGeolocationProvider::new(4));
    let agg = FraudRiskAggregator::new(
        RiskConfig::default(),
        provider.clone(),
        Arc::new(NullSink),
    );

    let tel = clean_telemetry("America/New_York", -5.0);
    agg.run_passive_checks(&tel);

    provider.push_fix(fix(40.741895, -73.989308, 15.0, 420));
    let report = agg.run_full_analysis(&tel).await.unwrap();

    assert!(
        !report.location.is_spoofed,
        "indicators: {:?}",
        report.location.indicators
    );
    assert_eq!(report.overall.risk_level, RiskLevel::Low);
    assert_eq!(
        report.overall.suspicion_score, 0,
        "indicators: {:?}",
        report.overall.all_indicators
    );
    assert!(report.location.overrides.is_empty());
    assert!(!report.device_masking.is_masked);
    assert!(report.extensions.provider.is_none());
    assert!(report.vpn.provider.is_none());
}

/// A session with a known spoofer extension and a VPN: both named in the
/// report, and their points land in the overall score.
#[tokio::test]
async fn test_extension_and_vpn_session() {
    let provider = Arc::new(ChannelGeolocationProvider::new(4));
    let agg = FraudRiskAggregator::new(
        RiskConfig::default(),
        provider.clone(),
        Arc::new(NullSink),
    );

    let mut tel = clean_telemetry("America/New_York", -5.0);
    tel.globals = vec!["locationguard".to_string(), "browsec".to_string()];
    agg.run_passive_checks(&tel);

    provider.push_fix(fix(40.741895, -73.989308, 15.0, 420));
    let report = agg.run_full_analysis(&tel).await.unwrap();

    assert_eq!(report.extensions.provider.as_deref(), Some("Location Guard"));
    assert_eq!(report.vpn.provider.as_deref(), Some("Browsec VPN"));
    assert_eq!(report.overall.suspicion_score, 55);
    assert_eq!(report.overall.risk_level, RiskLevel::High);
    // The numeric total alone does not force a spoofed location verdict
    assert!(!report.location.is_spoofed);
}

/// A virtualized session: VM renderer, VM screen, masked device profile.
#[tokio::test]
async fn test_virtualized_session_climbs_bands() {
    let provider = Arc::new(ChannelGeolocationProvider::new(4));
    let agg = FraudRiskAggregator::new(
        RiskConfig::default(),
        provider.clone(),
        Arc::new(NullSink),
    );

    let mut tel = clean_telemetry("America/New_York", -5.0);
    tel.webgl = Some(WebglInfo {
        vendor: "VMware, Inc.".to_string(),
        renderer: "VMware SVGA 3D".to_string(),
        debug_info_available: false,
    });
    tel.screen = ScreenInfo {
        width: 1024,
        height: 768,
        color_depth: 16,
        device_pixel_ratio: 1.0,
    };
    agg.run_passive_checks(&tel);

    provider.push_fix(fix(40.741895, -73.989308, 15.0, 420));
    let report = agg.run_full_analysis(&tel).await.unwrap();

    assert!(report.overall.suspicion_score >= 40, "score {}", report.overall.suspicion_score);
    assert!(report.overall.risk_level >= RiskLevel::High);
    assert!(report
        .overall
        .all_indicators
        .iter()
        .any(|i| i.contains("vmware")));
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let provider = Arc::new(ChannelGeolocationProvider::new(4));
    let agg = FraudRiskAggregator::new(
        RiskConfig::default(),
        provider.clone(),
        Arc::new(NullSink),
    );

    let tel = clean_telemetry("America/New_York", -5.0);
    agg.run_passive_checks(&tel);
    provider.push_fix(fix(40.741895, -73.989308, 15.0, 420));

    let report = agg.run_full_analysis(&tel).await.unwrap();
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"risk_level\":\"LOW\""));
    assert!(json.contains("\"is_spoofed\":false"));
}
