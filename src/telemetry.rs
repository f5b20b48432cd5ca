// Client telemetry shapes.
//
// Raw signals are collected in-page by the generated probe script (see
// `collector`) and cross into the engine as JSON. Every field is declared and
// defaulted so a partial capture deserializes cleanly; a missing capability
// shows up as `None`/empty, which the detectors treat as a data point rather
// than an error.

use serde::{Deserialize, Serialize};

/// Navigator-level identity fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigatorInfo {
    pub user_agent: String,
    pub platform: String,
    pub languages: Vec<String>,
    pub hardware_concurrency: Option<u32>,
    pub device_memory_gb: Option<f64>,
    pub max_touch_points: u32,
}

/// Screen geometry as the page sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub color_depth: u8,
    pub device_pixel_ratio: f64,
}

impl Default for ScreenInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            color_depth: 24,
            device_pixel_ratio: 1.0,
        }
    }
}

/// WebGL context parameters. `debug_info_available` is false when the
/// debug-renderer-info extension was withheld.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebglInfo {
    pub vendor: String,
    pub renderer: String,
    pub debug_info_available: bool,
}

/// Exported 2D-canvas render of the probe's fixed text and shapes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasCapture {
    /// Data-URL export of the canvas contents
    pub image_data: String,
}

/// Frequency-bin bytes sampled from the probe's oscillator/analyser graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioCapture {
    pub frequency_bins: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaDeviceInfo {
    pub kind: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginInfo {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaTag {
    pub name: String,
    pub content: String,
}

/// DOM scan results: marker strings the probe harvested from the live page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomSnapshot {
    /// Attribute names present anywhere in the document
    pub attribute_markers: Vec<String>,
    /// Class names present anywhere in the document
    pub class_markers: Vec<String>,
    /// Element ids present anywhere in the document
    pub id_markers: Vec<String>,
    /// `src`/`href` URLs of loaded scripts and stylesheets
    pub resource_urls: Vec<String>,
    /// Custom CSS property names visible on the root element
    pub css_custom_properties: Vec<String>,
    pub meta_tags: Vec<MetaTag>,
    /// Console-error text captured during the probe's time-boxed listener
    /// window (the wrap is installed and always restored in-page)
    pub console_errors: Vec<String>,
}

/// Source text of sensitive globals, as returned by `toString` in-page.
///
/// A genuinely native implementation carries the engine's native-code marker;
/// its absence means the function was monkey-patched by someone. This is a
/// best-effort, script-engine-specific technique: a non-browser embedder
/// leaves these unset and the related checks stay neutral.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeIntegrity {
    pub fetch_source: Option<String>,
    pub xhr_open_source: Option<String>,
    pub create_data_channel_source: Option<String>,
    pub function_to_string_source: Option<String>,
    pub console_error_source: Option<String>,
}

/// One round of DevTools tamper probes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TamperSample {
    /// Wall-clock delta across a breakpoint-able statement (ms)
    pub timing_probe_ms: f64,
    pub outer_inner_width_delta: i32,
    pub outer_inner_height_delta: i32,
    /// The side-effecting accessor logged to the console was invoked
    pub console_getter_fired: bool,
    /// Inspector-extension globals observed on the global object
    pub inspector_globals: Vec<String>,
    /// DevTools/view-source key combination seen since the last sample
    pub devtools_key_combo: Option<String>,
    /// A `toString` override on a throwaway function stuck
    pub to_string_override_stuck: bool,
    /// The dimension channel false-positives on mobile and is skipped there
    pub mobile_user_agent: bool,
}

/// Attribute/class names added to the DOM after initial load, as reported by
/// the probe's mutation subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomMutationEvent {
    pub added_attributes: Vec<String>,
    pub added_classes: Vec<String>,
}

/// One geolocation fix. Immutable once stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub captured_at_epoch_ms: i64,
    /// Time from request to callback; sub-100ms answers look pre-computed
    pub fix_response_ms: i64,
}

impl Default for LocationFix {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            accuracy_m: 0.0,
            captured_at_epoch_ms: 0,
            fix_response_ms: 0,
        }
    }
}

/// The full environment capture for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentTelemetry {
    pub navigator: NavigatorInfo,
    pub screen: ScreenInfo,
    pub webgl: Option<WebglInfo>,
    pub canvas: Option<CanvasCapture>,
    pub audio: Option<AudioCapture>,
    /// Resolved IANA timezone name, when the locale API exposed one
    pub timezone: Option<String>,
    /// The client's own UTC offset in hours, used as a timezone fallback
    pub local_utc_offset_hours: f64,
    /// `None` when enumeration itself was unavailable
    pub media_devices: Option<Vec<MediaDeviceInfo>>,
    pub plugins: Vec<PluginInfo>,
    /// Names found on the global object during the probe's namespace walk
    pub globals: Vec<String>,
    pub dom: DomSnapshot,
    pub runtime: RuntimeIntegrity,
    /// Tamper probes sampled once at collection time
    pub tamper: TamperSample,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_deserializes_with_defaults() {
        let json = r#"{
            "navigator": { "user_agent": "Mozilla/5.0", "platform": "Win32" },
            "screen": { "width": 1920, "height": 1080 }
        }"#;
        let tel: EnvironmentTelemetry = serde_json::from_str(json).unwrap();
        assert_eq!(tel.navigator.user_agent, "Mozilla/5.0");
        assert_eq!(tel.screen.width, 1920);
        assert_eq!(tel.screen.color_depth, 24);
        assert!(tel.webgl.is_none());
        assert!(tel.dom.resource_urls.is_empty());
        assert!(!tel.tamper.console_getter_fired);
    }

    #[test]
    fn test_fix_round_trip() {
        let fix = LocationFix {
            latitude: 40.712776,
            longitude: -74.005974,
            accuracy_m: 15.0,
            captured_at_epoch_ms: 1_700_000_000_000,
            fix_response_ms: 420,
        };
        let json = serde_json::to_string(&fix).unwrap();
        let back: LocationFix = serde_json::from_str(&json).unwrap();
        assert_eq!(fix, back);
    }
}
