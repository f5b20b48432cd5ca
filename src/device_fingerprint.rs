// Device-profile masking detection.
//
// Ten independent checks over the collected telemetry, each contributing
// fixed points plus an indicator string when it fires. A missing or blocked
// capability never aborts the remaining checks; absence is itself a signal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::DeviceConfig;
use crate::report::DetectionResult;
use crate::telemetry::EnvironmentTelemetry;

const CANVAS_MISSING_POINTS: u32 = 10;
const CANVAS_DEGENERATE_POINTS: u32 = 15;
const WEBGL_MISSING_POINTS: u32 = 10;
const WEBGL_NO_DEBUG_INFO_POINTS: u32 = 5;
const WEBGL_SOFTWARE_POINTS: u32 = 20;
const AUDIO_MISSING_POINTS: u32 = 10;
const AUDIO_SILENT_POINTS: u32 = 15;
const LOW_CORE_POINTS: u32 = 5;
const HIGH_CORE_POINTS: u32 = 3;
const LOW_MEMORY_POINTS: u32 = 5;
const HIGH_MEMORY_POINTS: u32 = 3;
const TINY_SCREEN_POINTS: u32 = 10;
const ODD_ASPECT_POINTS: u32 = 5;
const VM_SCREEN_POINTS: u32 = 15;
const GENERIC_TIMEZONE_POINTS: u32 = 5;
const FLASH_POINTS: u32 = 10;
const PLUGIN_FLOOD_POINTS: u32 = 5;
const NO_MEDIA_DEVICES_POINTS: u32 = 10;
const BLANK_MEDIA_LABELS_POINTS: u32 = 3;
const GENERIC_LOCALE_POINTS: u32 = 2;

/// Renderer substrings that identify software rasterizers or virtual GPUs.
const SOFTWARE_RENDERER_MARKERS: &[&str] = &[
    "swiftshader",
    "llvmpipe",
    "softpipe",
    "virtual",
    "vmware",
    "virtualbox",
    "software rasterizer",
];

/// Maximally generic zones a privacy mask tends to report.
const GENERIC_TIMEZONES: &[&str] = &["UTC", "GMT", "Etc/UTC", "Etc/GMT"];

/// Resolutions that ship as VM/RDP defaults.
const VM_RESOLUTIONS: &[(u32, u32)] = &[(1024, 768), (800, 600), (1280, 720), (1366, 768)];

/// Common desktop and mobile aspect ratios, as max/min.
const COMMON_ASPECT_RATIOS: &[f64] = &[
    16.0 / 9.0,
    16.0 / 10.0,
    4.0 / 3.0,
    5.0 / 4.0,
    3.0 / 2.0,
    21.0 / 9.0,
    19.5 / 9.0,
    2.0, // 18:9
];

const ASPECT_TOLERANCE: f64 = 0.05;

/// Device-masking detection output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMaskingResult {
    pub result: DetectionResult,
    pub is_masked: bool,
    /// Truncated canvas digest for diagnostics; never the full image data
    pub canvas_hash_preview: Option<String>,
    /// Truncated audio fingerprint for diagnostics
    pub audio_preview: Option<String>,
}

/// Scores how synthetic or masked the collected device profile looks.
pub struct DeviceFingerprintDetector {
    config: DeviceConfig,
}

impl DeviceFingerprintDetector {
    pub fn new(config: DeviceConfig) -> Self {
        Self { config }
    }

    /// Run all ten checks and fold their points into one masking score.
    pub fn analyze(&self, tel: &EnvironmentTelemetry) -> DeviceMaskingResult {
        let mut out = DeviceMaskingResult::default();

        self.check_canvas(tel, &mut out);
        self.check_webgl(tel, &mut out.result);
        self.check_audio(tel, &mut out);
        self.check_hardware_concurrency(tel, &mut out.result);
        self.check_device_memory(tel, &mut out.result);
        self.check_screen(tel, &mut out.result);
        self.check_timezone(tel, &mut out.result);
        self.check_plugins(tel, &mut out.result);
        self.check_media_devices(tel, &mut out.result);
        self.check_locale_consistency(tel, &mut out.result);

        out.is_masked = out.result.score >= self.config.mask_threshold;
        debug!(
            score = out.result.score,
            masked = out.is_masked,
            "device fingerprint analysis complete"
        );
        out
    }

    /// Check 1: canvas export digest. A blocked or no-op canvas yields a
    /// degenerate capture.
    fn check_canvas(&self, tel: &EnvironmentTelemetry, out: &mut DeviceMaskingResult) {
        let Some(canvas) = &tel.canvas else {
            out.result
                .add(CANVAS_MISSING_POINTS, "Canvas rendering unavailable");
            return;
        };

        let digest = Sha256::digest(canvas.image_data.as_bytes());
        let hash_hex = hex::encode(digest);
        out.canvas_hash_preview = Some(hash_hex[..16].to_string());

        if canvas.image_data.len() < self.config.min_canvas_data_len
            || hash_hex.contains("00000000")
        {
            out.result.add(
                CANVAS_DEGENERATE_POINTS,
                "Canvas fingerprint is degenerate (blocked or no-op canvas)",
            );
        }
    }

    /// Check 2: WebGL renderer string.
    fn check_webgl(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let Some(webgl) = &tel.webgl else {
            result.add(WEBGL_MISSING_POINTS, "WebGL unavailable");
            return;
        };

        if !webgl.debug_info_available {
            result.add(
                WEBGL_NO_DEBUG_INFO_POINTS,
                "WebGL debug renderer info withheld",
            );
        }

        let renderer = webgl.renderer.to_lowercase();
        for marker in SOFTWARE_RENDERER_MARKERS {
            if renderer.contains(marker) {
                result.add(
                    WEBGL_SOFTWARE_POINTS,
                    format!("Software/virtual WebGL renderer: '{}'", marker),
                );
                break;
            }
        }
    }

    /// Check 3: audio fingerprint capture.
    fn check_audio(&self, tel: &EnvironmentTelemetry, out: &mut DeviceMaskingResult) {
        let Some(audio) = &tel.audio else {
            out.result
                .add(AUDIO_MISSING_POINTS, "Audio fingerprint capture failed");
            return;
        };

        out.audio_preview = Some(
            audio
                .frequency_bins
                .iter()
                .take(8)
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(","),
        );

        if audio.frequency_bins.is_empty() || audio.frequency_bins.iter().all(|&b| b == 0) {
            out.result.add(
                AUDIO_SILENT_POINTS,
                "Audio fingerprint is silent (all-zero frequency bins)",
            );
        }
    }

    /// Check 4: logical core count.
    fn check_hardware_concurrency(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        match tel.navigator.hardware_concurrency {
            Some(cores) if cores < 2 => {
                result.add(
                    LOW_CORE_POINTS,
                    format!("Only {} logical core reported (constrained VM?)", cores),
                );
            }
            Some(cores) if cores > 64 => {
                result.add(
                    HIGH_CORE_POINTS,
                    format!("Unusual core count: {}", cores),
                );
            }
            _ => {}
        }
    }

    /// Check 5: reported device memory.
    fn check_device_memory(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        match tel.navigator.device_memory_gb {
            Some(gb) if gb < 1.0 => {
                result.add(
                    LOW_MEMORY_POINTS,
                    format!("Under 1GB device memory reported ({})", gb),
                );
            }
            Some(gb) if gb > 128.0 => {
                result.add(
                    HIGH_MEMORY_POINTS,
                    format!("Implausible device memory: {}GB", gb),
                );
            }
            _ => {}
        }
    }

    /// Check 6: screen geometry.
    fn check_screen(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let screen = &tel.screen;
        if screen.width == 0 || screen.height == 0 {
            result.add(TINY_SCREEN_POINTS, "Screen geometry unavailable");
            return;
        }

        if screen.width < 320 || screen.height < 480 {
            result.add(
                TINY_SCREEN_POINTS,
                format!("Sub-mobile resolution {}x{}", screen.width, screen.height),
            );
        }

        if !matches_common_ratio(screen.width, screen.height) {
            result.add(
                ODD_ASPECT_POINTS,
                format!(
                    "Non-standard aspect ratio for {}x{}",
                    screen.width, screen.height
                ),
            );
        }

        let is_vm_resolution = VM_RESOLUTIONS
            .iter()
            .any(|&(w, h)| screen.width == w && screen.height == h);
        if is_vm_resolution && screen.color_depth <= 16 {
            result.add(
                VM_SCREEN_POINTS,
                format!(
                    "VM-default resolution {}x{} with {}-bit color",
                    screen.width, screen.height, screen.color_depth
                ),
            );
        }
    }

    /// Check 7: timezone genericness.
    fn check_timezone(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        if let Some(tz) = &tel.timezone {
            if GENERIC_TIMEZONES.iter().any(|g| g == tz) {
                result.add(
                    GENERIC_TIMEZONE_POINTS,
                    format!("Maximally generic timezone '{}'", tz),
                );
            }
        }
    }

    /// Check 8: plugin list. Flash reached end-of-life in 2020; seeing it at
    /// all means the list is fabricated.
    fn check_plugins(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let has_flash = tel
            .plugins
            .iter()
            .any(|p| p.name.to_lowercase().contains("flash"));
        if has_flash {
            result.add(FLASH_POINTS, "Flash plugin present after end-of-life");
        }

        if tel.plugins.len() > self.config.max_plugins {
            result.add(
                PLUGIN_FLOOD_POINTS,
                format!("Implausibly high plugin count: {}", tel.plugins.len()),
            );
        }
    }

    /// Check 9: media device enumeration. All-blank labels are only a weak
    /// signal since unauthorized pages legitimately see blank labels.
    fn check_media_devices(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        match &tel.media_devices {
            None => {
                result.add(NO_MEDIA_DEVICES_POINTS, "Media device enumeration unavailable");
            }
            Some(devices) if devices.is_empty() => {
                result.add(NO_MEDIA_DEVICES_POINTS, "No media devices enumerable");
            }
            Some(devices) => {
                let all_blank = devices
                    .iter()
                    .all(|d| d.label.trim().is_empty() || d.label.eq_ignore_ascii_case("default"));
                if all_blank {
                    result.add(
                        BLANK_MEDIA_LABELS_POINTS,
                        "Every media device label is blank or generic",
                    );
                }
            }
        }
    }

    /// Check 10: single generic en-US language on a Windows-like platform.
    /// Very weak on its own; it only matters in combination.
    fn check_locale_consistency(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let nav = &tel.navigator;
        let single_generic = nav.languages.len() == 1 && nav.languages[0] == "en-US";
        if single_generic && nav.platform.starts_with("Win") {
            result.add(
                GENERIC_LOCALE_POINTS,
                "Single generic en-US locale on Windows platform",
            );
        }
    }
}

fn matches_common_ratio(width: u32, height: u32) -> bool {
    if height == 0 || width == 0 {
        return false;
    }
    let ratio = f64::from(width) / f64::from(height);
    let ratio = if ratio < 1.0 { 1.0 / ratio } else { ratio };
    COMMON_ASPECT_RATIOS
        .iter()
        .any(|&r| (ratio - r).abs() <= ASPECT_TOLERANCE)
}
