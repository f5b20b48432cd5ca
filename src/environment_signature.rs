// Screen/WebGL/navigator heuristics for RDP and VM detection.
//
// Three independent sub-checks, combined through a weighted point system.
// WebGL carries the highest weight because renderer-string spoofing is the
// strongest single tell for a virtualized or remoted session.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EnvironmentConfig;
use crate::telemetry::EnvironmentTelemetry;

/// Points contributed to the overall suspicion score per unit of weight.
const POINTS_PER_WEIGHT: u32 = 5;

/// Renderer substrings that identify virtualization or remote-desktop stacks.
const REMOTE_RENDERER_MARKERS: &[&str] = &[
    "vmware",
    "virtualbox",
    "qemu",
    "hyper-v",
    "parallels",
    "parsec",
    "anydesk",
    "teamviewer",
    "chrome remote desktop",
    "rdp display miniport",
    "mesa offscreen",
    "software renderer",
    "llvmpipe",
    "swiftshader",
    "citrix",
    "splashtop",
];

/// User-agent substrings for automation frameworks and remote tooling.
const AUTOMATION_UA_MARKERS: &[&str] = &[
    "headless",
    "phantomjs",
    "selenium",
    "webdriver",
    "puppeteer",
    "playwright",
    "cypress",
    "nightmare",
];

/// Aspect ratios considered standard for this check, as max/min.
const STANDARD_RATIOS: &[f64] = &[16.0 / 9.0, 16.0 / 10.0, 4.0 / 3.0, 5.0 / 4.0];

const RATIO_TOLERANCE: f64 = 0.01;

/// Outcome of one sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suspicion {
    Normal,
    Suspicious,
    /// The underlying capability was missing, so nothing can be concluded
    Undetermined,
}

/// One sub-check with the factors that drove its verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubCheck {
    pub suspicion: Suspicion,
    pub factors: Vec<String>,
}

impl Default for SubCheck {
    fn default() -> Self {
        Self {
            suspicion: Suspicion::Normal,
            factors: Vec::new(),
        }
    }
}

impl SubCheck {
    fn suspect(&mut self, factor: impl Into<String>) {
        self.suspicion = Suspicion::Suspicious;
        self.factors.push(factor.into());
    }
}

/// Overall environment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentClass {
    Authentic,
    Suspicious,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSignatureResult {
    pub screen: SubCheck,
    pub webgl: SubCheck,
    pub navigator: SubCheck,
    pub weighted_score: u32,
    pub classification: EnvironmentClass,
}

impl Default for EnvironmentSignatureResult {
    fn default() -> Self {
        Self {
            screen: SubCheck::default(),
            webgl: SubCheck::default(),
            navigator: SubCheck::default(),
            weighted_score: 0,
            classification: EnvironmentClass::Authentic,
        }
    }
}

impl EnvironmentSignatureResult {
    /// Contribution to the aggregator's overall suspicion score.
    pub fn detection_points(&self) -> u32 {
        self.weighted_score * POINTS_PER_WEIGHT
    }

    /// Every factor across the three sub-checks, for indicator folding.
    pub fn all_factors(&self) -> Vec<String> {
        let mut factors = Vec::new();
        factors.extend(self.screen.factors.iter().cloned());
        factors.extend(self.webgl.factors.iter().cloned());
        factors.extend(self.navigator.factors.iter().cloned());
        factors
    }
}

/// Scores RDP/VM likelihood from screen, WebGL, and navigator signals.
pub struct EnvironmentSignatureDetector {
    config: EnvironmentConfig,
}

impl EnvironmentSignatureDetector {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, tel: &EnvironmentTelemetry) -> EnvironmentSignatureResult {
        let screen = self.check_screen(tel);
        let webgl = self.check_webgl(tel);
        let navigator = self.check_navigator(tel);

        let mut weighted_score = 0;
        if screen.suspicion == Suspicion::Suspicious {
            weighted_score += self.config.screen_weight;
        }
        if webgl.suspicion == Suspicion::Suspicious {
            weighted_score += self.config.webgl_weight;
        }
        if navigator.suspicion == Suspicion::Suspicious {
            weighted_score += self.config.navigator_weight;
        }

        let classification = if weighted_score >= self.config.fake_total {
            EnvironmentClass::Fake
        } else if weighted_score >= self.config.suspicious_total {
            EnvironmentClass::Suspicious
        } else {
            EnvironmentClass::Authentic
        };

        debug!(
            weighted_score,
            ?classification,
            "environment signature analysis complete"
        );

        EnvironmentSignatureResult {
            screen,
            webgl,
            navigator,
            weighted_score,
            classification,
        }
    }

    fn check_screen(&self, tel: &EnvironmentTelemetry) -> SubCheck {
        let mut check = SubCheck::default();
        let screen = &tel.screen;

        if screen.width == 0 || screen.height == 0 {
            check.suspicion = Suspicion::Undetermined;
            check.factors.push("Screen geometry unavailable".to_string());
            return check;
        }

        if screen.color_depth < 24 {
            check.suspect(format!("Low color depth: {}-bit", screen.color_depth));
        }

        if screen.device_pixel_ratio <= 0.75 {
            check.suspect(format!(
                "Unusual device pixel ratio: {}",
                screen.device_pixel_ratio
            ));
        }

        if screen.width < 1024 || screen.height < 768 {
            check.suspect(format!(
                "Very small resolution: {}x{}",
                screen.width, screen.height
            ));
        }

        let ratio = f64::from(screen.width) / f64::from(screen.height);
        let ratio = if ratio < 1.0 { 1.0 / ratio } else { ratio };
        let standard = STANDARD_RATIOS
            .iter()
            .any(|&r| (ratio - r).abs() <= RATIO_TOLERANCE);
        if !standard {
            check.suspect(format!("Non-standard aspect ratio: {:.3}", ratio));
        }

        check
    }

    fn check_webgl(&self, tel: &EnvironmentTelemetry) -> SubCheck {
        let mut check = SubCheck::default();

        let Some(webgl) = &tel.webgl else {
            check.suspicion = Suspicion::Undetermined;
            check.factors.push("WebGL renderer unavailable".to_string());
            return check;
        };

        let renderer = webgl.renderer.to_lowercase();
        for marker in REMOTE_RENDERER_MARKERS {
            if renderer.contains(marker) {
                check.suspect(format!("Remote/virtual renderer keyword: '{}'", marker));
            }
        }

        check
    }

    fn check_navigator(&self, tel: &EnvironmentTelemetry) -> SubCheck {
        let mut check = SubCheck::default();
        let nav = &tel.navigator;
        let ua = nav.user_agent.to_lowercase();

        if ua.is_empty() {
            check.suspicion = Suspicion::Undetermined;
            check.factors.push("User agent unavailable".to_string());
            return check;
        }

        for marker in AUTOMATION_UA_MARKERS {
            if ua.contains(marker) {
                check.suspect(format!("Automation keyword in user agent: '{}'", marker));
            }
        }

        // OS claims in the UA should agree with the platform string
        let platform = nav.platform.to_lowercase();
        if !platform.is_empty() {
            let ua_windows = ua.contains("windows");
            let ua_linux = ua.contains("linux") && !ua.contains("android");
            let ua_mac = ua.contains("mac os") || ua.contains("macintosh");

            if ua_windows && !platform.starts_with("win") {
                check.suspect(format!(
                    "Windows user agent on '{}' platform",
                    nav.platform
                ));
            }
            if ua_linux && platform.starts_with("win") {
                check.suspect(format!("Linux user agent on '{}' platform", nav.platform));
            }
            if ua_mac && !(platform.starts_with("mac") || platform.starts_with("ip")) {
                check.suspect(format!("macOS user agent on '{}' platform", nav.platform));
            }
        }

        if let Some(cores) = nav.hardware_concurrency {
            if cores < 2 {
                check.suspect(format!("Hardware concurrency {}", cores));
            }
        }

        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{ScreenInfo, WebglInfo};

    fn desktop_telemetry() -> EnvironmentTelemetry {
        let mut tel = EnvironmentTelemetry::default();
        tel.navigator.user_agent =
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0"
                .to_string();
        tel.navigator.platform = "Win32".to_string();
        tel.navigator.hardware_concurrency = Some(8);
        tel.screen = ScreenInfo {
            width: 1920,
            height: 1080,
            color_depth: 24,
            device_pixel_ratio: 1.0,
        };
        tel.webgl = Some(WebglInfo {
            vendor: "Google Inc. (NVIDIA)".to_string(),
            renderer: "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0)"
                .to_string(),
            debug_info_available: true,
        });
        tel
    }

    #[test]
    fn test_authentic_desktop() {
        let detector = EnvironmentSignatureDetector::new(EnvironmentConfig::default());
        let result = detector.analyze(&desktop_telemetry());
        assert_eq!(result.classification, EnvironmentClass::Authentic);
        assert_eq!(result.weighted_score, 0);
        assert_eq!(result.detection_points(), 0);
    }

    #[test]
    fn test_vmware_renderer_alone_is_suspicious() {
        let detector = EnvironmentSignatureDetector::new(EnvironmentConfig::default());
        let mut tel = desktop_telemetry();
        tel.webgl = Some(WebglInfo {
            vendor: "VMware, Inc.".to_string(),
            renderer: "VMware SVGA 3D".to_string(),
            debug_info_available: true,
        });

        let result = detector.analyze(&tel);
        assert_eq!(result.webgl.suspicion, Suspicion::Suspicious);
        // webgl weight 3 alone reaches the suspicious total
        assert_eq!(result.classification, EnvironmentClass::Suspicious);
        assert!(result
            .webgl
            .factors
            .iter()
            .any(|f| f.contains("vmware")));
    }

    #[test]
    fn test_vm_screen_plus_renderer_is_fake() {
        let detector = EnvironmentSignatureDetector::new(EnvironmentConfig::default());
        let mut tel = desktop_telemetry();
        tel.screen = ScreenInfo {
            width: 800,
            height: 600,
            color_depth: 16,
            device_pixel_ratio: 1.0,
        };
        tel.webgl = Some(WebglInfo {
            vendor: "Mesa".to_string(),
            renderer: "llvmpipe (LLVM 15.0.7, 256 bits)".to_string(),
            debug_info_available: false,
        });

        let result = detector.analyze(&tel);
        assert_eq!(result.weighted_score, 5);
        assert_eq!(result.classification, EnvironmentClass::Fake);
        assert_eq!(result.detection_points(), 25);
    }

    #[test]
    fn test_headless_ua_flags_navigator() {
        let detector = EnvironmentSignatureDetector::new(EnvironmentConfig::default());
        let mut tel = desktop_telemetry();
        tel.navigator.user_agent =
            "Mozilla/5.0 (X11; Linux x86_64) HeadlessChrome/120.0.0.0".to_string();
        tel.navigator.platform = "Linux x86_64".to_string();

        let result = detector.analyze(&tel);
        assert_eq!(result.navigator.suspicion, Suspicion::Suspicious);
    }

    #[test]
    fn test_platform_ua_mismatch() {
        let detector = EnvironmentSignatureDetector::new(EnvironmentConfig::default());
        let mut tel = desktop_telemetry();
        // Claims Windows in UA but reports a Linux platform
        tel.navigator.platform = "Linux x86_64".to_string();

        let result = detector.analyze(&tel);
        assert_eq!(result.navigator.suspicion, Suspicion::Suspicious);
        assert!(result
            .navigator
            .factors
            .iter()
            .any(|f| f.contains("Windows user agent")));
    }

    #[test]
    fn test_missing_webgl_is_undetermined_not_suspicious() {
        let detector = EnvironmentSignatureDetector::new(EnvironmentConfig::default());
        let mut tel = desktop_telemetry();
        tel.webgl = None;

        let result = detector.analyze(&tel);
        assert_eq!(result.webgl.suspicion, Suspicion::Undetermined);
        assert_eq!(result.weighted_score, 0);
    }
}
