use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Engine configuration.
///
/// Every empirically chosen threshold in the scoring pipeline lives here as a
/// defaulted constant rather than a hard-coded invariant, so deployments can
/// recalibrate against their own traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub device: DeviceConfig,
    pub environment: EnvironmentConfig,
    pub spoofing: SpoofingConfig,
    pub behavior: BehaviorConfig,
    pub monitor: MonitorConfig,
    pub bands: RiskBands,
}

/// Device-masking detector thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Total masking score at or above which the profile is called synthetic
    pub mask_threshold: u32,
    /// Canvas exports shorter than this are treated as blocked/no-op
    pub min_canvas_data_len: usize,
    /// Plugin counts above this are implausible for a real browser
    pub max_plugins: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mask_threshold: 25,
            min_canvas_data_len: 100,
            max_plugins: 20,
        }
    }
}

/// Screen/WebGL/navigator signature weights and classification cut-offs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub screen_weight: u32,
    /// WebGL carries the highest weight: the renderer string is the
    /// strongest single VM/RDP tell
    pub webgl_weight: u32,
    pub navigator_weight: u32,
    /// Weighted total at which the session is classified suspicious
    pub suspicious_total: u32,
    /// Weighted total at which the session is classified fake
    pub fake_total: u32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            screen_weight: 2,
            webgl_weight: 3,
            navigator_weight: 2,
            suspicious_total: 3,
            fake_total: 5,
        }
    }
}

/// Single-fix spoofing evaluation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoofingConfig {
    /// Score at or above which a fix is classified spoofed (absent any
    /// critical override, which forces the verdict regardless)
    pub spoof_threshold: u32,
    /// Fixes answered faster than this look pre-computed
    pub min_fix_response_ms: i64,
    /// Consumer GPS rarely reports accuracy below this
    pub min_plausible_accuracy_m: f64,
    /// Accuracy above this is too coarse to trust
    pub max_plausible_accuracy_m: f64,
    /// |coord| % 1 below this counts as a hand-typed round number
    pub rounded_coord_epsilon: f64,
    /// Allowed delta between browser UTC offset and the longitude-implied
    /// offset; one hour absorbs DST skew
    pub timezone_tolerance_hours: f64,
    /// Radius for matching known signature coordinates (DevTools presets,
    /// emulator defaults)
    pub signature_radius_m: f64,
    /// Radius for matching commonly spoofed city centroids
    pub centroid_radius_m: f64,
    /// Penalty applied to the location score once developer tools are seen
    pub devtools_penalty: u32,
}

impl Default for SpoofingConfig {
    fn default() -> Self {
        Self {
            spoof_threshold: 20,
            min_fix_response_ms: 100,
            min_plausible_accuracy_m: 5.0,
            max_plausible_accuracy_m: 10_000.0,
            rounded_coord_epsilon: 0.001,
            timezone_tolerance_hours: 1.0,
            signature_radius_m: 11.0,
            centroid_radius_m: 30.0,
            devtools_penalty: 100,
        }
    }
}

/// Behavioral (movement-pattern) analysis thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Fix-history ring capacity; oldest entries are evicted first
    pub history_capacity: usize,
    /// Speed above which travel is physically impossible (km/h)
    pub impossible_speed_kmh: f64,
    /// Minimum displacement before the impossible-travel rule applies (m)
    pub impossible_min_distance_m: f64,
    /// Speed above which travel is suspicious but conceivable (km/h)
    pub suspicious_speed_kmh: f64,
    /// Minimum displacement before the suspicious-travel rule applies (m)
    pub suspicious_min_distance_m: f64,
    /// Cumulative behavioral score that marks the location spoofed
    pub behavior_spoof_threshold: u32,
    /// Continuous watch auto-stops after this many seconds
    pub watch_duration_secs: u64,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            impossible_speed_kmh: 1000.0,
            impossible_min_distance_m: 1000.0,
            suspicious_speed_kmh: 200.0,
            suspicious_min_distance_m: 500.0,
            behavior_spoof_threshold: 50,
            watch_duration_secs: 120,
        }
    }
}

/// DevTools tamper monitor thresholds and polling bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Probe deltas above this imply execution was paused in a debugger (ms)
    pub timing_threshold_ms: f64,
    /// Outer-minus-inner window delta above this implies a docked panel (px)
    pub dimension_threshold_px: i32,
    /// Lower bound of the randomized poll interval (s)
    pub poll_min_secs: u64,
    /// Upper bound of the randomized poll interval (s)
    pub poll_max_secs: u64,
    /// Polling auto-stops after this many seconds
    pub watch_duration_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timing_threshold_ms: 100.0,
            dimension_threshold_px: 160,
            poll_min_secs: 2,
            poll_max_secs: 7,
            watch_duration_secs: 300,
        }
    }
}

/// Risk-level band edges over the overall suspicion score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskBands {
    /// Scores below this are LOW
    pub medium: u32,
    /// Scores below this (and at/above `medium`) are MEDIUM
    pub high: u32,
    /// Scores at/above this are CRITICAL
    pub critical: u32,
}

impl Default for RiskBands {
    fn default() -> Self {
        Self {
            medium: 20,
            high: 40,
            critical: 60,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            environment: EnvironmentConfig::default(),
            spoofing: SpoofingConfig::default(),
            behavior: BehaviorConfig::default(),
            monitor: MonitorConfig::default(),
            bands: RiskBands::default(),
        }
    }
}

impl RiskConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: RiskConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(&self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bands.medium >= self.bands.high || self.bands.high >= self.bands.critical {
            anyhow::bail!(
                "risk bands must be strictly increasing: {} / {} / {}",
                self.bands.medium,
                self.bands.high,
                self.bands.critical
            );
        }

        if self.monitor.poll_min_secs == 0
            || self.monitor.poll_min_secs > self.monitor.poll_max_secs
        {
            anyhow::bail!(
                "invalid poll interval bounds: {}..{}",
                self.monitor.poll_min_secs,
                self.monitor.poll_max_secs
            );
        }

        if self.behavior.history_capacity == 0 {
            anyhow::bail!("fix history capacity must be > 0");
        }

        if self.spoofing.min_plausible_accuracy_m >= self.spoofing.max_plausible_accuracy_m {
            anyhow::bail!("accuracy plausibility window is empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = RiskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.mask_threshold, 25);
        assert_eq!(config.spoofing.spoof_threshold, 20);
        assert_eq!(config.behavior.behavior_spoof_threshold, 50);
        assert_eq!(config.spoofing.devtools_penalty, 100);
    }

    #[test]
    fn test_band_edges_are_documented_defaults() {
        let bands = RiskBands::default();
        assert_eq!((bands.medium, bands.high, bands.critical), (20, 40, 60));
    }

    #[test]
    fn test_validation_rejects_inverted_bands() {
        let mut config = RiskConfig::default();
        config.bands.high = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_poll_bounds() {
        let mut config = RiskConfig::default();
        config.monitor.poll_min_secs = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let original = RiskConfig::default();
        let toml_str = toml::to_string(&original).unwrap();
        let deserialized: RiskConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            original.spoofing.spoof_threshold,
            deserialized.spoofing.spoof_threshold
        );
        assert_eq!(original.bands.critical, deserialized.bands.critical);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
            [spoofing]
            spoof_threshold = 35
        "#;
        let config: RiskConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.spoofing.spoof_threshold, 35);
        assert_eq!(config.device.mask_threshold, 25);
    }
}
