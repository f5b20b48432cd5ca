// Detection result and report shapes shared by every detector.

use serde::{Deserialize, Serialize};

use crate::config::RiskBands;
use crate::device_fingerprint::DeviceMaskingResult;
use crate::environment_signature::EnvironmentSignatureResult;
use crate::telemetry::LocationFix;

/// Uniform return shape for every detector.
///
/// Scores are additive points, not probabilities. Invariant: `detected` is
/// true whenever the score is positive, and may also be set by a zero-point
/// strong-signal rule via [`DetectionResult::flag`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionResult {
    pub score: u32,
    pub indicators: Vec<String>,
    pub detected: bool,
    /// Product name when a signature scan identified a specific vendor
    pub provider: Option<String>,
}

impl DetectionResult {
    /// Add points with an indicator describing what fired.
    pub fn add(&mut self, points: u32, indicator: impl Into<String>) {
        self.score += points;
        if points > 0 {
            self.detected = true;
        }
        self.indicators.push(indicator.into());
    }

    /// Record a strong signal that carries no incremental points.
    pub fn flag(&mut self, indicator: impl Into<String>) {
        self.detected = true;
        self.indicators.push(indicator.into());
    }
}

/// Signals considered unambiguous proof of spoofing. The presence of any tag
/// forces the location verdict regardless of the accumulated numeric score.
///
/// Tags travel beside the human-readable indicator strings; the aggregator
/// matches on the tag, never on indicator text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalOverrideSignal {
    DevToolsDefaultCoordinates,
    AccuracyExactly150,
    TimezoneMismatch,
    NullIsland,
    EmulatorCoordinates,
    DevToolsLiveDetection,
}

/// Four-band risk classification over the overall suspicion score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Pure step function over the configured band edges.
    pub fn from_score(score: u32, bands: &RiskBands) -> Self {
        if score >= bands.critical {
            RiskLevel::Critical
        } else if score >= bands.high {
            RiskLevel::High
        } else if score >= bands.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Location section of the report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationAssessment {
    pub fix: Option<LocationFix>,
    pub spoofing_score: u32,
    pub indicators: Vec<String>,
    pub overrides: Vec<CriticalOverrideSignal>,
    pub is_spoofed: bool,
}

/// Overall section of the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallAssessment {
    pub suspicion_score: u32,
    pub risk_level: RiskLevel,
    pub all_indicators: Vec<String>,
}

/// The consolidated report built by one full analysis pass.
///
/// Background monitors keep mutating aggregator state after this value is
/// produced; consumers wanting live data re-query the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRiskReport {
    pub location: LocationAssessment,
    pub environment: EnvironmentSignatureResult,
    pub dev_tools: DetectionResult,
    pub console: DetectionResult,
    pub extensions: DetectionResult,
    pub vpn: DetectionResult,
    pub device_masking: DeviceMaskingResult,
    pub overall: OverallAssessment,
}
