// Behavioral analysis of successive geolocation fixes.
//
// Manual spoofing tools leave temporal/spatial patterns a real GPS receiver
// cannot: instantaneous jumps between distant points, hand-typed round
// coordinates, and accuracy values that never vary. The analyzer keeps a
// bounded ring of recent fixes and re-scores the window on every append.

use std::collections::VecDeque;
use tracing::debug;

use crate::config::BehaviorConfig;
use crate::distance::great_circle_distance_m;
use crate::telemetry::LocationFix;

const IMPOSSIBLE_TRAVEL_POINTS: u32 = 40;
const SUSPICIOUS_TRAVEL_POINTS: u32 = 15;
const LOW_PRECISION_POINTS: u32 = 10;
const ROUND_DECIMAL_POINTS: u32 = 15;
const TIGHT_ACCURACY_POINTS: u32 = 15;
const ACCURACY_SWING_POINTS: u32 = 10;
const STATIC_ACCURACY_POINTS: u32 = 15;
const TOOL_DEFAULT_ACCURACY_POINTS: u32 = 10;

/// Accuracy values common spoofing tools ship as defaults.
const TOOL_DEFAULT_ACCURACIES: &[f64] = &[10.0, 20.0, 50.0, 100.0, 150.0];

/// Bounded FIFO of recent fixes. Capacity is fixed at construction; the
/// oldest entry is evicted on overflow, both operations O(1).
#[derive(Debug)]
pub struct FixHistory {
    buf: VecDeque<LocationFix>,
    capacity: usize,
}

impl FixHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, fix: LocationFix) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(fix);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationFix> {
        self.buf.iter()
    }

    /// The most recent `n` fixes, oldest first.
    fn last_n(&self, n: usize) -> impl Iterator<Item = &LocationFix> {
        let skip = self.buf.len().saturating_sub(n);
        self.buf.iter().skip(skip)
    }
}

/// Result of re-scoring the window after one appended fix.
#[derive(Debug, Clone, Default)]
pub struct BehaviorAssessment {
    pub score: u32,
    pub indicators: Vec<String>,
}

/// Watches a short window of successive fixes for physically impossible or
/// tool-typical movement patterns.
pub struct LocationBehaviorAnalyzer {
    config: BehaviorConfig,
    history: FixHistory,
    cumulative_score: u32,
}

impl LocationBehaviorAnalyzer {
    pub fn new(config: BehaviorConfig) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            history: FixHistory::new(capacity),
            cumulative_score: 0,
        }
    }

    /// Append a fix and re-run the four scoring passes over the window.
    pub fn record_fix(&mut self, fix: LocationFix) -> BehaviorAssessment {
        self.history.push(fix);

        let mut assessment = BehaviorAssessment::default();
        self.check_speed_jumps(&mut assessment);
        self.check_coordinate_roundness(&mut assessment);
        self.check_accuracy_distribution(&mut assessment);
        self.check_static_accuracy(&mut assessment);

        self.cumulative_score += assessment.score;
        debug!(
            window = self.history.len(),
            pass_score = assessment.score,
            cumulative = self.cumulative_score,
            "behavior pass complete"
        );
        assessment
    }

    /// Total across every pass so far; the aggregator's sticky flag trips
    /// when this crosses the configured threshold.
    pub fn cumulative_score(&self) -> u32 {
        self.cumulative_score
    }

    pub fn window_len(&self) -> usize {
        self.history.len()
    }

    /// Pass 1: consecutive-pair travel speed.
    fn check_speed_jumps(&self, out: &mut BehaviorAssessment) {
        let fixes: Vec<&LocationFix> = self.history.iter().collect();
        for pair in fixes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let distance_m = great_circle_distance_m(
                a.latitude, a.longitude, b.latitude, b.longitude,
            );
            let elapsed_s =
                (b.captured_at_epoch_ms - a.captured_at_epoch_ms).max(1) as f64 / 1000.0;
            let speed_kmh = distance_m / 1000.0 / (elapsed_s / 3600.0);

            if speed_kmh >= self.config.impossible_speed_kmh
                && distance_m >= self.config.impossible_min_distance_m
            {
                out.score += IMPOSSIBLE_TRAVEL_POINTS;
                out.indicators.push(format!(
                    "Impossible travel speed: {:.0} km/h over {:.1} km",
                    speed_kmh,
                    distance_m / 1000.0
                ));
            } else if speed_kmh >= self.config.suspicious_speed_kmh
                && distance_m >= self.config.suspicious_min_distance_m
            {
                out.score += SUSPICIOUS_TRAVEL_POINTS;
                out.indicators.push(format!(
                    "Suspicious travel speed: {:.0} km/h over {:.1} km",
                    speed_kmh,
                    distance_m / 1000.0
                ));
            }
        }
    }

    /// Pass 2: coordinate roundness over the last three fixes. Hand-typed
    /// coordinates come with few decimals or land on clean 0.1 multiples.
    fn check_coordinate_roundness(&self, out: &mut BehaviorAssessment) {
        let recent: Vec<&LocationFix> = self.history.last_n(3).collect();
        if recent.is_empty() {
            return;
        }

        let low_precision = recent
            .iter()
            .filter(|f| has_limited_precision(f.latitude, 4) && has_limited_precision(f.longitude, 4))
            .count();
        if low_precision == recent.len() && recent.len() >= 2 {
            out.score += LOW_PRECISION_POINTS;
            out.indicators
                .push("Coordinates carry at most 4 decimal digits (manual entry)".to_string());
        }

        let on_tenth_grid = recent
            .iter()
            .any(|f| is_tenth_multiple(f.latitude) && is_tenth_multiple(f.longitude));
        if on_tenth_grid {
            out.score += ROUND_DECIMAL_POINTS;
            out.indicators
                .push("Coordinates are exact multiples of 0.1 degrees".to_string());
        }
    }

    /// Pass 3: accuracy distribution across the window.
    fn check_accuracy_distribution(&self, out: &mut BehaviorAssessment) {
        if self.history.len() < 2 {
            return;
        }

        let accuracies: Vec<f64> = self.history.iter().map(|f| f.accuracy_m).collect();
        let max = accuracies.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = accuracies.iter().cloned().fold(f64::INFINITY, f64::min);
        let mean = accuracies.iter().sum::<f64>() / accuracies.len() as f64;

        // Real consumer GPS rarely sustains sub-5m accuracy
        if max < 5.0 && mean < 3.0 {
            out.score += TIGHT_ACCURACY_POINTS;
            out.indicators.push(format!(
                "Implausibly tight accuracy: max {:.1} m, mean {:.1} m",
                max, mean
            ));
        }

        if min > 0.0 && max / min > 100.0 && max > 1000.0 {
            out.score += ACCURACY_SWING_POINTS;
            out.indicators.push(format!(
                "Extreme accuracy swing: {:.0} m to {:.0} m",
                min, max
            ));
        }
    }

    /// Pass 4: static accuracy. Real sensors vary a little fix to fix.
    fn check_static_accuracy(&self, out: &mut BehaviorAssessment) {
        if self.history.len() < 3 {
            return;
        }

        let mut iter = self.history.iter();
        let first = iter.next().map(|f| f.accuracy_m);
        let Some(first) = first else { return };
        if !iter.all(|f| f.accuracy_m == first) {
            return;
        }

        out.score += STATIC_ACCURACY_POINTS;
        out.indicators.push(format!(
            "Accuracy frozen at {:.0} m across {} fixes",
            first,
            self.history.len()
        ));

        if TOOL_DEFAULT_ACCURACIES.iter().any(|&d| d == first) {
            out.score += TOOL_DEFAULT_ACCURACY_POINTS;
            out.indicators.push(format!(
                "Frozen accuracy {:.0} m matches a spoofing-tool default",
                first
            ));
        }
    }
}

/// True when rounding to `decimals` digits does not change the value.
fn has_limited_precision(value: f64, decimals: i32) -> bool {
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    (scaled - scaled.round()).abs() < 1e-6
}

/// True when the value sits on the 0.1-degree grid.
fn is_tenth_multiple(value: f64) -> bool {
    let scaled = value * 10.0;
    (scaled - scaled.round()).abs() < 1e-9 && !has_limited_precision(value, 0)
}
