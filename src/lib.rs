// Library interface for the VERILOC session-authenticity engine.
// Detectors score client-collected telemetry; the aggregator folds their
// outputs into one risk classification.

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod device_fingerprint;
pub mod devtools_monitor;
pub mod distance;
pub mod environment_signature;
pub mod error;
pub mod extension_signature;
pub mod geo_time;
pub mod geolocation;
pub mod location_behavior;
pub mod lock_utils;
pub mod report;
pub mod signature;
pub mod telemetry;
pub mod vpn_signature;

pub use aggregator::{FraudRiskAggregator, LiveUpdate, LiveUpdateSink, NullSink};
pub use config::RiskConfig;
pub use error::{AnalysisError, GeolocationError};
pub use geolocation::{ChannelGeolocationProvider, GeolocationProvider, PositionOptions};
pub use report::{CriticalOverrideSignal, DetectionResult, FraudRiskReport, RiskLevel};
pub use telemetry::{EnvironmentTelemetry, LocationFix, TamperSample};
