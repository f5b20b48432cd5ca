use thiserror::Error;

/// Failures surfaced by a geolocation provider.
///
/// Mirrors the three platform-reported reasons plus the missing-API case so
/// callers can distinguish a user denial from a dead sensor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    /// The platform exposes no geolocation capability at all.
    #[error("geolocation unavailable on this platform")]
    Unsupported,
    /// The user (or a policy) denied the position request.
    #[error("geolocation permission denied")]
    PermissionDenied,
    /// The platform accepted the request but could not produce a fix.
    #[error("position unavailable")]
    PositionUnavailable,
    /// No fix arrived within the configured timeout.
    #[error("position request timed out after {0} ms")]
    Timeout(u64),
}

/// Top-level analysis failures.
///
/// Everything below the aggregator absorbs its own probe errors into partial
/// suspicion scores; the one hard failure is a missing location fix, because
/// the whole downstream pipeline depends on having one.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis failed: {0}")]
    LocationFix(#[from] GeolocationError),
    /// Spoofing evaluation was requested before any fix was captured.
    #[error("no location fix captured for this session")]
    NoFix,
}
