// Geolocation provider seam.
//
// The aggregator never talks to a platform API directly; it is constructed
// with a provider implementing this trait. Beacon-driven deployments use the
// channel-backed implementation below, which is also the test double.

use async_trait::async_trait;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::GeolocationError;
use crate::telemetry::LocationFix;

/// Options forwarded to the underlying position source.
#[derive(Debug, Clone)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    /// Zero means a cached fix is never acceptable
    pub max_cache_age_ms: u64,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout_ms: 10_000,
            max_cache_age_ms: 0,
        }
    }
}

/// A source of geolocation fixes.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// Request exactly one fix, failing with the platform's reason or a
    /// timeout once `options.timeout_ms` elapses.
    async fn request_current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<LocationFix, GeolocationError>;

    /// Open a continuous stream of fixes. The stream ends when the provider
    /// side closes; dropping the receiver cancels the watch.
    async fn watch_positions(
        &self,
    ) -> Result<mpsc::Receiver<LocationFix>, GeolocationError>;
}

/// Channel-backed provider: fixes pushed in from the outside (a page beacon
/// endpoint, a replay harness, a test) are handed out to one-shot requests
/// and fanned out to every open watch.
pub struct ChannelGeolocationProvider {
    one_shot_tx: mpsc::Sender<LocationFix>,
    one_shot_rx: Mutex<mpsc::Receiver<LocationFix>>,
    watchers: StdMutex<Vec<mpsc::Sender<LocationFix>>>,
    watch_buffer: usize,
}

impl ChannelGeolocationProvider {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self {
            one_shot_tx: tx,
            one_shot_rx: Mutex::new(rx),
            watchers: StdMutex::new(Vec::new()),
            watch_buffer: buffer,
        }
    }

    /// Feed one fix into the provider. Returns how many consumers (one-shot
    /// queue plus live watchers) accepted it.
    pub fn push_fix(&self, fix: LocationFix) -> usize {
        let mut delivered = 0;
        if self.one_shot_tx.try_send(fix).is_ok() {
            delivered += 1;
        }

        let mut watchers = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        watchers.retain(|w| !w.is_closed());
        for watcher in watchers.iter() {
            if watcher.try_send(fix).is_ok() {
                delivered += 1;
            }
        }
        debug!(delivered, "fix pushed into channel provider");
        delivered
    }
}

#[async_trait]
impl GeolocationProvider for ChannelGeolocationProvider {
    async fn request_current_position(
        &self,
        options: &PositionOptions,
    ) -> Result<LocationFix, GeolocationError> {
        let mut rx = self.one_shot_rx.lock().await;
        match tokio::time::timeout(Duration::from_millis(options.timeout_ms), rx.recv()).await {
            Ok(Some(fix)) => Ok(fix),
            Ok(None) => Err(GeolocationError::PositionUnavailable),
            Err(_) => Err(GeolocationError::Timeout(options.timeout_ms)),
        }
    }

    async fn watch_positions(
        &self,
    ) -> Result<mpsc::Receiver<LocationFix>, GeolocationError> {
        let (tx, rx) = mpsc::channel(self.watch_buffer);
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        Ok(rx)
    }
}

/// A provider for platforms with no geolocation capability at all.
pub struct UnsupportedGeolocationProvider;

#[async_trait]
impl GeolocationProvider for UnsupportedGeolocationProvider {
    async fn request_current_position(
        &self,
        _options: &PositionOptions,
    ) -> Result<LocationFix, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }

    async fn watch_positions(
        &self,
    ) -> Result<mpsc::Receiver<LocationFix>, GeolocationError> {
        Err(GeolocationError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(lat: f64, lon: f64) -> LocationFix {
        LocationFix {
            latitude: lat,
            longitude: lon,
            accuracy_m: 15.0,
            captured_at_epoch_ms: 1_700_000_000_000,
            fix_response_ms: 300,
        }
    }

    #[tokio::test]
    async fn test_one_shot_request_receives_pushed_fix() {
        let provider = ChannelGeolocationProvider::new(8);
        provider.push_fix(fix(48.85, 2.35));

        let got = provider
            .request_current_position(&PositionOptions::default())
            .await
            .unwrap();
        assert_eq!(got.latitude, 48.85);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_without_fix() {
        let provider = ChannelGeolocationProvider::new(8);
        let options = PositionOptions {
            timeout_ms: 100,
            ..Default::default()
        };

        let err = provider.request_current_position(&options).await.unwrap_err();
        assert_eq!(err, GeolocationError::Timeout(100));
    }

    #[tokio::test]
    async fn test_watch_receives_stream() {
        let provider = ChannelGeolocationProvider::new(8);
        let mut rx = provider.watch_positions().await.unwrap();

        provider.push_fix(fix(10.0, 20.0));
        provider.push_fix(fix(10.001, 20.001));

        assert_eq!(rx.recv().await.unwrap().latitude, 10.0);
        assert_eq!(rx.recv().await.unwrap().latitude, 10.001);
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let provider = UnsupportedGeolocationProvider;
        let err = provider
            .request_current_position(&PositionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, GeolocationError::Unsupported);
    }
}
