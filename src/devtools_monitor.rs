// DevTools and console-tamper monitoring.
//
// Six detection channels, each contributing its points at most once per
// session. Polling runs on a randomized interval so a scripted evasion
// cannot time its own state changes around the check. Once any channel
// fires, the detected flag is sticky for the life of the session: an
// attacker with developer tools open can rewrite geolocation output, so
// the location result is no longer trustworthy.

use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::MonitorConfig;
use crate::lock_utils::lock_or_recover;
use crate::report::DetectionResult;
use crate::telemetry::TamperSample;

/// Inspector-extension globals whose presence betrays an attached devtools
/// panel.
const INSPECTOR_GLOBALS: &[&str] = &[
    "__REACT_DEVTOOLS_GLOBAL_HOOK__",
    "__VUE_DEVTOOLS_GLOBAL_HOOK__",
    "__REDUX_DEVTOOLS_EXTENSION__",
    "devtoolsFormatters",
];

/// Conventional devtools / view-source key combinations.
const DEVTOOLS_KEY_COMBOS: &[&str] = &[
    "F12",
    "Ctrl+Shift+I",
    "Ctrl+Shift+J",
    "Ctrl+Shift+C",
    "Cmd+Opt+I",
    "Cmd+Opt+J",
    "Cmd+Opt+C",
    "Ctrl+U",
    "Cmd+U",
];

/// One detection channel. Each contributes its score only once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TamperChannel {
    Timing,
    WindowDimensions,
    ConsoleGetter,
    GlobalHook,
    KeyboardShortcut,
    FunctionIntegrity,
}

impl TamperChannel {
    fn points(self) -> u32 {
        match self {
            TamperChannel::Timing => 20,
            TamperChannel::WindowDimensions => 15,
            TamperChannel::ConsoleGetter => 25,
            TamperChannel::GlobalHook => 15,
            TamperChannel::KeyboardShortcut => 20,
            // Proves prototype tampering is possible in this realm, not
            // devtools itself; corroborating only
            TamperChannel::FunctionIntegrity => 10,
        }
    }
}

/// Source of fresh tamper samples, injected so the monitor can be driven by
/// an in-page probe, a beacon stream, or a test stub alike.
pub trait TamperProbe: Send + Sync {
    fn sample(&self) -> TamperSample;
}

#[derive(Default)]
struct MonitorState {
    fired: HashSet<TamperChannel>,
    devtools_detected: bool,
    result: DetectionResult,
}

/// Continuous developer-tools and tamper monitor.
pub struct DevToolsTamperMonitor {
    config: MonitorConfig,
    state: Arc<Mutex<MonitorState>>,
}

impl DevToolsTamperMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MonitorState::default())),
        }
    }

    /// Evaluate one sample against every channel. Returns the channels that
    /// fired for the first time this session.
    pub fn evaluate_sample(&self, sample: &TamperSample) -> Vec<TamperChannel> {
        evaluate(&self.config, &self.state, sample)
    }

    /// Sticky: never unset once true.
    pub fn devtools_detected(&self) -> bool {
        lock_or_recover(&self.state, "tamper monitor state").devtools_detected
    }

    /// Snapshot of the accumulated devtools detection result.
    pub fn result(&self) -> DetectionResult {
        lock_or_recover(&self.state, "tamper monitor state")
            .result
            .clone()
    }

    /// Console-tamper sub-result: the channels that specifically indicate
    /// console-level interference.
    pub fn console_result(&self) -> DetectionResult {
        let state = lock_or_recover(&self.state, "tamper monitor state");
        let mut console = DetectionResult::default();
        if state.fired.contains(&TamperChannel::ConsoleGetter) {
            console.add(
                TamperChannel::ConsoleGetter.points(),
                "Console rendered a side-effecting getter (panel open)",
            );
        }
        if state.fired.contains(&TamperChannel::FunctionIntegrity) {
            console.add(
                TamperChannel::FunctionIntegrity.points(),
                "Prototype tampering possible: toString override stuck",
            );
        }
        console
    }

    /// Spawn the anti-evasion polling loop: sample, evaluate, notify on new
    /// fires, sleeping a uniformly random 2-7 s (configurable) between
    /// rounds, until the bounded watch duration elapses.
    pub fn spawn_polling(
        &self,
        probe: Arc<dyn TamperProbe>,
        on_fire: Arc<dyn Fn(&[TamperChannel]) + Send + Sync>,
    ) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let config = self.config.clone();

        tokio::spawn(async move {
            let deadline =
                tokio::time::Instant::now() + Duration::from_secs(config.watch_duration_secs);

            loop {
                let sleep_secs = {
                    let mut rng = rand::thread_rng();
                    rng.gen_range(config.poll_min_secs..=config.poll_max_secs)
                };
                let wake = tokio::time::Instant::now() + Duration::from_secs(sleep_secs);
                if wake >= deadline {
                    break;
                }
                tokio::time::sleep_until(wake).await;

                let sample = probe.sample();
                let newly_fired = evaluate(&config, &state, &sample);
                if !newly_fired.is_empty() {
                    on_fire(&newly_fired);
                }
            }
            debug!("devtools polling window elapsed, monitor stopped");
        })
    }
}

/// Run every channel check against one sample, firing each at most once.
fn evaluate(
    config: &MonitorConfig,
    state: &Mutex<MonitorState>,
    sample: &TamperSample,
) -> Vec<TamperChannel> {
    let mut newly_fired = Vec::new();
    let mut state = lock_or_recover(state, "tamper monitor state");

    if sample.timing_probe_ms > config.timing_threshold_ms {
        fire(
            &mut state,
            TamperChannel::Timing,
            format!(
                "Debugger pause: timing probe took {:.0} ms",
                sample.timing_probe_ms
            ),
            &mut newly_fired,
        );
    }

    // Docked-panel heuristic false-positives on mobile browser chrome
    if !sample.mobile_user_agent
        && (sample.outer_inner_width_delta > config.dimension_threshold_px
            || sample.outer_inner_height_delta > config.dimension_threshold_px)
    {
        fire(
            &mut state,
            TamperChannel::WindowDimensions,
            format!(
                "Docked panel: window chrome delta {}x{} px",
                sample.outer_inner_width_delta, sample.outer_inner_height_delta
            ),
            &mut newly_fired,
        );
    }

    if sample.console_getter_fired {
        fire(
            &mut state,
            TamperChannel::ConsoleGetter,
            "Console rendered a side-effecting getter (panel open)",
            &mut newly_fired,
        );
    }

    let inspector_hit = sample
        .inspector_globals
        .iter()
        .find(|g| INSPECTOR_GLOBALS.iter().any(|known| known == &g.as_str()));
    if let Some(global) = inspector_hit {
        fire(
            &mut state,
            TamperChannel::GlobalHook,
            format!("Inspector hook present: {}", global),
            &mut newly_fired,
        );
    }

    if let Some(combo) = &sample.devtools_key_combo {
        if DEVTOOLS_KEY_COMBOS.iter().any(|c| c == combo) {
            fire(
                &mut state,
                TamperChannel::KeyboardShortcut,
                format!("DevTools key combination observed: {}", combo),
                &mut newly_fired,
            );
        }
    }

    if sample.to_string_override_stuck {
        fire(
            &mut state,
            TamperChannel::FunctionIntegrity,
            "Prototype tampering possible: toString override stuck",
            &mut newly_fired,
        );
    }

    if !newly_fired.is_empty() {
        warn!(?newly_fired, "devtools tamper channels fired");
    }
    newly_fired
}

fn fire(
    state: &mut MonitorState,
    channel: TamperChannel,
    indicator: impl Into<String>,
    newly_fired: &mut Vec<TamperChannel>,
) {
    // Dedup: a channel contributes its score only once per session
    if !state.fired.insert(channel) {
        return;
    }
    state.devtools_detected = true;
    state.result.add(channel.points(), indicator);
    newly_fired.push(channel);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> DevToolsTamperMonitor {
        DevToolsTamperMonitor::new(MonitorConfig::default())
    }

    #[test]
    fn test_clean_sample_fires_nothing() {
        let m = monitor();
        let fired = m.evaluate_sample(&TamperSample::default());
        assert!(fired.is_empty());
        assert!(!m.devtools_detected());
        assert_eq!(m.result().score, 0);
    }

    #[test]
    fn test_timing_channel() {
        let m = monitor();
        let sample = TamperSample {
            timing_probe_ms: 450.0,
            ..Default::default()
        };
        let fired = m.evaluate_sample(&sample);
        assert_eq!(fired, vec![TamperChannel::Timing]);
        assert!(m.devtools_detected());
    }

    #[test]
    fn test_channel_dedup() {
        let m = monitor();
        let sample = TamperSample {
            console_getter_fired: true,
            ..Default::default()
        };
        assert_eq!(m.evaluate_sample(&sample).len(), 1);
        // Same channel again: no new fire, no extra points
        assert!(m.evaluate_sample(&sample).is_empty());
        assert_eq!(m.result().score, 25);
    }

    #[test]
    fn test_dimension_channel_skipped_on_mobile() {
        let m = monitor();
        let sample = TamperSample {
            outer_inner_height_delta: 400,
            mobile_user_agent: true,
            ..Default::default()
        };
        assert!(m.evaluate_sample(&sample).is_empty());

        let desktop = TamperSample {
            outer_inner_height_delta: 400,
            mobile_user_agent: false,
            ..Default::default()
        };
        assert_eq!(
            m.evaluate_sample(&desktop),
            vec![TamperChannel::WindowDimensions]
        );
    }

    #[test]
    fn test_keyboard_channel_accepts_known_combos_only() {
        let m = monitor();
        let unknown = TamperSample {
            devtools_key_combo: Some("Ctrl+S".to_string()),
            ..Default::default()
        };
        assert!(m.evaluate_sample(&unknown).is_empty());

        let f12 = TamperSample {
            devtools_key_combo: Some("F12".to_string()),
            ..Default::default()
        };
        assert_eq!(
            m.evaluate_sample(&f12),
            vec![TamperChannel::KeyboardShortcut]
        );
    }

    #[test]
    fn test_sticky_flag_survives_clean_samples() {
        let m = monitor();
        m.evaluate_sample(&TamperSample {
            inspector_globals: vec!["__REACT_DEVTOOLS_GLOBAL_HOOK__".to_string()],
            ..Default::default()
        });
        assert!(m.devtools_detected());

        m.evaluate_sample(&TamperSample::default());
        assert!(m.devtools_detected(), "detected flag must never unset");
    }

    #[test]
    fn test_console_sub_result() {
        let m = monitor();
        m.evaluate_sample(&TamperSample {
            console_getter_fired: true,
            to_string_override_stuck: true,
            timing_probe_ms: 500.0,
            ..Default::default()
        });

        let console = m.console_result();
        assert_eq!(console.score, 35);
        // Timing points belong to the devtools result, not the console one
        assert_eq!(m.result().score, 55);
    }

    struct StubProbe {
        sample: TamperSample,
    }

    impl TamperProbe for StubProbe {
        fn sample(&self) -> TamperSample {
            self.sample.clone()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_fires_callback_once() {
        let m = Arc::new(DevToolsTamperMonitor::new(MonitorConfig {
            poll_min_secs: 1,
            poll_max_secs: 1,
            watch_duration_secs: 10,
            ..Default::default()
        }));
        let probe = Arc::new(StubProbe {
            sample: TamperSample {
                timing_probe_ms: 900.0,
                ..Default::default()
            },
        });

        let fires = Arc::new(Mutex::new(0u32));
        let fires_in_cb = Arc::clone(&fires);
        let handle = m.spawn_polling(
            probe,
            Arc::new(move |_channels: &[TamperChannel]| {
                *fires_in_cb.lock().unwrap() += 1;
            }),
        );

        handle.await.unwrap();
        // Channel dedup means the callback observed exactly one new fire
        assert_eq!(*fires.lock().unwrap(), 1);
        assert!(m.devtools_detected());
    }
}
