// In-page probe script generation.
//
// The engine never touches browser APIs itself; this generated script runs
// in the page, populates the telemetry shapes from `telemetry`, samples the
// tamper probes on a randomized interval, and submits everything as JSON.
// Randomized cadence and the time-boxed console.error wrap (install, always
// restore) live here because they only make sense in-page.

use crate::config::RiskConfig;

/// Generate the JavaScript probe for one session. Poll bounds come from the
/// monitor configuration so client and engine agree on the cadence.
pub fn generate_probe_script(config: &RiskConfig) -> String {
    PROBE_TEMPLATE
        .replace(
            "__POLL_MIN_MS__",
            &(config.monitor.poll_min_secs * 1000).to_string(),
        )
        .replace(
            "__POLL_MAX_MS__",
            &(config.monitor.poll_max_secs * 1000).to_string(),
        )
        .replace(
            "__WATCH_DURATION_MS__",
            &(config.monitor.watch_duration_secs * 1000).to_string(),
        )
}

const PROBE_TEMPLATE: &str = r#"
(function() {
    const VERILOC_PROBE = {
        startedAt: Date.now(),
        consoleErrors: [],
        lastKeyCombo: null,
        consoleGetterFired: false
    };

    // Time-boxed console.error capture: install, always restore
    (function() {
        const original = console.error;
        console.error = function() {
            try {
                VERILOC_PROBE.consoleErrors.push(Array.from(arguments).join(' '));
            } catch (e) {}
            return original.apply(console, arguments);
        };
        setTimeout(function() { console.error = original; }, 100);
    })();

    // DevTools key combinations
    document.addEventListener('keydown', function(e) {
        const ctrl = e.ctrlKey || e.metaKey;
        if (e.key === 'F12') VERILOC_PROBE.lastKeyCombo = 'F12';
        else if (ctrl && e.shiftKey && ['I','J','C'].includes(e.key.toUpperCase()))
            VERILOC_PROBE.lastKeyCombo = (e.metaKey ? 'Cmd+Opt+' : 'Ctrl+Shift+') + e.key.toUpperCase();
        else if (ctrl && e.key.toUpperCase() === 'U')
            VERILOC_PROBE.lastKeyCombo = (e.metaKey ? 'Cmd+U' : 'Ctrl+U');
    });

    function canvasCapture() {
        try {
            const canvas = document.createElement('canvas');
            canvas.width = 240; canvas.height = 60;
            const ctx = canvas.getContext('2d');
            ctx.textBaseline = 'top';
            ctx.font = '14px Arial';
            ctx.fillStyle = '#f60';
            ctx.fillRect(125, 1, 62, 20);
            ctx.fillStyle = '#069';
            ctx.fillText('veriloc,probe <canvas> 1.0', 2, 15);
            ctx.strokeStyle = 'rgba(102, 204, 0, 0.7)';
            ctx.beginPath();
            ctx.arc(50, 30, 20, 0, Math.PI * 2, true);
            ctx.stroke();
            return { image_data: canvas.toDataURL() };
        } catch (e) { return null; }
    }

    function webglInfo() {
        try {
            const canvas = document.createElement('canvas');
            const gl = canvas.getContext('webgl') || canvas.getContext('experimental-webgl');
            if (!gl) return null;
            const dbg = gl.getExtension('WEBGL_debug_renderer_info');
            if (!dbg) {
                return { vendor: gl.getParameter(gl.VENDOR), renderer: gl.getParameter(gl.RENDERER), debug_info_available: false };
            }
            return {
                vendor: gl.getParameter(dbg.UNMASKED_VENDOR_WEBGL),
                renderer: gl.getParameter(dbg.UNMASKED_RENDERER_WEBGL),
                debug_info_available: true
            };
        } catch (e) { return null; }
    }

    function audioCapture() {
        return new Promise(function(resolve) {
            try {
                const ctx = new (window.AudioContext || window.webkitAudioContext)();
                const oscillator = ctx.createOscillator();
                const analyser = ctx.createAnalyser();
                const gain = ctx.createGain();
                gain.gain.value = 0; // silent
                oscillator.type = 'triangle';
                oscillator.connect(analyser);
                analyser.connect(gain);
                gain.connect(ctx.destination);
                oscillator.start(0);
                // Let the graph produce samples before reading bins
                setTimeout(function() {
                    const bins = new Uint8Array(analyser.frequencyBinCount);
                    analyser.getByteFrequencyData(bins);
                    oscillator.stop();
                    ctx.close();
                    resolve({ frequency_bins: Array.from(bins.slice(0, 64)) });
                }, 100);
            } catch (e) { resolve(null); }
        });
    }

    function domSnapshot() {
        const attrs = new Set(), classes = new Set(), ids = new Set();
        try {
            const all = document.querySelectorAll('*');
            for (let i = 0; i < all.length && i < 3000; i++) {
                const el = all[i];
                for (const a of el.attributes) attrs.add(a.name);
                for (const c of el.classList) classes.add(c);
                if (el.id) ids.add(el.id);
            }
        } catch (e) {}

        const urls = [];
        try {
            document.querySelectorAll('script[src]').forEach(s => urls.push(s.src));
            document.querySelectorAll('link[href]').forEach(l => urls.push(l.href));
        } catch (e) {}

        const cssProps = [];
        try {
            const style = getComputedStyle(document.documentElement);
            for (let i = 0; i < style.length; i++) {
                if (style[i].startsWith('--')) cssProps.push(style[i]);
            }
        } catch (e) {}

        const metas = [];
        try {
            document.querySelectorAll('meta[name]').forEach(m =>
                metas.push({ name: m.name, content: m.content || '' }));
        } catch (e) {}

        return {
            attribute_markers: Array.from(attrs),
            class_markers: Array.from(classes),
            id_markers: Array.from(ids),
            resource_urls: urls,
            css_custom_properties: cssProps,
            meta_tags: metas,
            console_errors: VERILOC_PROBE.consoleErrors.slice(0, 20)
        };
    }

    function sourceOf(fn) {
        try { return Function.prototype.toString.call(fn); } catch (e) { return null; }
    }

    function runtimeIntegrity() {
        return {
            fetch_source: sourceOf(window.fetch),
            xhr_open_source: sourceOf(XMLHttpRequest.prototype.open),
            create_data_channel_source: window.RTCPeerConnection
                ? sourceOf(RTCPeerConnection.prototype.createDataChannel) : null,
            function_to_string_source: sourceOf(Function.prototype.toString),
            console_error_source: sourceOf(console.error)
        };
    }

    function tamperSample() {
        // Timing channel: a debugger pause stretches this delta
        const before = performance.now();
        debugger;
        const timingMs = performance.now() - before;

        // Console getter channel: the accessor fires only when a real
        // console renders the object
        VERILOC_PROBE.consoleGetterFired = false;
        const bait = { toString: function() { return ''; } };
        Object.defineProperty(bait, 'id', {
            get: function() { VERILOC_PROBE.consoleGetterFired = true; return ''; }
        });
        console.debug(bait);

        const inspectorGlobals = [
            '__REACT_DEVTOOLS_GLOBAL_HOOK__', '__VUE_DEVTOOLS_GLOBAL_HOOK__',
            '__REDUX_DEVTOOLS_EXTENSION__', 'devtoolsFormatters'
        ].filter(g => g in window);

        // Function-integrity channel
        let overrideStuck = false;
        try {
            const probe = function() {};
            probe.toString = function() { return 'overridden'; };
            overrideStuck = String(probe) === 'overridden';
        } catch (e) {}

        const combo = VERILOC_PROBE.lastKeyCombo;
        VERILOC_PROBE.lastKeyCombo = null;

        return {
            timing_probe_ms: timingMs,
            outer_inner_width_delta: (window.outerWidth || 0) - (window.innerWidth || 0),
            outer_inner_height_delta: (window.outerHeight || 0) - (window.innerHeight || 0),
            console_getter_fired: VERILOC_PROBE.consoleGetterFired,
            inspector_globals: inspectorGlobals,
            devtools_key_combo: combo,
            to_string_override_stuck: overrideStuck,
            mobile_user_agent: /Mobi|Android|iPhone|iPad/i.test(navigator.userAgent)
        };
    }

    async function collectTelemetry() {
        let mediaDevices = null;
        try {
            if (navigator.mediaDevices && navigator.mediaDevices.enumerateDevices) {
                const devices = await navigator.mediaDevices.enumerateDevices();
                mediaDevices = devices.map(d => ({ kind: d.kind, label: d.label || '' }));
            }
        } catch (e) {}

        let timezone = null;
        try { timezone = Intl.DateTimeFormat().resolvedOptions().timeZone || null; } catch (e) {}

        const knownGlobals = [];
        try {
            for (const name of Object.getOwnPropertyNames(window)) {
                if (knownGlobals.length >= 500) break;
                knownGlobals.push(name);
            }
        } catch (e) {}

        return {
            navigator: {
                user_agent: navigator.userAgent || '',
                platform: navigator.platform || '',
                languages: Array.from(navigator.languages || []),
                hardware_concurrency: navigator.hardwareConcurrency || null,
                device_memory_gb: navigator.deviceMemory || null,
                max_touch_points: navigator.maxTouchPoints || 0
            },
            screen: {
                width: screen.width || 0,
                height: screen.height || 0,
                color_depth: screen.colorDepth || 24,
                device_pixel_ratio: window.devicePixelRatio || 1
            },
            webgl: webglInfo(),
            canvas: canvasCapture(),
            audio: await audioCapture(),
            timezone: timezone,
            local_utc_offset_hours: -new Date().getTimezoneOffset() / 60,
            media_devices: mediaDevices,
            plugins: Array.from(navigator.plugins || []).map(p => ({ name: p.name })),
            globals: knownGlobals,
            dom: domSnapshot(),
            runtime: runtimeIntegrity(),
            tamper: tamperSample()
        };
    }

    window.VERILOC_collectTelemetry = collectTelemetry;

    window.VERILOC_submitTelemetry = async function(endpoint) {
        const telemetry = await collectTelemetry();
        const response = await fetch(endpoint, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify(telemetry)
        });
        return response.json();
    };

    // Anti-evasion: tamper beacons on a randomized interval so a script
    // cannot time its own state changes around the check
    window.VERILOC_startTamperBeacons = function(endpoint) {
        const stopAt = Date.now() + __WATCH_DURATION_MS__;
        function schedule() {
            if (Date.now() >= stopAt) return;
            const delay = __POLL_MIN_MS__ +
                Math.floor(Math.random() * (__POLL_MAX_MS__ - __POLL_MIN_MS__ + 1));
            setTimeout(async function() {
                try {
                    await fetch(endpoint, {
                        method: 'POST',
                        headers: { 'Content-Type': 'application/json' },
                        body: JSON.stringify(tamperSample())
                    });
                } catch (e) {}
                schedule();
            }, delay);
        }
        schedule();
    };

    // Geolocation fixes for the behavior watch
    window.VERILOC_startLocationWatch = function(endpoint) {
        if (!navigator.geolocation) return null;
        const requestedAt = Date.now();
        return navigator.geolocation.watchPosition(function(pos) {
            fetch(endpoint, {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({
                    latitude: pos.coords.latitude,
                    longitude: pos.coords.longitude,
                    accuracy_m: pos.coords.accuracy,
                    captured_at_epoch_ms: pos.timestamp,
                    fix_response_ms: Date.now() - requestedAt
                })
            }).catch(function() {});
        }, function() {}, { enableHighAccuracy: true, timeout: 10000, maximumAge: 0 });
    };
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_script_exposes_entry_points() {
        let script = generate_probe_script(&RiskConfig::default());
        assert!(script.contains("VERILOC_collectTelemetry"));
        assert!(script.contains("VERILOC_submitTelemetry"));
        assert!(script.contains("VERILOC_startTamperBeacons"));
        assert!(script.contains("VERILOC_startLocationWatch"));
    }

    #[test]
    fn test_poll_bounds_are_injected() {
        let config = RiskConfig::default();
        let script = generate_probe_script(&config);
        assert!(script.contains("2000"));
        assert!(script.contains("7000"));
        assert!(!script.contains("__POLL_MIN_MS__"));
        assert!(!script.contains("__POLL_MAX_MS__"));
        assert!(!script.contains("__WATCH_DURATION_MS__"));
    }

    #[test]
    fn test_console_wrap_is_always_restored() {
        let script = generate_probe_script(&RiskConfig::default());
        // Install-and-revert discipline: the restore is unconditional
        assert!(script.contains("console.error = original"));
    }
}
