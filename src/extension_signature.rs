// Known location-spoofing extension detection.
//
// Six probe families per table entry, unioned: global namespace, DOM
// markers, loaded-resource extension ids, native-code fingerprints of
// sensitive APIs, branded CSS custom properties, and the console-error
// burst captured by the probe's time-boxed listener. Any single probe
// failing to produce data leaves the others untouched; a partial result is
// always returned.

use tracing::debug;

use crate::report::DetectionResult;
use crate::signature::{
    self, dom_hit, extract_extension_ids, globals_hit, ua_hit, ProductSignature,
};
use crate::telemetry::{DomMutationEvent, EnvironmentTelemetry};

/// Points for an extension-resource URL whose id is not in the table: some
/// extension is injecting content, identity unknown.
const UNKNOWN_EXTENSION_POINTS: u32 = 5;
/// Points per monkey-patched sensitive API.
const API_OVERRIDE_POINTS: u32 = 8;
/// Points for a branded CSS custom property.
const CSS_PROPERTY_POINTS: u32 = 15;
/// Points for extension/geolocation co-occurrence in console errors.
const CONSOLE_ERROR_POINTS: u32 = 10;
/// Points for a marker appearing via DOM mutation after initial load.
const MUTATION_POINTS: u32 = 20;

/// Known location-spoofing products.
const EXTENSION_SIGNATURES: &[ProductSignature] = &[
    ProductSignature {
        name: "Location Guard",
        extension_id: "cfohepagpmnodfdmjliccbbigdkfcgia",
        globals: &["LocationGuard", "__locationGuard"],
        dom_markers: &["location-guard"],
        ua_markers: &[],
        points: 30,
    },
    ProductSignature {
        name: "Vytal",
        extension_id: "ncbknoohfjmcfneopnfkapmkblaicooe",
        globals: &["vytal", "__vytalState"],
        dom_markers: &["vytal"],
        ua_markers: &[],
        points: 30,
    },
    ProductSignature {
        name: "Change Geolocation",
        extension_id: "lejoknkbcogjceoniealiipllomkpioe",
        globals: &["changeGeolocation"],
        dom_markers: &["change-geolocation"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "Fake GPS Location",
        extension_id: "bmnmcjhkejgbhjcpfkoyinikjdnbckhm",
        globals: &["fakeGps", "FakeGPS"],
        dom_markers: &["fake-gps"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "Spoof Geolocation",
        extension_id: "nlodpmmpcfjcnokgfdokeimadhkepjnj",
        globals: &["spoofGeolocation", "__spoofGeo"],
        dom_markers: &["spoof-geolocation", "spoof-geo"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "Manual Geolocation",
        extension_id: "jpiefjlgcjmciajdcinaejedejjfjgki",
        globals: &["manualGeolocation"],
        dom_markers: &["manual-geolocation"],
        ua_markers: &[],
        points: 20,
    },
];

/// CSS custom properties branded by known spoofer extensions.
const EXTENSION_CSS_PROPERTIES: &[(&str, &str)] = &[
    ("--location-guard-accent", "Location Guard"),
    ("--vytal-badge-color", "Vytal"),
    ("--fake-gps-overlay", "Fake GPS Location"),
];

/// Scans the session for known location-spoofing browser extensions.
pub struct ExtensionSignatureDetector;

impl ExtensionSignatureDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, tel: &EnvironmentTelemetry) -> DetectionResult {
        let mut result = DetectionResult::default();

        for sig in EXTENSION_SIGNATURES {
            self.scan_product(sig, tel, &mut result);
        }

        self.scan_resource_urls(tel, &mut result);
        self.scan_api_overrides(tel, &mut result);
        self.scan_css_properties(tel, &mut result);
        self.scan_console_errors(tel, &mut result);

        debug!(
            score = result.score,
            provider = result.provider.as_deref().unwrap_or("-"),
            "extension signature scan complete"
        );
        result
    }

    fn scan_product(
        &self,
        sig: &ProductSignature,
        tel: &EnvironmentTelemetry,
        result: &mut DetectionResult,
    ) {
        if globals_hit(sig, &tel.globals) {
            result.add(
                sig.points,
                format!("Extension global object present: {}", sig.name),
            );
            result.provider.get_or_insert_with(|| sig.name.to_string());
        }

        if dom_hit(sig, &tel.dom) {
            result.add(
                sig.points / 2,
                format!("Extension DOM marker present: {}", sig.name),
            );
            result.provider.get_or_insert_with(|| sig.name.to_string());
        }

        if ua_hit(sig, &tel.navigator.user_agent) {
            result.add(
                sig.points / 2,
                format!("Extension user-agent marker: {}", sig.name),
            );
        }
    }

    /// Method 3: loaded-resource extension ids. An exact table match scores
    /// the product's full points; an unknown id is only the generic "some
    /// extension is injecting content" signal.
    fn scan_resource_urls(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let ids = extract_extension_ids(&tel.dom.resource_urls);
        for id in &ids {
            if let Some(sig) = EXTENSION_SIGNATURES
                .iter()
                .find(|s| !s.extension_id.is_empty() && s.extension_id == id)
            {
                result.add(
                    sig.points,
                    format!("Extension resource loaded from known id: {}", sig.name),
                );
                result.provider.get_or_insert_with(|| sig.name.to_string());
            } else {
                result.add(
                    UNKNOWN_EXTENSION_POINTS,
                    format!("Unrecognized extension resource present (id {})", id),
                );
            }
        }
    }

    /// Method 4: native-code fingerprints. Identifies that an override
    /// happened, not who did it.
    fn scan_api_overrides(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let checks = [
            (&tel.runtime.fetch_source, "fetch"),
            (&tel.runtime.xhr_open_source, "XMLHttpRequest.prototype.open"),
            (
                &tel.runtime.create_data_channel_source,
                "RTCPeerConnection.createDataChannel",
            ),
            (
                &tel.runtime.function_to_string_source,
                "Function.prototype.toString",
            ),
        ];

        for (source, api) in checks {
            if signature::looks_native(source) == Some(false) {
                result.add(
                    API_OVERRIDE_POINTS,
                    format!("{} lacks the native-code marker (monkey-patched)", api),
                );
            }
        }
    }

    /// Method 5: branded CSS custom properties.
    fn scan_css_properties(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        for (property, product) in EXTENSION_CSS_PROPERTIES {
            if tel
                .dom
                .css_custom_properties
                .iter()
                .any(|p| p.eq_ignore_ascii_case(property))
            {
                result.add(
                    CSS_PROPERTY_POINTS,
                    format!("Extension-branded CSS property {}: {}", property, product),
                );
                result
                    .provider
                    .get_or_insert_with(|| (*product).to_string());
            }
        }
    }

    /// Method 6: the console-error burst captured by the probe's time-boxed
    /// listener, scanned for extension/geolocation co-occurrence.
    fn scan_console_errors(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        for error in &tel.dom.console_errors {
            let lower = error.to_lowercase();
            let mentions_extension = lower.contains("extension");
            let mentions_location =
                lower.contains("geolocation") || lower.contains("location");
            if mentions_extension && mentions_location {
                result.add(
                    CONSOLE_ERROR_POINTS,
                    "Console error links an extension to geolocation",
                );
                break;
            }
        }
    }

    /// Scan a post-load DOM mutation for extension markers. Used by the
    /// aggregator's mutation watch to catch extensions that inject late.
    pub fn match_mutation(&self, event: &DomMutationEvent) -> Option<(String, u32)> {
        let added = event
            .added_attributes
            .iter()
            .chain(event.added_classes.iter());

        for value in added {
            let value = value.to_lowercase();
            for sig in EXTENSION_SIGNATURES {
                let mut needles: Vec<String> =
                    sig.dom_markers.iter().map(|m| m.to_lowercase()).collect();
                needles.push(sig.name.to_lowercase().replace(' ', "-"));
                if needles.iter().any(|n| value.contains(n.as_str())) {
                    return Some((sig.name.to_string(), MUTATION_POINTS));
                }
            }
        }
        None
    }
}

impl Default for ExtensionSignatureDetector {
    fn default() -> Self {
        Self::new()
    }
}
