// Known VPN and enterprise-proxy detection.
//
// Same table-driven pattern as extension detection, specialized to VPN
// providers, with two additions: enterprise proxy heuristics (PAC/WPAD
// artifacts, proxy meta tags) and a dedicated check for Zscaler, whose
// client does not appear as a conventional browser extension.

use tracing::debug;

use crate::report::DetectionResult;
use crate::signature::{
    self, dom_hit, extract_extension_ids, globals_hit, ua_hit, ProductSignature,
};
use crate::telemetry::EnvironmentTelemetry;

const PROXY_ARTIFACT_POINTS: u32 = 15;
const PROXY_META_POINTS: u32 = 10;
const NETWORK_API_OVERRIDE_POINTS: u32 = 10;

/// Known VPN products with browser-extension footprints.
const VPN_SIGNATURES: &[ProductSignature] = &[
    ProductSignature {
        name: "Hola VPN",
        extension_id: "gkojfkhlekighikafcpjkiklfbnlmeio",
        globals: &["hola_ext", "holaExtension"],
        dom_markers: &["hola-vpn", "hola_ext"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "Touch VPN",
        extension_id: "bihmplhobchoageeokmgbdihknkjbknd",
        globals: &["touchVpn"],
        dom_markers: &["touch-vpn"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "Browsec VPN",
        extension_id: "omghfjlpggmjjaagoclmmobgdodcjboh",
        globals: &["browsec", "__browsec"],
        dom_markers: &["browsec"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "Windscribe",
        extension_id: "hnmpcagpplmpfojmgmnngilcnanddlhb",
        globals: &["windscribe"],
        dom_markers: &["windscribe"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "ZenMate VPN",
        extension_id: "fdcgdnkidjaadafnichfpabhfomcebme",
        globals: &["zenmate", "__zenmate"],
        dom_markers: &["zenmate"],
        ua_markers: &[],
        points: 25,
    },
    ProductSignature {
        name: "Urban VPN",
        extension_id: "eppiocemhmnlbhjplcgkofciiegomcon",
        globals: &["urbanVpn", "urban_vpn"],
        dom_markers: &["urban-vpn"],
        ua_markers: &[],
        points: 20,
    },
    ProductSignature {
        name: "SetupVPN",
        extension_id: "oofgbpoabipfcfjapgnbbjjaenockbdp",
        globals: &["setupVpn"],
        dom_markers: &["setupvpn", "setup-vpn"],
        ua_markers: &[],
        points: 20,
    },
];

/// Zscaler ships as an OS-level client plus an enterprise browser component,
/// so it gets its own combined global/DOM/UA signature instead of a table row.
const ZSCALER_SIGNATURE: ProductSignature = ProductSignature {
    name: "Zscaler Client Connector",
    extension_id: "",
    globals: &["zscaler", "ZscalerAppInfo", "zsExtension"],
    dom_markers: &["zscaler", "zscloud"],
    ua_markers: &["zscaler"],
    points: 30,
};

/// PAC/WPAD artifacts that betray an enterprise proxy configuration.
const PROXY_URL_MARKERS: &[&str] = &["proxy.pac", "wpad.dat", "/pac?", "proxyconfig"];

/// Scans the session for VPN clients and enterprise proxies.
pub struct VpnSignatureDetector;

impl VpnSignatureDetector {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, tel: &EnvironmentTelemetry) -> DetectionResult {
        let mut result = DetectionResult::default();

        for sig in VPN_SIGNATURES {
            self.scan_product(sig, tel, &mut result);
        }

        self.scan_resource_ids(tel, &mut result);
        self.scan_proxy_artifacts(tel, &mut result);
        self.scan_network_api_tamper(tel, &mut result);
        self.check_zscaler(tel, &mut result);

        debug!(
            score = result.score,
            provider = result.provider.as_deref().unwrap_or("-"),
            "vpn signature scan complete"
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
            result.add(sig.points, format!("VPN global object present: {}", sig.name));
            result.provider.get_or_insert_with(|| sig.name.to_string());
        }

        if dom_hit(sig, &tel.dom) {
            result.add(
                sig.points / 2,
                format!("VPN DOM marker present: {}", sig.name),
            );
            result.provider.get_or_insert_with(|| sig.name.to_string());
        }

        if ua_hit(sig, &tel.navigator.user_agent) {
            result.add(
                sig.points / 2,
                format!("VPN user-agent marker: {}", sig.name),
            );
        }
    }

    fn scan_resource_ids(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let ids = extract_extension_ids(&tel.dom.resource_urls);
        for id in &ids {
            if let Some(sig) = VPN_SIGNATURES
                .iter()
                .find(|s| !s.extension_id.is_empty() && s.extension_id == id)
            {
                result.add(
                    sig.points,
                    format!("VPN extension resource loaded: {}", sig.name),
                );
                result.provider.get_or_insert_with(|| sig.name.to_string());
            }
        }
    }

    /// Enterprise proxy heuristics: PAC/WPAD resource artifacts and
    /// proxy-related meta tags.
    fn scan_proxy_artifacts(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        for url in &tel.dom.resource_urls {
            let lower = url.to_lowercase();
            if PROXY_URL_MARKERS.iter().any(|m| lower.contains(m)) {
                result.add(
                    PROXY_ARTIFACT_POINTS,
                    format!("Proxy auto-config artifact loaded: {}", url),
                );
                break;
            }
        }

        for meta in &tel.dom.meta_tags {
            let name = meta.name.to_lowercase();
            if name.contains("proxy") || name.contains("pac-url") {
                result.add(
                    PROXY_META_POINTS,
                    format!("Proxy-related meta tag: {}", meta.name),
                );
                break;
            }
        }
    }

    /// Network APIs rewritten in place are how several VPN extensions route
    /// traffic; the override itself is the signal.
    fn scan_network_api_tamper(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let network_checks = [
            (&tel.runtime.fetch_source, "fetch"),
            (
                &tel.runtime.create_data_channel_source,
                "RTCPeerConnection.createDataChannel",
            ),
        ];

        for (source, api) in network_checks {
            if signature::looks_native(source) == Some(false) {
                result.add(
                    NETWORK_API_OVERRIDE_POINTS,
                    format!("Network API {} overridden (possible tunnel shim)", api),
                );
            }
        }
    }

    fn check_zscaler(&self, tel: &EnvironmentTelemetry, result: &mut DetectionResult) {
        let sig = &ZSCALER_SIGNATURE;
        let global = globals_hit(sig, &tel.globals);
        let dom = dom_hit(sig, &tel.dom);
        let ua = ua_hit(sig, &tel.navigator.user_agent);
        let meta = tel
            .dom
            .meta_tags
            .iter()
            .any(|m| m.name.to_lowercase().contains("zscaler"));

        if global || dom || ua || meta {
            result.add(
                sig.points,
                "Enterprise proxy client detected: Zscaler Client Connector",
            );
            result.provider.get_or_insert_with(|| sig.name.to_string());
        }
    }
}

impl Default for VpnSignatureDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MetaTag;

    #[test]
    fn test_clean_session_scores_zero() {
        let detector = VpnSignatureDetector::new();
        let result = detector.scan(&EnvironmentTelemetry::default());
        assert_eq!(result.score, 0);
        assert!(result.provider.is_none());
    }

    #[test]
    fn test_browsec_global() {
        let detector = VpnSignatureDetector::new();
        let mut tel = EnvironmentTelemetry::default();
        tel.globals = vec!["browsec".to_string()];

        let result = detector.scan(&tel);
        assert_eq!(result.provider.as_deref(), Some("Browsec VPN"));
        assert_eq!(result.score, 25);
    }

    #[test]
    fn test_windscribe_extension_resource() {
        let detector = VpnSignatureDetector::new();
        let mut tel = EnvironmentTelemetry::default();
        tel.dom.resource_urls =
            vec!["chrome-extension://hnmpcagpplmpfojmgmnngilcnanddlhb/proxy.js".to_string()];

        let result = detector.scan(&tel);
        assert_eq!(result.provider.as_deref(), Some("Windscribe"));
    }

    #[test]
    fn test_pac_artifact() {
        let detector = VpnSignatureDetector::new();
        let mut tel = EnvironmentTelemetry::default();
        tel.dom.resource_urls = vec!["http://wpad.corp.local/proxy.pac".to_string()];

        let result = detector.scan(&tel);
        assert_eq!(result.score, PROXY_ARTIFACT_POINTS);
        assert!(result.indicators[0].contains("auto-config"));
    }

    #[test]
    fn test_proxy_meta_tag() {
        let detector = VpnSignatureDetector::new();
        let mut tel = EnvironmentTelemetry::default();
        tel.dom.meta_tags = vec![MetaTag {
            name: "x-proxy-config".to_string(),
            content: "pac".to_string(),
        }];

        let result = detector.scan(&tel);
        assert_eq!(result.score, PROXY_META_POINTS);
    }

    #[test]
    fn test_zscaler_via_user_agent() {
        let detector = VpnSignatureDetector::new();
        let mut tel = EnvironmentTelemetry::default();
        tel.navigator.user_agent =
            "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0.0.0 Zscaler/4.3".to_string();

        let result = detector.scan(&tel);
        assert_eq!(result.provider.as_deref(), Some("Zscaler Client Connector"));
        assert_eq!(result.score, 30);
    }

    #[test]
    fn test_tunnel_shim_override() {
        let detector = VpnSignatureDetector::new();
        let mut tel = EnvironmentTelemetry::default();
        tel.runtime.fetch_source = Some("function fetch() { return tunnel(arguments); }".to_string());

        let result = detector.scan(&tel);
        assert_eq!(result.score, NETWORK_API_OVERRIDE_POINTS);
    }
}
