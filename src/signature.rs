// Shared product-signature table type and scan helpers.
//
// Extension and VPN detection both match environment state against static
// tables of known products. Each entry carries the markers a product leaves
// behind: global object names, DOM attribute/class/id fragments, a store
// extension id, and optional user-agent substrings.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::telemetry::DomSnapshot;

/// The marker a script engine embeds in the `toString` output of genuinely
/// native functions. Its absence means the function was monkey-patched.
pub const NATIVE_CODE_MARKER: &str = "[native code]";

/// One known product and the markers it leaves behind.
#[derive(Debug, Clone, Copy)]
pub struct ProductSignature {
    pub name: &'static str,
    /// Canonical store extension id; empty for products that are not
    /// conventional browser extensions
    pub extension_id: &'static str,
    pub globals: &'static [&'static str],
    pub dom_markers: &'static [&'static str],
    pub ua_markers: &'static [&'static str],
    pub points: u32,
}

/// Extension-resource URLs embed the extension id in their authority.
static EXTENSION_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:chrome|moz|ms-browser|safari-web)-extension://([a-zA-Z0-9_-]{8,64})")
        .expect("valid extension url pattern")
});

/// Normalization variants of a product name, used when probing globals and
/// DOM markers: verbatim, lower-cased, space-stripped, underscored.
pub fn name_variants(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    vec![
        name.to_string(),
        lower.clone(),
        lower.replace(' ', ""),
        lower.replace(' ', "_"),
    ]
}

/// Method 1: global-object presence under any normalization variant.
pub fn globals_hit(sig: &ProductSignature, globals: &[String]) -> bool {
    for expected in sig.globals {
        for variant in name_variants(expected) {
            if globals.iter().any(|g| g == &variant) {
                return true;
            }
        }
    }
    false
}

/// Method 2: DOM marker match. Any attribute, class, or id containing a
/// marker fragment (or a normalized product-name variant) counts.
pub fn dom_hit(sig: &ProductSignature, dom: &DomSnapshot) -> bool {
    let mut needles: Vec<String> = sig.dom_markers.iter().map(|m| m.to_lowercase()).collect();
    needles.push(sig.name.to_lowercase().replace(' ', "-"));

    let haystacks = dom
        .attribute_markers
        .iter()
        .chain(dom.class_markers.iter())
        .chain(dom.id_markers.iter());

    for value in haystacks {
        let value = value.to_lowercase();
        if needles.iter().any(|n| value.contains(n.as_str())) {
            return true;
        }
    }
    false
}

/// Method 3 support: extract extension ids embedded in loaded resource URLs.
pub fn extract_extension_ids(resource_urls: &[String]) -> Vec<String> {
    let mut ids = Vec::new();
    for url in resource_urls {
        for caps in EXTENSION_URL_RE.captures_iter(url) {
            let id = caps[1].to_string();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// User-agent marker match.
pub fn ua_hit(sig: &ProductSignature, user_agent: &str) -> bool {
    if sig.ua_markers.is_empty() {
        return false;
    }
    let ua = user_agent.to_lowercase();
    sig.ua_markers
        .iter()
        .any(|m| ua.contains(m.to_lowercase().as_str()))
}

/// Method 4 support: does the captured source text look native? `None` when
/// no capture was taken, keeping the check neutral.
pub fn looks_native(source: &Option<String>) -> Option<bool> {
    source.as_ref().map(|s| s.contains(NATIVE_CODE_MARKER))
}
