// Timezone offset resolution for the location-vs-timezone consistency check.
//
// Offsets are resolved at a fixed mid-January reference instant so the answer
// does not flip with daylight-saving at call time. The longitude model is a
// deliberate 15-degrees-per-hour approximation, not a geo lookup.

use chrono::{NaiveDate, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Reference instant for offset resolution: 2024-01-15T12:00:00Z, far from
/// any northern-hemisphere DST transition.
static REFERENCE_INSTANT: Lazy<NaiveDateTime> = Lazy::new(|| {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid reference instant")
});

/// Literal offset names like "UTC+05:30", "GMT-7", "+0200".
static LITERAL_OFFSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(?:utc|gmt)?\s*([+-])(\d{1,2})(?::?([0-5]\d))?$").expect("valid offset pattern")
});

/// Resolve a named timezone to its UTC offset in hours at the reference
/// instant. Fractional offsets (e.g. 5.5 for Asia/Kolkata) are preserved.
///
/// Resolution order: IANA database lookup, then a literal `±HH:MM` parse for
/// non-IANA names, then the caller's own local offset. Never fails; the
/// result is always a best-effort number.
pub fn offset_hours_from_timezone_name(name: &str, fallback_offset_hours: f64) -> f64 {
    let trimmed = name.trim();

    if let Ok(tz) = trimmed.parse::<Tz>() {
        let offset = tz.offset_from_utc_datetime(&REFERENCE_INSTANT);
        return f64::from(offset.fix().local_minus_utc()) / 3600.0;
    }

    if let Some(hours) = parse_literal_offset(trimmed) {
        return hours;
    }

    fallback_offset_hours
}

/// Approximate the UTC offset implied by a longitude: `round(lon / 15)`.
///
/// The Earth rotates through 15 degrees of longitude per hour; real zone
/// boundaries are political, so this is only good to about an hour.
pub fn approx_offset_hours_from_longitude(longitude: f64) -> i32 {
    (longitude / 15.0).round() as i32
}

fn parse_literal_offset(name: &str) -> Option<f64> {
    let caps = LITERAL_OFFSET_RE.captures(name)?;
    let sign = if &caps[1] == "-" { -1.0 } else { 1.0 };
    let hours: f64 = caps[2].parse().ok()?;
    let minutes: f64 = caps
        .get(3)
        .map(|m| m.as_str().parse().unwrap_or(0.0))
        .unwrap_or(0.0);
    if hours > 14.0 {
        return None;
    }
    Some(sign * (hours + minutes / 60.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_offset_zones() {
        assert_eq!(offset_hours_from_timezone_name("Asia/Saigon", 0.0), 7.0);
        assert_eq!(offset_hours_from_timezone_name("UTC", 99.0), 0.0);
        assert_eq!(offset_hours_from_timezone_name("Etc/UTC", 99.0), 0.0);
    }

    #[test]
    fn test_winter_reference_avoids_dst() {
        // New York is on EST (-5) in mid-January regardless of call time
        assert_eq!(
            offset_hours_from_timezone_name("America/New_York", 0.0),
            -5.0
        );
        assert_eq!(
            offset_hours_from_timezone_name("America/Los_Angeles", 0.0),
            -8.0
        );
    }

    #[test]
    fn test_fractional_offsets() {
        assert_eq!(offset_hours_from_timezone_name("Asia/Kolkata", 0.0), 5.5);
        assert_eq!(offset_hours_from_timezone_name("Asia/Kathmandu", 0.0), 5.75);
    }

    #[test]
    fn test_literal_offset_names() {
        assert_eq!(offset_hours_from_timezone_name("UTC+05:30", 0.0), 5.5);
        assert_eq!(offset_hours_from_timezone_name("GMT-7", 0.0), -7.0);
        assert_eq!(offset_hours_from_timezone_name("+0200", 0.0), 2.0);
    }

    #[test]
    fn test_invalid_name_falls_back_to_local_offset() {
        assert_eq!(
            offset_hours_from_timezone_name("Not/AZone", -3.0),
            -3.0
        );
        assert_eq!(offset_hours_from_timezone_name("", 4.5), 4.5);
    }

    #[test]
    fn test_longitude_model() {
        assert_eq!(approx_offset_hours_from_longitude(0.0), 0);
        // Ho Chi Minh City
        assert_eq!(approx_offset_hours_from_longitude(106.66), 7);
        // New York
        assert_eq!(approx_offset_hours_from_longitude(-74.0), -5);
        // Mountain View
        assert_eq!(approx_offset_hours_from_longitude(-122.08), -8);
        assert_eq!(approx_offset_hours_from_longitude(179.9), 12);
    }
}
