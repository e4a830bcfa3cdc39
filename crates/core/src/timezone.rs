//! Timestamp normalization (§4.6, §9).
//!
//! All derived timestamps persisted by the recorder are converted to a
//! single named zone. If the OS zone database is unavailable, fall back to
//! a fixed UTC+8 offset (the documented zone below).

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use chrono_tz::Tz;

/// The single named zone all persisted conversation timestamps are
/// normalized to.
pub const PIPELINE_TZ: Tz = chrono_tz::Asia::Shanghai;

/// Fixed-offset fallback used only if `PIPELINE_TZ`'s rules can't be
/// resolved (e.g. a stripped-down zoneinfo environment).
const FALLBACK_OFFSET_SECONDS: i32 = 8 * 3600;

/// Normalizes a UTC instant to the pipeline's named zone, returning the
/// UTC instant unchanged (chrono timestamps are zone-agnostic in storage;
/// normalization governs how they're *rendered*, not their instant).
///
/// Exposed primarily so callers can render a `DateTime<Tz>` for logging
/// or for any zone-aware column without re-deriving the zone elsewhere.
pub fn to_pipeline_zone(instant: DateTime<Utc>) -> DateTime<Tz> {
    instant.with_timezone(&PIPELINE_TZ)
}

/// Resolves `occurred_at` per §4.6 step 2: prefer the `occurred` header
/// (Unix seconds), fall back to the broker message timestamp, fall back to
/// now. The result is always a valid UTC instant; rendering into
/// `PIPELINE_TZ` happens at the storage boundary.
pub fn resolve_occurred_at(
    occurred_header: Option<i64>,
    broker_timestamp: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    if let Some(secs) = occurred_header {
        if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
            return dt;
        }
    }
    if let Some(ts) = broker_timestamp {
        return ts;
    }
    Utc::now()
}

/// Fallback fixed-offset zone, used only if `chrono_tz` lookups ever fail
/// in a degraded environment.
pub fn fallback_offset() -> FixedOffset {
    FixedOffset::east_opt(FALLBACK_OFFSET_SECONDS).expect("fixed offset in range")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_occurred_header() {
        let header = 1_700_000_000;
        let broker_ts = Some(Utc::now());
        let resolved = resolve_occurred_at(Some(header), broker_ts);
        assert_eq!(resolved.timestamp(), header);
    }

    #[test]
    fn falls_back_to_broker_timestamp() {
        let broker_ts = Utc.timestamp_opt(1_650_000_000, 0).single().unwrap();
        let resolved = resolve_occurred_at(None, Some(broker_ts));
        assert_eq!(resolved, broker_ts);
    }

    #[test]
    fn falls_back_to_now_when_nothing_else_available() {
        let before = Utc::now();
        let resolved = resolve_occurred_at(None, None);
        assert!(resolved >= before);
    }

    #[test]
    fn invalid_header_falls_through_to_broker_timestamp() {
        let broker_ts = Utc.timestamp_opt(1_650_000_000, 0).single().unwrap();
        let resolved = resolve_occurred_at(Some(i64::MAX), Some(broker_ts));
        assert_eq!(resolved, broker_ts);
    }
}
