//! Property-based tests for normalization, the duplicate key and record ids
//!
//! Uses proptest to generate random inputs and verify properties

use attendsync::shared::normalize::{day_bounds, local_date, normalize_text, DedupKey};
use attendsync::shared::record::{ensure_v4, SyncStatus};
use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Version;

fn status() -> impl Strategy<Value = SyncStatus> {
    prop_oneof![Just(SyncStatus::Pending), Just(SyncStatus::Synced), Just(SyncStatus::Error)]
}

proptest! {
    #[test]
    fn test_normalize_is_idempotent(text in "[ a-zA-ZÀ-ÿ\\t]{0,40}") {
        let once = normalize_text(&text);
        prop_assert_eq!(normalize_text(&once), once.clone());
    }

    #[test]
    fn test_normalize_has_no_edge_or_double_spaces(text in "[ a-zA-Zãéíóúç\\t]{0,40}") {
        let normalized = normalize_text(&text);
        prop_assert_eq!(normalized.trim(), normalized.as_str());
        prop_assert!(!normalized.contains("  "));
    }

    #[test]
    fn test_case_and_accents_do_not_change_key(name in "[a-z]{1,10}( [a-z]{1,10}){0,3}") {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let lower = DedupKey::new(&name, "cotia", "musico", date);
        let upper = DedupKey::new(&name.to_uppercase(), "COTIA", "MÚSICO", date);
        prop_assert_eq!(lower, upper);
    }

    #[test]
    fn test_ensure_v4_always_yields_v4(raw in proptest::option::of(".{0,40}")) {
        let id = ensure_v4(raw.as_deref());
        prop_assert_eq!(id.get_version(), Some(Version::Random));
    }

    #[test]
    fn test_terminal_states_never_transition(from in status(), to in status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
        if from.can_transition_to(to) {
            prop_assert!(to.is_terminal());
        }
    }

    #[test]
    fn test_day_bounds_contain_timestamp(secs in 0i64..4_000_000_000, offset_hours in -12i32..=14) {
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        let ts = Utc.timestamp_opt(secs, 0).unwrap();
        let (start, end) = day_bounds(ts, offset);
        prop_assert!(start <= ts && ts < end);
        prop_assert_eq!(local_date(start, offset), local_date(ts, offset));
    }
}
