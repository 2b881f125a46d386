//! Property tests for the response normalizer

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use poolsync::models::WorkerStatus;
use poolsync::normalize::{
    active_flag, classify_worker_status, normalize_worker, parse_hashrate, parse_percentage,
};

proptest! {
    #[test]
    fn parse_hashrate_never_panics(input in ".*") {
        let _ = parse_hashrate(&input);
    }

    #[test]
    fn terahash_scales_gigahash(value in 0u32..1_000_000) {
        let th = parse_hashrate(&format!("{value} TH/s"));
        let gh = parse_hashrate(&format!("{value} GH/s"));
        prop_assert_eq!(th, gh * 1000);
    }

    #[test]
    fn bare_numbers_are_hashes(value in 0u64..u64::from(u32::MAX)) {
        prop_assert_eq!(parse_hashrate(&value.to_string()), value);
    }

    #[test]
    fn negative_hashrate_is_zero(value in 1u32..1_000_000) {
        prop_assert_eq!(parse_hashrate(&format!("-{value} MH/s")), 0);
    }

    #[test]
    fn percentage_round_trips_suffix(value in 0u32..10_000) {
        let percent = f64::from(value) / 100.0;
        let parsed = parse_percentage(&format!("{percent}%"));
        prop_assert!((parsed - percent).abs() < 1e-9);
    }

    #[test]
    fn truthy_flag_is_always_online(recent in any::<bool>()) {
        prop_assert_eq!(classify_worker_status(Some(true), recent), WorkerStatus::Online);
    }

    #[test]
    fn recent_share_overrides_missing_or_false_flag(flag in prop::option::of(Just(false))) {
        prop_assert_eq!(classify_worker_status(flag, true), WorkerStatus::Online);
    }

    #[test]
    fn share_freshness_window(age_secs in 0i64..7200) {
        let observed = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let last_share = observed.timestamp() - age_secs;
        let row = json!({"workerName": "rig", "lastShareTime": last_share});

        let worker = normalize_worker(&row, "Acct01", observed, Duration::minutes(30)).unwrap();
        let expected = if age_secs <= 1800 { WorkerStatus::Online } else { WorkerStatus::Unknown };
        prop_assert_eq!(worker.status, expected);
    }

    #[test]
    fn rows_without_name_are_invalid(status in 0i64..4) {
        let row = json!({"workerStatus": status, "hashrate1h": "1 TH/s"});
        prop_assert!(normalize_worker(&row, "Acct01", Utc::now(), Duration::minutes(30)).is_none());
    }
}

#[test]
fn test_active_flag_codes() {
    assert_eq!(active_flag(&json!(1)), Some(true));
    assert_eq!(active_flag(&json!(0)), Some(false));
    assert_eq!(active_flag(&json!(2)), Some(false));
    assert_eq!(active_flag(&json!(3)), None);
    assert_eq!(active_flag(&json!("Online")), Some(true));
    assert_eq!(active_flag(&json!(null)), None);
}
