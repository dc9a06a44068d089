//! Aggregation engine scenarios driven through `AccessStore` with a mock
//! clock: classification, statistics, eviction and their invariants.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use fsevents_agent::aggregator::{AccessStore, CloseOutcome};
use fsevents_agent::core::config::EngineConfig;
use fsevents_agent::platform::pal::MockPlatform;

fn setup(config: EngineConfig) -> (Arc<MockPlatform>, AccessStore) {
    let platform = MockPlatform::new(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap());
    let store = AccessStore::new(config, platform.clone());
    (platform, store)
}

/// Open `path`, let `elapsed_ms` pass, close it.
fn cycle(platform: &MockPlatform, store: &AccessStore, path: &str, elapsed_ms: i64) -> CloseOutcome {
    store.open(Path::new(path));
    platform.advance(Duration::milliseconds(elapsed_ms));
    store.close(Path::new(path))
}

// ══════════════════════════════════════════════════════════════════
// Section 1: Classification scenarios
// ══════════════════════════════════════════════════════════════════

#[test]
fn slow_small_read_counts_as_tape() {
    let (platform, store) = setup(EngineConfig::default());
    platform.set_size("a", 1_000);

    let outcome = cycle(&platform, &store, "a", 10_000);
    assert!(!outcome.completed().unwrap().from_cache);

    let stats = store.stats();
    assert_eq!(stats.tape_count(), 1);
    assert_eq!(stats.total_count(), 1);
    assert_eq!(stats.cumulative_tape_bytes(), 1_000);
    assert!((stats.bytes_per_sec_tape() - 100.0).abs() < 1e-9);
}

#[test]
fn quick_read_counts_as_cache() {
    let (platform, store) = setup(EngineConfig::default());
    platform.set_size("a", 1_000);
    platform.set_size("b", 1_000);
    cycle(&platform, &store, "a", 10_000);

    let outcome = cycle(&platform, &store, "b", 1_000);
    assert!(outcome.completed().unwrap().from_cache);
    let stats = store.stats();
    assert_eq!(stats.tape_count(), 1);
    assert_eq!(stats.total_count(), 2);
}

#[test]
fn fast_throughput_on_a_slow_read_is_cache() {
    let (platform, store) = setup(EngineConfig::default());
    // 10 s at 1 GB/s is above the 800 MB/s threshold.
    platform.set_size("big", 10_000_000_000);
    let outcome = cycle(&platform, &store, "big", 10_000);
    assert!(outcome.completed().unwrap().from_cache);
    assert_eq!(store.stats().tape_count(), 0);
}

#[test]
fn close_without_open_changes_nothing() {
    let (platform, store) = setup(EngineConfig::default());
    platform.set_size("stray", 5);
    assert!(matches!(store.close(Path::new("stray")), CloseOutcome::Untracked));
    assert!(store.is_empty());
    assert_eq!(store.stats().total_count(), 0);
}

#[test]
fn second_close_measures_from_the_same_open() {
    let (platform, store) = setup(EngineConfig::default());
    platform.set_size("a", 1);
    cycle(&platform, &store, "a", 2_000);
    platform.advance(Duration::seconds(3));
    // No reopen: elapsed runs from the original open.
    let done = *store.close(Path::new("a")).completed().unwrap();
    assert!((done.elapsed_secs - 5.0).abs() < 1e-9);
    assert!(done.new_longest);
}

// ══════════════════════════════════════════════════════════════════
// Section 2: Snapshot and eviction
// ══════════════════════════════════════════════════════════════════

#[test]
fn snapshot_orders_newest_longest_access_first() {
    let (platform, store) = setup(EngineConfig::default());
    for name in ["first", "second", "third"] {
        platform.set_size(name, 10);
        cycle(&platform, &store, name, 500);
        platform.advance(Duration::seconds(60));
    }

    let snapshot = store.snapshot();
    let names: Vec<_> = snapshot.entries.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, ["third", "second", "first"]);
    assert!(
        snapshot
            .entries
            .windows(2)
            .all(|pair| pair[0].longest_time >= pair[1].longest_time)
    );
}

#[test]
fn slower_access_moves_a_path_back_to_the_front() {
    let (platform, store) = setup(EngineConfig {
        max_files: 2,
        ..EngineConfig::default()
    });
    for name in ["a", "b", "c"] {
        platform.set_size(name, 10);
    }
    cycle(&platform, &store, "a", 1_000);
    cycle(&platform, &store, "b", 1_000);
    // A slower "a" re-anchors its longest time after "b".
    cycle(&platform, &store, "a", 5_000);
    cycle(&platform, &store, "c", 1_000);

    let snapshot = store.snapshot();
    let names: Vec<_> = snapshot.entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["c", "a"]);
    assert!(store.record(Path::new("b")).is_none());
}

#[test]
fn eviction_never_touches_statistics() {
    let (platform, store) = setup(EngineConfig {
        max_files: 1,
        ..EngineConfig::default()
    });
    for name in ["a", "b", "c"] {
        platform.set_size(name, 10);
        cycle(&platform, &store, name, 9_000);
    }
    let before = store.stats();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.evicted, 2);
    assert_eq!(store.stats(), before);
    assert_eq!(snapshot.stats.tape_count(), 3);
}

#[test]
fn threshold_override_changes_verdicts() {
    let (platform, store) = setup(EngineConfig {
        threshold_seconds: 1.0,
        ..EngineConfig::default()
    });
    platform.set_size("a", 10);
    let outcome = cycle(&platform, &store, "a", 2_000);
    assert!(!outcome.completed().unwrap().from_cache);
}

// ══════════════════════════════════════════════════════════════════
// Section 3: Properties
// ══════════════════════════════════════════════════════════════════

fn arb_cycles() -> impl Strategy<Value = Vec<(usize, i64)>> {
    prop::collection::vec((0usize..6, 0i64..20_000), 1..60)
}

proptest! {
    #[test]
    fn longest_is_max_elapsed_and_average_is_mean(cycles in arb_cycles()) {
        let (platform, store) = setup(EngineConfig::default());
        let mut max_by_path: HashMap<PathBuf, f64> = HashMap::new();
        let mut samples = Vec::new();

        for (idx, elapsed_ms) in &cycles {
            let name = format!("/data/f{idx}");
            platform.set_size(name.clone(), 4_096);
            cycle(&platform, &store, &name, *elapsed_ms);
            #[allow(clippy::cast_precision_loss)]
            let secs = *elapsed_ms as f64 / 1_000.0;
            samples.push(secs);
            let entry = max_by_path.entry(PathBuf::from(&name)).or_insert(0.0);
            *entry = entry.max(secs);
        }

        for (path, expected) in &max_by_path {
            let record = store.record(path).unwrap();
            prop_assert!((record.longest_duration - expected).abs() < 1e-6);
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let stats = store.stats();
        prop_assert_eq!(stats.total_count(), samples.len() as u64);
        prop_assert!((stats.total_average() - mean).abs() < 1e-6);
        prop_assert!(stats.tape_count() <= stats.total_count());
    }

    #[test]
    fn snapshot_respects_cap(cycles in arb_cycles(), max_files in 1usize..5) {
        let (platform, store) = setup(EngineConfig { max_files, ..EngineConfig::default() });
        for (idx, elapsed_ms) in &cycles {
            let name = format!("/data/f{idx}");
            platform.set_size(name.clone(), 1);
            cycle(&platform, &store, &name, *elapsed_ms);
        }

        let snapshot = store.snapshot();
        prop_assert!(snapshot.entries.len() <= max_files);
        prop_assert!(store.len() <= max_files);

        let mut names: Vec<_> = snapshot.entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names.dedup();
        prop_assert_eq!(names.len(), snapshot.entries.len());
    }

    #[test]
    fn stray_closes_never_create_records(names in prop::collection::vec("[a-z]{1,8}", 1..20)) {
        let (platform, store) = setup(EngineConfig::default());
        for name in &names {
            platform.set_size(name.clone(), 1);
            store.close(Path::new(name));
        }
        prop_assert!(store.is_empty());
        prop_assert_eq!(store.stats().total_count(), 0);
    }
}
