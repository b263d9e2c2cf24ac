use chainflow::testing::*;
use chainflow::*;
use std::time::Duration;

#[test]
fn fresh_stream_has_zeroed_stats() {
    let nums = from_vec(vec![1, 2, 3]);
    assert_eq!(nums.stats().snapshot(), StatsSnapshot::default());
}

#[test]
fn derived_handles_share_counters() -> anyhow::Result<()> {
    let base = from_vec(vec![1, 2, 3, 4]);
    let par = base
        .parallel(ParallelConfig::new().chunk_size(2).num_workers(2))?
        .map(|x: &i32| x + 1);

    par.collect()?;
    assert!(base.stats().shares_with(par.stats()));
    assert_eq!(base.stats().processed_items(), 4);

    let unrelated = from_vec(vec![1]);
    assert!(!unrelated.stats().shares_with(base.stats()));
    Ok(())
}

#[test]
fn execution_time_grows_with_each_run() -> anyhow::Result<()> {
    let slow = from_vec(vec![1, 2]).map(|x: &i32| {
        std::thread::sleep(Duration::from_millis(5));
        *x
    });

    slow.collect()?;
    let first = slow.stats().execution_time();
    assert!(first >= Duration::from_millis(10));

    // Cache hits do not execute anything.
    slow.collect()?;
    assert_eq!(slow.stats().execution_time(), first);
    Ok(())
}

#[test]
fn counters_survive_failures_and_successes() -> anyhow::Result<()> {
    let config = ParallelConfig::new()
        .chunk_size(2)
        .num_workers(2)
        .retry_count(0)
        .retry_delay(Duration::ZERO);
    let base = from_vec(vec![1, 2, 3, 4, 5, 6]).parallel(config)?;

    base.map(|x: &i32| x * 2).collect()?;
    let _ = base
        .try_map(|x: &i32| fail_when(*x, |v| *v > 4, "too big"))
        .collect();

    let s = base.stats().snapshot();
    assert!(s.processed_items >= 6);
    assert_eq!(s.failed_items, 2);
    assert_eq!(s.error_count, 1);
    Ok(())
}

#[cfg(feature = "metrics")]
#[test]
fn stats_export_as_json() -> anyhow::Result<()> {
    let squares = from_vec(vec![1, 2, 3])
        .parallel(ParallelConfig::new().chunk_size(1).num_workers(3))?
        .map(|x: &i32| x * x);
    squares.collect()?;

    let json = squares.stats().to_json();
    assert_eq!(json["processed_items"], 3);
    assert_eq!(json["failed_items"], 0);
    assert_eq!(json["error_count"], 0);
    assert!(json["execution_time_ms"].is_u64());
    Ok(())
}

#[cfg(feature = "metrics")]
#[test]
fn stats_saved_to_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stats.json");

    let nums = from_vec(vec![1, 2, 3]).parallel(ParallelConfig::new())?.map(|x: &i32| *x);
    nums.collect()?;
    nums.stats().save_to_file(&path)?;

    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(saved, nums.stats().to_json());
    Ok(())
}

#[test]
fn snapshot_round_trips_through_serde() -> anyhow::Result<()> {
    let squares = from_vec(vec![2, 3])
        .parallel(ParallelConfig::new())?
        .map(|x: &i32| x * x);
    squares.collect()?;

    let snap = squares.stats().snapshot();
    let back: StatsSnapshot = serde_json::from_str(&serde_json::to_string(&snap)?)?;
    assert_eq!(back, snap);
    Ok(())
}
