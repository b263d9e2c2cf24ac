use chainflow::testing::*;
use chainflow::*;
use std::time::Duration;

/// No retries and no delay, so failure tests stay fast.
fn strict(chunk_size: usize, num_workers: usize) -> ParallelConfig {
    ParallelConfig::new()
        .chunk_size(chunk_size)
        .num_workers(num_workers)
        .retry_count(0)
        .retry_delay(Duration::ZERO)
}

#[test]
fn parallel_map_squares_in_order() -> anyhow::Result<()> {
    let squares = from_vec(vec![1, 2, 3, 4, 5, 6])
        .parallel(strict(2, 3))?
        .map(|x: &i32| x * x);

    assert_collections_equal(&squares.collect()?, &[1, 4, 9, 16, 25, 36]);
    assert_stats(squares.stats(), 6, 0, 0);
    Ok(())
}

#[test]
fn parallel_filter_counts_kept_elements() -> anyhow::Result<()> {
    let long = from_vec(vec!["a".to_string(), "bb".to_string(), "ccc".to_string()])
        .parallel(strict(1, 2))?
        .filter(|s: &String| s.len() > 1);

    assert_collections_equal(&long.collect()?, &["bb".to_string(), "ccc".to_string()]);
    assert_eq!(long.stats().processed_items(), 2);
    Ok(())
}

#[test]
fn more_workers_than_chunks() -> anyhow::Result<()> {
    let out = from_vec(vec![10_u64, 20, 30])
        .parallel(strict(100, 8))?
        .map(|x: &u64| x / 10)
        .collect()?;

    assert_eq!(out, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn empty_input_yields_empty_output() -> anyhow::Result<()> {
    let out = from_vec(Vec::<i32>::new())
        .parallel(strict(4, 2))?
        .map(|x: &i32| x + 1)
        .collect()?;

    assert!(out.is_empty());
    Ok(())
}

#[test]
fn one_failing_chunk_fails_the_whole_stage() -> anyhow::Result<()> {
    let mapped = from_vec(vec![1, 2, 3, 4, 5, 6])
        .parallel(strict(2, 3))?
        .try_map(|x: &i32| fail_when(*x, |v| *v == 3, "cannot map 3"));

    let failure = assert_parallel_error(mapped.collect());
    match failure {
        ParallelFailure::Chunk { index, len, cause } => {
            assert_eq!((index, len), (1, 2));
            assert_eq!(cause.to_string(), "cannot map 3");
        }
        other => panic!("expected a chunk failure, got {other:?}"),
    }

    let s = mapped.stats().snapshot();
    assert_eq!(s.error_count, 1);
    assert_eq!(s.failed_items, 2);
    assert!(!mapped.is_cached());
    Ok(())
}

#[test]
fn retries_recover_a_flaky_chunk() -> anyhow::Result<()> {
    let flaky = Flaky::failing_times(2);
    let f = flaky.clone();
    let config = strict(10, 1).retry_count(2);

    let out = from_vec(vec![1, 2, 3])
        .parallel(config)?
        .try_map(move |x: &i32| f.call(*x))
        .collect()?;

    assert_collections_equal(&out, &[1, 2, 3]);
    // Two failed attempts on the first element, then one clean pass.
    assert_eq!(flaky.calls(), 5);
    Ok(())
}

#[test]
fn retries_run_out() -> anyhow::Result<()> {
    let flaky = Flaky::failing_times(usize::MAX);
    let f = flaky.clone();
    let mapped = from_vec(vec![1, 2, 3])
        .parallel(strict(10, 1).retry_count(1))?
        .try_map(move |x: &i32| f.call(*x));

    let failure = assert_parallel_error(mapped.collect());
    assert!(matches!(failure, ParallelFailure::Chunk { index: 0, len: 3, .. }));
    assert_eq!(flaky.calls(), 2);
    assert_stats(mapped.stats(), 0, 3, 1);
    Ok(())
}

#[test]
fn slow_stage_times_out() -> anyhow::Result<()> {
    let config = strict(1, 1).timeout(Duration::from_millis(50));
    let slow = from_vec(vec![1, 2])
        .parallel(config)?
        .map(|x: &i32| {
            std::thread::sleep(Duration::from_millis(300));
            *x
        });

    let err = slow.collect().unwrap_err();
    assert!(err.is_timeout());
    assert!(err.is_parallel());
    assert_stats(slow.stats(), 0, 0, 1);
    Ok(())
}

#[test]
fn timed_out_chunk_stops_retrying() -> anyhow::Result<()> {
    let calls = CallCounter::new();
    let c = calls.clone();
    let config = strict(1, 1)
        .timeout(Duration::from_millis(50))
        .retry_count(2)
        .retry_delay(Duration::from_millis(100));
    let failing = from_vec(vec![1])
        .parallel(config)?
        .try_map(move |x: &i32| {
            c.hit();
            std::thread::sleep(Duration::from_millis(150));
            fail_when(*x, |_| true, "still broken")
        });

    assert!(failing.collect().unwrap_err().is_timeout());
    // Long enough for both retries, had they been attempted.
    std::thread::sleep(Duration::from_millis(700));
    assert_eq!(calls.count(), 1);
    assert_stats(failing.stats(), 0, 0, 1);
    Ok(())
}

#[test]
fn output_finished_after_a_timeout_is_not_counted() -> anyhow::Result<()> {
    let config = strict(1, 1).timeout(Duration::from_millis(50));
    let late = from_vec(vec![1, 2, 3])
        .parallel(config)?
        .map(|x: &i32| {
            std::thread::sleep(Duration::from_millis(150));
            *x
        });

    assert!(late.collect().unwrap_err().is_timeout());
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(late.stats().processed_items(), 0);
    Ok(())
}

#[test]
fn sibling_chunks_do_not_mask_the_failing_chunk() -> anyhow::Result<()> {
    for _ in 0..20 {
        let mapped = from_vec((0..40).collect::<Vec<i32>>())
            .parallel(strict(2, 4))?
            .try_map(|x: &i32| fail_when(*x, |v| *v == 0, "first element"));

        let failure = assert_parallel_error(mapped.collect());
        assert!(matches!(failure, ParallelFailure::Chunk { index: 0, len: 2, .. }), "{failure:?}");
    }
    Ok(())
}

#[test]
fn worker_panic_becomes_an_error() -> anyhow::Result<()> {
    let mapped = from_vec(vec![1, 2, 3, 4])
        .parallel(strict(2, 2))?
        .map(|x: &i32| {
            assert!(*x != 4, "bad element {x}");
            *x
        });

    match assert_parallel_error(mapped.collect()) {
        ParallelFailure::Panicked { index, len, message } => {
            assert_eq!((index, len), (1, 2));
            assert!(message.contains("bad element 4"), "{message}");
        }
        other => panic!("expected a caught panic, got {other:?}"),
    }
    assert_eq!(mapped.stats().failed_items(), 2);
    Ok(())
}

#[test]
fn invalid_config_is_rejected_when_switching() {
    let nums = from_vec(vec![1, 2, 3]);

    for (config, field) in [
        (ParallelConfig::new().num_workers(0), "num_workers"),
        (ParallelConfig::new().chunk_size(0), "chunk_size"),
        (ParallelConfig::new().timeout(Duration::ZERO), "timeout"),
    ] {
        match nums.parallel(config) {
            Err(StreamError::InvalidConfig { field: f, .. }) => assert_eq!(f, field),
            Err(other) => panic!("expected invalid config for {field}, got {other}"),
            Ok(_) => panic!("expected invalid config for {field}"),
        }
    }
}

#[test]
fn steps_before_the_switch_stay_sequential() -> anyhow::Result<()> {
    let seq = from_vec(vec![1, 2, 3, 4]).map(|x: &i32| x + 1);
    let par = seq.parallel(strict(2, 2))?.map(|x: &i32| x * 10);

    assert_collections_equal(&par.collect()?, &[20, 30, 40, 50]);
    // Only the parallel stage counts processed items.
    assert_eq!(par.stats().processed_items(), 4);

    let broken = from_vec(vec![1, 2, 3])
        .try_map(|x: &i32| fail_when(*x, |v| *v == 2, "sequential failure"))
        .parallel(strict(1, 2))?
        .map(|x: &i32| x * 10);
    assert_stage_error(broken.collect(), 1, StageKind::Map);
    Ok(())
}

#[test]
fn parallel_stages_chain() -> anyhow::Result<()> {
    let out = from_vec((1..=20).collect::<Vec<u32>>())
        .parallel(strict(3, 4))?
        .filter(|x: &u32| x % 2 == 0)
        .map(|x: &u32| format!("n{x}"))
        .collect()?;

    let expected: Vec<String> = (1..=20).filter(|x| x % 2 == 0).map(|x| format!("n{x}")).collect();
    assert_collections_equal(&out, &expected);
    Ok(())
}

#[tokio::test]
async fn collect_async_on_a_parallel_stream() -> anyhow::Result<()> {
    let stream = from_vec((0..100).collect::<Vec<i64>>())
        .parallel(strict(7, 4))?
        .map(|x: &i64| -x);

    let out = stream.collect_async().await?;
    assert_eq!(out, (0..100).map(|x: i64| -x).collect::<Vec<_>>());
    assert_stats(stream.stats(), 100, 0, 0);
    Ok(())
}
