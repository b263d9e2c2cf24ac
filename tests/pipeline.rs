//! Tests for the shared node graph and the runner.

use chainflow::testing::*;
use chainflow::*;

#[test]
fn every_builder_call_adds_one_node() {
    let base = from_vec(vec![1, 2, 3]);
    assert_eq!(base.pipeline().node_count(), 1);

    let mapped = base.map(|x: &i32| x * 2);
    let _filtered = mapped.filter(|x: &i32| *x > 2);
    let _branch = base.inspect(|_| {});

    assert_eq!(base.pipeline().node_count(), 4);
    assert_eq!(mapped.pipeline().node_count(), 4);
}

#[test]
fn handles_point_at_distinct_nodes() {
    let base = from_vec(vec![1]);
    let a = base.map(|x: &i32| *x);
    let b = base.map(|x: &i32| *x);

    assert_ne!(a.node_id(), b.node_id());
    assert_ne!(a.node_id(), base.node_id());
    assert!(a.node_id().raw() > base.node_id().raw());
}

#[test]
fn separate_sources_build_separate_graphs() {
    let a = from_vec(vec![1]);
    let _more = a.map(|x: &i32| x + 1);
    let b = from_vec(vec![2]);

    assert_eq!(b.pipeline().node_count(), 1);
    assert_eq!(a.node_id(), b.node_id());
}

#[test]
fn uncached_runner_executes_every_time() -> anyhow::Result<()> {
    let counter = CallCounter::new();
    let c = counter.clone();
    let stream = from_vec(vec![1, 2, 3]).map(move |x: &i32| {
        c.hit();
        *x
    });

    let runner = Runner::uncached();
    let first = runner.run_collect::<i32>(stream.pipeline(), stream.node_id())?;
    let second = runner.run_collect::<i32>(stream.pipeline(), stream.node_id())?;

    assert_eq!(first, second);
    assert_eq!(counter.count(), 6);
    assert!(!stream.is_cached());
    Ok(())
}

#[test]
fn cached_results_are_per_node() -> anyhow::Result<()> {
    let base = from_vec(vec![1, 2, 3]);
    let doubled = base.map(|x: &i32| x * 2);

    doubled.collect()?;
    assert!(doubled.is_cached());
    assert!(!base.is_cached());
    Ok(())
}

#[test]
fn stage_info_formats_position_and_kind() {
    let info = StageInfo {
        index: 3,
        kind: StageKind::GroupBy,
        parallel: false,
    };
    assert_eq!(info.to_string(), "#3 group_by");

    let par = StageInfo {
        index: 2,
        kind: StageKind::Map,
        parallel: true,
    };
    assert_eq!(par.to_string(), "#2 map (parallel)");
}

#[test]
fn exec_mode_reports_parallelism() {
    assert!(!ExecMode::Sequential.is_parallel());
    assert!(ExecMode::Parallel(ParallelConfig::default()).is_parallel());
}
