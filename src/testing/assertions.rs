//! Assertions for collected stream output, stats and errors.

use crate::error::{ParallelFailure, StreamError};
use crate::node::StageKind;
use crate::stats::ExecutionStats;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Assert that two collections are equal in order and content.
///
/// # Panics
///
/// Panics if the collections differ in length or content.
///
/// # Example
///
/// ```
/// use chainflow::testing::assert_collections_equal;
///
/// assert_collections_equal(&[1, 2, 3], &[1, 2, 3]);
/// ```
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    if let Some(i) = actual.iter().zip(expected).position(|(a, e)| a != e) {
        panic!(
            "Collection mismatch at index {i}:\n  Expected: {:?}\n  Actual: {:?}\n  Full expected: {expected:?}\n  Full actual: {actual:?}",
            expected[i], actual[i]
        );
    }
}

/// Assert that two collections hold the same elements with the same
/// multiplicities, ignoring order.
///
/// # Panics
///
/// Panics if any element occurs a different number of times.
///
/// # Example
///
/// ```
/// use chainflow::testing::assert_collections_unordered_equal;
///
/// assert_collections_unordered_equal(&[3, 1, 2, 1], &[1, 1, 2, 3]);
/// ```
pub fn assert_collections_unordered_equal<T: Debug + Eq + Hash>(actual: &[T], expected: &[T]) {
    let actual_counts = multiplicities(actual);
    let expected_counts = multiplicities(expected);
    if actual_counts != expected_counts {
        let missing = short_of(&actual_counts, &expected_counts);
        let extra = short_of(&expected_counts, &actual_counts);
        panic!(
            "Collection content mismatch:\n  Missing elements: {missing:?}\n  Extra elements: {extra:?}\n  Expected: {expected:?}\n  Actual: {actual:?}"
        );
    }
}

fn multiplicities<T: Eq + Hash>(items: &[T]) -> HashMap<&T, usize> {
    let mut counts = HashMap::new();
    for item in items {
        *counts.entry(item).or_default() += 1;
    }
    counts
}

/// Elements `want` holds more often than `have`.
fn short_of<'a, T: Eq + Hash>(
    have: &HashMap<&'a T, usize>,
    want: &HashMap<&'a T, usize>,
) -> Vec<&'a T> {
    want.iter()
        .filter(|&(item, n)| have.get(item).copied().unwrap_or(0) < *n)
        .map(|(item, _)| *item)
        .collect()
}

/// Assert that `groups` is a valid grouping of `input` by `key`.
///
/// Checks that keys are strictly ascending, that every member carries its
/// group's key, and that concatenating the groups of each key yields exactly
/// the input elements with that key, in input order.
///
/// # Panics
///
/// Panics on the first violation.
///
/// # Example
///
/// ```
/// use chainflow::testing::assert_grouping_of;
///
/// let input = vec![3, 1, 4, 1, 5];
/// let groups = vec![(false, vec![4]), (true, vec![3, 1, 1, 5])];
/// assert_grouping_of(&groups, &input, |x| x % 2 == 1);
/// ```
pub fn assert_grouping_of<K, T>(groups: &[(K, Vec<T>)], input: &[T], key: impl Fn(&T) -> K)
where
    K: Debug + Ord,
    T: Debug + PartialEq,
{
    for pair in groups.windows(2) {
        assert!(
            pair[0].0 < pair[1].0,
            "Group keys not strictly ascending: {:?} then {:?}",
            pair[0].0,
            pair[1].0
        );
    }

    let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
    assert_eq!(
        total,
        input.len(),
        "Grouping has {total} members but the input has {} elements",
        input.len()
    );

    for (k, members) in groups {
        let expected: Vec<&T> = input.iter().filter(|&t| key(t) == *k).collect();
        let actual: Vec<&T> = members.iter().collect();
        assert_eq!(
            actual, expected,
            "Group {k:?} does not match the input elements with that key, in input order"
        );
    }
}

/// Assert that every element satisfies `predicate`.
///
/// # Panics
///
/// Panics on the first element that does not.
pub fn assert_all<T: Debug>(collection: &[T], predicate: impl Fn(&T) -> bool) {
    if let Some(i) = collection.iter().position(|item| !predicate(item)) {
        panic!(
            "Predicate failed for element at index {i}:\n  Element: {:?}\n  Collection: {collection:?}",
            collection[i]
        );
    }
}

/// Assert the counters of `stats`, ignoring execution time.
///
/// # Panics
///
/// Panics if any of the three counters differs.
pub fn assert_stats(stats: &ExecutionStats, processed: u64, failed: u64, errors: u64) {
    let s = stats.snapshot();
    assert_eq!(
        (s.processed_items, s.failed_items, s.error_count),
        (processed, failed, errors),
        "Stats mismatch (processed, failed, errors):\n  Expected: ({processed}, {failed}, {errors})\n  Actual: {s:?}"
    );
}

/// Assert that `result` failed in a sequential stage of the given kind and
/// position, and return the underlying cause for further checks.
///
/// # Panics
///
/// Panics if `result` is `Ok` or failed any other way.
pub fn assert_stage_error<T: Debug>(
    result: crate::Result<T>,
    index: usize,
    kind: StageKind,
) -> anyhow::Error {
    match result {
        Err(StreamError::Stage { stage, cause }) => {
            assert_eq!(
                (stage.index, stage.kind),
                (index, kind),
                "Stage error raised by the wrong stage: {stage}"
            );
            cause
        }
        other => panic!("Expected a failure of stage #{index} {kind}, got {other:?}"),
    }
}

/// Assert that `result` failed in a parallel stage, and return the failure.
///
/// # Panics
///
/// Panics if `result` is `Ok` or failed any other way.
pub fn assert_parallel_error<T: Debug>(result: crate::Result<T>) -> ParallelFailure {
    match result {
        Err(StreamError::Parallel { stage, cause }) => {
            assert!(stage.parallel, "Parallel failure reported for sequential stage {stage}");
            cause
        }
        other => panic!("Expected a parallel stage failure, got {other:?}"),
    }
}
