use chainflow::*;
use proptest::prelude::*;
use std::time::Duration;

fn config(chunk_size: usize, num_workers: usize) -> ParallelConfig {
    ParallelConfig::new()
        .chunk_size(chunk_size)
        .num_workers(num_workers)
        .retry_count(0)
        .retry_delay(Duration::ZERO)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn parallel_map_preserves_order(
        data in prop::collection::vec(any::<i32>(), 0..300),
        chunk_size in 1_usize..40,
        num_workers in 1_usize..6,
    ) {
        let expected: Vec<i64> = data.iter().map(|x| i64::from(*x) * 3 - 1).collect();
        let out = from_vec(data)
            .parallel(config(chunk_size, num_workers))
            .expect("valid config")
            .map(|x: &i32| i64::from(*x) * 3 - 1)
            .collect()
            .expect("infallible map");
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn parallel_filter_matches_sequential_filter(
        data in prop::collection::vec(0_u32..1_000, 0..300),
        chunk_size in 1_usize..40,
        num_workers in 1_usize..6,
    ) {
        let nums = from_vec(data);
        let sequential = nums.filter(|x: &u32| x % 3 == 0).collect().expect("sequential filter");
        let parallel = nums
            .parallel(config(chunk_size, num_workers))
            .expect("valid config")
            .filter(|x: &u32| x % 3 == 0)
            .collect()
            .expect("parallel filter");
        prop_assert_eq!(parallel, sequential);
    }

    #[test]
    fn chunks_concatenate_to_the_input(
        data in prop::collection::vec(any::<u8>(), 0..500),
        size in 1_usize..64,
    ) {
        let chunker = Chunker::new(size).expect("non-zero size");
        let chunks = chunker.split(data.clone());

        prop_assert_eq!(chunks.len(), chunker.chunk_count(data.len()));
        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index, i);
            prop_assert!(!chunk.is_empty() && chunk.len() <= size);
        }
        let rebuilt: Vec<u8> = chunks.into_iter().flat_map(|c| c.items).collect();
        prop_assert_eq!(rebuilt, data);
    }

    #[test]
    fn group_by_partitions_the_input(
        data in prop::collection::vec(0_u16..50, 0..200),
        modulus in 1_u16..10,
    ) {
        let groups = from_vec(data.clone())
            .group_by(move |x: &u16| x % modulus)
            .collect()
            .expect("group_by");
        chainflow::testing::assert_grouping_of(&groups, &data, |x| x % modulus);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn parallel_sum_matches_sequential_sum(
        data in prop::collection::vec(-1_000_i64..1_000, 0..400),
        chunk_size in 1_usize..50,
        num_workers in 1_usize..5,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("runtime");
        let nums = from_vec(data.clone());
        let parallel = runtime
            .block_on(
                nums.parallel(config(chunk_size, num_workers))
                    .expect("valid config")
                    .reduce_async(|a, b| a + b, Some(0)),
            )
            .expect("parallel reduce");
        prop_assert_eq!(parallel, data.iter().sum::<i64>());
    }
}
