use px_common::{ProcessingType, UNBOUNDED};

/// Fan-out of a chain built from lightweight components
pub const BASE_CHAIN_PARALLELISM: usize = 1;

/// How many events a component's chain may process at once on one
/// subscriber path.
pub fn chain_parallelism(
    processing_type: ProcessingType,
    max_concurrency: usize,
    pool_parallelism: usize,
    subscriber_count: usize,
    is_blocking: bool,
) -> usize {
    if processing_type == ProcessingType::Light {
        return BASE_CHAIN_PARALLELISM;
    }
    if max_concurrency == 1 {
        return 1;
    }
    if max_concurrency == UNBOUNDED {
        return if is_blocking { UNBOUNDED } else { 1 };
    }

    let divisor = pool_parallelism
        .max(1)
        .saturating_mul(subscriber_count.max(1));
    (max_concurrency / divisor).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_is_always_base() {
        assert_eq!(chain_parallelism(ProcessingType::Light, 100, 1, 1, true), 1);
        assert_eq!(chain_parallelism(ProcessingType::Light, UNBOUNDED, 1, 1, true), 1);
    }

    #[test]
    fn test_single_slot_is_sequential() {
        assert_eq!(chain_parallelism(ProcessingType::Blocking, 1, 1, 1, true), 1);
        assert_eq!(chain_parallelism(ProcessingType::CpuIntensive, 1, 8, 4, true), 1);
    }

    #[test]
    fn test_unbounded_depends_on_blocking_flag() {
        assert_eq!(
            chain_parallelism(ProcessingType::Blocking, UNBOUNDED, 1, 1, true),
            UNBOUNDED
        );
        assert_eq!(chain_parallelism(ProcessingType::Io, UNBOUNDED, 1, 1, false), 1);
        assert_eq!(chain_parallelism(ProcessingType::LightAsync, UNBOUNDED, 2, 2, false), 1);
    }

    #[test]
    fn test_bounded_split_across_subscribers() {
        assert_eq!(chain_parallelism(ProcessingType::Blocking, 10, 2, 1, true), 5);
        assert_eq!(chain_parallelism(ProcessingType::Blocking, 10, 4, 1, true), 2);
        assert_eq!(chain_parallelism(ProcessingType::Io, 10, 2, 2, true), 2);
        assert_eq!(chain_parallelism(ProcessingType::CpuIntensive, 3, 4, 2, true), 1);
    }

    #[test]
    fn test_zero_divisors_count_as_one() {
        assert_eq!(chain_parallelism(ProcessingType::Blocking, 10, 0, 0, true), 10);
    }
}
