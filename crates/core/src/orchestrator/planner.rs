//! Batch planning.

use std::ops::Range;

/// Partitions a request list into ordered batches.
///
/// Planning is pure: the same inputs always produce the same batches, and the
/// concatenation of the batches is the original list.
pub struct BatchPlanner;

impl BatchPlanner {
    /// Split `items` into consecutive slices of at most `batch_size` elements.
    ///
    /// Only the last slice may be shorter. A `batch_size` of zero is treated as one.
    pub fn plan<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
        items.chunks(batch_size.max(1)).collect()
    }

    /// Same partition as [`BatchPlanner::plan`], expressed as index ranges into `items`.
    pub fn plan_ranges(len: usize, batch_size: usize) -> Vec<Range<usize>> {
        let size = batch_size.max(1);
        (0..len)
            .step_by(size)
            .map(|start| start..(start + size).min(len))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_ten_by_four() {
        let items: Vec<u32> = (0..10).collect();
        let batches = BatchPlanner::plan(&items, 4);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_plan_is_partition() {
        for len in 0..25usize {
            let items: Vec<usize> = (0..len).collect();
            for batch_size in 1..8 {
                let batches = BatchPlanner::plan(&items, batch_size);

                let flattened: Vec<usize> = batches.iter().flat_map(|b| b.iter().copied()).collect();
                assert_eq!(flattened, items, "len={} batch_size={}", len, batch_size);

                for (i, batch) in batches.iter().enumerate() {
                    assert!(!batch.is_empty());
                    assert!(batch.len() <= batch_size);
                    if i + 1 < batches.len() {
                        assert_eq!(batch.len(), batch_size);
                    }
                }
            }
        }
    }

    #[test]
    fn test_plan_empty() {
        let items: Vec<u32> = Vec::new();
        assert!(BatchPlanner::plan(&items, 4).is_empty());
        assert!(BatchPlanner::plan_ranges(0, 4).is_empty());
    }

    #[test]
    fn test_plan_zero_batch_size() {
        let items = [1, 2, 3];
        assert_eq!(BatchPlanner::plan(&items, 0).len(), 3);
    }

    #[test]
    fn test_plan_ranges_match_slices() {
        let items: Vec<u32> = (0..11).collect();
        let ranges = BatchPlanner::plan_ranges(items.len(), 4);
        assert_eq!(ranges, vec![0..4, 4..8, 8..11]);

        let batches = BatchPlanner::plan(&items, 4);
        for (range, batch) in ranges.iter().zip(batches) {
            assert_eq!(&items[range.clone()], batch);
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let items: Vec<u32> = (0..9).collect();
        assert_eq!(BatchPlanner::plan(&items, 2), BatchPlanner::plan(&items, 2));
    }
}
