//! Prefetch order and requests

use crate::types::{Axis, VolumeShape};

/// Offsets around the current slice, nearest first, alternating direction:
/// `+1, -1, +2, -2, ..., +range, -range`.
pub fn interleaved_offsets(range: usize) -> Vec<i64> {
    (1..=range as i64).flat_map(|step| [step, -step]).collect()
}

/// Slices to prefetch: `reference_index + offset` for each offset, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchRequest {
    pub axis: Axis,
    pub reference_index: usize,
    pub offsets: Vec<i64>,
}

impl PrefetchRequest {
    pub fn new(axis: Axis, reference_index: usize, offsets: Vec<i64>) -> Self {
        Self {
            axis,
            reference_index,
            offsets,
        }
    }

    /// Request the `range` nearest neighbors on each side of `reference_index`
    pub fn around(axis: Axis, reference_index: usize, range: usize) -> Self {
        Self::new(axis, reference_index, interleaved_offsets(range))
    }

    /// Target index for `offset`, or `None` if it falls outside the volume
    pub fn target(&self, offset: i64, shape: &VolumeShape) -> Option<usize> {
        let target = i64::try_from(self.reference_index)
            .ok()?
            .checked_add(offset)?;
        shape
            .contains_index(self.axis, target)
            .then_some(target as usize)
    }

    /// All valid targets in offset order
    pub fn targets(&self, shape: &VolumeShape) -> Vec<usize> {
        self.offsets
            .iter()
            .filter_map(|&offset| self.target(offset, shape))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_order() {
        assert_eq!(interleaved_offsets(3), vec![1, -1, 2, -2, 3, -3]);
        assert_eq!(interleaved_offsets(1), vec![1, -1]);
        assert!(interleaved_offsets(0).is_empty());
    }

    #[test]
    fn test_targets_filtered_to_volume() {
        let shape = VolumeShape::new(10, 4, 4);

        let middle = PrefetchRequest::around(Axis::Depth, 5, 3);
        assert_eq!(middle.targets(&shape), vec![6, 4, 7, 3, 8, 2]);

        let start = PrefetchRequest::around(Axis::Depth, 0, 3);
        assert_eq!(start.targets(&shape), vec![1, 2, 3]);

        let end = PrefetchRequest::around(Axis::Height, 3, 2);
        assert_eq!(end.targets(&shape), vec![2, 1]);
    }

    #[test]
    fn test_supplied_order_is_kept() {
        let shape = VolumeShape::new(10, 10, 10);
        let request = PrefetchRequest::new(Axis::Width, 5, vec![-3, 4, 0, 1]);
        assert_eq!(request.targets(&shape), vec![2, 9, 5, 6]);
    }

    #[test]
    fn test_empty_axis() {
        let shape = VolumeShape::new(0, 4, 4);
        let request = PrefetchRequest::around(Axis::Depth, 0, 2);
        assert!(request.targets(&shape).is_empty());
    }
}
