//! Reusable scratch memory for connected-component labeling.
//!
//! The segmenter needs a label map the size of the processed band, a
//! union-find forest and one accumulator per provisional label. All three are
//! sized once at startup and reused for every frame; a lease hands out zeroed
//! views for exactly one segmentation call and the borrow ends the lease on
//! every exit path.

use crate::core_modules::union_find::UnionFind;
use log::{debug, warn};

/// Running sums for one provisional label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelAccumulator {
    pub sum_x: u64,
    pub sum_y: u64,
    pub pixel_count: u64,
    pub brightness_sum: u64,
}

impl LabelAccumulator {
    pub fn add(&mut self, x: u32, y: u32, value: u8) {
        self.sum_x += x as u64;
        self.sum_y += y as u64;
        self.pixel_count += 1;
        self.brightness_sum += value as u64;
    }
}

/// Pre-sized label map, union-find forest and accumulators.
#[derive(Debug)]
pub struct LabelWorkspace {
    labels: Vec<u16>,
    forest: UnionFind,
    accumulators: Vec<LabelAccumulator>,
    /// Largest label map the workspace may ever hold. `None` is unbounded.
    pixel_limit: Option<usize>,
}

/// One segmentation call's view of the workspace.
pub struct WorkspaceLease<'a> {
    pub labels: &'a mut [u16],
    pub forest: &'a mut UnionFind,
    pub accumulators: &'a mut [LabelAccumulator],
}

impl LabelWorkspace {
    /// Reserves room for frames up to `max_pixels` and `max_labels` provisional labels.
    pub fn new(max_pixels: usize, max_labels: usize) -> Self {
        let forest = UnionFind::with_capacity(max_labels);
        let label_count = forest.capacity();
        Self {
            labels: Vec::with_capacity(max_pixels),
            forest,
            accumulators: vec![LabelAccumulator::default(); label_count],
            pixel_limit: None,
        }
    }

    /// Refuses leases larger than `limit` pixels instead of growing past it.
    pub fn with_pixel_limit(mut self, limit: Option<usize>) -> Self {
        self.pixel_limit = limit;
        self
    }

    /// Number of provisional labels, including background label 0.
    pub fn label_capacity(&self) -> usize {
        self.forest.capacity()
    }

    pub fn pixel_capacity(&self) -> usize {
        self.labels.capacity()
    }

    /// Hands out zeroed buffers for a band of `pixels` pixels.
    ///
    /// Returns `None` when the label map would exceed the pixel limit or cannot
    /// grow to that size; the caller drops the frame.
    pub fn lease(&mut self, pixels: usize) -> Option<WorkspaceLease<'_>> {
        if let Some(limit) = self.pixel_limit.filter(|&limit| pixels > limit) {
            warn!("label map of {pixels} pixels exceeds the {limit} pixel limit");
            return None;
        }
        self.labels.clear();
        if self.labels.capacity() < pixels {
            debug!(
                "growing label map from {} to {} pixels",
                self.labels.capacity(),
                pixels
            );
            if let Err(err) = self.labels.try_reserve_exact(pixels) {
                warn!("label map allocation for {pixels} pixels failed: {err}");
                return None;
            }
        }
        self.labels.resize(pixels, 0);
        self.forest.reset();
        self.accumulators.fill(LabelAccumulator::default());

        Some(WorkspaceLease {
            labels: &mut self.labels,
            forest: &mut self.forest,
            accumulators: &mut self.accumulators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_hands_out_clean_buffers() {
        let mut workspace = LabelWorkspace::new(64, 8);
        assert_eq!(workspace.label_capacity(), 8);
        {
            let lease = workspace.lease(64).unwrap();
            lease.labels.fill(3);
            lease.forest.union(2, 5);
            lease.accumulators[2].add(1, 1, 255);
        }
        let lease = workspace.lease(32).unwrap();
        assert_eq!(lease.labels.len(), 32);
        assert!(lease.labels.iter().all(|&l| l == 0));
        assert_eq!(lease.forest.find(5), 5);
        assert!(lease.accumulators.iter().all(|a| *a == LabelAccumulator::default()));
    }

    #[test]
    fn lease_grows_past_startup_size() {
        let mut workspace = LabelWorkspace::new(16, 4);
        assert_eq!(workspace.lease(100).map(|l| l.labels.len()), Some(100));
        assert!(workspace.pixel_capacity() >= 100);
    }

    #[test]
    fn impossible_allocation_yields_none() {
        let mut workspace = LabelWorkspace::new(16, 4);
        assert!(workspace.lease(usize::MAX / 2).is_none());
        // The workspace is still usable afterwards.
        assert!(workspace.lease(16).is_some());
    }

    #[test]
    fn pixel_limit_caps_growth() {
        let mut workspace = LabelWorkspace::new(16, 4).with_pixel_limit(Some(64));
        assert!(workspace.lease(64).is_some());
        assert!(workspace.lease(65).is_none());
        assert!(workspace.lease(64).is_some());
    }
}
