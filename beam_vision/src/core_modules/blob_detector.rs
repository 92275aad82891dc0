// THEORY:
// The `Segmenter` turns one grayscale frame into a short, size-sorted list of
// light-source candidates. It is a classic two-pass connected-component
// labeling over a thresholded image:
//
// 1.  **Pass 1 (labeling)**: scan row-major. A pixel below the threshold is
//     background. A bright pixel looks at its already-visited neighbors; with
//     none labeled it opens a new provisional label, otherwise it takes the
//     smallest neighbor label and unions the rest into it. The running pixel
//     sum gives the scene brightness for free.
// 2.  **Pass 2 (accumulation)**: every labeled pixel resolves its root and
//     adds its coordinates and value to that root's accumulator.
// 3.  **Filtering**: roots outside the [min, max] size window are noise or
//     washout; centroids hugging the top or bottom rows are sensor-edge
//     artifacts of the orientation correction.
// 4.  **Sort, merge, cap**: largest first; nearby centroids collapse into one
//     blob (multi-die lamps segment into several regions); the list is cut at
//     the configured cap.
//
// Capacity limits saturate instead of failing: regions past the label budget
// become background, blobs past the cap are dropped smallest first, and a
// workspace that cannot grow produces an empty result for that frame.

use crate::config::{Connectivity, DetectorConfig, RoiBand};
use crate::core_modules::blob::{Blob, Centroid, DetectionResult, MAX_BLOBS};
use crate::core_modules::workspace::LabelWorkspace;
use log::{debug, warn};

/// Owns a detector configuration and the scratch workspace it labels into.
#[derive(Debug)]
pub struct Segmenter {
    config: DetectorConfig,
    workspace: LabelWorkspace,
}

impl Segmenter {
    pub fn new(config: DetectorConfig) -> Self {
        let workspace = LabelWorkspace::new(config.workspace_pixels, config.max_labels)
            .with_pixel_limit(config.workspace_pixel_limit);
        Self { config, workspace }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detects bright blobs in a row-major, one-byte-per-pixel frame.
    pub fn segment(&mut self, pixels: &[u8], width: u32, height: u32) -> DetectionResult {
        segment(&self.config, &mut self.workspace, pixels, width, height)
    }
}

/// Detects bright blobs using an explicit workspace.
///
/// Classification and motion fields of the returned blobs are left at their
/// defaults for the tracker to fill in.
pub fn segment(
    config: &DetectorConfig,
    workspace: &mut LabelWorkspace,
    pixels: &[u8],
    width: u32,
    height: u32,
) -> DetectionResult {
    if width == 0 || height == 0 {
        warn!("ignoring empty {width}x{height} frame");
        return DetectionResult::empty(width, height);
    }
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        warn!("ignoring {width}x{height} frame, centroids are limited to {}", u16::MAX);
        return DetectionResult::empty(width, height);
    }
    let frame_len = width as usize * height as usize;
    if pixels.len() < frame_len {
        warn!(
            "frame buffer holds {} bytes, {width}x{height} needs {frame_len}",
            pixels.len()
        );
        return DetectionResult::empty(width, height);
    }

    let (y_start, y_end) = RoiBand::resolve(config.roi, height);
    let w = width as usize;
    let roi_rows = (y_end - y_start) as usize;
    let roi_pixels = w * roi_rows;

    let Some(mut lease) = workspace.lease(roi_pixels) else {
        return DetectionResult::empty(width, height);
    };
    let label_limit = lease.forest.capacity().min(config.max_labels);

    // --- Pass 1: provisional labels ---
    let mut next_label: usize = 1;
    let mut scene_sum: u64 = 0;
    for ry in 0..roi_rows {
        let row_start = (y_start as usize + ry) * w;
        let row = &pixels[row_start..row_start + w];
        for (x, &value) in row.iter().enumerate() {
            scene_sum += value as u64;
            if value < config.brightness_threshold {
                continue;
            }

            let ri = ry * w + x;
            let neighbors = visited_neighbors(lease.labels, ri, x, ry, w, config.connectivity);
            let min_label = neighbors.iter().copied().filter(|&l| l != 0).min();

            match min_label {
                None => {
                    if next_label < label_limit {
                        lease.labels[ri] = next_label as u16;
                        next_label += 1;
                    }
                }
                Some(min_label) => {
                    lease.labels[ri] = min_label;
                    for label in neighbors {
                        if label != 0 && label != min_label {
                            lease.forest.union(min_label, label);
                        }
                    }
                }
            }
        }
    }

    let scene_brightness = if roi_pixels == 0 {
        0
    } else {
        (scene_sum / roi_pixels as u64) as u8
    };

    // --- Pass 2: per-root accumulation ---
    for ry in 0..roi_rows {
        let frame_y = y_start + ry as u32;
        let row_start = frame_y as usize * w;
        for x in 0..w {
            let label = lease.labels[ry * w + x];
            if label == 0 {
                continue;
            }
            let root = lease.forest.find(label);
            lease.accumulators[root as usize].add(x as u32, frame_y, pixels[row_start + x]);
        }
    }

    // --- Filtering ---
    let mut blobs = Vec::new();
    for label in 1..next_label {
        if !lease.forest.is_root(label as u16) {
            continue;
        }
        let acc = &lease.accumulators[label];
        if acc.pixel_count == 0 {
            continue;
        }
        if acc.pixel_count < config.min_blob_pixels as u64
            || acc.pixel_count > config.max_blob_pixels as u64
        {
            continue;
        }

        let cx = acc.sum_x / acc.pixel_count;
        let cy = acc.sum_y / acc.pixel_count;
        let margin = config.edge_margin_rows as u64;
        if cy < margin || cy + margin >= height as u64 {
            continue;
        }

        blobs.push(Blob::new(
            Centroid::new(cx as u16, cy as u16),
            acc.pixel_count as u32,
            acc.brightness_sum.min(u32::MAX as u64) as u32,
        ));
    }

    sort_by_size(&mut blobs);
    if config.merge_blobs {
        merge_nearby(&mut blobs, config.merge_distance);
    }
    blobs.truncate(config.max_blobs.min(MAX_BLOBS));

    debug!(
        "segmented {width}x{height} rows {y_start}..{y_end}: {} labels, {} blobs, brightness {scene_brightness}",
        next_label - 1,
        blobs.len()
    );

    DetectionResult {
        blobs,
        scene_brightness,
        frame_width: width,
        frame_height: height,
    }
}

/// Labels of the neighbors already visited in scan order; 0 where absent.
fn visited_neighbors(
    labels: &[u16],
    ri: usize,
    x: usize,
    ry: usize,
    width: usize,
    connectivity: Connectivity,
) -> [u16; 4] {
    let left = if x > 0 { labels[ri - 1] } else { 0 };
    let above = if ry > 0 { labels[ri - width] } else { 0 };
    match connectivity {
        Connectivity::Four => [left, above, 0, 0],
        Connectivity::Eight => {
            let above_left = if ry > 0 && x > 0 {
                labels[ri - width - 1]
            } else {
                0
            };
            let above_right = if ry > 0 && x + 1 < width {
                labels[ri - width + 1]
            } else {
                0
            };
            [left, above, above_left, above_right]
        }
    }
}

/// Largest first. Stable, so equal sizes keep label order.
fn sort_by_size(blobs: &mut [Blob]) {
    blobs.sort_by(|a, b| b.pixel_count.cmp(&a.pixel_count));
}

/// Collapses blobs whose centroids are within `distance` (Manhattan) until no pair qualifies.
fn merge_nearby(blobs: &mut Vec<Blob>, distance: u32) {
    loop {
        let mut merged_any = false;
        let mut i = 0;
        while i < blobs.len() {
            let mut j = i + 1;
            while j < blobs.len() {
                if blobs[i].centroid.manhattan(&blobs[j].centroid) <= distance {
                    let absorbed = blobs.remove(j);
                    blobs[i].absorb(&absorbed);
                    merged_any = true;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
        if !merged_any {
            break;
        }
    }
    // A grown blob may now outrank the ones before it.
    sort_by_size(blobs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoiBand;

    const W: u32 = 800;
    const H: u32 = 600;

    fn dark_frame() -> Vec<u8> {
        vec![0; (W * H) as usize]
    }

    /// Fills `[x0, x1) x [y0, y1)` with `value`.
    fn paint(frame: &mut [u8], x0: u32, y0: u32, x1: u32, y1: u32, value: u8) {
        for y in y0..y1 {
            for x in x0..x1 {
                frame[(y * W + x) as usize] = value;
            }
        }
    }

    fn unmerged() -> DetectorConfig {
        DetectorConfig {
            merge_blobs: false,
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn single_square_yields_one_centered_blob() {
        let mut frame = dark_frame();
        paint(&mut frame, 96, 96, 105, 105, 255);

        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        let blob = result.blobs[0];
        assert_eq!(blob.pixel_count, 81);
        assert_eq!(blob.centroid, Centroid::new(100, 100));
        assert_eq!(blob.brightness_sum, 81 * 255);
        assert_eq!(result.frame_width, W);
        assert_eq!(result.frame_height, H);
    }

    #[test]
    fn ten_pixel_square_centroid_within_rounding() {
        let mut frame = dark_frame();
        paint(&mut frame, 95, 95, 105, 105, 255);

        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        let blob = result.blobs[0];
        assert_eq!(blob.pixel_count, 100);
        assert!(blob.centroid.x.abs_diff(100) <= 1);
        assert!(blob.centroid.y.abs_diff(100) <= 1);
    }

    #[test]
    fn scene_brightness_is_frame_mean() {
        let mut frame = vec![10u8; (W * H) as usize];
        paint(&mut frame, 0, 0, W, H / 2, 30);
        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.scene_brightness, 20);
        assert!(result.is_empty());
    }

    #[test]
    fn output_is_capped_and_sorted() {
        let mut frame = dark_frame();
        // 24 squares of varying size, 50 px apart so nothing merges.
        for i in 0..24u32 {
            let side = 4 + i % 7;
            let x0 = 20 + (i % 12) * 60;
            let y0 = 100 + (i / 12) * 200;
            paint(&mut frame, x0, y0, x0 + side, y0 + side, 250);
        }

        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), MAX_BLOBS);
        assert!(
            result
                .blobs
                .windows(2)
                .all(|pair| pair[0].pixel_count >= pair[1].pixel_count)
        );
        // Dropped blobs are the smallest ones.
        assert!(result.blobs.iter().all(|b| b.pixel_count >= 36));
    }

    #[test]
    fn configured_cap_below_hard_limit() {
        let mut frame = dark_frame();
        for i in 0..6u32 {
            let x0 = 50 + i * 100;
            paint(&mut frame, x0, 300, x0 + 6, 306, 255);
        }
        let config = DetectorConfig {
            max_blobs: 4,
            ..DetectorConfig::default()
        };
        assert_eq!(Segmenter::new(config).segment(&frame, W, H).blob_count(), 4);
    }

    #[test]
    fn nearby_regions_merge_with_weighted_centroid() {
        let mut frame = dark_frame();
        // 7x7 centered on (100, 200) and 5x5 centered on (110, 200): 10 px apart.
        paint(&mut frame, 97, 197, 104, 204, 255);
        paint(&mut frame, 108, 198, 113, 203, 255);

        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        let blob = result.blobs[0];
        assert_eq!(blob.pixel_count, 74);
        assert_eq!(blob.centroid, Centroid::new((100 * 49 + 110 * 25) / 74, 200));
        assert_eq!(blob.brightness_sum, 74 * 255);
    }

    #[test]
    fn distant_regions_stay_separate() {
        let mut frame = dark_frame();
        paint(&mut frame, 97, 197, 104, 204, 255);
        paint(&mut frame, 198, 198, 203, 203, 255);

        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 2);
        assert_eq!(result.blobs[0].pixel_count, 49);
        assert_eq!(result.blobs[1].pixel_count, 25);
        assert_eq!(result.blobs[1].centroid, Centroid::new(200, 200));
    }

    #[test]
    fn merge_chain_collapses_completely() {
        let mut frame = dark_frame();
        // Three regions 12 px apart: the outer two are beyond the merge distance.
        for cx in [300u32, 312, 324] {
            paint(&mut frame, cx - 2, 298, cx + 3, 303, 255);
        }
        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        assert_eq!(result.blobs[0].pixel_count, 75);
    }

    #[test]
    fn regions_at_frame_edges_are_dropped() {
        let mut frame = dark_frame();
        paint(&mut frame, 100, 0, 140, 3, 255);
        paint(&mut frame, 300, H - 3, 340, H, 255);
        paint(&mut frame, 500, 300, 508, 308, 255);

        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        assert_eq!(result.blobs[0].centroid.x, 503);
    }

    #[test]
    fn size_window_filters_noise_and_washout() {
        let mut frame = dark_frame();
        paint(&mut frame, 100, 100, 103, 103, 255);
        let result = Segmenter::new(DetectorConfig::default()).segment(&frame, W, H);
        assert!(result.is_empty());

        let (w, h) = (400u32, 300u32);
        let washed = vec![255u8; (w * h) as usize];
        let result = Segmenter::new(DetectorConfig::default()).segment(&washed, w, h);
        assert!(result.is_empty());
        assert_eq!(result.scene_brightness, 255);
    }

    #[test]
    fn u_shape_resolves_to_one_region() {
        let mut frame = dark_frame();
        paint(&mut frame, 50, 50, 55, 70, 255);
        paint(&mut frame, 70, 50, 75, 70, 255);
        paint(&mut frame, 50, 70, 75, 75, 255);

        let result = Segmenter::new(unmerged()).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        assert_eq!(result.blobs[0].pixel_count, 2 * 5 * 20 + 25 * 5);
    }

    #[test]
    fn diagonal_touch_depends_on_connectivity() {
        let mut frame = dark_frame();
        paint(&mut frame, 100, 100, 105, 105, 255);
        paint(&mut frame, 105, 105, 110, 110, 255);

        let eight = Segmenter::new(unmerged()).segment(&frame, W, H);
        assert_eq!(eight.blob_count(), 1);
        assert_eq!(eight.blobs[0].pixel_count, 50);

        let four = DetectorConfig {
            connectivity: Connectivity::Four,
            ..unmerged()
        };
        let four = Segmenter::new(four).segment(&frame, W, H);
        assert_eq!(four.blob_count(), 2);
        assert!(four.blobs.iter().all(|b| b.pixel_count == 25));
    }

    #[test]
    fn label_budget_saturates_to_background() {
        let mut frame = dark_frame();
        for x0 in [100u32, 200, 300] {
            paint(&mut frame, x0, 100, x0 + 6, 106, 255);
        }
        let config = DetectorConfig {
            max_labels: 3,
            ..unmerged()
        };
        let result = Segmenter::new(config).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 2);
        let mut xs: Vec<u16> = result.blobs.iter().map(|b| b.centroid.x).collect();
        xs.sort_unstable();
        assert_eq!(xs, vec![102, 202]);
    }

    #[test]
    fn roi_band_limits_processing() {
        let mut frame = dark_frame();
        paint(&mut frame, 100, 100, 106, 106, 255);
        paint(&mut frame, 300, 300, 306, 306, 255);
        let config = DetectorConfig {
            roi: Some(RoiBand { y_start: 200, y_end: 400 }),
            ..DetectorConfig::default()
        };

        let result = Segmenter::new(config).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        assert_eq!(result.blobs[0].centroid, Centroid::new(302, 302));
    }

    #[test]
    fn malformed_frames_yield_empty_results() {
        let mut segmenter = Segmenter::new(DetectorConfig::default());
        assert!(segmenter.segment(&[255; 10], 0, 10).is_empty());
        assert!(segmenter.segment(&[255; 10], 10, 10).is_empty());
    }

    #[test]
    fn oversized_frame_dimensions_yield_empty_results() {
        const WIDE: u32 = 70_000;
        const ROWS: u32 = 20;
        let mut frame = vec![0u8; (WIDE * ROWS) as usize];
        for y in 8..13 {
            for x in 66_000..66_005 {
                frame[(y * WIDE + x) as usize] = 255;
            }
        }
        let mut segmenter = Segmenter::new(DetectorConfig::default());
        let result = segmenter.segment(&frame, WIDE, ROWS);
        assert!(result.is_empty());
        assert_eq!(result.frame_width, WIDE);

        let tall = vec![0u8; 70_000];
        assert!(segmenter.segment(&tall, 1, 70_000).is_empty());
    }

    #[test]
    fn workspace_refusal_drops_the_frame() {
        let config = DetectorConfig {
            workspace_pixels: 100 * W as usize,
            workspace_pixel_limit: Some(100 * W as usize),
            ..DetectorConfig::default()
        };
        let mut frame = dark_frame();
        paint(&mut frame, 96, 46, 105, 55, 255);

        let mut segmenter = Segmenter::new(config);
        assert_eq!(segmenter.config().workspace_pixel_limit, Some(100 * W as usize));
        let result = segmenter.segment(&frame, W, H);
        assert!(result.is_empty());
        assert_eq!(result.scene_brightness, 0);

        // The same frame fits once the band is narrowed to the limit.
        let banded = DetectorConfig {
            roi: Some(RoiBand { y_start: 0, y_end: 100 }),
            ..segmenter.config().clone()
        };
        let result = Segmenter::new(banded).segment(&frame, W, H);
        assert_eq!(result.blob_count(), 1);
        assert_eq!(result.blobs[0].centroid, Centroid::new(100, 50));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut frame = dark_frame();
        paint(&mut frame, 100, 100, 110, 110, 255);
        paint(&mut frame, 400, 200, 410, 210, 255);
        paint(&mut frame, 600, 400, 607, 407, 220);

        let mut segmenter = Segmenter::new(DetectorConfig::default());
        let first = segmenter.segment(&frame, W, H);
        let second = segmenter.segment(&frame, W, H);
        assert_eq!(first, second);
        assert_eq!(first.blob_count(), 3);
    }
}
