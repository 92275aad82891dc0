// THEORY:
// A `Blob` is one bright region in one frame: where it is (centroid), how big it
// is (pixel count) and how bright it is (brightness sum). The segmenter creates
// it; the tracker fills in the classification and the inter-frame delta. It is
// a plain value, thrown away at the end of the frame except for its centroid,
// which the tracker keeps as the next frame's reference.
//
// `DetectionResult` is the per-frame list of blobs. It is bounded by
// `MAX_BLOBS` and always sorted largest first, so "the first blob" is always
// the most prominent light in the scene.

use std::fmt;

/// Hard cap on blobs reported per frame.
pub const MAX_BLOBS: usize = 16;

/// Pixel coordinates of a blob centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Centroid {
    pub x: u16,
    pub y: u16,
}

impl Centroid {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }

    /// `|dx| + |dy|` between two centroids.
    pub fn manhattan(&self, other: &Centroid) -> u32 {
        self.x.abs_diff(other.x) as u32 + self.y.abs_diff(other.y) as u32
    }
}

/// What the tracker believes a blob is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlobClass {
    /// Not yet confirmed, or moving between the static and vehicle thresholds.
    #[default]
    Unknown,
    /// Streetlamp or stationary reflection.
    StaticLight,
    /// Oncoming vehicle headlight.
    Vehicle,
}

impl BlobClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobClass::Unknown => "UNKNOWN",
            BlobClass::StaticLight => "STATIC_LIGHT",
            BlobClass::Vehicle => "VEHICLE",
        }
    }
}

impl fmt::Display for BlobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected bright region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Blob {
    pub centroid: Centroid,
    /// Number of bright pixels in the region.
    pub pixel_count: u32,
    /// Sum of the region's pixel values.
    pub brightness_sum: u32,
    /// Written by the tracker.
    pub classification: BlobClass,
    /// Inter-frame centroid delta, written by the tracker.
    pub dx: i16,
    pub dy: i16,
}

impl Blob {
    pub fn new(centroid: Centroid, pixel_count: u32, brightness_sum: u32) -> Self {
        Self {
            centroid,
            pixel_count,
            brightness_sum,
            ..Self::default()
        }
    }

    /// Mean pixel value of the blob, 0 for an empty blob.
    pub fn avg_brightness(&self) -> u8 {
        if self.pixel_count == 0 {
            return 0;
        }
        (self.brightness_sum / self.pixel_count).min(u8::MAX as u32) as u8
    }

    /// Folds `other` into `self`: weighted centroid, additive count and brightness.
    pub(crate) fn absorb(&mut self, other: &Blob) {
        let total = self.pixel_count as u64 + other.pixel_count as u64;
        if total == 0 {
            return;
        }
        let weighted = |a: u16, wa: u32, b: u16, wb: u32| -> u16 {
            ((a as u64 * wa as u64 + b as u64 * wb as u64) / total) as u16
        };
        self.centroid = Centroid {
            x: weighted(self.centroid.x, self.pixel_count, other.centroid.x, other.pixel_count),
            y: weighted(self.centroid.y, self.pixel_count, other.centroid.y, other.pixel_count),
        };
        self.pixel_count = total.min(u32::MAX as u64) as u32;
        self.brightness_sum = self.brightness_sum.saturating_add(other.brightness_sum);
    }
}

/// The segmenter's output for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectionResult {
    /// At most [`MAX_BLOBS`] blobs, sorted by pixel count, largest first.
    pub blobs: Vec<Blob>,
    /// Mean brightness of the processed region (0-255).
    pub scene_brightness: u8,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl DetectionResult {
    /// An empty result for a frame that could not be processed.
    pub fn empty(frame_width: u32, frame_height: u32) -> Self {
        Self {
            blobs: Vec::new(),
            scene_brightness: 0,
            frame_width,
            frame_height,
        }
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// The most prominent blob, if any.
    pub fn largest(&self) -> Option<&Blob> {
        self.blobs.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_weights_centroid_by_pixel_count() {
        let mut a = Blob::new(Centroid::new(100, 100), 300, 300 * 250);
        let b = Blob::new(Centroid::new(120, 104), 100, 100 * 210);
        a.absorb(&b);
        assert_eq!(a.centroid, Centroid::new(105, 101));
        assert_eq!(a.pixel_count, 400);
        assert_eq!(a.brightness_sum, 300 * 250 + 100 * 210);
    }

    #[test]
    fn avg_brightness_handles_empty_blob() {
        assert_eq!(Blob::default().avg_brightness(), 0);
        assert_eq!(Blob::new(Centroid::new(1, 1), 4, 4 * 230).avg_brightness(), 230);
    }

    #[test]
    fn manhattan_distance_is_symmetric() {
        let a = Centroid::new(10, 40);
        let b = Centroid::new(25, 31);
        assert_eq!(a.manhattan(&b), 24);
        assert_eq!(b.manhattan(&a), 24);
    }

    #[test]
    fn class_labels() {
        assert_eq!(BlobClass::default(), BlobClass::Unknown);
        assert_eq!(BlobClass::StaticLight.to_string(), "STATIC_LIGHT");
        assert_eq!(BlobClass::Vehicle.as_str(), "VEHICLE");
    }
}
