// THEORY:
// Every tunable of the perception core lives here as a named, serde-friendly
// field with the device's stock defaults. The fixed capacities (`MAX_BLOBS`, the
// u16 label range, the link slot count) stay compile-time constants; the config
// may only lower them, never raise them, and exceeding them drops data rather
// than raising an error.
//
// The two legacy variants observed in the field (4-connected labeling and
// horizontal-only disparity) are explicit enum choices, never implicit.

use crate::core_modules::blob::MAX_BLOBS;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pixel adjacency used when labeling connected regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Left, upper-left, upper and upper-right neighbors. Canonical.
    #[default]
    Eight,
    /// Left and upper neighbors only. Legacy mode.
    Four,
}

/// How the stereo estimator measures disparity between two centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisparityMode {
    /// Euclidean pixel distance. Stays meaningful when the bicycle leans. Canonical.
    #[default]
    Euclidean,
    /// Horizontal offset only, the classical level-rig formula. Legacy mode.
    Horizontal,
}

/// How the primary node picks the peer blob to pair with its own largest blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerMatch {
    /// Pair the largest blob of each camera.
    #[default]
    Largest,
    /// Pair with the peer blob whose row is closest, if within `max_dy` rows.
    SameRow { max_dy: u16 },
}

/// Vertical band of the frame that is actually processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBand {
    /// First processed row.
    pub y_start: u32,
    /// One past the last processed row. `0` means "to the bottom of the frame".
    pub y_end: u32,
}

impl RoiBand {
    /// Resolves the band against a concrete frame height.
    ///
    /// An end of `0` or past the frame clamps to the frame height; a start at or
    /// past the end falls back to row 0.
    pub fn resolve(band: Option<RoiBand>, height: u32) -> (u32, u32) {
        let Some(band) = band else {
            return (0, height);
        };
        let y_end = if band.y_end == 0 || band.y_end > height {
            height
        } else {
            band.y_end
        };
        let y_start = if band.y_start >= y_end { 0 } else { band.y_start };
        (y_start, y_end)
    }
}

/// Tuning for the blob segmenter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Pixels at or above this value are "bright".
    pub brightness_threshold: u8,
    /// Regions smaller than this are sensor noise.
    pub min_blob_pixels: u32,
    /// Regions larger than this are whole-frame washout.
    pub max_blob_pixels: u32,
    /// Output cap. Never above [`MAX_BLOBS`].
    pub max_blobs: usize,
    /// Provisional label budget per frame. New regions past it become background.
    pub max_labels: usize,
    pub roi: Option<RoiBand>,
    /// Blobs whose centroid row is within this many rows of the top or bottom edge are dropped.
    pub edge_margin_rows: u32,
    /// Manhattan distance under which two blob centroids are merged.
    pub merge_distance: u32,
    pub merge_blobs: bool,
    pub connectivity: Connectivity,
    /// Largest frame area the scratch workspace is sized for at startup.
    pub workspace_pixels: usize,
    /// Hard ceiling on the label map. Frames whose processed band is larger are
    /// dropped with an empty result. `None` lets the workspace grow on demand.
    pub workspace_pixel_limit: Option<usize>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 200,
            min_blob_pixels: 16,
            max_blob_pixels: 70_000,
            max_blobs: MAX_BLOBS,
            max_labels: 512,
            roi: None,
            edge_margin_rows: 3,
            merge_distance: 20,
            merge_blobs: true,
            connectivity: Connectivity::Eight,
            workspace_pixels: 800 * 600,
            workspace_pixel_limit: None,
        }
    }
}

/// Tuning for the inter-frame tracker. All distances are Manhattan pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Motion at or below this is a static light.
    pub static_threshold: u32,
    /// Motion at or above this is a vehicle.
    pub vehicle_threshold: u32,
    /// Largest centroid jump still matched to the previous frame.
    pub max_match_distance: u32,
    /// Consecutive agreeing frames before a classification is confirmed.
    pub confirm_frames: u8,
    /// Classify large blobs in the lower quarter as our own headlight's road reflection.
    pub reflection_filter: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            static_threshold: 4,
            vehicle_threshold: 12,
            max_match_distance: 25,
            confirm_frames: 3,
            reflection_filter: true,
        }
    }
}

/// Stereo rig geometry and plausibility bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    /// Lens separation in metres.
    pub baseline_m: f32,
    /// Horizontal field of view in degrees.
    pub hfov_deg: f32,
    /// Frame width the focal length is derived from.
    pub frame_width: u32,
    pub min_disparity_px: f32,
    pub min_distance_m: f32,
    pub max_distance_m: f32,
    pub disparity: DisparityMode,
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            baseline_m: 0.15,
            hfov_deg: 62.0,
            frame_width: 800,
            min_disparity_px: 1.0,
            min_distance_m: 0.5,
            max_distance_m: 80.0,
            disparity: DisparityMode::Euclidean,
        }
    }
}

/// Inter-camera telemetry framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Sync byte that starts every packet.
    pub header: u8,
    /// Capacity of the link channel in packets.
    pub channel_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            header: 0xAA,
            channel_capacity: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub peer_match: PeerMatch,
}

/// Complete configuration of one camera node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub stereo: StereoConfig,
    pub link: LinkConfig,
    pub fusion: FusionConfig,
}

impl BeamConfig {
    /// Parses and validates a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: BeamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        if d.min_blob_pixels > d.max_blob_pixels {
            return Err(ConfigError::invalid(
                "detector.min_blob_pixels",
                format!("{} exceeds max_blob_pixels {}", d.min_blob_pixels, d.max_blob_pixels),
            ));
        }
        if d.max_blobs == 0 || d.max_blobs > MAX_BLOBS {
            return Err(ConfigError::invalid(
                "detector.max_blobs",
                format!("must be in 1..={MAX_BLOBS}, got {}", d.max_blobs),
            ));
        }
        if d.max_labels < 2 || d.max_labels > u16::MAX as usize {
            return Err(ConfigError::invalid(
                "detector.max_labels",
                format!("must be in 2..={}, got {}", u16::MAX, d.max_labels),
            ));
        }

        if let Some(limit) = d.workspace_pixel_limit.filter(|&l| l < d.workspace_pixels) {
            return Err(ConfigError::invalid(
                "detector.workspace_pixel_limit",
                format!("{limit} is below workspace_pixels {}", d.workspace_pixels),
            ));
        }

        let t = &self.tracker;
        if t.static_threshold >= t.vehicle_threshold {
            return Err(ConfigError::invalid(
                "tracker.static_threshold",
                format!(
                    "{} must be below vehicle_threshold {}",
                    t.static_threshold, t.vehicle_threshold
                ),
            ));
        }
        if t.confirm_frames == 0 {
            return Err(ConfigError::invalid("tracker.confirm_frames", "must be at least 1"));
        }

        let s = &self.stereo;
        if !(s.baseline_m > 0.0) {
            return Err(ConfigError::invalid("stereo.baseline_m", "must be positive"));
        }
        if !(s.hfov_deg > 0.0 && s.hfov_deg < 180.0) {
            return Err(ConfigError::invalid(
                "stereo.hfov_deg",
                format!("must be in (0, 180), got {}", s.hfov_deg),
            ));
        }
        if s.frame_width == 0 {
            return Err(ConfigError::invalid("stereo.frame_width", "must be positive"));
        }
        if !(s.min_disparity_px >= 0.0) {
            return Err(ConfigError::invalid("stereo.min_disparity_px", "must not be negative"));
        }
        if !(s.min_distance_m < s.max_distance_m) {
            return Err(ConfigError::invalid(
                "stereo.min_distance_m",
                format!("{} must be below max_distance_m {}", s.min_distance_m, s.max_distance_m),
            ));
        }

        if self.link.channel_capacity == 0 {
            return Err(ConfigError::invalid("link.channel_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_tuning() {
        let config = BeamConfig::default();
        assert_eq!(config.detector.brightness_threshold, 200);
        assert_eq!(config.detector.max_blobs, 16);
        assert_eq!(config.tracker.confirm_frames, 3);
        assert_eq!(config.link.header, 0xAA);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = BeamConfig::from_json_str(
            r#"{
                "detector": { "brightness_threshold": 180, "connectivity": "four" },
                "stereo": { "disparity": "horizontal", "baseline_m": 0.2 },
                "fusion": { "peer_match": { "same_row": { "max_dy": 12 } } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.detector.brightness_threshold, 180);
        assert_eq!(config.detector.connectivity, Connectivity::Four);
        assert_eq!(config.detector.min_blob_pixels, 16);
        assert_eq!(config.stereo.disparity, DisparityMode::Horizontal);
        assert_eq!(config.fusion.peer_match, PeerMatch::SameRow { max_dy: 12 });
        assert_eq!(config.tracker, TrackerConfig::default());
    }

    #[test]
    fn rejects_inverted_tracker_thresholds() {
        let err = BeamConfig::from_json_str(
            r#"{ "tracker": { "static_threshold": 12, "vehicle_threshold": 4 } }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "tracker.static_threshold", .. }
        ));
    }

    #[test]
    fn rejects_blob_cap_above_hard_limit() {
        let mut config = BeamConfig::default();
        config.detector.max_blobs = MAX_BLOBS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_pixel_limit_below_startup_size() {
        let mut config = BeamConfig::default();
        config.detector.workspace_pixel_limit = Some(1_000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "detector.workspace_pixel_limit", .. })
        ));
        config.detector.workspace_pixels = 1_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            BeamConfig::from_json_str("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn roi_band_resolution() {
        assert_eq!(RoiBand::resolve(None, 600), (0, 600));
        let band = RoiBand { y_start: 100, y_end: 0 };
        assert_eq!(RoiBand::resolve(Some(band), 600), (100, 600));
        let band = RoiBand { y_start: 100, y_end: 900 };
        assert_eq!(RoiBand::resolve(Some(band), 600), (100, 600));
        let band = RoiBand { y_start: 400, y_end: 300 };
        assert_eq!(RoiBand::resolve(Some(band), 600), (0, 300));
    }
}
