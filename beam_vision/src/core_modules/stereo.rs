// THEORY:
// Parallel-axis stereo. The same lamp seen by two cameras a known baseline
// apart lands at slightly different pixel positions; that offset (disparity)
// is inversely proportional to the lamp's distance:
//
//     focal_px  = (frame_width / 2) / tan(hfov / 2)
//     distance  = baseline_m * focal_px / disparity_px
//
// The secondary camera sits on the left, so a lamp ahead always appears
// further right in the secondary image. A pair that violates that is not the
// same lamp (or the rig is miswired) and is rejected before any division.
//
// Disparity is the Euclidean distance between the two centroids by default.
// On a level rig it equals the horizontal offset; on a leaning bicycle the
// baseline rotates and the vertical component carries part of the signal.
//
// There is no lens-distortion correction and no rectification; matching the
// lamp across cameras is the caller's job.

use crate::config::{DisparityMode, StereoConfig};
use crate::core_modules::blob::Centroid;
use std::fmt;

/// Why a distance estimate was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The secondary view is not displaced to the right of the primary view.
    WrongSign,
    /// Disparity under the configured minimum: too far to resolve.
    BelowMinDisparity,
    /// Closer than the plausible range.
    TooClose,
    /// Beyond the plausible range.
    TooFar,
}

/// Result of a distance estimate. Callers must check validity before use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceEstimate {
    Valid { meters: f32, disparity_px: f32 },
    Invalid(Rejection),
}

impl DistanceEstimate {
    pub fn meters(&self) -> Option<f32> {
        match self {
            DistanceEstimate::Valid { meters, .. } => Some(*meters),
            DistanceEstimate::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, DistanceEstimate::Valid { .. })
    }
}

impl fmt::Display for DistanceEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceEstimate::Valid { meters, .. } => write!(f, "{meters:.2} m"),
            DistanceEstimate::Invalid(_) => f.write_str("N/A"),
        }
    }
}

/// Rig geometry with the focal length derived once.
#[derive(Debug, Clone)]
pub struct StereoGeometry {
    config: StereoConfig,
    focal_px: f32,
}

impl StereoGeometry {
    pub fn new(config: StereoConfig) -> Self {
        let half_fov = config.hfov_deg.to_radians() * 0.5;
        let focal_px = (config.frame_width as f32 * 0.5) / half_fov.tan();
        Self { config, focal_px }
    }

    /// Focal length in pixels.
    pub fn focal_px(&self) -> f32 {
        self.focal_px
    }

    pub fn config(&self) -> &StereoConfig {
        &self.config
    }

    /// Distance to the light seen at `primary` by the primary camera and at
    /// `secondary` by the secondary camera.
    pub fn estimate(&self, primary: Centroid, secondary: Centroid) -> DistanceEstimate {
        let dx = secondary.x as f32 - primary.x as f32;
        let dy = secondary.y as f32 - primary.y as f32;
        let min_disparity = self.config.min_disparity_px;

        if dx <= 0.0 {
            return DistanceEstimate::Invalid(Rejection::WrongSign);
        }
        if dx < min_disparity {
            return DistanceEstimate::Invalid(Rejection::BelowMinDisparity);
        }

        let disparity_px = match self.config.disparity {
            DisparityMode::Euclidean => dx.hypot(dy),
            DisparityMode::Horizontal => dx,
        };

        let meters = self.config.baseline_m * self.focal_px / disparity_px;
        if meters < self.config.min_distance_m {
            return DistanceEstimate::Invalid(Rejection::TooClose);
        }
        if meters > self.config.max_distance_m {
            return DistanceEstimate::Invalid(Rejection::TooFar);
        }

        DistanceEstimate::Valid {
            meters,
            disparity_px,
        }
    }
}
