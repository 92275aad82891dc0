// THEORY:
// A camera node does the same two steps on every frame: segment the frame into
// blobs, then classify those blobs against the previous frame. `CameraPipeline`
// owns everything that has to survive between frames for one camera (the
// labeling workspace inside the segmenter and the tracker history) so the node
// loop only hands it pixels.
//
// The primary node additionally pairs one of its own blobs with one reported
// by the peer camera and turns the pair into a distance. `StereoFusion` holds
// that pairing policy and the rig geometry. It has no per-frame state.

use crate::config::{BeamConfig, DetectorConfig, FusionConfig, PeerMatch, StereoConfig, TrackerConfig};
use crate::core_modules::blob::DetectionResult;
use crate::core_modules::blob_detector::Segmenter;
use crate::core_modules::link::{PeerBlob, PeerSummary};
use crate::core_modules::stereo::{DistanceEstimate, StereoGeometry};
use crate::core_modules::tracker::{MotionCompensator, NoCompensation, Tracker, TrackerState};

/// Segmenter plus tracker for a single camera.
pub struct CameraPipeline {
    segmenter: Segmenter,
    tracker: Tracker,
    tracker_state: TrackerState,
    compensator: Box<dyn MotionCompensator + Send>,
}

impl CameraPipeline {
    pub fn new(detector: DetectorConfig, tracker: TrackerConfig) -> Self {
        let segmenter = Segmenter::new(detector);
        let tracker = Tracker::new(tracker, segmenter.config().max_blob_pixels);
        Self {
            segmenter,
            tracker,
            tracker_state: TrackerState::new(),
            compensator: Box::new(NoCompensation),
        }
    }

    pub fn from_config(config: &BeamConfig) -> Self {
        Self::new(config.detector.clone(), config.tracker.clone())
    }

    /// Replaces the platform-motion correction applied before classification.
    pub fn with_compensator(mut self, compensator: Box<dyn MotionCompensator + Send>) -> Self {
        self.compensator = compensator;
        self
    }

    /// Segments one frame and classifies its blobs.
    pub fn process(&mut self, pixels: &[u8], width: u32, height: u32) -> DetectionResult {
        let mut result = self.segmenter.segment(pixels, width, height);
        self.tracker.classify_compensated(
            &mut self.tracker_state,
            &mut result,
            self.compensator.as_ref(),
        );
        result
    }

    /// Forgets tracking history, e.g. after a capture gap.
    pub fn reset(&mut self) {
        self.tracker_state.reset();
    }

    pub fn tracker_state(&self) -> &TrackerState {
        &self.tracker_state
    }
}

/// Pairs a primary blob with a peer blob and estimates its distance.
#[derive(Debug, Clone)]
pub struct StereoFusion {
    geometry: StereoGeometry,
    config: FusionConfig,
}

impl StereoFusion {
    pub fn new(stereo: StereoConfig, config: FusionConfig) -> Self {
        Self {
            geometry: StereoGeometry::new(stereo),
            config,
        }
    }

    pub fn from_config(config: &BeamConfig) -> Self {
        Self::new(config.stereo.clone(), config.fusion.clone())
    }

    pub fn geometry(&self) -> &StereoGeometry {
        &self.geometry
    }

    /// `None` when there is nothing to pair this frame, which is normal.
    pub fn fuse(&self, primary: &DetectionResult, peer: Option<&PeerSummary>) -> Option<DistanceEstimate> {
        let own = primary.largest()?;
        let peer = peer?;
        let partner = self.pick_partner(own.centroid.y, peer)?;
        Some(self.geometry.estimate(own.centroid, partner.centroid))
    }

    fn pick_partner<'a>(&self, row: u16, peer: &'a PeerSummary) -> Option<&'a PeerBlob> {
        match self.config.peer_match {
            PeerMatch::Largest => peer.largest(),
            PeerMatch::SameRow { max_dy } => peer
                .blobs
                .iter()
                .filter(|b| b.centroid.y.abs_diff(row) <= max_dy)
                .min_by_key(|b| b.centroid.y.abs_diff(row)),
        }
    }
}
