// THEORY:
// This file is the main entry point for the `beam_vision` library crate, the
// perception core of a bicycle automatic high/low-beam controller.
//
// Two synchronized grayscale cameras each run the same per-frame pipeline:
// threshold and label bright regions (`core_modules::blob_detector`), follow
// them across frames to tell streetlamps from oncoming vehicles
// (`core_modules::tracker`), and, on the primary node, compare the matched
// light seen by both cameras to estimate its distance (`core_modules::stereo`).
// The secondary node ships its blob summary to the primary over a small
// fixed-length packet (`core_modules::link`).
//
// `pipeline` and `node` wire those pieces into the per-camera loop; `config`
// and `error` carry the ambient concerns.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod node;
pub mod pipeline;

pub use config::BeamConfig;
pub use core_modules::blob::{Blob, BlobClass, Centroid, DetectionResult, MAX_BLOBS};
pub use core_modules::link::{PacketFormat, PacketReceiver, PeerBlob, PeerSummary};
pub use core_modules::stereo::{DistanceEstimate, Rejection, StereoGeometry};
pub use core_modules::tracker::{MotionCompensator, NoCompensation, Tracker, TrackerState};
pub use error::{CaptureError, ConfigError, LinkError};
pub use node::{FrameReport, GrayFrame, run_primary, run_secondary};
pub use pipeline::{CameraPipeline, StereoFusion};
