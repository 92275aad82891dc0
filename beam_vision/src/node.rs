// THEORY:
// Each camera runs one long-lived task that pulls frames from a stream and
// pushes them through its `CameraPipeline`. The two tasks only talk through a
// bounded byte channel standing in for the serial link between the boards:
//
//   secondary: frame -> pipeline -> packet -> link (try_send, drop if full)
//   primary:   frame -> pipeline -> drain link -> newest peer summary
//              -> stereo fusion -> FrameReport
//
// Neither side ever waits on the other. The secondary drops packets when the
// link is backed up, and the primary works with whatever bytes have arrived,
// keeping the last good peer summary until a newer one (or a corrupt packet)
// replaces it. A frame that fails to arrive is skipped, never fatal.

use crate::core_modules::blob::DetectionResult;
use crate::core_modules::link::{PacketFormat, PacketReceiver, PeerSummary};
use crate::core_modules::stereo::DistanceEstimate;
use crate::error::CaptureError;
use crate::pipeline::{CameraPipeline, StereoFusion};
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// One 8-bit grayscale frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl GrayFrame {
    pub fn new(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            index,
            width,
            height,
            pixels,
        }
    }
}

/// What the primary node knows after one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub result: DetectionResult,
    /// Latest summary from the peer camera, if any has arrived yet.
    pub peer: Option<PeerSummary>,
    /// `None` when either camera had nothing to pair.
    pub distance: Option<DistanceEstimate>,
}

/// Secondary camera loop. Returns the number of frames processed.
pub async fn run_secondary<S>(
    mut pipeline: CameraPipeline,
    format: PacketFormat,
    mut frames: S,
    link: mpsc::Sender<Vec<u8>>,
) -> u64
where
    S: Stream<Item = Result<GrayFrame, CaptureError>> + Unpin,
{
    let mut processed = 0u64;
    let mut dropped = 0u64;

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!("secondary: {err}, skipping frame");
                continue;
            }
        };

        let result = pipeline.process(&frame.pixels, frame.width, frame.height);
        processed += 1;

        match link.try_send(format.encode(&result).to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                debug!("secondary: link busy, dropped packet for frame {}", frame.index);
            }
            Err(TrySendError::Closed(_)) => {
                dropped += 1;
                debug!("secondary: link closed, dropped packet for frame {}", frame.index);
            }
        }
    }

    info!("secondary: {processed} frames processed, {dropped} packets dropped");
    processed
}

/// Primary camera loop. Returns the number of frames processed.
pub async fn run_primary<S>(
    mut pipeline: CameraPipeline,
    fusion: StereoFusion,
    format: PacketFormat,
    mut frames: S,
    mut link: mpsc::Receiver<Vec<u8>>,
    reports: mpsc::Sender<FrameReport>,
) -> u64
where
    S: Stream<Item = Result<GrayFrame, CaptureError>> + Unpin,
{
    let mut receiver = PacketReceiver::new(format);
    let mut peer: Option<PeerSummary> = None;
    let mut processed = 0u64;

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!("primary: {err}, skipping frame");
                continue;
            }
        };

        let result = pipeline.process(&frame.pixels, frame.width, frame.height);
        processed += 1;

        while let Ok(bytes) = link.try_recv() {
            receiver.push(&bytes);
        }
        if let Some(summary) = receiver.poll_latest() {
            peer = Some(summary);
        }

        let distance = fusion.fuse(&result, peer.as_ref());
        debug!(
            "primary: frame {} blobs={} peer={} distance={}",
            frame.index,
            result.blob_count(),
            peer.as_ref().map_or(0, PeerSummary::count),
            distance.map_or_else(|| "N/A".to_string(), |d| d.to_string()),
        );

        let report = FrameReport {
            frame_index: frame.index,
            result,
            peer: peer.clone(),
            distance,
        };
        if reports.send(report).await.is_err() {
            info!("primary: report consumer gone, stopping");
            break;
        }
    }

    processed
}
