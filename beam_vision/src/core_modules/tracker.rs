// THEORY:
// The `tracker` module gives the per-frame blob list a short memory. Its job
// is to decide, for every light in view, whether it is a stationary light
// (streetlamp, reflector) or an approaching vehicle, and to refuse to decide
// until the evidence has been consistent for a few frames.
//
// Key architectural principles:
// 1.  **Explicit state**: everything that survives between frames lives in a
//     `TrackerState` owned by the caller, one per camera. The `Tracker` itself
//     only holds configuration, so two camera pipelines never alias.
// 2.  **Greedy matching**: blobs arrive largest first; each claims the nearest
//     unclaimed previous-frame centroid (Manhattan distance) if it is close
//     enough. Large lights get first pick.
// 3.  **Hysteresis**: the motion magnitude gives a raw class per frame. A slot
//     only changes its confirmed class after `confirm_frames` consecutive
//     frames of the same raw class.
// 4.  **Reindexing**: votes are updated in previous-frame slot order but the
//     next frame looks them up in current-frame order, so the state is rebuilt
//     in current order at the end of every call. An empty frame wipes the
//     state: a light that reappears later is a new light.
// 5.  **Geometry shortcut**: a large blob in the lower quarter is our own
//     headlight on the road and is static without any voting.

use crate::config::TrackerConfig;
use crate::core_modules::blob::{Blob, BlobClass, Centroid, DetectionResult, MAX_BLOBS};
use log::trace;

/// Supplies the platform-motion part of a blob's inter-frame shift.
///
/// The correction is subtracted from the raw centroid delta before the motion
/// magnitude is classified, so parallax caused by the bicycle's own movement
/// can be removed without touching the state machine.
pub trait MotionCompensator {
    /// Expected `(dx, dy)` shift, in pixels, of a stationary light seen at `centroid`.
    fn correction(&self, centroid: Centroid) -> (i32, i32);
}

/// No platform-motion correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompensation;

impl MotionCompensator for NoCompensation {
    fn correction(&self, _centroid: Centroid) -> (i32, i32) {
        (0, 0)
    }
}

/// Persistent per-light memory kept between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackSlot {
    /// Centroid in the previous frame.
    pub centroid: Centroid,
    /// Classification currently being voted on.
    pub pending: BlobClass,
    /// Consecutive frames agreeing on `pending`.
    pub votes: u8,
    /// Last classification that collected enough votes.
    pub confirmed: BlobClass,
}

/// Tracker memory for one camera.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerState {
    slots: [TrackSlot; MAX_BLOBS],
    count: usize,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every previous-frame light.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Number of meaningful slots, equal to the previous frame's blob count.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn slot(&self, index: usize) -> Option<&TrackSlot> {
        self.slots[..self.count].get(index)
    }
}

/// Clears all persistent slots of `state`.
pub fn reset(state: &mut TrackerState) {
    state.reset();
}

/// Classifies blobs by their inter-frame motion.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: TrackerConfig,
    max_blob_pixels: u32,
}

impl Tracker {
    /// `max_blob_pixels` is the detector's upper size bound; blobs above half of it
    /// qualify for the road-reflection shortcut.
    pub fn new(config: TrackerConfig, max_blob_pixels: u32) -> Self {
        Self {
            config,
            max_blob_pixels,
        }
    }

    /// Fills in `classification`, `dx` and `dy` of every blob and advances `state`.
    pub fn classify(&self, state: &mut TrackerState, result: &mut DetectionResult) {
        self.classify_compensated(state, result, &NoCompensation);
    }

    /// Like [`Tracker::classify`], subtracting `compensator`'s platform-motion
    /// estimate before the motion magnitude is classified. The reported
    /// `dx`/`dy` stay the raw deltas.
    pub fn classify_compensated(
        &self,
        state: &mut TrackerState,
        result: &mut DetectionResult,
        compensator: &dyn MotionCompensator,
    ) {
        let frame_height = result.frame_height;
        let mut claimed = [false; MAX_BLOBS];
        let mut matched_slot: [Option<usize>; MAX_BLOBS] = [None; MAX_BLOBS];

        for (i, blob) in result.blobs.iter_mut().enumerate().take(MAX_BLOBS) {
            if self.is_road_reflection(blob, frame_height) {
                set_unmatched(blob, BlobClass::StaticLight);
                continue;
            }
            if state.count == 0 {
                set_unmatched(blob, BlobClass::Unknown);
                continue;
            }

            let nearest = (0..state.count)
                .filter(|&j| !claimed[j])
                .map(|j| (j, blob.centroid.manhattan(&state.slots[j].centroid)))
                .min_by_key(|&(_, distance)| distance);
            let Some((j, _)) =
                nearest.filter(|&(_, distance)| distance <= self.config.max_match_distance)
            else {
                set_unmatched(blob, BlobClass::Unknown);
                continue;
            };

            claimed[j] = true;
            matched_slot[i] = Some(j);

            let previous = state.slots[j].centroid;
            let dx = blob.centroid.x as i32 - previous.x as i32;
            let dy = blob.centroid.y as i32 - previous.y as i32;
            blob.dx = saturate_i16(dx);
            blob.dy = saturate_i16(dy);

            let (cx, cy) = compensator.correction(blob.centroid);
            let motion = dx
                .saturating_sub(cx)
                .unsigned_abs()
                .saturating_add(dy.saturating_sub(cy).unsigned_abs());
            let raw = self.raw_class(motion);

            let slot = &mut state.slots[j];
            if raw == slot.pending {
                slot.votes = slot.votes.saturating_add(1);
            } else {
                slot.pending = raw;
                slot.votes = 1;
            }
            if slot.votes >= self.config.confirm_frames {
                slot.confirmed = slot.pending;
            }
            blob.classification = slot.confirmed;

            trace!(
                "blob {i} at ({}, {}) matched slot {j}: motion {motion}, raw {raw}, votes {}, class {}",
                blob.centroid.x, blob.centroid.y, slot.votes, slot.confirmed
            );
        }

        // Rebuild the slots in current-frame order for the next call.
        let mut next = TrackerState::default();
        for (i, blob) in result.blobs.iter().enumerate().take(MAX_BLOBS) {
            let mut slot = match matched_slot[i] {
                Some(j) => state.slots[j],
                None => TrackSlot::default(),
            };
            slot.centroid = blob.centroid;
            next.slots[i] = slot;
        }
        next.count = result.blobs.len().min(MAX_BLOBS);
        *state = next;
    }

    fn is_road_reflection(&self, blob: &Blob, frame_height: u32) -> bool {
        self.config.reflection_filter
            && frame_height > 0
            && blob.centroid.y as u32 > frame_height * 3 / 4
            && blob.pixel_count > self.max_blob_pixels / 2
    }

    fn raw_class(&self, motion: u32) -> BlobClass {
        if motion <= self.config.static_threshold {
            BlobClass::StaticLight
        } else if motion >= self.config.vehicle_threshold {
            BlobClass::Vehicle
        } else {
            BlobClass::Unknown
        }
    }
}

fn set_unmatched(blob: &mut Blob, class: BlobClass) {
    blob.classification = class;
    blob.dx = 0;
    blob.dy = 0;
}

fn saturate_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
