// THEORY:
// The secondary camera has no distance logic of its own; it ships a summary of
// its brightest blobs to the primary every frame over a byte link. The framing
// is deliberately tiny and fixed-length:
//
//     [header][count][slot 0][slot 1][slot 2]
//     slot = cx (u16 BE) | cy (u16 BE) | pixel_count (u16 BE, saturated)
//
// Unused slots are zero-filled so every packet is the same size. The header is
// a single sync byte, which can also show up inside slot data; a receiver that
// lost sync skips bytes until it sees the header again and may briefly decode
// garbage. A count byte larger than the slot count is the one corruption the
// receiver can detect, and it answers by flushing everything buffered.

use crate::core_modules::blob::{Centroid, DetectionResult};
use crate::error::LinkError;
use log::{debug, warn};

/// Blob slots carried by one packet.
pub const LINK_SLOTS: usize = 3;
const SLOT_LEN: usize = 6;
/// Header byte, count byte and the slots.
pub const PACKET_LEN: usize = 2 + LINK_SLOTS * SLOT_LEN;
pub const HEADER: u8 = 0xAA;
/// Receive buffer bound. Older bytes are dropped first.
pub const MAX_BUFFERED: usize = 8 * PACKET_LEN;

/// One blob as reported by the peer camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerBlob {
    pub centroid: Centroid,
    pub pixel_count: u16,
}

/// The peer camera's view of the current frame, largest blob first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PeerSummary {
    pub blobs: Vec<PeerBlob>,
}

impl PeerSummary {
    pub fn count(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn largest(&self) -> Option<&PeerBlob> {
        self.blobs.first()
    }
}

/// Packet framing with a configurable sync byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFormat {
    header: u8,
}

impl Default for PacketFormat {
    fn default() -> Self {
        Self::new(HEADER)
    }
}

impl PacketFormat {
    pub fn new(header: u8) -> Self {
        Self { header }
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    /// Packs the first `LINK_SLOTS` blobs of `result`.
    pub fn encode(&self, result: &DetectionResult) -> [u8; PACKET_LEN] {
        let mut packet = [0u8; PACKET_LEN];
        let sent = result.blobs.len().min(LINK_SLOTS);
        packet[0] = self.header;
        packet[1] = sent as u8;

        for (blob, slot) in result.blobs[..sent]
            .iter()
            .zip(packet[2..].chunks_exact_mut(SLOT_LEN))
        {
            let pixel_count = blob.pixel_count.min(u16::MAX as u32) as u16;
            slot[0..2].copy_from_slice(&blob.centroid.x.to_be_bytes());
            slot[2..4].copy_from_slice(&blob.centroid.y.to_be_bytes());
            slot[4..6].copy_from_slice(&pixel_count.to_be_bytes());
        }
        packet
    }

    /// Parses one packet from the start of `bytes`. Trailing bytes are ignored.
    pub fn decode(&self, bytes: &[u8]) -> Result<PeerSummary, LinkError> {
        if bytes.len() < PACKET_LEN {
            return Err(LinkError::Truncated {
                len: bytes.len(),
                expected: PACKET_LEN,
            });
        }
        if bytes[0] != self.header {
            return Err(LinkError::BadHeader { found: bytes[0] });
        }
        let count = bytes[1];
        if count as usize > LINK_SLOTS {
            return Err(LinkError::BadCount {
                count,
                max: LINK_SLOTS,
            });
        }

        let blobs = bytes[2..PACKET_LEN]
            .chunks_exact(SLOT_LEN)
            .take(count as usize)
            .map(|slot| PeerBlob {
                centroid: Centroid::new(
                    u16::from_be_bytes([slot[0], slot[1]]),
                    u16::from_be_bytes([slot[2], slot[3]]),
                ),
                pixel_count: u16::from_be_bytes([slot[4], slot[5]]),
            })
            .collect();
        Ok(PeerSummary { blobs })
    }
}

/// Encodes with the default header.
pub fn encode_packet(result: &DetectionResult) -> [u8; PACKET_LEN] {
    PacketFormat::default().encode(result)
}

/// Decodes with the default header.
pub fn decode_packet(bytes: &[u8]) -> Result<PeerSummary, LinkError> {
    PacketFormat::default().decode(bytes)
}

/// Reassembles packets from an unframed byte stream.
#[derive(Debug, Default)]
pub struct PacketReceiver {
    format: PacketFormat,
    buffer: Vec<u8>,
}

impl PacketReceiver {
    pub fn new(format: PacketFormat) -> Self {
        Self {
            format,
            buffer: Vec::with_capacity(MAX_BUFFERED),
        }
    }

    /// Bytes waiting to be parsed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            debug!("link buffer full, dropping {excess} old bytes");
            self.buffer.drain(..excess);
        }
    }

    /// Next packet, if a complete one is buffered.
    ///
    /// A corrupt count byte flushes the buffer and yields an empty summary so
    /// the caller stops using stale peer data.
    pub fn poll(&mut self) -> Option<PeerSummary> {
        let header = self.format.header();
        let skip = self
            .buffer
            .iter()
            .position(|&b| b == header)
            .unwrap_or(self.buffer.len());
        if skip > 0 {
            debug!("link resync, skipped {skip} bytes");
            self.buffer.drain(..skip);
        }

        if self.buffer.len() < PACKET_LEN {
            return None;
        }

        match self.format.decode(&self.buffer[..PACKET_LEN]) {
            Ok(summary) => {
                self.buffer.drain(..PACKET_LEN);
                Some(summary)
            }
            Err(err) => {
                warn!("dropping peer packet: {err}");
                self.buffer.clear();
                Some(PeerSummary::default())
            }
        }
    }

    /// Drains every complete packet and keeps the newest.
    pub fn poll_latest(&mut self) -> Option<PeerSummary> {
        let mut latest = None;
        while let Some(summary) = self.poll() {
            latest = Some(summary);
        }
        latest
    }
}
