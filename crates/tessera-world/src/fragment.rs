//! Reassembly of map payloads split over several datagrams.
//!
//! Fragments of one payload share a packet id and carry a byte offset plus
//! the total payload length. They may arrive in any order, more than once,
//! or not at all; buffers that stop receiving data are purged after an idle
//! timeout.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tessera_common::PacketId;
use thiserror::Error;
use tracing::debug;

use crate::message::MapFragment;

/// Fragment errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    /// Fragment bytes extend past the declared payload length
    #[error("fragment {offset}+{len} exceeds payload length {total} (packet {packet:?})")]
    OutOfBounds {
        /// Packet the fragment belongs to
        packet: PacketId,
        /// Fragment offset
        offset: usize,
        /// Fragment length
        len: usize,
        /// Declared payload length
        total: usize,
    },
    /// Fragment disagrees with the buffer already started for its packet
    #[error("packet {packet:?} declared length {declared}, buffer has {expected}")]
    LengthMismatch {
        /// Packet the fragment belongs to
        packet: PacketId,
        /// Length the buffer was created with
        expected: usize,
        /// Length this fragment declared
        declared: usize,
    },
}

/// Partially received payload.
#[derive(Debug)]
pub struct FragmentBuffer {
    /// Payload bytes, valid where covered by `ranges`
    data: Vec<u8>,
    /// Received byte ranges, sorted, disjoint and non-adjacent
    ranges: Vec<(usize, usize)>,
    /// Last time a fragment was merged
    last_touched: Instant,
}

impl FragmentBuffer {
    /// Creates an empty buffer for a payload of `total` bytes.
    #[must_use]
    pub fn new(total: usize, now: Instant) -> Self {
        Self {
            data: vec![0; total],
            ranges: Vec::new(),
            last_touched: now,
        }
    }

    /// Declared payload length.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    /// Bytes received so far, counting overlaps once.
    #[must_use]
    pub fn received_len(&self) -> usize {
        self.ranges.iter().map(|(s, e)| e - s).sum()
    }

    /// Returns true once `[0, total)` has been received.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.data.is_empty() || self.ranges.as_slice() == [(0, self.data.len())]
    }

    /// Copies `bytes` into the buffer at `offset`.
    ///
    /// The caller must have checked that the range fits.
    fn merge(&mut self, offset: usize, bytes: &[u8], now: Instant) {
        self.last_touched = now;
        if bytes.is_empty() {
            return;
        }
        let (mut start, mut end) = (offset, offset + bytes.len());
        self.data[start..end].copy_from_slice(bytes);

        // Absorb every range that overlaps or touches [start, end)
        let mut merged = Vec::with_capacity(self.ranges.len() + 1);
        for &(s, e) in &self.ranges {
            if e < start || s > end {
                merged.push((s, e));
            } else {
                start = start.min(s);
                end = end.max(e);
            }
        }
        let pos = merged.partition_point(|&(s, _)| s < start);
        merged.insert(pos, (start, end));
        self.ranges = merged;
    }

    fn into_payload(self) -> Vec<u8> {
        self.data
    }
}

/// Per-packet reassembly table.
#[derive(Debug)]
pub struct FragmentReassembler {
    buffers: BTreeMap<PacketId, FragmentBuffer>,
    timeout: Duration,
}

impl FragmentReassembler {
    /// Creates a reassembler that purges buffers idle for longer than
    /// `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            buffers: BTreeMap::new(),
            timeout,
        }
    }

    /// Number of payloads still being reassembled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Returns the buffer for `packet`, if one is live.
    #[must_use]
    pub fn buffer(&self, packet: PacketId) -> Option<&FragmentBuffer> {
        self.buffers.get(&packet)
    }

    /// Drops every buffer untouched for longer than the idle timeout.
    /// Returns the number dropped.
    pub fn purge_stale(&mut self, now: Instant) -> usize {
        let before = self.buffers.len();
        let timeout = self.timeout;
        self.buffers.retain(|packet, buf| {
            let keep = now.saturating_duration_since(buf.last_touched) <= timeout;
            if !keep {
                debug!(
                    "Dropping stale fragment buffer {packet:?} ({}/{} bytes)",
                    buf.received_len(),
                    buf.total_len()
                );
            }
            keep
        });
        before - self.buffers.len()
    }

    /// Merges one fragment.
    ///
    /// Stale buffers are purged first, so a fragment for a packet whose
    /// buffer timed out starts a fresh buffer. Returns the whole payload once
    /// its last missing range arrives.
    pub fn accept(
        &mut self,
        fragment: &MapFragment,
        now: Instant,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        self.purge_stale(now);

        let packet = fragment.packet_id;
        let total = usize::from(fragment.total_len);
        let offset = usize::from(fragment.offset);
        let len = fragment.payload.len();
        if offset + len > total {
            return Err(FragmentError::OutOfBounds {
                packet,
                offset,
                len,
                total,
            });
        }

        let buf = self
            .buffers
            .entry(packet)
            .or_insert_with(|| FragmentBuffer::new(total, now));
        if buf.total_len() != total {
            return Err(FragmentError::LengthMismatch {
                packet,
                expected: buf.total_len(),
                declared: total,
            });
        }
        buf.merge(offset, &fragment.payload, now);

        if !buf.is_complete() {
            return Ok(None);
        }
        Ok(self.buffers.remove(&packet).map(FragmentBuffer::into_payload))
    }
}
