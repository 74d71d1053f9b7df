//! Outstanding grid requests and their retry schedule.

use std::time::{Duration, Instant};

use ahash::AHashMap;
use tessera_common::{Coord, MessageWriter};
use tracing::debug;

/// Message type byte of an outbound grid request.
pub const MSG_MAP_REQUEST: u8 = 4;

/// Retry state of one grid that has been asked for but not received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRequest {
    /// When the last request went out, `None` before the first one
    pub last_request: Option<Instant>,
    /// Requests sent so far
    pub attempts: u32,
}

impl PendingRequest {
    fn is_due(&self, now: Instant, interval: Duration) -> bool {
        self.last_request
            .map_or(true, |last| now.saturating_duration_since(last) > interval)
    }
}

/// Outbound "send me this grid" message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridRequest {
    /// Grid coordinate wanted
    pub gc: Coord,
}

impl GridRequest {
    /// Encodes the request as a session message.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        MessageWriter::with_type(MSG_MAP_REQUEST).coord(self.gc).finish()
    }
}

/// Fixed-rate retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Minimum time between two requests for the same grid
    pub interval: Duration,
    /// Requests sent before giving up
    pub max_attempts: u32,
}

/// Set of pending grid requests keyed by grid coordinate.
#[derive(Debug, Default)]
pub struct RequestTable {
    pending: AHashMap<Coord, PendingRequest>,
}

impl RequestTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures a request exists for `gc`. An existing request keeps its
    /// backoff state. Returns true if a new request was created.
    pub fn register(&mut self, gc: Coord) -> bool {
        if self.pending.contains_key(&gc) {
            return false;
        }
        self.pending.insert(gc, PendingRequest::default());
        true
    }

    /// Removes the request for `gc`, returning it if one existed.
    pub fn remove(&mut self, gc: Coord) -> Option<PendingRequest> {
        self.pending.remove(&gc)
    }

    /// Returns true if a request is pending for `gc`.
    #[must_use]
    pub fn contains(&self, gc: Coord) -> bool {
        self.pending.contains_key(&gc)
    }

    /// Returns the retry state for `gc`.
    #[must_use]
    pub fn get(&self, gc: Coord) -> Option<&PendingRequest> {
        self.pending.get(&gc)
    }

    /// Number of pending requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Iterates over pending coordinates.
    pub fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
        self.pending.keys().copied()
    }

    /// Drops every request outside the inclusive rectangle `[ul, lr]`.
    /// Returns the number dropped.
    pub fn retain_within(&mut self, ul: Coord, lr: Coord) -> usize {
        let before = self.pending.len();
        self.pending.retain(|gc, _| gc.within(ul, lr));
        before - self.pending.len()
    }

    /// Drops every request.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Advances the retry schedule to `now`.
    ///
    /// Every request whose last send is older than the policy interval is
    /// either sent again or, once it has been sent `max_attempts` times,
    /// dropped. Returns the requests to put on the wire.
    pub fn poll(&mut self, now: Instant, policy: RetryPolicy) -> Vec<GridRequest> {
        let mut out = Vec::new();
        self.pending.retain(|&gc, req| {
            if !req.is_due(now, policy.interval) {
                return true;
            }
            if req.attempts >= policy.max_attempts {
                debug!("Giving up on grid {gc} after {} requests", req.attempts);
                return false;
            }
            req.attempts += 1;
            req.last_request = Some(now);
            out.push(GridRequest { gc });
            true
        });
        out
    }
}
