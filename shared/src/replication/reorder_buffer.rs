use std::collections::VecDeque;

use log::trace;

use crate::{replication::ReplicationDelta, stamp::Stamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Held until every earlier stamp has arrived
    Accepted,
    /// Already applied or already waiting
    Duplicate,
    /// Older than the next expected stamp
    Stale,
    /// Too far ahead of the next expected stamp to wait for the gap
    DriftExceeded { expected: Stamp, received: Stamp },
    /// No baseline yet; kept until the next snapshot
    AwaitingSnapshot,
}

/// Releases one pool's deltas strictly in timestamp order.
///
/// A window of `drift_window` stamps starting at the next expected stamp is
/// kept, filled in as deltas arrive and drained from the front once it is
/// contiguous.
pub struct DeltaReorderBuffer {
    next_stamp: Option<Stamp>,
    window: VecDeque<Option<ReplicationDelta>>,
    parked: Vec<ReplicationDelta>,
    drift_window: u16,
}

impl DeltaReorderBuffer {
    /// A buffer expecting the first stamp a fresh server pool issues.
    pub fn new(drift_window: u16) -> Self {
        Self {
            next_stamp: Some(Stamp::new(0).next()),
            window: VecDeque::new(),
            parked: Vec::new(),
            drift_window,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.next_stamp.is_some()
    }

    pub fn next_stamp(&self) -> Option<Stamp> {
        self.next_stamp
    }

    pub fn buffered(&self) -> usize {
        self.window.iter().filter(|entry| entry.is_some()).count() + self.parked.len()
    }

    pub fn push(&mut self, delta: ReplicationDelta) -> Admission {
        let Some(next_stamp) = self.next_stamp else {
            if self.parked.len() >= usize::from(self.drift_window) {
                self.parked.remove(0);
            }
            self.parked.push(delta);
            return Admission::AwaitingSnapshot;
        };

        let received = delta.authoritative_timestamp;
        let offset = next_stamp.distance_to(&received);
        if offset < 0 {
            return Admission::Stale;
        }
        let offset = offset as usize;
        if offset >= usize::from(self.drift_window) {
            return Admission::DriftExceeded {
                expected: next_stamp,
                received,
            };
        }

        while self.window.len() <= offset {
            self.window.push_back(None);
        }
        let entry = &mut self.window[offset];
        if entry.is_some() {
            return Admission::Duplicate;
        }
        trace!("Buffered delta {} while expecting {}", received, next_stamp);
        *entry = Some(delta);
        Admission::Accepted
    }

    /// Pops every delta that is now contiguous with the last applied stamp.
    pub fn drain_ready(&mut self) -> Vec<ReplicationDelta> {
        let mut output = Vec::new();
        let Some(mut next_stamp) = self.next_stamp else {
            return output;
        };
        while let Some(Some(_)) = self.window.front() {
            if let Some(Some(delta)) = self.window.pop_front() {
                output.push(delta);
                next_stamp = next_stamp.next();
            }
        }
        self.next_stamp = Some(next_stamp);
        output
    }

    /// Drops the baseline; deltas are parked until `resynchronize`.
    pub fn desynchronize(&mut self) {
        if let Some(next_stamp) = self.next_stamp.take() {
            let waiting = std::mem::take(&mut self.window);
            self.parked.extend(waiting.into_iter().flatten());
            trace!("Desynchronized while expecting {}", next_stamp);
        }
    }

    /// Forgets everything and expects a fresh server pool again.
    pub fn clear(&mut self) {
        self.next_stamp = Some(Stamp::new(0).next());
        self.window.clear();
        self.parked.clear();
    }

    /// Restarts after a snapshot taken at `snapshot_stamp`. Parked deltas
    /// newer than the snapshot are replayed into the window.
    pub fn resynchronize(&mut self, snapshot_stamp: Stamp) {
        self.next_stamp = Some(snapshot_stamp.next());
        self.window.clear();
        let parked = std::mem::take(&mut self.parked);
        for delta in parked {
            if delta.authoritative_timestamp.is_newer_than(&snapshot_stamp) {
                self.push(delta);
            }
        }
    }
}
