//! Grace-period reorder buffer.
//!
//! Step reports cross the network out of order. Each workflow gets one
//! of these buffers: a report whose sequence is not yet applicable
//! waits here, and is released either when its predecessors arrive
//! (in-order release, no gap) or when its grace period lapses (forced
//! release, the skipped sequences become gaps at the caller).

use chrono::{DateTime, Duration, Utc};
use mesh_types::TelemetryEvent;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Buffered {
    event: TelemetryEvent,
    buffered_at: DateTime<Utc>,
}

/// An event leaving the buffer, tagged with whether it waited past its
/// grace period.
#[derive(Debug, Clone)]
pub struct Released {
    pub event: TelemetryEvent,
    /// True when the event is released despite missing predecessors.
    pub forced: bool,
}

/// Per-workflow sequence reorder buffer.
#[derive(Debug)]
pub struct ReorderBuffer {
    grace: Duration,
    pending: BTreeMap<u64, Buffered>,
}

impl ReorderBuffer {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            pending: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffer one step report. A duplicate sequence replaces the held
    /// event (retries carry the fresher outcome).
    pub fn push(&mut self, event: TelemetryEvent, now: DateTime<Utc>) {
        let Some(sequence) = event.sequence else {
            return;
        };
        self.pending.insert(
            sequence,
            Buffered {
                event,
                buffered_at: now,
            },
        );
    }

    /// Release every event that is applicable now, in sequence order.
    ///
    /// An event is applicable when its sequence is the next expected
    /// one (or the expectation is still unset), or when it has waited
    /// longer than the grace period. Forced releases are flagged so the
    /// caller can record the skipped sequences.
    pub fn drain_ready(&mut self, next_expected: Option<u64>, now: DateTime<Utc>) -> Vec<Released> {
        let mut released = Vec::new();
        let mut expected = next_expected;

        loop {
            let Some((&sequence, buffered)) = self.pending.iter().next() else {
                break;
            };
            let in_order = match expected {
                None => true,
                Some(e) => sequence <= e,
            };
            let overdue = now - buffered.buffered_at >= self.grace;
            if !in_order && !overdue {
                break;
            }
            let buffered = self
                .pending
                .remove(&sequence)
                .expect("peeked entry vanished");
            released.push(Released {
                event: buffered.event,
                forced: !in_order,
            });
            expected = Some(sequence + 1);
        }

        released
    }
}
