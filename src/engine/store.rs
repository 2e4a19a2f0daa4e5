use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::*;

use super::term::TermPolicy;
use super::EngineError;

/// One elementary slot. Only its `remaining` field ever changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotState {
    pub id: SlotId,
    pub span: Span,
    pub remaining: u32,
}

impl SlotState {
    pub fn info(&self) -> SlotInfo {
        SlotInfo {
            id: self.id,
            start: self.span.start,
            end: self.span.end,
            remaining: self.remaining,
        }
    }
}

pub type SharedSlot = Arc<Mutex<SlotState>>;

/// Full-capacity slot states tiling the term.
pub fn grid_states(policy: &TermPolicy) -> Vec<SlotState> {
    let grid = policy.grid();
    let mut states = Vec::new();
    let mut start = grid.term.start;
    while start < grid.term.end {
        let end = start.saturating_add(grid.slot_width).min(grid.term.end);
        states.push(SlotState {
            id: states.len() as SlotId,
            span: Span::new(start, end),
            remaining: grid.capacity,
        });
        start = end;
    }
    states
}

/// Slot grid tiling the term, one lock per slot.
///
/// `spans` is the immutable geometry, kept outside the locks so range lookups
/// never wait on a booking in flight.
pub struct SlotStore {
    slots: Vec<SharedSlot>,
    spans: Vec<Span>,
}

impl SlotStore {
    /// Tile the term with `slot_width` slots, each at full capacity.
    /// The last slot is cut at the term end when the width does not divide it.
    pub fn provision(policy: &TermPolicy) -> Self {
        Self::from_states(grid_states(policy))
    }

    /// Wrap already-built slot states (used after replay).
    pub fn from_states(states: Vec<SlotState>) -> Self {
        let spans = states.iter().map(|s| s.span).collect();
        let slots = states
            .into_iter()
            .map(|s| Arc::new(Mutex::new(s)))
            .collect();
        Self { slots, spans }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index range of slots intersecting `span`, via binary search on the grid.
    ///
    /// An empty span `[x, x)` resolves to the slot containing `x`.
    pub fn covering(&self, span: Span) -> std::ops::Range<usize> {
        let end = span.end.max(span.start.saturating_add(1));
        let left = self.spans.partition_point(|s| s.end <= span.start);
        let right = self.spans.partition_point(|s| s.start < end);
        left..right.max(left)
    }

    pub fn covering_ids(&self, span: Span) -> Vec<SlotId> {
        self.covering(span).map(|i| i as SlotId).collect()
    }

    /// Lock every slot intersecting `span`, in ascending start order.
    ///
    /// Every caller goes through here, so two bookings overlapping in any way
    /// always contend in the same order and cannot deadlock.
    pub async fn lock_covering(&self, span: Span) -> SlotLease {
        let range = self.covering(span);
        let mut guards = Vec::with_capacity(range.len());
        for slot in &self.slots[range] {
            guards.push(slot.clone().lock_owned().await);
        }
        SlotLease {
            guards,
            decremented: 0,
            committed: false,
        }
    }

    /// Remaining capacity of each slot intersecting `span`. Each slot is read
    /// under its own lock; the result is not a consistent cut across slots.
    pub async fn snapshot(&self, span: Span) -> Vec<SlotInfo> {
        let mut out = Vec::new();
        for slot in &self.slots[self.covering(span)] {
            out.push(slot.lock().await.info());
        }
        out
    }
}

/// Exclusive hold on a run of slots for one unit of work.
///
/// Decrements are applied to the locked slots in place; dropping the lease
/// without [`SlotLease::commit`] puts every decremented unit back before the
/// locks are released, so no other booking ever observes a partial decrement.
pub struct SlotLease {
    guards: Vec<OwnedMutexGuard<SlotState>>,
    decremented: usize,
    committed: bool,
}

impl SlotLease {
    pub fn slots(&self) -> impl Iterator<Item = &SlotState> {
        self.guards.iter().map(|g| &**g)
    }

    pub fn ids(&self) -> Vec<SlotId> {
        self.guards.iter().map(|g| g.id).collect()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// First slot (ascending) with no capacity left.
    pub fn first_exhausted(&self) -> Option<&SlotState> {
        self.slots().find(|s| s.remaining == 0)
    }

    /// Take one unit from every held slot. Capacity is re-read under the lock;
    /// on the first empty slot nothing further is taken and the error names it.
    pub fn decrement_all(&mut self) -> Result<(), EngineError> {
        while self.decremented < self.guards.len() {
            let slot = &mut self.guards[self.decremented];
            if slot.remaining == 0 {
                return Err(EngineError::CapacityExhausted(slot.id));
            }
            slot.remaining -= 1;
            self.decremented += 1;
        }
        Ok(())
    }

    /// Keep the decrements and release the locks.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for slot in &mut self.guards[..self.decremented] {
            slot.remaining += 1;
        }
    }
}
