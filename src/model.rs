use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix seconds. The only time type.
pub type Secs = i64;

/// Index of an elementary slot inside the term. Ascending id == ascending start.
pub type SlotId = u32;

/// Opaque, already-authenticated requester identity.
pub type UserId = i64;

pub type TagId = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Secs,
    pub end: Secs,
}

impl Span {
    pub fn new(start: Secs, end: Secs) -> Self {
        debug_assert!(start <= end, "Span start must not be after end");
        Self { start, end }
    }

    pub fn duration(&self) -> Secs {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Secs) -> bool {
        self.start <= t && t < self.end
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// The booking term and its slot grid. Fixed at provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermGrid {
    pub term: Span,
    pub slot_width: Secs,
    pub capacity: u32,
}

impl std::fmt::Display for TermGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "term {} ({}s slots, capacity {})",
            self.term, self.slot_width, self.capacity
        )
    }
}

/// A booking attempt. Consumed entirely by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub requester_id: UserId,
    pub title: String,
    pub description: String,
    pub playlist_url: String,
    pub thumbnail_url: String,
    pub start_at: Secs,
    pub end_at: Secs,
    /// Set semantics: order and duplicates are ignored.
    pub tag_ids: Vec<TagId>,
}

/// A scheduled broadcast. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Livestream {
    /// Monotonic ULID: ordering by id is ordering by creation.
    pub id: Ulid,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    pub playlist_url: String,
    pub thumbnail_url: String,
    pub start_at: Secs,
    pub end_at: Secs,
    /// Sorted, deduplicated.
    pub tag_ids: Vec<TagId>,
}

impl Livestream {
    pub fn span(&self) -> Span {
        Span::new(self.start_at, self.end_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Point-in-time view of one elementary slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub id: SlotId,
    pub start: Secs,
    pub end: Secs,
    pub remaining: u32,
}

/// The event types. Flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// First record of every log. Fixes the term and the slot grid for good.
    TermProvisioned(TermGrid),
    TagRegistered {
        id: TagId,
        name: String,
    },
    /// Commit record of one booking: the livestream plus every slot it consumed.
    LivestreamReserved {
        livestream: Livestream,
        slots: Vec<SlotId>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
        assert!(!s.is_empty());
        assert!(Span::new(5, 5).is_empty());
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_display() {
        assert_eq!(Span::new(3600, 7200).to_string(), "[3600, 7200)");
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::LivestreamReserved {
            livestream: Livestream {
                id: Ulid::new(),
                owner_id: 7,
                title: "morning show".into(),
                description: String::new(),
                playlist_url: "https://media.example/playlist.m3u8".into(),
                thumbnail_url: "https://media.example/thumb.jpg".into(),
                start_at: 3600,
                end_at: 7200,
                tag_ids: vec![1, 4],
            },
            slots: vec![1],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
