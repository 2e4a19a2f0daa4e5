use crate::model::{SlotId, Span, TagId, TermGrid};

#[derive(Debug)]
pub enum EngineError {
    /// Requested range does not intersect the term.
    OutOfTerm(Span),
    /// End before start.
    InvalidRange(Span),
    /// A covering slot has no capacity left. Carries the first exhausted slot.
    InsufficientCapacity(Span),
    /// Decrement attempted on a slot already at zero.
    CapacityExhausted(SlotId),
    LimitExceeded(&'static str),
    InvalidTerm(&'static str),
    /// The log was provisioned for a different term or grid.
    TermMismatch {
        stored: TermGrid,
        configured: TermGrid,
    },
    TagExists(TagId),
    /// Storage or commit failure. Nothing was applied.
    OperationFailed(String),
}

impl EngineError {
    /// User-correctable outcomes: retrying the same request cannot succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::OutOfTerm(_)
                | EngineError::InvalidRange(_)
                | EngineError::InsufficientCapacity(_)
                | EngineError::CapacityExhausted(_)
                | EngineError::LimitExceeded(_)
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::OutOfTerm(_) => "out_of_term",
            EngineError::InvalidRange(_) => "invalid_range",
            EngineError::InsufficientCapacity(_) | EngineError::CapacityExhausted(_) => {
                "insufficient_capacity"
            }
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::InvalidTerm(_) => "invalid_term",
            EngineError::TermMismatch { .. } => "term_mismatch",
            EngineError::TagExists(_) => "tag_exists",
            EngineError::OperationFailed(_) => "operation_failed",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::OutOfTerm(span) => {
                write!(f, "reservation {span} is outside the booking term")
            }
            EngineError::InvalidRange(span) => {
                write!(f, "invalid reservation range {span}: end precedes start")
            }
            EngineError::InsufficientCapacity(slot) => {
                write!(f, "no capacity left in slot {slot}")
            }
            EngineError::CapacityExhausted(id) => write!(f, "slot {id} capacity exhausted"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvalidTerm(msg) => write!(f, "invalid term: {msg}"),
            EngineError::TermMismatch { stored, configured } => {
                write!(f, "log provisioned for {stored} but configured for {configured}")
            }
            EngineError::TagExists(id) => write!(f, "tag {id} already registered"),
            EngineError::OperationFailed(e) => write!(f, "operation failed: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
