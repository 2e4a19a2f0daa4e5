use crate::limits::MAX_SLOTS_PER_TERM;
use crate::model::*;

use super::EngineError;

/// The single booking term every request is checked against. Immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermPolicy {
    grid: TermGrid,
}

impl TermPolicy {
    pub fn new(grid: TermGrid) -> Result<Self, EngineError> {
        if grid.term.start >= grid.term.end {
            return Err(EngineError::InvalidTerm("term start must precede term end"));
        }
        if grid.slot_width <= 0 {
            return Err(EngineError::InvalidTerm("slot width must be positive"));
        }
        if grid.capacity == 0 {
            return Err(EngineError::InvalidTerm("slot capacity must be positive"));
        }
        let length = grid
            .term
            .end
            .checked_sub(grid.term.start)
            .ok_or(EngineError::InvalidTerm("term too long"))?;
        let slots = (length as u64).div_ceil(grid.slot_width as u64);
        if slots > MAX_SLOTS_PER_TERM {
            return Err(EngineError::InvalidTerm("too many slots in term"));
        }
        // Every slot end, including the last one before clipping, must be representable.
        if grid.term.end.checked_add(grid.slot_width).is_none() {
            return Err(EngineError::InvalidTerm("term end too close to the time limit"));
        }
        Ok(Self { grid })
    }

    pub fn grid(&self) -> TermGrid {
        self.grid
    }

    pub fn term(&self) -> Span {
        self.grid.term
    }

    /// Accept `[start, end)` iff it intersects the term. Both edges reject on equality:
    /// `start >= term.end` or `end <= term.start` is out of term, whatever the
    /// order of `start` and `end`.
    pub fn validate(&self, start: Secs, end: Secs) -> Result<Span, EngineError> {
        let term = self.grid.term;
        if start >= term.end || end <= term.start {
            return Err(EngineError::OutOfTerm(Span { start, end }));
        }
        if end < start {
            return Err(EngineError::InvalidRange(Span { start, end }));
        }
        Ok(Span::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Secs = 3600;

    fn policy() -> TermPolicy {
        TermPolicy::new(TermGrid {
            term: Span::new(100 * H, 200 * H),
            slot_width: H,
            capacity: 1,
        })
        .unwrap()
    }

    #[test]
    fn inside_and_straddling_accepted() {
        let p = policy();
        assert!(p.validate(110 * H, 112 * H).is_ok());
        assert!(p.validate(90 * H, 101 * H).is_ok());
        assert!(p.validate(199 * H, 210 * H).is_ok());
        assert!(p.validate(0, 1000 * H).is_ok());
    }

    #[test]
    fn start_at_term_end_rejected() {
        let p = policy();
        assert!(matches!(
            p.validate(200 * H, 201 * H),
            Err(EngineError::OutOfTerm(_))
        ));
        assert!(p.validate(200 * H - 1, 201 * H).is_ok());
    }

    #[test]
    fn end_at_term_start_rejected() {
        let p = policy();
        assert!(matches!(
            p.validate(99 * H, 100 * H),
            Err(EngineError::OutOfTerm(_))
        ));
        assert!(p.validate(99 * H, 100 * H + 1).is_ok());
    }

    #[test]
    fn entirely_outside_rejected() {
        let p = policy();
        assert!(matches!(p.validate(0, H), Err(EngineError::OutOfTerm(_))));
        assert!(matches!(
            p.validate(300 * H, 301 * H),
            Err(EngineError::OutOfTerm(_))
        ));
    }

    #[test]
    fn zero_length_inside_accepted() {
        let p = policy();
        assert_eq!(p.validate(150 * H, 150 * H).unwrap(), Span::new(150 * H, 150 * H));
        // A zero-length range at the term start has end == term start.
        assert!(matches!(
            p.validate(100 * H, 100 * H),
            Err(EngineError::OutOfTerm(_))
        ));
    }

    #[test]
    fn inverted_range_rejected() {
        let p = policy();
        let err = p.validate(120 * H, 110 * H).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(_)));
        assert!(err.is_rejection());
    }

    #[test]
    fn inverted_range_outside_term_is_out_of_term() {
        let p = policy();
        assert!(matches!(
            p.validate(240 * H, 210 * H),
            Err(EngineError::OutOfTerm(_))
        ));
        assert!(matches!(
            p.validate(90 * H, 80 * H),
            Err(EngineError::OutOfTerm(_))
        ));
    }

    fn grid(term: Span, slot_width: Secs, capacity: u32) -> TermGrid {
        TermGrid {
            term,
            slot_width,
            capacity,
        }
    }

    #[test]
    fn invalid_grids() {
        let term = Span::new(0, 10 * H);
        assert!(TermPolicy::new(grid(Span::new(5, 5), H, 1)).is_err());
        assert!(TermPolicy::new(grid(term, 0, 1)).is_err());
        assert!(TermPolicy::new(grid(term, H, 0)).is_err());
        assert!(TermPolicy::new(grid(term, 1, 1)).is_ok());
        let huge = Span::new(0, (MAX_SLOTS_PER_TERM as Secs + 1) * 60);
        assert!(TermPolicy::new(grid(huge, 60, 1)).is_err());
    }

    #[test]
    fn extreme_grids_rejected_without_overflow() {
        let whole_range = Span::new(Secs::MIN, Secs::MAX);
        assert!(matches!(
            TermPolicy::new(grid(whole_range, H, 1)),
            Err(EngineError::InvalidTerm(_))
        ));
        let near_limit = Span::new(Secs::MAX - 10 * H, Secs::MAX - H);
        assert!(matches!(
            TermPolicy::new(grid(near_limit, 2 * H, 1)),
            Err(EngineError::InvalidTerm(_))
        ));
        assert!(matches!(
            TermPolicy::new(grid(Span::new(0, 10 * H), Secs::MAX, 1)),
            Err(EngineError::InvalidTerm(_))
        ));
    }
}
