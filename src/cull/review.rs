//! Delete review sub-session and the pre-sort decision.

/// Which deletes a review session walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewScope {
    /// Only files marked Delete since the folder was loaded.
    Session,
    /// Every file currently marked Delete.
    All,
}

/// What the presentation layer should ask before sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortPrompt {
    /// No file is marked Keep or Delete.
    NothingToSort,
    /// Nothing is marked Delete; sort without review.
    SortDirectly,
    /// Review all deletes, or skip review and sort.
    ReviewOrSort { deletes: usize },
    /// Deletes are a mix of this session's and carried-over ones: review the
    /// session's, review all, or skip review and sort.
    ChooseReviewScope {
        session_deletes: usize,
        total_deletes: usize,
    },
}

impl SortPrompt {
    pub fn from_counts(keep: usize, total_deletes: usize, session_deletes: usize) -> Self {
        if keep == 0 && total_deletes == 0 {
            SortPrompt::NothingToSort
        } else if total_deletes == 0 {
            SortPrompt::SortDirectly
        } else if session_deletes > 0 && session_deletes < total_deletes {
            SortPrompt::ChooseReviewScope {
                session_deletes,
                total_deletes,
            }
        } else {
            SortPrompt::ReviewOrSort {
                deletes: total_deletes,
            }
        }
    }

    pub fn offers_review(&self) -> bool {
        matches!(
            self,
            SortPrompt::ReviewOrSort { .. } | SortPrompt::ChooseReviewScope { .. }
        )
    }
}

/// A static walk over delete-marked indices.
///
/// The subsequence is fixed when the session starts; re-marking an entry
/// during review does not remove it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewSession {
    scope: ReviewScope,
    indices: Vec<usize>,
    cursor: usize,
}

impl ReviewSession {
    /// `None` when there is nothing to review.
    pub fn new(scope: ReviewScope, indices: Vec<usize>) -> Option<Self> {
        if indices.is_empty() {
            return None;
        }
        Some(Self {
            scope,
            indices,
            cursor: 0,
        })
    }

    pub fn scope(&self) -> ReviewScope {
        self.scope
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Image index under the cursor.
    pub fn current(&self) -> usize {
        self.indices[self.cursor]
    }

    /// Cursor position within the subsequence.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Move the cursor by `delta`; out-of-range moves are ignored.
    pub fn step(&mut self, delta: isize) -> bool {
        match self.cursor.checked_add_signed(delta) {
            Some(next) if next < self.indices.len() => {
                self.cursor = next;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_nothing_marked() {
        assert_eq!(SortPrompt::from_counts(0, 0, 0), SortPrompt::NothingToSort);
        assert_eq!(SortPrompt::from_counts(3, 0, 0), SortPrompt::SortDirectly);
    }

    #[test]
    fn test_prompt_three_way_only_for_mixed_deletes() {
        assert_eq!(
            SortPrompt::from_counts(0, 5, 2),
            SortPrompt::ChooseReviewScope {
                session_deletes: 2,
                total_deletes: 5
            }
        );
        // All deletes from this session, or all carried over: plain yes/no.
        assert_eq!(
            SortPrompt::from_counts(1, 4, 4),
            SortPrompt::ReviewOrSort { deletes: 4 }
        );
        assert_eq!(
            SortPrompt::from_counts(0, 4, 0),
            SortPrompt::ReviewOrSort { deletes: 4 }
        );
        assert!(SortPrompt::from_counts(0, 4, 0).offers_review());
        assert!(!SortPrompt::SortDirectly.offers_review());
    }

    #[test]
    fn test_empty_session_is_none() {
        assert!(ReviewSession::new(ReviewScope::All, vec![]).is_none());
    }

    #[test]
    fn test_step_clamps() {
        let mut session = ReviewSession::new(ReviewScope::Session, vec![2, 7, 9]).unwrap();
        assert_eq!(session.current(), 2);
        assert!(!session.step(-1));
        assert!(session.step(2));
        assert_eq!(session.current(), 9);
        assert!(!session.step(1));
        assert!(session.step(-1));
        assert_eq!(session.current(), 7);
        assert_eq!(session.position(), 1);
    }
}
