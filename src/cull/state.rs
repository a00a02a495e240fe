//! Per-file marks, undo log, navigation and the review state machine.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::phase::Phase;
use super::review::{ReviewScope, ReviewSession, SortPrompt};
use crate::error::{CullError, Result};
use crate::models::{ImageEntry, Mark, MarkSummary, MovePlan};
use crate::scanner::ScanResult;

/// One mark transition: the mark `path` had before it was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoRecord {
    pub path: PathBuf,
    pub previous: Mark,
}

/// Culling session over an ordered, fixed list of RAW files.
#[derive(Debug)]
pub struct CullState {
    root: PathBuf,
    entries: Vec<ImageEntry>,
    by_path: HashMap<PathBuf, usize>,
    undo_log: Vec<UndoRecord>,
    summary: MarkSummary,
    cursor: usize,
    phase: Phase,
    review: Option<ReviewSession>,
    /// Clockwise quarter turns applied for display.
    rotations: HashMap<usize, u8>,
    sidecars: HashMap<PathBuf, PathBuf>,
}

impl CullState {
    /// Build a session from `(path, initial mark)` pairs in display order.
    /// Duplicate paths keep their first occurrence.
    pub fn new(root: PathBuf, files: Vec<(PathBuf, Mark)>) -> Result<Self> {
        let mut entries = Vec::with_capacity(files.len());
        let mut by_path = HashMap::with_capacity(files.len());
        let mut summary = MarkSummary::default();

        for (path, mark) in files {
            if by_path.contains_key(&path) {
                warn!(?path, "Duplicate path in image list, ignoring");
                continue;
            }
            let index = entries.len();
            by_path.insert(path.clone(), index);
            count_mark(&mut summary, mark, 1);
            entries.push(ImageEntry::new(index, path, mark));
        }

        if entries.is_empty() {
            return Err(CullError::EmptyFolder { path: root });
        }

        debug!(?root, images = entries.len(), %summary, "Loaded culling session");

        Ok(Self {
            root,
            entries,
            by_path,
            undo_log: Vec::new(),
            summary,
            cursor: 0,
            phase: Phase::Browsing,
            review: None,
            rotations: HashMap::new(),
            sidecars: HashMap::new(),
        })
    }

    /// Build a session from a folder scan, carrying sidecar pairs into the move plan.
    pub fn from_scan(scan: ScanResult) -> Result<Self> {
        let sidecars = scan.sidecars();
        let files = scan
            .files
            .into_iter()
            .map(|f| (f.path, f.initial_mark))
            .collect();
        let mut state = Self::new(scan.root, files)?;
        state.sidecars = sidecars;
        Ok(state)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&ImageEntry> {
        self.entries.get(index)
    }

    /// Paths in display order, for the preview cache.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn mark(&self, path: &Path) -> Mark {
        self.index_of(path)
            .map(|i| self.entries[i].mark)
            .unwrap_or_default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    // ---- Marks ----

    /// Record the current mark of `path` for undo, then set it to `mark`.
    ///
    /// Setting a mark to its current value still records an undo entry.
    /// Returns false for unknown paths or once the session has ended.
    pub fn set_mark(&mut self, path: &Path, mark: Mark) -> bool {
        if self.phase.is_terminal() {
            warn!(?path, "Ignoring mark change after sort started");
            return false;
        }
        let Some(index) = self.index_of(path) else {
            warn!(?path, "Ignoring mark for unknown path");
            return false;
        };

        let previous = self.entries[index].mark;
        self.undo_log.push(UndoRecord {
            path: path.to_path_buf(),
            previous,
        });
        self.apply_mark(index, mark);
        true
    }

    /// Restore the most recent mark change. Returns the affected path so the
    /// caller can refocus on it, or `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<PathBuf> {
        if self.phase.is_terminal() {
            return None;
        }
        let record = self.undo_log.pop()?;
        if let Some(index) = self.index_of(&record.path) {
            self.apply_mark(index, record.previous);
        }
        debug!(path = ?record.path, restored = %record.previous, "Undid mark");
        Some(record.path)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_log.len()
    }

    /// Mark every listed, currently unmarked path Keep without recording undo
    /// entries. Returns how many were changed.
    pub fn auto_keep<'a, I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut applied = 0;
        for path in paths {
            if let Some(index) = self.index_of(path) {
                if self.entries[index].mark == Mark::None {
                    self.apply_mark(index, Mark::Keep);
                    applied += 1;
                }
            }
        }
        if applied > 0 {
            info!(applied, "Auto-kept previously edited files");
        }
        applied
    }

    fn apply_mark(&mut self, index: usize, mark: Mark) {
        let entry = &mut self.entries[index];
        count_mark(&mut self.summary, entry.mark, -1);
        count_mark(&mut self.summary, mark, 1);
        entry.mark = mark;
    }

    pub fn summary(&self) -> MarkSummary {
        self.summary
    }

    /// Files marked Delete since load, excluding deletes carried over from disk.
    pub fn session_delete_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_session_delete()).count()
    }

    /// First unmarked index at or after `from`.
    pub fn first_unmarked(&self, from: usize) -> Option<usize> {
        self.entries
            .iter()
            .skip(from)
            .find(|e| e.mark == Mark::None)
            .map(|e| e.index)
    }

    // ---- Navigation ----

    pub fn current_index(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> &ImageEntry {
        &self.entries[self.cursor]
    }

    /// Move by `delta` within the active sequence: the whole list while
    /// browsing, the review subsequence while reviewing. Out-of-range moves
    /// are ignored.
    pub fn navigate(&mut self, delta: isize) -> bool {
        match self.phase {
            Phase::Browsing => match self.cursor.checked_add_signed(delta) {
                Some(next) if next < self.entries.len() => {
                    self.cursor = next;
                    true
                }
                _ => false,
            },
            Phase::Reviewing => {
                let Some(review) = self.review.as_mut() else {
                    return false;
                };
                let moved = review.step(delta);
                self.cursor = review.current();
                moved
            }
            Phase::Terminal => false,
        }
    }

    /// Jump to `index`. Only while browsing.
    pub fn go_to(&mut self, index: usize) -> bool {
        if self.phase != Phase::Browsing || index >= self.entries.len() {
            return false;
        }
        self.cursor = index;
        true
    }

    /// Jump to `path`, typically the one returned by [`undo`](Self::undo).
    pub fn focus(&mut self, path: &Path) -> bool {
        match self.index_of(path) {
            Some(index) => self.go_to(index),
            None => false,
        }
    }

    /// Mark the current image. While browsing, Keep and Delete advance to the
    /// next image; clearing a mark stays put.
    pub fn mark_current(&mut self, mark: Mark) -> bool {
        let path = self.entries[self.cursor].path.clone();
        if !self.set_mark(&path, mark) {
            return false;
        }
        if self.phase == Phase::Browsing && mark.is_set() && self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
        true
    }

    // ---- Rotation ----

    pub fn rotation(&self, index: usize) -> u8 {
        self.rotations.get(&index).copied().unwrap_or(0)
    }

    /// Turn the current image by `delta_quarters` (positive is clockwise).
    pub fn rotate_current(&mut self, delta_quarters: i8) -> u8 {
        let next = (self.rotation(self.cursor) as i8 + delta_quarters).rem_euclid(4) as u8;
        if next == 0 {
            self.rotations.remove(&self.cursor);
        } else {
            self.rotations.insert(self.cursor, next);
        }
        next
    }

    // ---- Review and sort ----

    /// Delete-marked indices in list order, optionally restricted to
    /// deletions made in this session.
    pub fn review_indices(&self, scope: ReviewScope) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|e| match scope {
                ReviewScope::All => e.mark == Mark::Delete,
                ReviewScope::Session => e.is_session_delete(),
            })
            .map(|e| e.index)
            .collect()
    }

    /// Decision the caller must offer before sorting.
    pub fn sort_prompt(&self) -> SortPrompt {
        SortPrompt::from_counts(
            self.summary.keep,
            self.summary.delete,
            self.session_delete_count(),
        )
    }

    /// Enter review over the static delete subsequence for `scope`.
    ///
    /// Returns the subsequence. When it is empty the phase is unchanged and
    /// the caller should sort directly.
    pub fn start_review(&mut self, scope: ReviewScope) -> Result<Vec<usize>> {
        self.require(Phase::Browsing, "start review")?;
        let indices = self.review_indices(scope);
        if let Some(session) = ReviewSession::new(scope, indices.clone()) {
            self.cursor = session.current();
            self.review = Some(session);
            self.phase = Phase::Reviewing;
            debug!(?scope, count = indices.len(), "Started delete review");
        }
        Ok(indices)
    }

    pub fn review(&self) -> Option<&ReviewSession> {
        self.review.as_ref()
    }

    /// Leave review and resume browsing at the image last reviewed.
    pub fn cancel_review(&mut self) -> Result<()> {
        self.require(Phase::Reviewing, "cancel review")?;
        self.review = None;
        self.phase = Phase::Browsing;
        debug!("Cancelled delete review");
        Ok(())
    }

    /// Confirm review and hand off the move plan.
    pub fn confirm_review(&mut self) -> Result<MovePlan> {
        self.require(Phase::Reviewing, "confirm review")?;
        self.review = None;
        self.finish()
    }

    /// Sort without reviewing.
    pub fn skip_review(&mut self) -> Result<MovePlan> {
        self.require(Phase::Browsing, "sort")?;
        self.finish()
    }

    fn finish(&mut self) -> Result<MovePlan> {
        self.phase = Phase::Terminal;
        let plan = self.build_move_plan();
        info!(summary = %self.summary, "Handing off move plan");
        Ok(plan)
    }

    /// Snapshot of the full mark mapping.
    pub fn build_move_plan(&self) -> MovePlan {
        let marks: BTreeMap<PathBuf, Mark> = self
            .entries
            .iter()
            .map(|e| (e.path.clone(), e.mark))
            .collect();
        MovePlan::new(marks).with_sidecars(self.sidecars.clone())
    }

    fn require(&self, expected: Phase, action: &'static str) -> Result<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(CullError::InvalidTransition {
                from: self.phase.name(),
                action,
            })
        }
    }
}

fn count_mark(summary: &mut MarkSummary, mark: Mark, delta: isize) {
    let slot = match mark {
        Mark::Keep => &mut summary.keep,
        Mark::Delete => &mut summary.delete,
        Mark::None => &mut summary.unmarked,
    };
    *slot = slot.saturating_add_signed(delta);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(marks: &[(&str, Mark)]) -> CullState {
        let files = marks
            .iter()
            .map(|(name, mark)| (PathBuf::from(format!("/shoot/{}", name)), *mark))
            .collect();
        CullState::new(PathBuf::from("/shoot"), files).unwrap()
    }

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/shoot/{}", name))
    }

    fn marks_of(state: &CullState) -> Vec<Mark> {
        state.entries().iter().map(|e| e.mark).collect()
    }

    #[test]
    fn test_empty_list_is_error() {
        let err = CullState::new(PathBuf::from("/empty"), vec![]).unwrap_err();
        assert!(matches!(err, CullError::EmptyFolder { .. }));
    }

    #[test]
    fn test_duplicates_dropped() {
        let state = CullState::new(
            PathBuf::from("/shoot"),
            vec![(p("a.nef"), Mark::None), (p("a.nef"), Mark::Keep)],
        )
        .unwrap();
        assert_eq!(state.len(), 1);
        assert_eq!(state.mark(&p("a.nef")), Mark::None);
    }

    #[test]
    fn test_set_mark_and_undo() {
        let mut state = state(&[("a.nef", Mark::None), ("b.nef", Mark::None)]);
        assert!(state.set_mark(&p("a.nef"), Mark::Keep));
        assert!(state.set_mark(&p("b.nef"), Mark::Delete));
        assert_eq!(state.undo_depth(), 2);

        assert_eq!(state.undo(), Some(p("b.nef")));
        assert_eq!(state.mark(&p("b.nef")), Mark::None);
        assert_eq!(state.undo(), Some(p("a.nef")));
        assert_eq!(state.mark(&p("a.nef")), Mark::None);
        assert_eq!(state.undo(), None);
    }

    #[test]
    fn test_same_value_mark_still_undoable() {
        let mut state = state(&[("a.nef", Mark::Keep)]);
        state.set_mark(&p("a.nef"), Mark::Keep);
        assert_eq!(state.undo_depth(), 1);
        assert_eq!(state.undo(), Some(p("a.nef")));
        assert_eq!(state.mark(&p("a.nef")), Mark::Keep);
    }

    #[test]
    fn test_unknown_path_ignored() {
        let mut state = state(&[("a.nef", Mark::None)]);
        assert!(!state.set_mark(Path::new("/elsewhere/z.nef"), Mark::Keep));
        assert_eq!(state.undo_depth(), 0);
    }

    #[test]
    fn test_undo_is_strict_inverse() {
        let names = ["a.nef", "b.nef", "c.nef", "d.nef", "e.nef"];
        let mut state = state(&[
            ("a.nef", Mark::None),
            ("b.nef", Mark::Keep),
            ("c.nef", Mark::Delete),
            ("d.nef", Mark::None),
            ("e.nef", Mark::None),
        ]);
        let before = marks_of(&state);
        let choices = [Mark::Keep, Mark::Delete, Mark::None];

        // Deterministic walk with repeats and same-value sets.
        let mut seed = 17usize;
        let steps = 40;
        for _ in 0..steps {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345) % 65_536;
            let name = names[seed % names.len()];
            let mark = choices[(seed / 7) % choices.len()];
            state.set_mark(&p(name), mark);
            let s = state.summary();
            assert_eq!(s.keep + s.delete + s.unmarked, state.len());
        }
        for _ in 0..steps {
            assert!(state.undo().is_some());
        }

        assert_eq!(marks_of(&state), before);
        assert_eq!(state.summary().total(), state.len());
        assert_eq!(state.summary().keep, 1);
        assert_eq!(state.summary().delete, 1);
    }

    #[test]
    fn test_summary_counts() {
        let mut state = state(&[
            ("a.nef", Mark::None),
            ("b.nef", Mark::Keep),
            ("c.nef", Mark::Delete),
        ]);
        state.set_mark(&p("a.nef"), Mark::Delete);
        let summary = state.summary();
        assert_eq!(summary.keep, 1);
        assert_eq!(summary.delete, 2);
        assert_eq!(summary.unmarked, 0);
    }

    #[test]
    fn test_first_unmarked() {
        let state = state(&[
            ("a.nef", Mark::Keep),
            ("b.nef", Mark::None),
            ("c.nef", Mark::Delete),
            ("d.nef", Mark::None),
        ]);
        assert_eq!(state.first_unmarked(0), Some(1));
        assert_eq!(state.first_unmarked(2), Some(3));
        assert_eq!(state.first_unmarked(4), None);
    }

    #[test]
    fn test_review_subset_by_scope() {
        let mut state = state(&[
            ("a.nef", Mark::None),
            ("b.nef", Mark::None),
            ("c.nef", Mark::Delete),
            ("d.nef", Mark::None),
        ]);
        state.set_mark(&p("a.nef"), Mark::Delete);
        state.set_mark(&p("b.nef"), Mark::Keep);

        assert_eq!(state.review_indices(ReviewScope::Session), vec![0]);
        assert_eq!(state.review_indices(ReviewScope::All), vec![0, 2]);
        assert_eq!(
            state.sort_prompt(),
            SortPrompt::ChooseReviewScope {
                session_deletes: 1,
                total_deletes: 2
            }
        );
    }

    #[test]
    fn test_review_sequence_is_static() {
        let mut state = state(&[
            ("a.nef", Mark::Delete),
            ("b.nef", Mark::Keep),
            ("c.nef", Mark::Delete),
        ]);
        assert_eq!(state.start_review(ReviewScope::All).unwrap(), vec![0, 2]);
        assert_eq!(state.phase(), Phase::Reviewing);
        assert_eq!(state.current_index(), 0);

        // Re-marking during review keeps the entry in the walk.
        assert!(state.mark_current(Mark::Keep));
        assert_eq!(state.current_index(), 0);
        assert!(state.navigate(1));
        assert_eq!(state.current_index(), 2);
        assert!(!state.navigate(1));
        assert!(state.navigate(-1));
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.review().unwrap().indices(), &[0, 2]);
    }

    #[test]
    fn test_empty_review_stays_browsing() {
        let mut state = state(&[("a.nef", Mark::Keep)]);
        assert!(state.start_review(ReviewScope::All).unwrap().is_empty());
        assert_eq!(state.phase(), Phase::Browsing);
        assert_eq!(state.sort_prompt(), SortPrompt::SortDirectly);
        let plan = state.skip_review().unwrap();
        assert_eq!(plan.mark_of(&p("a.nef")), Mark::Keep);
        assert_eq!(state.phase(), Phase::Terminal);
    }

    #[test]
    fn test_cancel_then_confirm() {
        let mut state = state(&[("a.nef", Mark::None), ("b.nef", Mark::None)]);
        state.set_mark(&p("b.nef"), Mark::Delete);

        state.start_review(ReviewScope::Session).unwrap();
        assert_eq!(state.current_index(), 1);
        state.cancel_review().unwrap();
        assert_eq!(state.phase(), Phase::Browsing);
        assert!(state.review().is_none());
        assert!(state.cancel_review().is_err());

        state.start_review(ReviewScope::All).unwrap();
        let plan = state.confirm_review().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.mark_of(&p("b.nef")), Mark::Delete);
        assert_eq!(plan.mark_of(&p("a.nef")), Mark::None);
    }

    #[test]
    fn test_terminal_is_final() {
        let mut state = state(&[("a.nef", Mark::Delete)]);
        state.skip_review().unwrap();

        assert!(matches!(
            state.start_review(ReviewScope::All),
            Err(CullError::InvalidTransition { .. })
        ));
        assert!(state.skip_review().is_err());
        assert!(state.confirm_review().is_err());
        assert!(!state.set_mark(&p("a.nef"), Mark::Keep));
        assert!(!state.navigate(1));
    }

    #[test]
    fn test_browsing_navigation_and_auto_advance() {
        let mut state = state(&[
            ("a.nef", Mark::None),
            ("b.nef", Mark::None),
            ("c.nef", Mark::None),
        ]);
        assert!(!state.navigate(-1));
        state.mark_current(Mark::Keep);
        assert_eq!(state.current_index(), 1);
        state.mark_current(Mark::None);
        assert_eq!(state.current_index(), 1);
        state.mark_current(Mark::Delete);
        assert_eq!(state.current_index(), 2);
        state.mark_current(Mark::Delete);
        assert_eq!(state.current_index(), 2);

        let restored = state.undo().unwrap();
        assert!(state.focus(&restored));
        assert_eq!(state.current_index(), 2);
        assert!(state.go_to(0));
        assert!(!state.go_to(3));
    }

    #[test]
    fn test_auto_keep_skips_marked_and_is_not_undoable() {
        let mut state = state(&[
            ("a.nef", Mark::None),
            ("b.nef", Mark::Delete),
            ("c.nef", Mark::None),
        ]);
        let edited = [p("a.nef"), p("b.nef")];
        assert_eq!(state.auto_keep(edited.iter().map(PathBuf::as_path)), 1);
        assert_eq!(state.mark(&p("a.nef")), Mark::Keep);
        assert_eq!(state.mark(&p("b.nef")), Mark::Delete);
        assert_eq!(state.undo_depth(), 0);
        assert_eq!(state.summary().keep, 1);
    }

    #[test]
    fn test_rotation_wraps() {
        let mut state = state(&[("a.nef", Mark::None)]);
        assert_eq!(state.rotate_current(1), 1);
        assert_eq!(state.rotate_current(-2), 3);
        assert_eq!(state.rotate_current(1), 0);
        assert_eq!(state.rotation(0), 0);
    }
}
