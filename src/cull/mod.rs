//! Mark, undo and review bookkeeping for a culling session.
//!
//! - `CullState` - ordered image list, marks, undo log, cursor
//! - `ReviewSession` / `SortPrompt` - delete review before sorting
//! - `Phase` - Browsing, Reviewing, Terminal

pub mod phase;
pub mod review;
pub mod state;

pub use phase::Phase;
pub use review::{ReviewScope, ReviewSession, SortPrompt};
pub use state::{CullState, UndoRecord};
