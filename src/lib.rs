//! rawcull: cull a folder of RAW photos into `keep/` and `delete/`.
//!
//! The crate is split into a preview pipeline, the culling session state and
//! the file operations that apply the final decision:
//! - [`scanner`] finds RAW files and their current sort folder
//! - [`preview`] decodes and caches previews ahead of navigation
//! - [`cull`] tracks marks, undo and the delete review
//! - [`sorter`] moves files according to a [`MovePlan`]

pub mod config;
pub mod cull;
pub mod error;
pub mod models;
pub mod preview;
pub mod scanner;
pub mod sorter;

pub use config::CullConfig;
pub use cull::{CullState, Phase, ReviewScope, SortPrompt};
pub use error::{CullError, Result};
pub use models::{ImageEntry, Mark, MarkSummary, MovePlan};
pub use preview::{Decoder, PreviewCache, PreviewImage, RawPreviewDecoder};
pub use scanner::{FolderScanner, ScanResult};
pub use sorter::{SortReport, Sorter};
