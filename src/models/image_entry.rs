use std::path::{Path, PathBuf};

use super::Mark;

/// One RAW file in the session's ordered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// Position in the list; never changes after load.
    pub index: usize,
    pub path: PathBuf,
    pub mark: Mark,
    /// Mark derived from the folder layout when the session was loaded.
    pub initial_mark: Mark,
}

impl ImageEntry {
    pub fn new(index: usize, path: PathBuf, initial_mark: Mark) -> Self {
        Self {
            index,
            path,
            mark: initial_mark,
            initial_mark,
        }
    }

    /// Display name of the file.
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Case-insensitive ordering key.
    pub fn sort_key(&self) -> String {
        sort_key_of(&self.path)
    }

    /// Marked for deletion during this session rather than carried over from disk.
    pub fn is_session_delete(&self) -> bool {
        self.mark == Mark::Delete && self.initial_mark != Mark::Delete
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Case-insensitive file name used to order a session's images.
pub fn sort_key_of(path: &Path) -> String {
    file_name_of(path).to_lowercase()
}
