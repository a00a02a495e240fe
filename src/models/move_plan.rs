use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::Mark;

/// Snapshot of every path's mark, handed to the sorter unchanged.
///
/// Sidecars travel with their RAW file so an edited image never loses its
/// metadata when it moves between folders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovePlan {
    pub marks: BTreeMap<PathBuf, Mark>,
    pub sidecars: HashMap<PathBuf, PathBuf>,
}

impl MovePlan {
    pub fn new(marks: BTreeMap<PathBuf, Mark>) -> Self {
        Self {
            marks,
            sidecars: HashMap::new(),
        }
    }

    pub fn with_sidecars(mut self, sidecars: HashMap<PathBuf, PathBuf>) -> Self {
        self.sidecars = sidecars;
        self
    }

    pub fn mark_of(&self, path: &Path) -> Mark {
        self.marks.get(path).copied().unwrap_or_default()
    }

    pub fn sidecar_of(&self, path: &Path) -> Option<&Path> {
        self.sidecars.get(path).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
