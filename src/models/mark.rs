use std::fmt;

/// Per-file disposition. `None` is the unset state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mark {
    Keep,
    Delete,
    #[default]
    None,
}

impl Mark {
    pub fn is_set(self) -> bool {
        self != Mark::None
    }

    /// Status-bar label for the mark.
    pub fn label(self) -> &'static str {
        match self {
            Mark::Keep => "KEEP",
            Mark::Delete => "DELETE",
            Mark::None => "UNMARKED",
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Counts over the current mark mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkSummary {
    pub keep: usize,
    pub delete: usize,
    pub unmarked: usize,
}

impl MarkSummary {
    pub fn total(&self) -> usize {
        self.keep + self.delete + self.unmarked
    }
}

impl fmt::Display for MarkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Keep:{}  Del:{}  Unmarked:{}",
            self.keep, self.delete, self.unmarked
        )
    }
}
