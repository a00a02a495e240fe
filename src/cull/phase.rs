use std::fmt;

/// Where the culling session is in its lifecycle.
///
/// `Browsing -> Reviewing` only with a nonempty delete subsequence,
/// `Reviewing -> Browsing` on cancel, and either of them `-> Terminal` once the
/// move plan is handed off. Terminal is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Browsing,
    Reviewing,
    Terminal,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Browsing => "browsing",
            Phase::Reviewing => "reviewing deletes",
            Phase::Terminal => "sorting",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Terminal
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
