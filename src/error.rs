//! Error types for the culling core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the library boundary.
///
/// Preview decode failures never reach this type: decoders report through
/// `anyhow` and the preview cache turns failures into placeholders.
#[derive(Debug, Error)]
pub enum CullError {
    #[error("no supported RAW files found in {path:?}")]
    EmptyFolder { path: PathBuf },

    #[error("{path:?} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn decode worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl CullError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CullError>;
