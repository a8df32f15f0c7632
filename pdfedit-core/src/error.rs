use std::path::PathBuf;

use thiserror::Error;

pub type EditResult<T> = std::result::Result<T, EditError>;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("failed to open source document {}", path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to render page {page_index} of {}", path.display())]
    Render {
        path: PathBuf,
        page_index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to write {}", path.display())]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid merge position {0:?}: expected `start`, `end` or a page count")]
    InvalidMergePosition(String),

    #[error("rotation of {0} degrees is not a multiple of 90")]
    InvalidRotation(i32),

    #[error("new page order is not a permutation of the current pages")]
    InvalidOrder,

    #[error("invalid edit step {step:?}: {reason}")]
    InvalidStep { step: String, reason: String },

    #[error("invalid configuration in {}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl EditError {
    pub(crate) fn source_open(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::SourceOpen {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_step(step: &str, reason: impl Into<String>) -> Self {
        Self::InvalidStep {
            step: step.to_owned(),
            reason: reason.into(),
        }
    }
}
