use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;

/// Failures that end a delivery.
///
/// Client disconnects are not represented here: an abandoned transfer is a
/// normal outcome, see [`Delivered::aborted`](crate::Delivered::aborted).
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("file not readable: {}", path.display())]
    NotReadable { path: PathBuf },

    #[error("failed to open {}: {source}", path.display())]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("range not satisfiable for entity of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    /// Read or write failure after the response head was committed.
    #[error("i/o error during transfer: {0}")]
    Io(#[from] io::Error),

    #[error("transport rejected response: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// The status line a host should answer with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } | Self::NotReadable { .. } => StatusCode::NOT_FOUND,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::OpenFailure { .. } | Self::Io(_) | Self::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type Result<T, E = DeliveryError> = std::result::Result<T, E>;
