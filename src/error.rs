//! Crate-wide error taxonomy.
//!
//! Each variant carries the context a caller needs to log or report the
//! failure without re-deriving it from surrounding state, the same way the
//! wire-format parsing layer carries offsets and byte samples on its own
//! error type.

use std::fmt;

/// Top-level error returned by configuration, capture, and store setup.
#[derive(Debug, Clone)]
pub enum NetwatchError {
    /// Bad or unparsable configuration (unknown interface, malformed duration).
    Config {
        /// What was wrong
        message: String,
    },
    /// Could not open a raw capture handle on the named interface.
    Permission {
        /// Interface that was denied
        interface: String,
        /// Underlying OS message
        reason: String,
    },
    /// A single frame or payload failed to decode.
    PacketParse {
        /// Interface the frame arrived on
        interface: String,
        /// Which layer rejected it (`dns`, `tls`, `decode`)
        layer: String,
        /// Short description of the failure
        reason: String,
    },
    /// A single insert or batch insert failed but the store is still usable.
    StoreTransient {
        /// Description of the failed operation
        operation: String,
        /// Underlying message
        reason: String,
    },
    /// The store itself is unusable (filesystem error, corruption).
    StoreFatal {
        /// Underlying message
        reason: String,
    },
    /// One compaction pair or bucket failed to merge; the run continues.
    CompactionItem {
        /// Ids involved in the failed merge
        ids: Vec<i64>,
        /// Underlying message
        reason: String,
    },
}

impl fmt::Display for NetwatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetwatchError::Config { message } => write!(f, "configuration error: {message}"),
            NetwatchError::Permission { interface, reason } => {
                write!(f, "permission denied opening {interface}: {reason}")
            }
            NetwatchError::PacketParse {
                interface,
                layer,
                reason,
            } => write!(f, "{layer} parse error on {interface}: {reason}"),
            NetwatchError::StoreTransient { operation, reason } => {
                write!(f, "store operation '{operation}' failed: {reason}")
            }
            NetwatchError::StoreFatal { reason } => write!(f, "store is unusable: {reason}"),
            NetwatchError::CompactionItem { ids, reason } => {
                write!(f, "compaction failed for ids {ids:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for NetwatchError {}

impl From<rusqlite::Error> for NetwatchError {
    fn from(err: rusqlite::Error) -> Self {
        NetwatchError::StoreTransient {
            operation: "sqlite".to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NetwatchError>;
