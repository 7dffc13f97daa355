//! Error types for minidoc

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Wire Errors ===
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === Partition Errors ===
    #[error("Could not connect to partition rank {rank}: {reason}")]
    Connection { rank: usize, reason: String },

    /// The peer closed the channel before a reply frame completed.
    #[error("Partition rank {rank} closed the connection before replying")]
    ConnectionClosed { rank: usize },

    /// An earlier transport failure left the channel unusable
    #[error("Connection to partition rank {rank} is unusable: {reason}")]
    ConnectionLost { rank: usize, reason: String },

    #[error("Partition rank {rank} refused request: {message}")]
    Remote { rank: usize, message: String },

    #[error("Partition rank {rank} did not answer {op} within {millis}ms")]
    Timeout {
        rank: usize,
        op: &'static str,
        millis: u64,
    },

    // === Schema Errors ===
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Schema catalog error: {0}")]
    Catalog(#[from] serde_json::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Lifecycle Errors ===
    #[error("Database initialization failed: {source}")]
    FatalInit {
        #[source]
        source: Box<Error>,
    },

    #[error("Sync failed: {source}")]
    Sync {
        #[source]
        source: Box<Error>,
    },

    #[error("Shutdown did not fully complete: {detail}")]
    ShutdownPartial { ranks: Vec<usize>, detail: String },

    #[error("Coordinator has been shut down")]
    ShutDown,
}

impl Error {
    pub fn fatal_init(source: Error) -> Self {
        Error::FatalInit {
            source: Box::new(source),
        }
    }

    pub fn sync(source: Error) -> Self {
        Error::Sync {
            source: Box::new(source),
        }
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Connection { .. } | Error::Sync { .. } => true,
            Error::FatalInit { source } => source.is_retryable(),
            _ => false,
        }
    }

    /// Rank the error is attributed to, if any.
    pub fn rank(&self) -> Option<usize> {
        match self {
            Error::Connection { rank, .. }
            | Error::ConnectionClosed { rank }
            | Error::ConnectionLost { rank, .. }
            | Error::Remote { rank, .. }
            | Error::Timeout { rank, .. } => Some(*rank),
            Error::FatalInit { source } | Error::Sync { source } => source.rank(),
            _ => None,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(Error::Connection {
            rank: 2,
            reason: "refused".into()
        }
        .is_retryable());
        assert!(Error::sync(Error::Remote {
            rank: 0,
            message: "already frozen".into()
        })
        .is_retryable());
        assert!(!Error::InvalidSchema("empty".into()).is_retryable());
        assert!(!Error::fatal_init(Error::InvalidSchema("x".into())).is_retryable());
    }

    #[test]
    fn test_rank_through_wrappers() {
        let err = Error::fatal_init(Error::Connection {
            rank: 3,
            reason: "no such file".into(),
        });
        assert_eq!(err.rank(), Some(3));
        assert_eq!(Error::InvalidSchema("x".into()).rank(), None);
    }

    #[test]
    fn test_messages_name_rank() {
        let err = Error::Remote {
            rank: 1,
            message: "disk full".into(),
        };
        assert_eq!(err.to_string(), "Partition rank 1 refused request: disk full");
    }
}
