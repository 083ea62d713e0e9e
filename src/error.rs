use thiserror::Error;

pub type Result<T> = std::result::Result<T, GroupError>;

#[derive(Debug, Error, Serialize, Deserialize, Clone, Hash, PartialEq, Eq)]
pub enum GroupError {
    /// The random source or the host name could not produce an instance id.
    #[error("could not generate instance id: {error_msg}")]
    IdentityGeneration { error_msg: String },
    /// Partition or leader information could not be read in full.
    #[error("topology unavailable: {error_msg}")]
    TopologyUnavailable { error_msg: String },
    /// No instances were supplied to the assignment.
    #[error("cannot assign {partitions} partitions to an empty group")]
    InvalidMembership { partitions: usize },
    #[error("{topic}/{partition} is owned by {owner}")]
    ClaimConflict {
        topic: String,
        partition: i32,
        owner: String,
    },
    #[error("registry error: {error_msg}")]
    Store { error_msg: String },
    #[error("invalid configuration in {file_path}: {error_msg}")]
    ConfigError {
        file_path: String,
        error_msg: String,
    },
    #[error("internal error: {error_msg}")]
    Internal { error_msg: String },
}

impl GroupError {
    pub fn topology<E: ToString>(err: E) -> Self {
        GroupError::TopologyUnavailable {
            error_msg: err.to_string(),
        }
    }

    pub fn identity<E: ToString>(err: E) -> Self {
        GroupError::IdentityGeneration {
            error_msg: err.to_string(),
        }
    }

    /// Failures a rebalance loop may retry on a backoff. Everything else is a bug or fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GroupError::TopologyUnavailable { .. } | GroupError::ClaimConflict { .. }
        )
    }

    /// Any failure while reading topology is reported as the topology being unavailable.
    pub(crate) fn into_topology(self) -> Self {
        match self {
            err @ GroupError::TopologyUnavailable { .. } => err,
            err => GroupError::topology(err),
        }
    }
}

impl From<sled::Error> for GroupError {
    fn from(err: sled::Error) -> Self {
        GroupError::Store {
            error_msg: err.to_string(),
        }
    }
}

impl From<Box<bincode::ErrorKind>> for GroupError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        GroupError::Store {
            error_msg: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for GroupError {
    fn from(err: config::ConfigError) -> Self {
        GroupError::ConfigError {
            file_path: String::new(),
            error_msg: err.to_string(),
        }
    }
}

impl From<std::io::Error> for GroupError {
    fn from(err: std::io::Error) -> Self {
        GroupError::Internal {
            error_msg: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for GroupError {
    fn from(err: tokio::task::JoinError) -> Self {
        GroupError::Internal {
            error_msg: err.to_string(),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for GroupError {
    fn from(err: tokio::sync::mpsc::error::SendError<T>) -> Self {
        GroupError::Internal {
            error_msg: err.to_string(),
        }
    }
}
