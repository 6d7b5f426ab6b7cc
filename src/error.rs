use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RepcacheError {
    #[error("No repcache server available (tried: {})", .tried.join(", "))]
    PoolExhausted { tried: Vec<String> },

    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server rejected store: {0}")]
    NotStored(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Pass aborted on {kind} failure for key {key}: {reason}")]
    ItemAborted {
        key: String,
        kind: ItemFailureKind,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RepcacheError>;

impl From<std::io::Error> for RepcacheError {
    fn from(e: std::io::Error) -> Self {
        RepcacheError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for RepcacheError {
    fn from(e: serde_json::Error) -> Self {
        RepcacheError::Json(e.to_string())
    }
}

/// Which step of a single item's store or fetch went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFailureKind {
    Encode,
    Store,
    Fetch,
    Decode,
}

impl std::fmt::Display for ItemFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemFailureKind::Encode => "encode",
            ItemFailureKind::Store => "store",
            ItemFailureKind::Fetch => "fetch",
            ItemFailureKind::Decode => "decode",
        };
        f.write_str(s)
    }
}

impl RepcacheError {
    /// True for errors that end the whole pass rather than one item.
    pub fn is_pass_failure(&self) -> bool {
        matches!(
            self,
            RepcacheError::PoolExhausted { .. }
                | RepcacheError::ItemAborted { .. }
                | RepcacheError::Config(_)
        )
    }
}
