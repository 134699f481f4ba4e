//! Error types for the certificate issuer.
//!
//! A single error enum spans the whole pipeline. Each variant maps to an
//! [`ErrorKind`]; task retry decisions are an identity match on the kind,
//! never a broad classification.

use thiserror::Error;

/// Errors produced anywhere in the issuance pipeline.
#[derive(Error, Debug, Clone)]
pub enum IssuerError {
    /// Malformed request data: commitment, profile, date, nationality, key.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed issuer key material at startup. Fatal.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The provider address is not whitelisted in the guardian registry.
    #[error("provider {0} is not a guardian yet")]
    NotAGuardian(String),

    /// RPC view call failed.
    #[error("chain read failed: {0}")]
    ChainRead(String),

    /// Transaction submission or mining failed.
    #[error("chain write failed: {0}")]
    ChainWrite(String),

    /// Merkle proof service call failed.
    #[error("merkle proof service: {0}")]
    ProofService(String),

    /// Canonical "try again later" marker. The only error that re-queues
    /// a task.
    #[error("requires a retry")]
    RequiresRetry,

    /// The task outlived its expiration window and was dropped.
    #[error("task expired")]
    TaskExpired,

    /// A panic inside a task body, captured at the task boundary.
    #[error("panic in task execution: {0}")]
    PanicInTask(String),

    /// Encrypting the issued certificate for the holder failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Persisting to the pending store failed.
    #[error("store write failed: {0}")]
    Store(String),

    /// Bad or missing configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The task queue no longer accepts work.
    #[error("task queue is closed")]
    QueueClosed,
}

/// Discriminant used for sentinel matching and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    InvalidKey,
    NotAGuardian,
    ChainRead,
    ChainWrite,
    ProofService,
    RequiresRetry,
    TaskExpired,
    PanicInTask,
    Encryption,
    Store,
    Configuration,
    QueueClosed,
}

impl IssuerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IssuerError::InvalidInput(_) => ErrorKind::InvalidInput,
            IssuerError::InvalidKey(_) => ErrorKind::InvalidKey,
            IssuerError::NotAGuardian(_) => ErrorKind::NotAGuardian,
            IssuerError::ChainRead(_) => ErrorKind::ChainRead,
            IssuerError::ChainWrite(_) => ErrorKind::ChainWrite,
            IssuerError::ProofService(_) => ErrorKind::ProofService,
            IssuerError::RequiresRetry => ErrorKind::RequiresRetry,
            IssuerError::TaskExpired => ErrorKind::TaskExpired,
            IssuerError::PanicInTask(_) => ErrorKind::PanicInTask,
            IssuerError::Encryption(_) => ErrorKind::Encryption,
            IssuerError::Store(_) => ErrorKind::Store,
            IssuerError::Configuration(_) => ErrorKind::Configuration,
            IssuerError::QueueClosed => ErrorKind::QueueClosed,
        }
    }

    /// True iff this error is the retry sentinel itself.
    pub fn is_retry_sentinel(&self) -> bool {
        self.kind() == ErrorKind::RequiresRetry
    }
}

/// Result type for issuer operations.
pub type Result<T> = std::result::Result<T, IssuerError>;
