use bitcoin::Txid;

/// Error type for the whole crate.
#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dependency {txid} has {outputs} outputs but an input spends vout {vout}")]
    CorruptedDependency { txid: Txid, vout: u32, outputs: usize },

    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),

    #[error("HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Cannot decode transaction: {0}")]
    Decode(String),

    #[error("Declared txid {expected} but data hashes to {computed}")]
    TxidMismatch { expected: String, computed: Txid },

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Worker is not running")]
    WorkerStopped,

    #[error(transparent)]
    JsonFrom(#[from] serde_json::Error),

    #[error(transparent)]
    StdIOError(#[from] std::io::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    BitcoinEncode(#[from] bitcoin::consensus::encode::Error),

    #[error(transparent)]
    HexToBytes(#[from] bitcoin::hex::HexToBytesError),

    #[error(transparent)]
    Prices(#[from] crate::prices::Error),
}

impl Error {
    /// True for failures caused by not reaching the remote service at all
    pub fn is_connectivity(&self) -> bool {
        match self {
            Error::Connectivity(_) => true,
            Error::Reqwest(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

// `Error` is shared between task listeners, which need an owned copy each.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::InvalidArgument(s) => Error::InvalidArgument(s.clone()),
            Error::NotFound(s) => Error::NotFound(s.clone()),
            Error::CorruptedDependency {
                txid,
                vout,
                outputs,
            } => Error::CorruptedDependency {
                txid: *txid,
                vout: *vout,
                outputs: *outputs,
            },
            Error::Connectivity(s) => Error::Connectivity(s.clone()),
            Error::Unexpected(s) => Error::Unexpected(s.clone()),
            Error::Http { status, body } => Error::Http {
                status: *status,
                body: body.clone(),
            },
            Error::Decode(s) => Error::Decode(s.clone()),
            Error::TxidMismatch { expected, computed } => Error::TxidMismatch {
                expected: expected.clone(),
                computed: *computed,
            },
            Error::Cancelled => Error::Cancelled,
            Error::WorkerStopped => Error::WorkerStopped,
            Error::Prices(e) => Error::Prices(e.clone()),
            e if e.is_connectivity() => Error::Connectivity(e.to_string()),
            e => Error::Unexpected(e.to_string()),
        }
    }
}
