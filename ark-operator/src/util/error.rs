use std::time::Duration;

/// Errors that can arise anywhere in the reconciliation engine.
///
/// `Permanent` and `Temporary` are the two kinds §7 of the spec calls out
/// explicitly; everything else is a source error that reconciliation code
/// wraps into one of those two as it decides whether a failure is
/// recoverable.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("Json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Failed to parse DateTime: {source}")]
    Chrono {
        #[from]
        source: chrono::ParseError,
    },

    #[error("Parse duration: {source}")]
    ParseDuration {
        #[from]
        source: parse_duration::parse::Error,
    },

    #[error("HTTP request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("Invalid size literal: {0}")]
    InvalidSize(String),

    #[error("requested size {requested} is below the {minimum} minimum for {what}")]
    PvcTooSmall {
        what: String,
        requested: String,
        minimum: String,
    },

    #[error("PVC {name} cannot shrink from {current} to {requested}; delete it manually first")]
    PvcShrink {
        name: String,
        current: String,
        requested: String,
    },

    #[error("config key '{key}' in [{section}] is reserved and managed by the operator")]
    ManagedCollision { section: String, key: String },

    #[error("Failed to parse config: {0}")]
    ConfigParse(String),

    #[error("RCON error talking to {host}:{port}: {message}")]
    Rcon {
        host: String,
        port: u16,
        message: String,
    },

    #[error("Invalid user input: {0}")]
    UserInput(String),

    /// A failure that will not be resolved by retrying. Surfaces as
    /// `status.state = "Error: <message>"`.
    #[error("{0}")]
    Permanent(String),

    /// A recoverable failure; the caller should re-enqueue after `delay`.
    #[error("{message} (retry in {delay:?})")]
    Temporary { message: String, delay: Duration },
}

impl Error {
    pub fn permanent(message: impl Into<String>) -> Self {
        Error::Permanent(message.into())
    }

    pub fn temporary(message: impl Into<String>, delay: Duration) -> Self {
        Error::Temporary {
            message: message.into(),
            delay,
        }
    }

    /// `true` for anything that should be surfaced as a terminal
    /// `status.state = "Error: ..."` rather than silently re-enqueued.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Error::Temporary { .. })
    }

    /// The delay a `Temporary` error requests, if any.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Error::Temporary { delay, .. } => Some(*delay),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
