use thiserror::Error;

/// How a control loop reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged, a fallback value is used and the loop keeps going.
    Transient,
    /// The process must stop.
    Fatal,
}

#[derive(Error, Debug)]
pub enum OncallError {
    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Time-series query failed: {0}")]
    Query(String),

    #[error("Malformed time-series response: {0}")]
    MalformedResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OncallError {
    pub fn severity(&self) -> Severity {
        match self {
            OncallError::Probe(_) | OncallError::Query(_) | OncallError::MalformedResponse(_) => {
                Severity::Transient
            }
            OncallError::InvalidConfig(_)
            | OncallError::Bind { .. }
            | OncallError::Database(_)
            | OncallError::Persistence(_)
            | OncallError::IoError(_)
            | OncallError::Other(_) => Severity::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.severity() == Severity::Transient
    }
}

pub type Result<T> = std::result::Result<T, OncallError>;
