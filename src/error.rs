use std::io;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the health dashboard
#[derive(Error, Debug)]
pub enum HealthError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("TUI error: {0}")]
    Tui(String),
}

/// Result type alias for the health dashboard
pub type Result<T> = std::result::Result<T, HealthError>;

impl HealthError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        HealthError::Config(msg.into())
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        HealthError::Runtime(msg.into())
    }

    pub fn tui<S: Into<String>>(msg: S) -> Self {
        HealthError::Tui(msg.into())
    }
}

/// A metric group could not be read. Tolerated: the group's metrics are left absent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("{group}: I/O failure: {message}")]
    Io { group: String, message: String },

    #[error("{group}: permission denied")]
    PermissionDenied { group: String },

    #[error("{group}: sensor not available")]
    MissingSensor { group: String },

    #[error("{group}: read exceeded {budget:?}")]
    Timeout { group: String, budget: Duration },
}

impl AdapterError {
    pub fn io<G: Into<String>, S: Into<String>>(group: G, message: S) -> Self {
        AdapterError::Io {
            group: group.into(),
            message: message.into(),
        }
    }

    pub fn missing_sensor<G: Into<String>>(group: G) -> Self {
        AdapterError::MissingSensor {
            group: group.into(),
        }
    }

    pub fn timeout<G: Into<String>>(group: G, budget: Duration) -> Self {
        AdapterError::Timeout {
            group: group.into(),
            budget,
        }
    }

    /// Name of the metric group that failed
    pub fn group(&self) -> &str {
        match self {
            AdapterError::Io { group, .. }
            | AdapterError::PermissionDenied { group }
            | AdapterError::MissingSensor { group }
            | AdapterError::Timeout { group, .. } => group,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Timeout { .. })
    }
}

/// History persistence failure. Logged; sampling continues.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("history I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode history record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("out-of-order append: {got} is older than newest record {newest}")]
    OutOfOrder { got: String, newest: String },
}

impl StoreError {
    pub fn io<P: AsRef<std::path::Path>>(path: P, source: io::Error) -> Self {
        StoreError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Alert delivery failure. Logged by the dispatcher, never propagated to sampling.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("{sink}: {message}")]
    Delivery { sink: String, message: String },

    #[error("{sink}: timed out after {timeout:?}")]
    Timeout { sink: String, timeout: Duration },
}

impl SinkError {
    pub fn delivery<N: Into<String>, S: Into<String>>(sink: N, message: S) -> Self {
        SinkError::Delivery {
            sink: sink.into(),
            message: message.into(),
        }
    }
}
