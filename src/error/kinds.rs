use std::{fmt, io};

use crate::error::mongo::{format_mongodb_error, is_transient_mongodb_error};

/// Crate-wide `Result` type using [`ExportError`] as the error.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Top-level error type for partition discovery and export.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExportError {
    /// Configuration errors, raised before any remote call.
    Config(ConfigError),

    /// Malformed or mismatched filter expressions.
    Filter(FilterError),

    /// Failures talking to the remote index.
    Transport(TransportError),

    /// Export job execution errors.
    Execution(ExecutionError),

    /// Partition manifest errors.
    Manifest(ManifestError),

    /// I/O errors.
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// JSON (de)serialization errors.
    Json(serde_json::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Generic configuration error.
    Generic(String),
}

/// Filter expression errors.
#[derive(Debug)]
pub enum FilterError {
    /// Expression could not be parsed.
    Syntax { expression: String, message: String },

    /// Expression refers to a different field than expected.
    FieldMismatch { expected: String, found: String },

    /// A value does not belong to the ordering field's domain.
    DomainMismatch { kind: String, value: String },
}

/// Transport-level errors from the remote index.
#[derive(Debug)]
pub enum TransportError {
    /// Request failed, possibly transiently.
    RequestFailed(String),

    /// Requested more results than the service can return.
    ResultWindowExceeded { requested: u64, limit: u64 },

    /// Retries exhausted; wraps the last failure.
    RetriesExhausted { attempts: u32, last: Box<ExportError> },
}

/// Export job errors.
#[derive(Debug)]
pub enum ExecutionError {
    /// A single partition failed.
    PartitionFailed { id: usize, message: String },

    /// One or more partitions failed; the job was stopped.
    PartitionsFailed { failures: Vec<(usize, String)> },

    /// Writer failure.
    WriterFailed(String),

    /// The job was cancelled.
    Cancelled,

    /// A worker task panicked or was aborted.
    WorkerFailed(String),
}

/// Partition manifest errors.
#[derive(Debug)]
pub enum ManifestError {
    /// Partition id outside of the manifest.
    UnknownPartition { id: usize, partitions: usize },

    /// Stored total does not match the partition sum.
    CountMismatch { expected: u64, actual: u64 },

    /// Manifest content is invalid.
    Invalid(String),
}

impl ExportError {
    /// Whether the failure may succeed when retried.
    ///
    /// Configuration, filter, manifest and cancellation errors are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ExportError::Transport(TransportError::RequestFailed(_)) => true,
            ExportError::Transport(_) => false,
            ExportError::Io(_) => true,
            ExportError::MongoDb(e) => is_transient_mongodb_error(e),
            _ => false,
        }
    }

    /// Whether this error represents a cancelled job.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Execution(ExecutionError::Cancelled))
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Config(e) => write!(f, "Configuration error: {e}"),
            ExportError::Filter(e) => write!(f, "Filter error: {e}"),
            ExportError::Transport(e) => write!(f, "Transport error: {e}"),
            ExportError::Execution(e) => write!(f, "Export error: {e}"),
            ExportError::Manifest(e) => write!(f, "Manifest error: {e}"),
            ExportError::Io(e) => write!(f, "I/O error: {e}"),
            ExportError::MongoDb(e) => format_mongodb_error(f, e),
            ExportError::Json(e) => write!(f, "JSON error: {e}"),
            ExportError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::Syntax {
                expression,
                message,
            } => write!(f, "cannot parse '{expression}': {message}"),
            FilterError::FieldMismatch { expected, found } => {
                write!(f, "expected field '{expected}', found '{found}'")
            }
            FilterError::DomainMismatch { kind, value } => {
                write!(f, "value {value} is not a {kind} value")
            }
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::RequestFailed(msg) => write!(f, "Request failed: {msg}"),
            TransportError::ResultWindowExceeded { requested, limit } => write!(
                f,
                "Requested {requested} results but the result window is {limit}"
            ),
            TransportError::RetriesExhausted { attempts, last } => {
                write!(f, "Giving up after {attempts} attempts: {last}")
            }
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::PartitionFailed { id, message } => {
                write!(f, "Partition {id} failed: {message}")
            }
            ExecutionError::PartitionsFailed { failures } => {
                let ids: Vec<String> = failures.iter().map(|(id, _)| id.to_string()).collect();
                write!(f, "{} partition(s) failed [{}]", failures.len(), ids.join(", "))?;
                for (id, message) in failures {
                    write!(f, "\n  partition {id}: {message}")?;
                }
                Ok(())
            }
            ExecutionError::WriterFailed(msg) => write!(f, "Writer failed: {msg}"),
            ExecutionError::Cancelled => write!(f, "Export cancelled"),
            ExecutionError::WorkerFailed(msg) => write!(f, "Worker failed: {msg}"),
        }
    }
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestError::UnknownPartition { id, partitions } => write!(
                f,
                "Partition id {id} is out of range (manifest has {partitions} partitions)"
            ),
            ManifestError::CountMismatch { expected, actual } => write!(
                f,
                "totalDocumentCount is {expected} but partitions sum to {actual}"
            ),
            ManifestError::Invalid(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ExportError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for FilterError {}
impl std::error::Error for TransportError {}
impl std::error::Error for ExecutionError {}
impl std::error::Error for ManifestError {}

/* ========================= Conversions to ExportError ========================= */

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<mongodb::error::Error> for ExportError {
    fn from(err: mongodb::error::Error) -> Self {
        ExportError::MongoDb(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Json(err)
    }
}

impl From<ConfigError> for ExportError {
    fn from(err: ConfigError) -> Self {
        ExportError::Config(err)
    }
}

impl From<FilterError> for ExportError {
    fn from(err: FilterError) -> Self {
        ExportError::Filter(err)
    }
}

impl From<TransportError> for ExportError {
    fn from(err: TransportError) -> Self {
        ExportError::Transport(err)
    }
}

impl From<ExecutionError> for ExportError {
    fn from(err: ExecutionError) -> Self {
        ExportError::Execution(err)
    }
}

impl From<ManifestError> for ExportError {
    fn from(err: ManifestError) -> Self {
        ExportError::Manifest(err)
    }
}

impl From<String> for ExportError {
    fn from(msg: String) -> Self {
        ExportError::Generic(msg)
    }
}

impl From<&str> for ExportError {
    fn from(msg: &str) -> Self {
        ExportError::Generic(msg.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transient: ExportError = TransportError::RequestFailed("503".into()).into();
        assert!(transient.is_transient());

        let config: ExportError = ConfigError::MissingField("index".into()).into();
        assert!(!config.is_transient());

        let exhausted: ExportError = TransportError::RetriesExhausted {
            attempts: 5,
            last: Box::new(transient),
        }
        .into();
        assert!(!exhausted.is_transient());
        assert!(!ExportError::from(ExecutionError::Cancelled).is_transient());
    }

    #[test]
    fn test_partitions_failed_lists_ids() {
        let err = ExportError::from(ExecutionError::PartitionsFailed {
            failures: vec![(3, "boom".into()), (7, "bang".into())],
        });
        let text = err.to_string();
        assert!(text.contains("[3, 7]"));
        assert!(text.contains("partition 7: bang"));
    }
}
