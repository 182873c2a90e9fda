//! Error handling for partitioned index export.
//!
//! This module provides:
//! - A single crate-wide error type wrapping more specific error kinds
//! - Classification of errors into transient and permanent failures, used by
//!   the retry policy of the transport layer
//! - Structured extraction of MongoDB driver error information
//!
//! # Example
//!
//! ```rust
//! use partition_export::error::{ConfigError, ExportError, Result};
//!
//! fn check_index(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(ConfigError::MissingField("source.index_name".into()).into());
//!     }
//!     Ok(())
//! }
//!
//! let err = check_index("").unwrap_err();
//! assert!(!err.is_transient());
//! ```

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{
    ConfigError, ExecutionError, ExportError, FilterError, ManifestError, Result, TransportError,
};
pub use mongo::{ErrorInfo, extract_error_info, is_transient_mongodb_error};
