use std::fmt;

use serde::{Deserialize, Serialize};

/// Server error codes that indicate a transient condition.
const TRANSIENT_CODES: &[i32] = &[
    6,     // HostUnreachable
    7,     // HostNotFound
    50,    // MaxTimeMSExpired
    89,    // NetworkTimeout
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    262,   // ExceededTimeLimit
    9001,  // SocketException
    10107, // NotWritablePrimary
    11600, // InterruptedAtShutdown
    11602, // InterruptedDueToReplStateChange
    13435, // NotPrimaryNoSecondaryOk
    13436, // NotPrimaryOrSecondary
];

/// Structured error information extracted from MongoDB errors.
///
/// Serialized to JSON when a driver error is displayed.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub(crate) error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    pub(crate) transient: bool,
}

impl ErrorInfo {
    /// Convert error info to compact JSON string (single line).
    pub fn to_json_compact(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Format MongoDB errors as compact JSON wrapped in an `error` field.
///
/// Export logs are line oriented, so the output stays on one line.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    let info = extract_error_info(error);
    let wrapper = serde_json::json!({ "error": info });
    let json_output = serde_json::to_string(&wrapper).map_err(|_| fmt::Error)?;
    write!(f, "{json_output}")
}

/// Describe a driver error as an [`ErrorInfo`].
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::ErrorKind;

    let (kind, code, message) = match error.kind.as_ref() {
        ErrorKind::Command(cmd) => ("command", Some(cmd.code), cmd.message.clone()),
        ErrorKind::Authentication { message, .. } => ("authentication", None, message.clone()),
        ErrorKind::InvalidArgument { message, .. } => ("invalid_argument", None, message.clone()),
        ErrorKind::ServerSelection { message, .. } => ("server_selection", None, message.clone()),
        ErrorKind::Io(io) => ("io", None, io.to_string()),
        _ => return ErrorInfo {
            message: Some(error.to_string()),
            transient: is_transient_mongodb_error(error),
            ..ErrorInfo::default()
        },
    };

    ErrorInfo {
        error_type: Some(format!("mongo.{kind}")),
        code,
        name: code.and_then(get_error_name),
        message: Some(message),
        transient: is_transient_mongodb_error(error),
    }
}

/// Whether a driver error is worth retrying.
///
/// Network failures, server selection timeouts, cleared pools and the
/// server's own "try again" codes are transient; everything else
/// (authentication, bad arguments, malformed queries) is not.
pub fn is_transient_mongodb_error(error: &mongodb::error::Error) -> bool {
    use mongodb::error::ErrorKind;

    if error.contains_label("RetryableWriteError") || error.contains_label("TransientTransactionError")
    {
        return true;
    }

    match error.kind.as_ref() {
        ErrorKind::Io(_) => true,
        ErrorKind::ServerSelection { .. } => true,
        ErrorKind::ConnectionPoolCleared { .. } => true,
        ErrorKind::Command(command_error) => TRANSIENT_CODES.contains(&command_error.code),
        _ => false,
    }
}

/// Get a human-readable error name from a MongoDB error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        2 => "BadValue",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        89 => "NetworkTimeout",
        91 => "ShutdownInProgress",
        189 => "PrimarySteppedDown",
        _ => return None,
    };

    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names() {
        assert_eq!(get_error_name(13).as_deref(), Some("Unauthorized"));
        assert_eq!(get_error_name(12345), None);
    }

    #[test]
    fn test_io_error_is_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = mongodb::error::Error::from(io);
        assert!(is_transient_mongodb_error(&err));

        let info = extract_error_info(&err);
        assert!(info.transient);
        assert_eq!(info.error_type.as_deref(), Some("mongo.io"));
    }
}
