use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidToml,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    MarkerNotFound,
    MarkerAmbiguous,

    SshConnectFailed,
    SshAuthFailed,
    TransferFailed,

    RemoteCommandFailed,
    ServiceUnhealthy,

    RunLocked,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

/// Coarse failure taxonomy a run failure is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Config,
    MarkerFormat,
    Transport,
    RemoteCommand,
    Concurrency,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidToml => "config.invalid_toml",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::MarkerNotFound => "marker.not_found",
            ErrorCode::MarkerAmbiguous => "marker.ambiguous",

            ErrorCode::SshConnectFailed => "ssh.connect_failed",
            ErrorCode::SshAuthFailed => "ssh.auth_failed",
            ErrorCode::TransferFailed => "transfer.failed",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",
            ErrorCode::ServiceUnhealthy => "service.unhealthy",

            ErrorCode::RunLocked => "run.locked",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::ConfigMissingKey
            | ErrorCode::ConfigInvalidToml
            | ErrorCode::ConfigInvalidValue
            | ErrorCode::ValidationMissingArgument
            | ErrorCode::ValidationInvalidArgument => ErrorCategory::Config,

            ErrorCode::MarkerNotFound | ErrorCode::MarkerAmbiguous => ErrorCategory::MarkerFormat,

            ErrorCode::SshConnectFailed | ErrorCode::SshAuthFailed | ErrorCode::TransferFailed => {
                ErrorCategory::Transport
            }

            ErrorCode::RemoteCommandFailed | ErrorCode::ServiceUnhealthy => {
                ErrorCategory::RemoteCommand
            }

            ErrorCode::RunLocked => ErrorCategory::Concurrency,

            ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError
            | ErrorCode::InternalUnexpected => ErrorCategory::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidTomlDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

/// Where a marker lookup went wrong. `lines` are 1-based.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerDetails {
    pub key: String,
    pub matches: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportFailedDetails {
    pub operation: String,
    pub exit_code: i32,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunLockedDetails {
    pub lock_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder_pid: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        let message = format!("Missing required configuration key: {}", key);
        Self::new(
            ErrorCode::ConfigMissingKey,
            message,
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_toml(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        let details = to_details(ConfigInvalidTomlDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidToml,
            "Invalid TOML in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn marker_not_found(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::MarkerNotFound,
            format!("No line of the form {} = \"...\" found in artifact", key),
            to_details(MarkerDetails {
                key,
                matches: 0,
                lines: Vec::new(),
            }),
        )
    }

    pub fn marker_ambiguous(key: impl Into<String>, lines: Vec<usize>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::MarkerAmbiguous,
            format!(
                "Expected exactly one {} line, found {}",
                key,
                lines.len()
            ),
            to_details(MarkerDetails {
                key,
                matches: lines.len(),
                lines,
            }),
        )
        .with_hint("Remove the duplicate marker lines so exactly one remains")
    }

    pub fn ssh_connect_failed(operation: impl Into<String>, exit_code: i32, stderr: String) -> Self {
        Self::transport(
            ErrorCode::SshConnectFailed,
            "Could not reach remote host",
            operation,
            exit_code,
            stderr,
        )
    }

    pub fn ssh_auth_failed(operation: impl Into<String>, exit_code: i32, stderr: String) -> Self {
        Self::transport(
            ErrorCode::SshAuthFailed,
            "Remote host rejected authentication",
            operation,
            exit_code,
            stderr,
        )
        .with_hint("Check the BOT_DEPLOY_USER and BOT_DEPLOY_PASSWORD secrets")
    }

    pub fn transfer_failed(
        message: impl Into<String>,
        exit_code: i32,
        stderr: String,
        staging_path: Option<String>,
    ) -> Self {
        Self::new(
            ErrorCode::TransferFailed,
            message,
            to_details(TransportFailedDetails {
                operation: "transfer".to_string(),
                exit_code,
                stderr,
                staging_path,
            }),
        )
    }

    fn transport(
        code: ErrorCode,
        message: &str,
        operation: impl Into<String>,
        exit_code: i32,
        stderr: String,
    ) -> Self {
        Self::new(
            code,
            message,
            to_details(TransportFailedDetails {
                operation: operation.into(),
                exit_code,
                stderr,
                staging_path: None,
            }),
        )
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = format!("Remote command exited with status {}", details.exit_code);
        Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details))
    }

    pub fn service_unhealthy(details: RemoteCommandFailedDetails) -> Self {
        let message = match &details.service {
            Some(service) => format!(
                "Service '{}' status check exited with status {}",
                service, details.exit_code
            ),
            None => format!("Status check exited with status {}", details.exit_code),
        };
        Self::new(ErrorCode::ServiceUnhealthy, message, to_details(details))
    }

    pub fn run_locked(lock_path: impl Into<String>, holder_pid: Option<u32>) -> Self {
        Self::new(
            ErrorCode::RunLocked,
            "Another deploy run holds the lock for this target",
            to_details(RunLockedDetails {
                lock_path: lock_path.into(),
                holder_pid,
            }),
        )
        .with_hint("Wait for the other run to finish; the lock is released when its process exits")
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
