//! CLI response formatting and output.
//!
//! Provides JSON envelope, printing, and exit code mapping.

use botdeploy::error::Hint;
use botdeploy::{Error, ErrorCode, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl<T: Serialize> CliResponse<T> {
    /// A command that produced data. A failed deploy run still carries its
    /// report, so `success` follows the exit code rather than the `Result`.
    pub fn completed(data: T, exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            data: Some(data),
            error: None,
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: if err.hints.is_empty() {
                    None
                } else {
                    Some(err.hints.clone())
                },
                retryable: err.retryable,
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(()); // Exit gracefully on SIGPIPE
        }
        return Err(Error::internal_io(
            e.to_string(),
            Some("write stdout".to_string()),
        ));
    }
    Ok(())
}

pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for_error(err.code);
            (Err(err), exit_code)
        }
    }
}

/// Errors raised before a run starts. Failures inside a run are reported in
/// the run report and exit 1.
fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigMissingKey
        | ErrorCode::ConfigInvalidToml
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ValidationMissingArgument
        | ErrorCode::ValidationInvalidArgument
        | ErrorCode::MarkerNotFound
        | ErrorCode::MarkerAmbiguous => 2,

        ErrorCode::RunLocked => 3,

        ErrorCode::SshConnectFailed
        | ErrorCode::SshAuthFailed
        | ErrorCode::TransferFailed
        | ErrorCode::RemoteCommandFailed
        | ErrorCode::ServiceUnhealthy
        | ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}

pub fn print_json_result(result: Result<serde_json::Value>, exit_code: i32) -> Result<()> {
    match result {
        Ok(data) => print_response(&CliResponse::completed(data, exit_code)),
        Err(err) => print_response(&CliResponse::<()>::from_error(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_2() {
        let (_, code) = map_cmd_result_to_json::<()>(Err(Error::config_missing_key(
            "BOT_DEPLOY_HOST",
            Some("environment".to_string()),
        )));
        assert_eq!(code, 2);
    }

    #[test]
    fn run_lock_contention_exits_3() {
        let (_, code) = map_cmd_result_to_json::<()>(Err(Error::run_locked("/tmp/x.lock", Some(42))));
        assert_eq!(code, 3);
    }

    #[test]
    fn failed_run_report_is_not_a_success_envelope() {
        let response = CliResponse::completed(serde_json::json!({"status": "failed"}), 1);
        assert!(!response.success);
        assert!(response.data.is_some());
    }
}
