//! Remote shell access.
//!
//! `RemoteShell` is the seam between the deploy steps and the transport.
//! Production runs go through `SshClient` (OpenSSH driven by `sshpass`);
//! tests substitute a recording fake.

mod client;

pub use client::SshClient;

use std::path::Path;

use serde::Serialize;

use crate::config::DeployConfig;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
            exit_code: 0,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
            exit_code,
        }
    }

    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Why a remote call never reached (or was refused by) the remote shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    Connect,
    Auth,
}

pub trait RemoteShell {
    /// Run `command` through the remote login shell, optionally feeding `stdin`.
    fn execute(&self, command: &str, stdin: Option<&[u8]>) -> CommandOutput;

    /// Copy a local file to `remote_path`, replacing whatever is there.
    fn upload(&self, local_path: &Path, remote_path: &str) -> CommandOutput;

    /// Classify a failed call as a transport problem rather than a command result.
    fn transport_fault(&self, output: &CommandOutput) -> Option<TransportFault> {
        classify_transport(output)
    }
}

/// Opens the remote shell a run talks through.
pub trait Connector {
    fn open<'c>(&self, config: &'c DeployConfig) -> Box<dyn RemoteShell + 'c>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SshConnector;

impl Connector for SshConnector {
    fn open<'c>(&self, config: &'c DeployConfig) -> Box<dyn RemoteShell + 'c> {
        Box::new(SshClient::from_config(config))
    }
}

const AUTH_PATTERNS: &[&str] = &[
    "permission denied (",
    "permission denied, please try again",
    "authentication failed",
    "too many authentication failures",
];

const CONNECT_PATTERNS: &[&str] = &[
    "ssh: connect to host",
    "connection refused",
    "connection reset",
    "connection timed out",
    "no route to host",
    "network is unreachable",
    "temporary failure in name resolution",
    "could not resolve hostname",
    "host key verification failed",
    "kex_exchange_identification",
    "connection closed by remote host",
];

/// Classify by OpenSSH exit status (255 = ssh itself failed) and stderr text.
pub fn classify_transport(output: &CommandOutput) -> Option<TransportFault> {
    if output.success {
        return None;
    }

    let stderr = output.stderr.to_lowercase();
    if AUTH_PATTERNS.iter().any(|p| stderr.contains(p)) {
        return Some(TransportFault::Auth);
    }
    if output.exit_code == 255 || CONNECT_PATTERNS.iter().any(|p| stderr.contains(p)) {
        return Some(TransportFault::Connect);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_output_is_never_a_fault() {
        assert_eq!(classify_transport(&CommandOutput::ok("fine")), None);
    }

    #[test]
    fn exit_255_is_a_connect_fault() {
        let output = CommandOutput::failed(255, "");
        assert_eq!(classify_transport(&output), Some(TransportFault::Connect));
    }

    #[test]
    fn permission_denied_is_an_auth_fault() {
        let output = CommandOutput::failed(255, "pi@host: Permission denied (password).");
        assert_eq!(classify_transport(&output), Some(TransportFault::Auth));
    }

    #[test]
    fn unresolvable_host_is_a_connect_fault() {
        let output = CommandOutput::failed(
            1,
            "ssh: Could not resolve hostname nowhere: Name or service not known",
        );
        assert_eq!(classify_transport(&output), Some(TransportFault::Connect));
    }

    #[test]
    fn ordinary_command_failure_is_not_a_fault() {
        let output = CommandOutput::failed(3, "Unit discord-bot.service could not be found.");
        assert_eq!(classify_transport(&output), None);
    }

    #[test]
    fn error_text_prefers_stderr() {
        let mut output = CommandOutput::failed(1, "stderr content");
        output.stdout = "stdout content".to_string();
        assert_eq!(output.error_text(), "stderr content");

        output.stderr = "  ".to_string();
        assert_eq!(output.error_text(), "stdout content");
    }
}
