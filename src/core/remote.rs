//! Remote Controller: restart the service under systemd, then ask for its status.

use serde::Serialize;

use crate::config::Privilege;
use crate::credential::{Credential, Redactor};
use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::ssh::{CommandOutput, RemoteShell, TransportFault};
use crate::utils::shell;

/// A finished remote command, with secrets already masked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub struct ServiceControl<'a> {
    remote: &'a dyn RemoteShell,
    service: &'a str,
    privilege: Privilege,
    credential: &'a Credential,
    redactor: &'a Redactor<'a>,
}

impl<'a> ServiceControl<'a> {
    pub fn new(
        remote: &'a dyn RemoteShell,
        service: &'a str,
        privilege: Privilege,
        credential: &'a Credential,
        redactor: &'a Redactor<'a>,
    ) -> Self {
        Self {
            remote,
            service,
            privilege,
            credential,
            redactor,
        }
    }

    pub fn restart_command(&self) -> String {
        self.supervisor_command(&format!("restart {}", shell::quote_arg(self.service)))
    }

    pub fn status_command(&self) -> String {
        self.supervisor_command(&format!(
            "status {} --no-pager",
            shell::quote_arg(self.service)
        ))
    }

    fn supervisor_command(&self, action: &str) -> String {
        match self.privilege {
            Privilege::SudoPassword => format!("sudo -S -p '' systemctl {}", action),
            Privilege::Sudo => format!("sudo -n systemctl {}", action),
            Privilege::None => format!("systemctl {}", action),
        }
    }

    /// Blocks until the remote restart returns its exit status.
    pub fn restart(&self) -> Result<CommandRecord> {
        let command = self.restart_command();
        log_status!("remote", "Restarting service {}", self.service);

        let (record, output) = self.run(&command);
        if output.success {
            return Ok(record);
        }

        Err(self
            .transport_error(&output, "restart")
            .unwrap_or_else(|| Error::remote_command_failed(self.failure_details(record))))
    }

    /// Query service status. A non-zero exit carries the captured status text.
    pub fn status(&self) -> Result<CommandRecord> {
        let command = self.status_command();
        log_status!("remote", "Checking status of {}", self.service);

        let (record, output) = self.run(&command);
        for line in record.stdout.lines() {
            log_status!("status", "{}", line);
        }

        if output.success {
            return Ok(record);
        }

        Err(self
            .transport_error(&output, "status")
            .unwrap_or_else(|| Error::service_unhealthy(self.failure_details(record))))
    }

    fn run(&self, command: &str) -> (CommandRecord, CommandOutput) {
        let output = match self.privilege {
            Privilege::SudoPassword => {
                let line = self.credential.stdin_line();
                self.remote.execute(command, Some(line.as_slice()))
            }
            Privilege::Sudo | Privilege::None => self.remote.execute(command, None),
        };

        let record = CommandRecord {
            command: command.to_string(),
            exit_code: output.exit_code,
            stdout: self.redactor.redact(&output.stdout),
            stderr: self.redactor.redact(&output.stderr),
        };
        (record, output)
    }

    fn transport_error(&self, output: &CommandOutput, operation: &str) -> Option<Error> {
        let stderr = self.redactor.redact(output.error_text());
        match self.remote.transport_fault(output)? {
            TransportFault::Auth => Some(Error::ssh_auth_failed(operation, output.exit_code, stderr)),
            TransportFault::Connect => {
                Some(Error::ssh_connect_failed(operation, output.exit_code, stderr))
            }
        }
    }

    fn failure_details(&self, record: CommandRecord) -> RemoteCommandFailedDetails {
        RemoteCommandFailedDetails {
            command: record.command,
            exit_code: record.exit_code,
            stdout: record.stdout,
            stderr: record.stderr,
            service: Some(self.service.to_string()),
        }
    }
}
