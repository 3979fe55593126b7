use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::process::{Command, Stdio};

use super::{classify_transport, CommandOutput, RemoteShell, TransportFault};
use crate::config::DeployConfig;
use crate::credential::Credential;
use crate::utils::shell;

/// sshpass: the ssh password prompt was answered and rejected.
const SSHPASS_BAD_PASSWORD: i32 = 5;
/// sshpass: host key unknown under strict checking.
const SSHPASS_HOST_KEY_UNKNOWN: i32 = 6;

/// Password-authenticated OpenSSH client.
///
/// Every call spawns `sshpass -d <fd> ssh ...`; the password reaches sshpass
/// through an inherited pipe and never touches argv or the environment.
pub struct SshClient<'a> {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub strict_host_key_checking: bool,
    credential: &'a Credential,
}

impl<'a> SshClient<'a> {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        port: u16,
        strict_host_key_checking: bool,
        credential: &'a Credential,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            port,
            strict_host_key_checking,
            credential,
        }
    }

    pub fn from_config(config: &'a DeployConfig) -> Self {
        let remote = &config.settings.remote;
        if !remote.strict_host_key_checking {
            log_status!(
                "ssh",
                "Host key verification is disabled (remote.strict_host_key_checking = false)"
            );
        }

        Self::new(
            config.secrets.host.clone(),
            config.secrets.user.clone(),
            remote.port,
            remote.strict_host_key_checking,
            &config.secrets.credential,
        )
    }

    fn build_ssh_args(&self, password_fd: RawFd, command: &str) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(),
            password_fd.to_string(),
            "ssh".to_string(),
        ];

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        let host_key_options: &[&str] = if self.strict_host_key_checking {
            &["StrictHostKeyChecking=yes"]
        } else {
            &["StrictHostKeyChecking=no", "UserKnownHostsFile=/dev/null"]
        };

        // Password-only, non-interactive session with timeout and keepalive
        // so a stalled connection cannot hang the run.
        for option in host_key_options.iter().copied().chain([
            "LogLevel=ERROR",
            "PubkeyAuthentication=no",
            "PreferredAuthentications=password,keyboard-interactive",
            "NumberOfPasswordPrompts=1",
            "ConnectTimeout=10",
            "ServerAliveInterval=15",
            "ServerAliveCountMax=3",
        ]) {
            args.push("-o".to_string());
            args.push(option.to_string());
        }

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());
        args
    }

    fn base_command(&self, command: &str, password: &PasswordPipe) -> Command {
        let mut cmd = Command::new("sshpass");
        cmd.args(self.build_ssh_args(password.fd(), command));
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn password_pipe(&self) -> std::result::Result<PasswordPipe, CommandOutput> {
        PasswordPipe::new(self.credential).map_err(|e| {
            CommandOutput::failed(-1, format!("Failed to hand password to sshpass: {}", e))
        })
    }

    fn run_with_stdin_bytes(&self, command: &str, input: Option<&[u8]>) -> CommandOutput {
        let password = match self.password_pipe() {
            Ok(pipe) => pipe,
            Err(output) => return output,
        };
        let mut cmd = self.base_command(command, &password);
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let spawned = cmd.spawn();
        // The child holds its own copy of the read end now.
        drop(password);
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return spawn_failure(e),
        };

        let mut write_error = None;
        if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
            if let Err(e) = stdin.write_all(bytes) {
                write_error = Some(e);
            }
        }

        collect(child.wait_with_output(), write_error)
    }

    fn run_with_stdin_file(&self, command: &str, local_path: &Path) -> CommandOutput {
        let file = match std::fs::File::open(local_path) {
            Ok(file) => file,
            Err(err) => {
                return CommandOutput::failed(-1, format!("Failed to open stdin file: {}", err))
            }
        };

        let password = match self.password_pipe() {
            Ok(pipe) => pipe,
            Err(output) => return output,
        };
        let mut cmd = self.base_command(command, &password);
        cmd.stdin(file);

        let spawned = cmd.spawn();
        drop(password);
        match spawned {
            Ok(child) => collect(child.wait_with_output(), None),
            Err(e) => spawn_failure(e),
        }
    }
}

/// Read end of a pipe preloaded with the password line, for `sshpass -d`.
///
/// The write end is closed before any child is spawned, so sshpass sees the
/// line followed by EOF. Only the read end is inheritable.
struct PasswordPipe {
    read: OwnedFd,
}

impl PasswordPipe {
    fn new(credential: &Credential) -> io::Result<Self> {
        let mut fds: [libc::c_int; 2] = [-1; 2];
        // SAFETY: `fds` is a valid two-element buffer for pipe(2).
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: pipe(2) succeeded, both descriptors are open and owned here.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        // A password line is far below the pipe buffer, so this never blocks.
        let mut writer = File::from(write);
        writer.write_all(credential.stdin_line().as_slice())?;
        drop(writer);

        Ok(Self { read })
    }

    fn fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }
}

impl RemoteShell for SshClient<'_> {
    fn execute(&self, command: &str, stdin: Option<&[u8]>) -> CommandOutput {
        self.run_with_stdin_bytes(command, stdin)
    }

    /// Streams the file into `cat` on the remote side; a short write or a
    /// full disk surfaces as a non-zero exit.
    fn upload(&self, local_path: &Path, remote_path: &str) -> CommandOutput {
        let remote_command = format!("cat > {}", shell::quote_path(remote_path));
        self.run_with_stdin_file(&remote_command, local_path)
    }

    fn transport_fault(&self, output: &CommandOutput) -> Option<TransportFault> {
        if output.success {
            return None;
        }
        // sshpass's own codes only mean something when the remote side produced
        // no output; `systemctl` also exits 5 for an unknown unit.
        if output.stdout.is_empty() && !remote_wrote_stderr(output) {
            match output.exit_code {
                SSHPASS_BAD_PASSWORD => return Some(TransportFault::Auth),
                SSHPASS_HOST_KEY_UNKNOWN => return Some(TransportFault::Connect),
                _ => {}
            }
        }
        if output.exit_code == -1 {
            return Some(TransportFault::Connect);
        }
        classify_transport(output)
    }
}

/// True when stderr holds something other than ssh's own complaints.
fn remote_wrote_stderr(output: &CommandOutput) -> bool {
    !output.stderr.trim().is_empty() && classify_transport(output).is_none()
}

fn collect(
    output: std::io::Result<std::process::Output>,
    write_error: Option<std::io::Error>,
) -> CommandOutput {
    match output {
        Ok(out) => {
            let mut result = CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            };
            if let Some(e) = write_error {
                result.success = false;
                if result.exit_code == 0 {
                    result.exit_code = -1;
                }
                result.stderr.push_str(&format!("\nFailed to write stdin: {}", e));
            }
            result
        }
        Err(e) => CommandOutput::failed(-1, format!("SSH error: {}", e)),
    }
}

fn spawn_failure(e: std::io::Error) -> CommandOutput {
    let hint = if e.kind() == std::io::ErrorKind::NotFound {
        " (is sshpass installed?)"
    } else {
        ""
    };
    CommandOutput::failed(-1, format!("Failed to start sshpass: {}{}", e, hint))
}
