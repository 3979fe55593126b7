//! Transfer Agent: put the stamped artifact at its remote path.
//!
//! Atomic mode uploads to a staging file beside the destination, checks its
//! SHA-256 against the local bytes, then renames it over the destination, so
//! a broken copy never replaces the running bot's file. Direct mode writes
//! the destination in place and can leave it truncated if the copy dies.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::credential::Redactor;
use crate::error::{Error, Result};
use crate::ssh::{CommandOutput, RemoteShell, TransportFault};
use crate::utils::{base_path, io, shell};

#[derive(Debug, Clone)]
pub struct TransferRequest<'a> {
    pub destination: &'a str,
    pub run_id: &'a str,
    pub atomic: bool,
    pub verify_checksum: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub file_name: String,
    pub bytes: usize,
    pub sha256: String,
    pub atomic: bool,
    pub verified: bool,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Staging path: hidden sibling of the destination, unique per run.
pub fn staging_path(destination: &str, run_id: &str) -> Result<String> {
    let dir = base_path::remote_dirname(destination)?;
    let name = base_path::remote_basename(destination)?;
    let staged = format!(".{}.botdeploy-{}.tmp", name, run_id);
    if dir == "/" {
        Ok(format!("/{}", staged))
    } else {
        Ok(format!("{}/{}", dir, staged))
    }
}

pub fn transfer(
    remote: &dyn RemoteShell,
    bytes: &[u8],
    request: &TransferRequest<'_>,
    redactor: &Redactor<'_>,
) -> Result<TransferReceipt> {
    let file_name = base_path::remote_basename(request.destination)?;
    let digest = sha256_hex(bytes);
    let local = io::write_temp_file(bytes, "stage artifact")?;

    let upload_target = if request.atomic {
        staging_path(request.destination, request.run_id)?
    } else {
        log_status!(
            "transfer",
            "Non-atomic transfer: a failed copy can leave {} truncated on the remote",
            file_name
        );
        request.destination.to_string()
    };
    let staging = request.atomic.then(|| upload_target.clone());

    log_status!("transfer", "Uploading {} ({} bytes)", file_name, bytes.len());
    let output = remote.upload(local.path(), &upload_target);
    check(remote, &output, "upload", "Upload failed", staging.as_deref(), redactor)?;

    if request.verify_checksum {
        let output = remote.execute(
            &format!("sha256sum {}", shell::quote_path(&upload_target)),
            None,
        );
        check(
            remote,
            &output,
            "checksum",
            "Could not checksum uploaded file",
            staging.as_deref(),
            redactor,
        )?;

        let remote_digest = output.stdout.split_whitespace().next().unwrap_or_default();
        if !remote_digest.eq_ignore_ascii_case(&digest) {
            return Err(Error::transfer_failed(
                format!(
                    "Uploaded file checksum mismatch (expected {}, got {})",
                    digest,
                    if remote_digest.is_empty() { "nothing" } else { remote_digest }
                ),
                output.exit_code,
                redactor.redact(&output.stderr),
                staging.as_deref().map(|s| redactor.redact(s)),
            ));
        }
    }

    if request.atomic {
        let output = remote.execute(
            &format!(
                "mv -f {} {}",
                shell::quote_path(&upload_target),
                shell::quote_path(request.destination)
            ),
            None,
        );
        check(
            remote,
            &output,
            "rename",
            "Failed to move uploaded file into place",
            staging.as_deref(),
            redactor,
        )?;
    }

    log_status!("transfer", "{} in place (sha256 {})", file_name, digest);

    Ok(TransferReceipt {
        file_name,
        bytes: bytes.len(),
        sha256: digest,
        atomic: request.atomic,
        verified: request.verify_checksum,
    })
}

fn check(
    remote: &dyn RemoteShell,
    output: &CommandOutput,
    operation: &str,
    message: &str,
    staging: Option<&str>,
    redactor: &Redactor<'_>,
) -> Result<()> {
    if output.success {
        return Ok(());
    }

    let stderr = redactor.redact(output.error_text());
    let err = match remote.transport_fault(output) {
        Some(TransportFault::Auth) => Error::ssh_auth_failed(operation, output.exit_code, stderr),
        Some(TransportFault::Connect) => {
            Error::ssh_connect_failed(operation, output.exit_code, stderr)
        }
        None => Error::transfer_failed(
            format!("{} (exit {})", message, output.exit_code),
            output.exit_code,
            stderr,
            staging.map(|s| redactor.redact(s)),
        ),
    };

    Err(err)
}
