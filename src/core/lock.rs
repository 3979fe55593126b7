//! Local run lock keyed by remote target.
//!
//! The pipeline itself never locks. Callers that may start overlapping runs
//! against the same target take this lock around the run; it only guards
//! runs on one machine. The lock is a `flock(2)` on a file in the temp dir,
//! so the kernel drops it when the holder exits, however it exits. The file
//! itself stays behind and only records the holder's PID.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::transfer::sha256_hex;

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    pub fn acquire(target_identity: &str) -> Result<Self> {
        Self::acquire_in(&std::env::temp_dir(), target_identity)
    }

    pub fn acquire_in(dir: &Path, target_identity: &str) -> Result<Self> {
        let path = lock_path(dir, target_identity);
        let io_error = |e: io::Error, action: &str| {
            Error::internal_io(e.to_string(), Some(format!("{} {}", action, path.display())))
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_error(e, "open lock"))?;

        // SAFETY: the descriptor belongs to `file`, which outlives the call.
        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
            let err = io::Error::last_os_error();
            if err.kind() == ErrorKind::WouldBlock {
                return Err(Error::run_locked(
                    path.display().to_string(),
                    holder_pid(&mut file),
                ));
            }
            return Err(io_error(err, "lock"));
        }

        // Whatever a dead holder left behind is overwritten.
        file.set_len(0).map_err(|e| io_error(e, "truncate lock"))?;
        writeln!(file, "{}", std::process::id()).map_err(|e| io_error(e, "write lock"))?;
        file.flush().map_err(|e| io_error(e, "write lock"))?;
        log_status!("lock", "Acquired {}", path.display());

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    /// Clears the PID; closing the file releases the lock. The file is not
    /// unlinked, so a waiting opener can never lock a stale inode.
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
    }
}

fn holder_pid(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

/// The file name carries a digest of the identity, never the identity itself.
fn lock_path(dir: &Path, target_identity: &str) -> PathBuf {
    let digest = sha256_hex(target_identity.as_bytes());
    dir.join(format!("botdeploy-{}.lock", &digest[..16]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_target_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _held = RunLock::acquire_in(dir.path(), "pi@bot:22:/home/pi/bot/main.py#bot").unwrap();

        let err = RunLock::acquire_in(dir.path(), "pi@bot:22:/home/pi/bot/main.py#bot").unwrap_err();
        assert_eq!(err.code.as_str(), "run.locked");
        assert_eq!(err.details["holderPid"], std::process::id());
    }

    #[test]
    fn different_targets_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let _a = RunLock::acquire_in(dir.path(), "target-a").unwrap();
        let _b = RunLock::acquire_in(dir.path(), "target-b").unwrap();
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let lock = RunLock::acquire_in(dir.path(), "target").unwrap();
            assert_eq!(
                std::fs::read_to_string(lock.path()).unwrap().trim(),
                std::process::id().to_string()
            );
            lock.path().to_path_buf()
        };
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        RunLock::acquire_in(dir.path(), "target").unwrap();
    }

    #[test]
    fn lock_file_left_by_a_killed_run_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(dir.path(), "target");
        // A run killed mid-deploy leaves its file and PID, but no kernel lock.
        std::fs::write(&path, "4194303\n").unwrap();

        let lock = RunLock::acquire_in(dir.path(), "target").unwrap();
        assert_eq!(
            std::fs::read_to_string(lock.path()).unwrap().trim(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn lock_file_name_hides_target() {
        let path = lock_path(Path::new("/tmp"), "pi@bot.example.com:22");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("botdeploy-"));
        assert!(!name.contains("example"));
    }
}
