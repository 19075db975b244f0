//! External player process control.
//!
//! This is the only module that spawns or signals OS processes. A
//! [`ProcessHandle`] owns exactly one player child and reaps it on every exit
//! path, including drop.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::PlaybackError;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Builds ffplay invocations for a fixed executable and output device.
#[derive(Clone, Debug)]
pub struct PlayerCommand {
    program: String,
    device: String,
}

impl PlayerCommand {
    pub fn new(program: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            device: device.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument vector for one playback.
    pub fn args(&self, path: &Path, loop_playback: bool, start_offset_ms: u64) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-nodisp", "-autoexit", "-vn", "-loglevel", "error"]
            .into_iter()
            .map(OsString::from)
            .collect();
        if start_offset_ms > 0 {
            args.push("-ss".into());
            args.push(format!("{:.3}", start_offset_ms as f64 / 1000.0).into());
        }
        if loop_playback {
            args.push("-loop".into());
            args.push("0".into());
        }
        args.push("-device".into());
        args.push(self.device.clone().into());
        args.push("-i".into());
        args.push(path.as_os_str().to_os_string());
        args
    }
}

/// One running (or finished) player process.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Option<Child>,
    pid: u32,
}

impl ProcessHandle {
    /// Spawn the player for `path`.
    pub fn start(
        command: &PlayerCommand,
        path: &Path,
        loop_playback: bool,
        start_offset_ms: u64,
    ) -> Result<Self, PlaybackError> {
        let child = Command::new(command.program())
            .args(command.args(path, loop_playback, start_offset_ms))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PlaybackError::LaunchError(format!(
                    "ffplay not found at '{}'.",
                    command.program()
                )),
                _ => PlaybackError::LaunchError(format!("Failed to start playback: {e}")),
            })?;
        let pid = child.id();
        tracing::debug!(pid, program = %command.program(), path = %path.display(), "player spawned");
        Ok(Self {
            child: Some(child),
            pid,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking liveness check. Reaps the child once it has exited.
    pub fn is_alive(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(pid = self.pid, %status, "player exited");
                self.child = None;
                false
            }
            Err(e) => {
                tracing::warn!(pid = self.pid, error = %e, "player status check failed");
                false
            }
        }
    }

    /// Ask the player to exit, killing it if it is still running after `grace`.
    ///
    /// Calling this on a handle that already exited or was terminated is a no-op.
    pub async fn terminate(&mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(pid = self.pid, %status, "player already exited");
            return;
        }

        request_exit(&mut child);
        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(pid = self.pid, %status, "player terminated");
                    return;
                }
                Ok(None) if Instant::now() < deadline => {
                    tokio::time::sleep(EXIT_POLL_INTERVAL).await;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(pid = self.pid, error = %e, "player wait failed");
                    break;
                }
            }
        }

        tracing::warn!(pid = self.pid, grace_ms = grace.as_millis() as u64, "player ignored terminate; killing");
        force_kill(&mut child);
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                force_kill(&mut child);
            }
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    // SAFETY: the pid belongs to a child we have not reaped yet, so it cannot
    // have been recycled for another process.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(pid = child.id(), error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.kill();
}

fn force_kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(pid = child.id(), error = %e, "kill failed");
    }
    let _ = child.wait();
}
