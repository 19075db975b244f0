//! Playback supervision: the single playback session and its player process.
//!
//! All transitions (`play`, `stop`, and the exit reconciliation done by
//! `status`) run under one async mutex, so spawn and terminate steps from
//! concurrent requests never interleave.
//!
//! ```text
//! Idle --play--> Playing --stop | player exit | replacing play--> Stopped --play--> Playing
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use audio_playback_types::{FileListing, PlaybackSnapshot, PlaybackStatus};
use tokio::sync::Mutex;

use crate::clock::SharedClock;
use crate::error::PlaybackError;
use crate::paths::{PathResolver, ResolvedPath};
use crate::player::{PlayerCommand, ProcessHandle};

pub type SharedSupervisor = Arc<PlaybackSupervisor>;

/// Message plus the state snapshot taken right after an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub message: String,
    pub state: PlaybackSnapshot,
}

#[derive(Debug, Default)]
struct Session {
    status: PlaybackStatus,
    current_file: Option<PathBuf>,
    started_at_ms: Option<i64>,
    loop_playback: bool,
    start_offset_ms: u64,
    /// Position captured when the session left `Playing`.
    frozen_position_ms: Option<i64>,
    /// Present exactly while `status == Playing`.
    process: Option<ProcessHandle>,
}

impl Session {
    fn playing(
        resolved: &ResolvedPath,
        loop_playback: bool,
        start_offset_ms: u64,
        started_at_ms: i64,
        process: ProcessHandle,
    ) -> Self {
        Self {
            status: PlaybackStatus::Playing,
            current_file: Some(resolved.absolute.clone()),
            started_at_ms: Some(started_at_ms),
            loop_playback,
            start_offset_ms,
            frozen_position_ms: None,
            process: Some(process),
        }
    }

    fn live_position(&self, now_ms: i64) -> Option<i64> {
        let started = self.started_at_ms?;
        let elapsed = (now_ms - started).max(0);
        // No duration is known, so looping sessions keep counting past the end.
        Some((self.start_offset_ms as i64).saturating_add(elapsed).max(0))
    }

    /// Leave `Playing`, freezing the position. Returns the process to terminate.
    fn end(&mut self, now_ms: i64) -> Option<ProcessHandle> {
        if self.status != PlaybackStatus::Playing {
            return None;
        }
        self.frozen_position_ms = self.live_position(now_ms);
        self.status = PlaybackStatus::Stopped;
        self.process.take()
    }

    fn snapshot(&self, now_ms: i64) -> PlaybackSnapshot {
        let position_estimate_ms = match self.status {
            PlaybackStatus::Playing => self.live_position(now_ms),
            _ => self.frozen_position_ms,
        };
        PlaybackSnapshot {
            status: self.status,
            current_file: self
                .current_file
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            started_at_ms: self.started_at_ms,
            position_estimate_ms,
        }
    }
}

/// Owns the playback session and drives the player process.
pub struct PlaybackSupervisor {
    resolver: PathResolver,
    command: PlayerCommand,
    clock: SharedClock,
    stop_grace: Duration,
    session: Mutex<Session>,
}

impl PlaybackSupervisor {
    pub fn new(
        resolver: PathResolver,
        command: PlayerCommand,
        clock: SharedClock,
        stop_grace: Duration,
    ) -> Self {
        Self {
            resolver,
            command,
            clock,
            stop_grace,
            session: Mutex::new(Session::default()),
        }
    }

    /// Start playing `filename`, replacing any running playback.
    ///
    /// Path errors are returned before the current session is touched. A
    /// launch failure leaves the previous session stopped.
    pub async fn play(
        &self,
        filename: &str,
        loop_playback: bool,
        start_offset_ms: u64,
    ) -> Result<Outcome, PlaybackError> {
        let resolved = self.resolver.resolve(filename)?;

        let mut session = self.session.lock().await;
        self.reconcile(&mut session);
        if let Some(mut previous) = session.end(self.clock.now_ms()) {
            tracing::info!(pid = previous.pid(), "replacing current playback");
            previous.terminate(self.stop_grace).await;
        }

        let process =
            match ProcessHandle::start(&self.command, &resolved.absolute, loop_playback, start_offset_ms) {
                Ok(process) => process,
                Err(e) => {
                    tracing::warn!(
                        file = %resolved.relative,
                        error = %e,
                        "player launch failed"
                    );
                    return Err(e);
                }
            };
        let now = self.clock.now_ms();
        tracing::info!(
            file = %resolved.relative,
            pid = process.pid(),
            loop_playback,
            start_offset_ms,
            "playback started"
        );
        *session = Session::playing(&resolved, loop_playback, start_offset_ms, now, process);

        let mut message = format!("Playing '{}' from {} ms.", resolved.relative, start_offset_ms);
        if loop_playback {
            message.push_str(" Looping until stopped.");
        }
        Ok(Outcome {
            message,
            state: session.snapshot(now),
        })
    }

    /// Stop playback. Succeeds as a no-op when nothing is playing.
    pub async fn stop(&self) -> Outcome {
        let mut session = self.session.lock().await;
        self.reconcile(&mut session);
        let now = self.clock.now_ms();
        let message = match session.end(now) {
            Some(mut process) => {
                process.terminate(self.stop_grace).await;
                tracing::info!(
                    position_ms = ?session.frozen_position_ms,
                    "playback stopped"
                );
                "Playback stopped."
            }
            None => "No playback to stop.",
        };
        Outcome {
            message: message.to_string(),
            state: session.snapshot(now),
        }
    }

    /// Reconcile player exit, then report the session.
    pub async fn status(&self) -> Outcome {
        let state = self.snapshot().await;
        tracing::debug!(
            status = state.status.as_str(),
            position_ms = ?state.position_estimate_ms,
            "status"
        );
        let message = match state.status {
            PlaybackStatus::Playing => "Currently playing.",
            PlaybackStatus::Stopped => "Playback stopped.",
            PlaybackStatus::Idle => "Idle.",
        };
        Outcome {
            message: message.to_string(),
            state,
        }
    }

    /// Current state after reconciling a player that exited on its own.
    pub async fn snapshot(&self) -> PlaybackSnapshot {
        let mut session = self.session.lock().await;
        self.reconcile(&mut session);
        session.snapshot(self.clock.now_ms())
    }

    /// Files available for playback. Does not touch the session.
    pub fn list_files(&self, limit: usize) -> FileListing {
        self.resolver.list(limit)
    }

    /// Stop any running player before the server exits.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut process) = session.end(self.clock.now_ms()) {
            tracing::info!(pid = process.pid(), "stopping player on shutdown");
            process.terminate(self.stop_grace).await;
        }
    }

    /// Fold a player that exited by itself into `Stopped`.
    fn reconcile(&self, session: &mut Session) {
        let exited = session
            .process
            .as_mut()
            .is_some_and(|process| !process.is_alive());
        if exited {
            let now = self.clock.now_ms();
            drop(session.end(now));
            tracing::info!(
                loop_playback = session.loop_playback,
                position_ms = ?session.frozen_position_ms,
                "player exited; playback marked stopped"
            );
        }
    }
}
