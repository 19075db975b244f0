//! Maps `audio_playback` tool calls onto supervisor operations.

use audio_playback_types::{ToolCall, ToolResponse};

use crate::error::PlaybackError;
use crate::supervisor::SharedSupervisor;

pub const DEFAULT_LIST_LIMIT: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Play,
    Stop,
    Status,
    ListFiles,
}

impl Action {
    fn parse(raw: &str) -> Result<Self, PlaybackError> {
        match raw.trim() {
            "play" => Ok(Action::Play),
            "stop" => Ok(Action::Stop),
            "status" => Ok(Action::Status),
            "list_files" => Ok(Action::ListFiles),
            other => Err(PlaybackError::InvalidAction(other.to_string())),
        }
    }
}

/// Validates tool calls and shapes response envelopes.
#[derive(Clone)]
pub struct ToolDispatcher {
    supervisor: SharedSupervisor,
}

impl ToolDispatcher {
    pub fn new(supervisor: SharedSupervisor) -> Self {
        Self { supervisor }
    }

    /// Run one tool call. Failures become `success: false` envelopes that
    /// still carry the current state.
    pub async fn dispatch(&self, call: ToolCall) -> ToolResponse {
        match self.try_dispatch(&call).await {
            Ok(response) => response,
            Err(e) => {
                tracing::info!(
                    action = %call.action,
                    kind = e.kind(),
                    error = %e,
                    "tool call failed"
                );
                ToolResponse::failure(e.to_string(), self.supervisor.snapshot().await)
            }
        }
    }

    async fn try_dispatch(&self, call: &ToolCall) -> Result<ToolResponse, PlaybackError> {
        let action = Action::parse(&call.action)?;
        tracing::debug!(?action, "tool call");
        match action {
            Action::Play => {
                let filename = call
                    .filename
                    .as_deref()
                    .filter(|f| !f.trim().is_empty())
                    .ok_or(PlaybackError::MissingParameter("filename"))?;
                let start_offset_ms = non_negative(call.start_offset_ms, "start_offset_ms")?.unwrap_or(0);
                let loop_playback = call.loop_playback.unwrap_or(false);
                let outcome = self
                    .supervisor
                    .play(filename, loop_playback, start_offset_ms)
                    .await?;
                Ok(ToolResponse::ok(outcome.message, outcome.state))
            }
            Action::Stop => {
                let outcome = self.supervisor.stop().await;
                Ok(ToolResponse::ok(outcome.message, outcome.state))
            }
            Action::Status => {
                let outcome = self.supervisor.status().await;
                Ok(ToolResponse::ok(outcome.message, outcome.state))
            }
            Action::ListFiles => {
                let limit = non_negative(call.list_limit, "list_limit")?
                    .map(|v| usize::try_from(v).unwrap_or(usize::MAX))
                    .unwrap_or(DEFAULT_LIST_LIMIT);
                let listing = self.supervisor.list_files(limit);
                let state = self.supervisor.snapshot().await;
                Ok(
                    ToolResponse::ok("Listed files available under AUDIO_ROOT_DIR.", state)
                        .with_files(listing),
                )
            }
        }
    }
}

fn non_negative(value: Option<i64>, name: &str) -> Result<Option<u64>, PlaybackError> {
    match value {
        None => Ok(None),
        Some(v) if v < 0 => Err(PlaybackError::InvalidParameter(format!(
            "{name} must be non-negative."
        ))),
        Some(v) => Ok(Some(v as u64)),
    }
}
