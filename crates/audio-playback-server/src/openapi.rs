use audio_playback_types::{
    FileEntry, FileListing, PlaybackSnapshot, PlaybackStatus, ToolCall, ToolResponse,
};
use utoipa::OpenApi;

use crate::transport::http;

#[derive(OpenApi)]
#[openapi(
    paths(
        http::health,
        http::mcp_endpoint,
    ),
    components(
        schemas(
            http::HealthResponse,
            ToolCall,
            ToolResponse,
            PlaybackSnapshot,
            PlaybackStatus,
            FileListing,
            FileEntry,
        )
    ),
    tags(
        (name = "audio-playback-server", description = "MCP audio playback tool over JSON-RPC")
    )
)]
pub struct ApiDoc;
