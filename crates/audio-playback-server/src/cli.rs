use std::path::PathBuf;

use clap::Parser;

use crate::config::Transport;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "audio-playback-server", version = VERSION)]
pub struct Args {
    /// JSON config file (overrides AUDIO_PLAYBACK_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Transport to serve: stdio or http (overrides MCP_TRANSPORT)
    #[arg(long, value_parser = parse_transport)]
    pub transport: Option<Transport>,

    /// HTTP bind address, e.g. 127.0.0.1:8765 (overrides MCP_HTTP_HOST/MCP_HTTP_PORT)
    #[arg(long)]
    pub bind: Option<String>,
}

fn parse_transport(raw: &str) -> Result<Transport, String> {
    raw.parse()
}
