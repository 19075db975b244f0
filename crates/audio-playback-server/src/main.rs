mod cli;
mod clock;
mod config;
mod dispatcher;
mod error;
mod mcp;
mod openapi;
mod paths;
mod player;
mod startup;
mod supervisor;
mod transport;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    // stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,audio_playback_server=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let config = match startup::load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    startup::run(config).await
}
