//! Newline-delimited JSON-RPC over stdin/stdout.

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::mcp::{JsonRpcResponse, McpServer, PARSE_ERROR};

/// Serve the process's stdin/stdout until EOF.
pub async fn run(server: &McpServer) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(server, stdin, stdout).await
}

/// Read one message per line and write one response line per request.
pub async fn serve<R, W>(server: &McpServer, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await.context("read stdin")? == 0 {
            break;
        }
        let response = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => server.handle_text(line.trim_end()).await,
            Err(e) => {
                tracing::warn!(error = %e, "non-utf8 json-rpc message");
                Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ))
            }
        };
        if let Some(response) = response {
            write_response(&mut writer, &response).await?;
        }
    }
    tracing::info!("stdin closed");
    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let mut payload = serde_json::to_vec(response).context("serialize response")?;
    payload.push(b'\n');
    writer.write_all(&payload).await.context("write stdout")?;
    writer.flush().await.context("flush stdout")?;
    Ok(())
}
