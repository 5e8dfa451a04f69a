//! Newline-delimited JSON-RPC over stdin/stdout.

use crate::mcp::McpServer;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Serves MCP on the process's stdin and stdout until stdin closes.
///
/// # Errors
///
/// Returns the I/O error that ended the session, if any.
pub async fn run_stdio(server: McpServer) -> std::io::Result<()> {
    tracing::info!("mcp stdio transport started");
    let result = serve_lines(&server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await;
    tracing::info!("mcp stdio transport stopped");
    result
}

/// Reads one JSON-RPC message per line from `reader` and writes one
/// response per line to `writer`. Blank lines are skipped and
/// notifications are not answered.
///
/// # Errors
///
/// Returns the first read or write error.
pub async fn serve_lines<R, W>(server: &McpServer, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(response) = server.handle_message(line).await else {
            continue;
        };

        let mut frame = serde_json::to_vec(&response).map_err(std::io::Error::other)?;
        frame.push(b'\n');
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }

    tracing::debug!("stdin reached EOF");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolHandler;
    use captains_db::{open_database, DbRuntimeSettings, MEMORY_PATH};
    use captains_log::Journal;
    use serde_json::Value;

    fn server() -> McpServer {
        let pool = open_database(MEMORY_PATH, DbRuntimeSettings::default())
            .expect("database should open");
        McpServer::new(ToolHandler::new(Journal::new(pool)))
    }

    #[tokio::test]
    async fn answers_each_request_line() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"multiply","arguments":{"a":4,"b":7}}}"#,
            "\n",
        );
        let mut output = Vec::new();

        serve_lines(&server(), input.as_bytes(), &mut output)
            .await
            .expect("serve should finish at EOF");

        let responses: Vec<Value> = String::from_utf8(output)
            .expect("utf-8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line is JSON"))
            .collect();

        assert_eq!(responses.len(), 2, "notification must not be answered");
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["result"]["content"][0]["text"], "28.0");
    }
}
