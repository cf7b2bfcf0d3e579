//! MCP stdio transport (`--mode stdio`): JSON-RPC 2.0, one object per
//! line. Grounded on the teacher's `mcp_bridge::run()` loop, generalised
//! from its synchronous `std::io::stdin()` read loop to `tokio::io`
//! equivalents since `tools::execute_tool` is itself async (every
//! subsystem call it dispatches to goes through a `tokio::sync::Mutex`).

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::app::AppState;
use crate::tools::{execute_tool, tool_definitions};

/// Run the MCP stdio loop. Blocks (on the calling task) until stdin hits
/// EOF — the caller's `main` awaits this directly on the current-thread
/// task, same lifetime as the teacher's blocking `run()`.
pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                write_response(
                    &mut stdout,
                    json!(null),
                    Some(json!({ "code": -32700, "message": format!("Parse error: {e}") })),
                    None,
                )
                .await?;
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(json!(null));
        let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("");
        let is_notification = request.get("id").is_none();

        match method {
            "initialize" => {
                write_response(
                    &mut stdout,
                    id,
                    None,
                    Some(json!({
                        "protocolVersion": "2025-06-18",
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "mojo-gateway", "version": env!("CARGO_PKG_VERSION") }
                    })),
                )
                .await?;
            }

            "notifications/initialized" => {}

            "tools/list" => {
                write_response(&mut stdout, id, None, Some(json!({ "tools": tool_definitions() }))).await?;
            }

            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(json!({}));
                let tool_name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

                match execute_tool(&state, tool_name, &arguments).await {
                    Ok(value) => {
                        let text = serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());
                        write_response(
                            &mut stdout,
                            id,
                            None,
                            Some(json!({ "content": [{"type": "text", "text": text}], "isError": false })),
                        )
                        .await?;
                    }
                    Err(err) => {
                        let envelope = err.to_envelope();
                        let text = serde_json::to_string(&envelope).unwrap_or_else(|_| err.to_string());
                        write_response(
                            &mut stdout,
                            id,
                            None,
                            Some(json!({ "content": [{"type": "text", "text": text}], "isError": true })),
                        )
                        .await?;
                    }
                }
            }

            _ => {
                if !is_notification {
                    write_response(
                        &mut stdout,
                        id,
                        Some(json!({ "code": -32601, "message": format!("Method not found: {method}") })),
                        None,
                    )
                    .await?;
                }
            }
        }
    }

    Ok(())
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    id: Value,
    error: Option<Value>,
    result: Option<Value>,
) -> std::io::Result<()> {
    let response = if let Some(err) = error {
        json!({ "jsonrpc": "2.0", "id": id, "error": err })
    } else {
        json!({ "jsonrpc": "2.0", "id": id, "result": result.unwrap_or(json!(null)) })
    };
    let mut bytes = serde_json::to_vec(&response).unwrap_or_default();
    bytes.push(b'\n');
    stdout.write_all(&bytes).await?;
    stdout.flush().await?;
    Ok(())
}
