//! A minimal compute provider speaking newline-delimited JSON-RPC over stdio.
//! Useful for trying the orchestrator locally without a real tool server.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

fn tools() -> Value {
    json!([
        {
            "name": "echo",
            "description": "Returns the given text unchanged",
            "inputSchema": {
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }
        },
        {
            "name": "list_directory",
            "description": "Lists the entries of a directory",
            "inputSchema": {
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }
        }
    ])
}

fn text_result(text: String, is_error: bool) -> Value {
    json!({"content": [{"type": "text", "text": text}], "isError": is_error})
}

fn list_directory(path: &str) -> Value {
    match std::fs::read_dir(path) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            text_result(names.join("\n"), false)
        }
        Err(e) => text_result(format!("Cannot list {}: {}", path, e), true),
    }
}

fn call_tool(params: &Value) -> Result<Value, (i64, String)> {
    let arguments = &params["arguments"];
    match params["name"].as_str() {
        Some("echo") => Ok(text_result(
            arguments["text"].as_str().unwrap_or_default().to_string(),
            false,
        )),
        Some("list_directory") => Ok(list_directory(arguments["path"].as_str().unwrap_or("."))),
        Some(name) => Err((-32602, format!("Unknown tool: {}", name))),
        None => Err((-32602, "Missing tool name".to_string())),
    }
}

fn handle(request: &Request) -> Result<Value, (i64, String)> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": request.params["protocolVersion"]
                .as_str()
                .unwrap_or("2024-11-05"),
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "stub-provider", "version": env!("CARGO_PKG_VERSION")}
        })),
        "tools/list" => Ok(json!({"tools": tools()})),
        "tools/call" => call_tool(&request.params),
        other => Err((-32601, format!("Method not found: {}", other))),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    eprintln!("Stub provider ready on stdio");
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Request>(&line) {
            // Notifications carry no id and get no reply
            Ok(request) => match request.id.clone() {
                None => continue,
                Some(id) => match handle(&request) {
                    Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    Err((code, message)) => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": code, "message": message}
                    }),
                },
            },
            Err(e) => json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": format!("Parse error: {}", e)}
            }),
        };

        stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}
