use std::sync::Arc;

use clap::{Args, Subcommand};
use editor_bridge_core::{Catalog, CatalogError, Envelope};
use serde_json::{Map, Value, json};
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod handler;

use backend::{AutomationBackend, HttpAutomationBackend};
use config::RuntimeConfig;
use dispatch::Dispatcher;
use handler::ActionHandler;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "editor-bridge-mcp";
const RESPONSE_CHANNEL_CAPACITY: usize = 32;

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run the MCP server over stdio
    Serve,
    /// Print the tool catalog exactly as `tools/list` serves it
    Tools,
    /// Run one tool invocation and print its envelope
    Call(McpCallArgs),
}

#[derive(Args, Clone, Debug)]
pub struct McpCallArgs {
    /// Tool name, e.g. manage_input
    #[arg(long)]
    pub tool: String,
    /// Tool arguments as a JSON object, including the `action` selector
    #[arg(long, default_value = "{}")]
    pub args: String,
}

pub async fn run(config: RuntimeConfig, command: McpCommands) -> i32 {
    let handler = match build_handler(&config) {
        Ok(handler) => handler,
        Err(err) => {
            let payload = json!({
                "error": "catalog_invalid",
                "message": err.to_string(),
            });
            eprintln!("{}", to_pretty_json(&payload));
            return 1;
        }
    };

    match command {
        McpCommands::Serve => {
            let server = McpServer::new(handler);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Tools => {
            println!("{}", to_pretty_json(&tools_list_payload(handler.catalog())));
            0
        }
        McpCommands::Call(args) => {
            let arguments = match serde_json::from_str::<Value>(&args.args) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    eprintln!(
                        "{}",
                        to_pretty_json(&json!({
                            "error": "invalid_arguments",
                            "message": "--args must be a JSON object",
                        }))
                    );
                    return 2;
                }
                Err(err) => {
                    eprintln!(
                        "{}",
                        to_pretty_json(&json!({
                            "error": "invalid_arguments",
                            "message": format!("--args is not valid JSON: {err}"),
                        }))
                    );
                    return 2;
                }
            };
            let envelope = handler.handle(&args.tool, &arguments).await;
            println!("{}", to_pretty_json(&envelope.to_value()));
            if envelope.is_success() { 0 } else { 1 }
        }
    }
}

/// Load the catalog and wire the dispatcher to the configured bridge, if any.
pub fn build_handler(config: &RuntimeConfig) -> Result<ActionHandler, CatalogError> {
    let catalog = Arc::new(Catalog::builtin()?);
    let backend = config.bridge_url.as_ref().map(|url| {
        Arc::new(HttpAutomationBackend::new(
            url.clone(),
            config.bridge_token.clone(),
        )) as Arc<dyn AutomationBackend>
    });
    match &config.bridge_url {
        Some(url) => tracing::info!(
            bridge_url = %url,
            timeout_ms = config.request_timeout_ms,
            tools = catalog.tools.len(),
            "automation bridge configured"
        ),
        None => tracing::warn!("no automation bridge configured; dispatches will report it unavailable"),
    }
    Ok(ActionHandler::new(
        catalog,
        Dispatcher::new(backend, config.request_timeout_ms),
    ))
}

#[derive(Clone)]
pub struct McpServer {
    handler: ActionHandler,
}

impl McpServer {
    pub fn new(handler: ActionHandler) -> Self {
        Self { handler }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        let mut reader = BufReader::new(io::stdin());
        self.serve(&mut reader, io::stdout()).await
    }

    /// Every incoming message runs on its own task, so a slow dispatch never
    /// holds up later requests. Responses are written in completion order by a
    /// single writer task. At EOF, in-flight requests finish before returning.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Value>(RESPONSE_CHANNEL_CAPACITY);
        let writer_task = tokio::spawn(write_responses(writer, rx));
        let mut in_flight = JoinSet::new();

        let read_result = loop {
            let incoming = match read_framed_json(reader).await {
                Ok(Some(incoming)) => incoming,
                Ok(None) => break Ok(()),
                Err(e) => break Err(format!("Failed to read MCP message: {e}")),
            };

            let server = self.clone();
            let tx = tx.clone();
            in_flight.spawn(async move {
                for response in server.handle_incoming_message(incoming).await {
                    if tx.send(response).await.is_err() {
                        tracing::warn!("MCP writer closed; dropping response");
                        break;
                    }
                }
            });
            while in_flight.try_join_next().is_some() {}
        };

        while in_flight.join_next().await.is_some() {}
        drop(tx);

        let write_result = match writer_task.await {
            Ok(result) => result.map_err(|e| format!("Failed to write MCP response: {e}")),
            Err(e) => Err(format!("MCP writer task failed: {e}")),
        };
        read_result.and(write_result)
    }

    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        // A message without a method is a client response; this server never asks.
        let method = obj.get("method").and_then(Value::as_str)?;

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        let Some(id) = obj.get("id").cloned() else {
            tracing::debug!(method, "ignoring notification");
            return None;
        };
        Some(match self.handle_request(method, params).await {
            Ok(payload) => success_response(id, payload),
            Err(err) => error_response(id, err),
        })
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload(self.handler.catalog())),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let tool_names: Vec<&str> = self
            .handler
            .catalog()
            .tools
            .iter()
            .map(|tool| tool.name.as_str())
            .collect();
        let mut instructions = format!(
            "Each tool takes an `action` argument selecting one operation plus that operation's fields. Every call returns an envelope with a boolean `success`, a `message`, and either `data` or an `errorCode`. Available tools: {}.",
            tool_names.join(", ")
        );
        if !self.handler.bridge_connected() {
            instructions.push_str(
                " No automation bridge is connected; calls that pass validation report AUTOMATION_BRIDGE_UNAVAILABLE.",
            );
        }
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                },
                "resources": {
                    "listChanged": false
                },
                "prompts": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let envelope = self.handler.handle(name, &args).await;
        Ok(build_tool_call_response(&envelope))
    }
}

fn tools_list_payload(catalog: &Catalog) -> Value {
    let tools: Vec<Value> = catalog
        .tools
        .iter()
        .map(|tool| {
            let mut entry = json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema(),
            });
            if let (Some(schema), Some(obj)) = (&tool.output_schema, entry.as_object_mut()) {
                obj.insert("outputSchema".to_string(), schema.clone());
            }
            entry
        })
        .collect();
    json!({ "tools": tools })
}

fn build_tool_call_response(envelope: &Envelope) -> Value {
    let structured = envelope.to_value();
    let text = to_pretty_json(&structured);
    if envelope.is_success() {
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": structured
        })
    } else {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }],
            "structuredContent": structured
        })
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

async fn read_framed_json<R>(reader: &mut R) -> Result<Option<Value>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        if line == "\r\n" || line == "\n" {
            break;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = line
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    let json: Value = serde_json::from_slice(&payload).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid JSON payload: {e}"),
        )
    })?;
    Ok(Some(json))
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<Value>) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        write_framed_json(&mut writer, &response).await?;
    }
    Ok(())
}

async fn write_framed_json<W>(writer: &mut W, value: &Value) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    let header = format!(
        "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
        body.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
