//! MCP Server Implementation
//!
//! Connection handling, message routing, and tool dispatch over a
//! newline-delimited JSON-RPC stream.

use crate::mcp::errors::{ErrorHandler, McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::tools::error_message;
use crate::mcp::validation::{
    McpValidator, compile_tool_schema, is_protocol_version_supported, validate_tool_arguments,
};
use anyhow::Result;
use async_trait::async_trait;
use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// MCP Server state and configuration
pub struct McpServer {
    /// Server implementation information
    pub server_info: Implementation,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Registered tools, in registration order
    pub tools: Arc<RwLock<Vec<Tool>>>,
    /// Tool handlers
    pub tool_handlers: Arc<RwLock<HashMap<String, Arc<dyn ToolHandler>>>>,
    /// Compiled input schemas of the registered tools
    tool_schemas: Arc<RwLock<HashMap<String, Arc<Validator>>>>,
    /// Connection state
    pub connection_state: Arc<RwLock<ConnectionState>>,
    /// Message validator
    pub validator: Arc<McpValidator>,
}

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Message handler for processing incoming messages
pub struct MessageHandler {
    server: Arc<McpServer>,
}

impl McpServer {
    /// Create a new MCP server
    #[inline]
    pub fn new(name: String, version: String) -> Result<Self> {
        let server_info = Implementation { name, version };

        let capabilities = ServerCapabilities {
            experimental: None,
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        let validator = McpValidator::new()?;

        Ok(Self {
            server_info,
            capabilities,
            tools: Arc::new(RwLock::new(Vec::new())),
            tool_handlers: Arc::new(RwLock::new(HashMap::new())),
            tool_schemas: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
            validator: Arc::new(validator),
        })
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H) -> McpResult<()>
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();
        let schema = compile_tool_schema(&tool)?;

        {
            let mut tools = self.tools.write().await;
            if tools.iter().any(|registered| registered.name == tool_name) {
                return Err(McpError::InvalidRequest {
                    message: format!("Tool already registered: {}", tool_name),
                });
            }
            tools.push(tool);
        }

        self.tool_schemas
            .write()
            .await
            .insert(tool_name.clone(), Arc::new(schema));
        self.tool_handlers
            .write()
            .await
            .insert(tool_name.clone(), Arc::new(handler));

        debug!("Registered tool: {}", tool_name);
        Ok(())
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");

        let reader = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        self.serve(reader, &mut stdout).await
    }

    /// Process newline-delimited messages from `reader` until EOF, writing
    /// replies to `writer`
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, mut reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let handler = MessageHandler::new(Arc::clone(&self));
        let mut line = String::new();

        let outcome = loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break Ok(());
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Err(e) = handler.process_line(line, writer).await {
                        break Err(e);
                    }
                }
                Err(e) => {
                    error!("Error reading from input: {}", e);
                    break Err(e.into());
                }
            }
        };

        self.set_connection_state(ConnectionState::Closed).await;
        info!("MCP server stopped");
        outcome
    }

    /// Send a message to the client
    async fn send_message<W>(&self, writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Get current connection state
    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        *self.connection_state.write().await = state;
    }

    /// Names of the registered tools, in registration order
    #[inline]
    pub async fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .await
            .iter()
            .map(|tool| tool.name.clone())
            .collect()
    }
}

impl MessageHandler {
    /// Create a new message handler
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Parse, validate, and answer a single line of input
    #[inline]
    pub async fn process_line<W>(&self, line: &str, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON: {}", e);
                return self
                    .send_error_response(writer, JsonRpcError::parse_error(), None)
                    .await;
            }
        };

        match self.server.validator.validate_raw_message(&raw_value) {
            Ok(message) => self.process_message(message, writer).await,
            Err(e) => {
                error!("Message validation failed: {}", e);
                let id = raw_value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                self.send_error_response(writer, JsonRpcError::invalid_request(), id)
                    .await
            }
        }
    }

    /// Process an incoming message
    #[inline]
    pub async fn process_message<W>(&self, message: JsonRpcMessage, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match message {
            JsonRpcMessage::Request(request) => self.handle_request(request, writer).await,
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await;
                Ok(())
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                Ok(())
            }
        }
    }

    /// Handle a JSON-RPC request
    async fn handle_request<W>(&self, request: JsonRpcRequest, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        debug!("Handling request: {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(self.handle_ping()),
            method => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        };

        let message = match response {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => ErrorHandler::handle_error(&e, Some(request.id)),
        };
        self.server.send_message(writer, &message).await
    }

    /// Handle a JSON-RPC notification
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => self.handle_initialized().await,
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
            }
            _ => {
                warn!("Unknown notification method: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        self.server
            .validator
            .validate_params("initialize", params.as_ref())?;
        let params: InitializeParams = parse_params(params)?;

        if !is_protocol_version_supported(&params.protocol_version) {
            warn!(
                "Client requested unsupported protocol version {}, offering {}",
                params.protocol_version, LATEST_PROTOCOL_VERSION
            );
        }

        self.server
            .set_connection_state(ConnectionState::Initializing)
            .await;

        let result = InitializeResult {
            protocol_version: negotiate_protocol_version(&params.protocol_version).to_string(),
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        Ok(serde_json::to_value(result)?)
    }

    /// Handle initialized notification
    async fn handle_initialized(&self) {
        self.server.set_connection_state(ConnectionState::Ready).await;
        info!("Server ready to handle requests");
    }

    /// Handle list tools request
    #[inline]
    pub async fn handle_list_tools(&self) -> Result<Value> {
        let tools = self.server.tools.read().await.clone();
        Ok(serde_json::to_value(ListToolsResult { tools })?)
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        self.server
            .validator
            .validate_params("tools/call", params.as_ref())?;
        let params: CallToolParams = parse_params(params)?;

        let handler = self
            .server
            .tool_handlers
            .read()
            .await
            .get(&params.name)
            .cloned()
            .ok_or_else(|| McpError::ToolNotFound {
                name: params.name.clone(),
            })?;

        let schema = self.server.tool_schemas.read().await.get(&params.name).cloned();
        if let Some(schema) = schema {
            let arguments = Value::Object(params.arguments.clone().unwrap_or_default());
            validate_tool_arguments(&params.name, &schema, &arguments)?;
        }

        let tool_name = params.name.clone();
        let result = match handler.handle(params).await {
            Ok(result) => result,
            Err(e) => {
                error!("Tool {} failed: {}", tool_name, error_message(&e));
                CallToolResult::error(format!("Error executing tool {}: {}", tool_name, e))
            }
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle ping request
    #[inline]
    pub fn handle_ping(&self) -> Value {
        json!({})
    }

    /// Send an error response
    async fn send_error_response<W>(
        &self,
        writer: &mut W,
        error: JsonRpcError,
        id: Option<RequestId>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let error_response = JsonRpcErrorResponse::new(error, id);
        let message = JsonRpcMessage::ErrorResponse(error_response);
        self.server.send_message(writer, &message).await
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::InvalidParameters {
        message: "Request missing parameters".to_string(),
    })?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidParameters {
        message: e.to_string(),
    })
}
