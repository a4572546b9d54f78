//! MCP Message Validation
//!
//! JSON Schema checks for incoming JSON-RPC envelopes, method parameters,
//! and tool arguments.

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use anyhow::{Result, anyhow};
use jsonschema::Validator;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::debug;

const REQUEST_SCHEMA: &str = "jsonrpc_request";
const NOTIFICATION_SCHEMA: &str = "jsonrpc_notification";
const RESPONSE_SCHEMA: &str = "jsonrpc_response";
const ERROR_RESPONSE_SCHEMA: &str = "jsonrpc_error_response";

/// JSON Schema validator for MCP messages
pub struct McpValidator {
    schemas: HashMap<String, Validator>,
}

impl std::fmt::Debug for McpValidator {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.schemas.keys().collect();
        names.sort();
        f.debug_struct("McpValidator").field("schemas", &names).finish()
    }
}

impl McpValidator {
    /// Create a new MCP validator with built-in schemas
    #[inline]
    pub fn new() -> Result<Self> {
        let mut validator = Self {
            schemas: HashMap::new(),
        };
        validator.load_builtin_schemas()?;
        Ok(validator)
    }

    fn load_builtin_schemas(&mut self) -> Result<()> {
        let id = json!({
            "oneOf": [
                {"type": "string"},
                {"type": "integer"}
            ]
        });
        let version = json!({"type": "string", "const": JSONRPC_VERSION});

        self.add_schema(
            REQUEST_SCHEMA,
            &json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "method": {"type": "string"},
                    "params": {"type": ["object", "array"]},
                    "id": id
                },
                "required": ["jsonrpc", "method", "id"]
            }),
        )?;

        self.add_schema(
            NOTIFICATION_SCHEMA,
            &json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "method": {"type": "string"},
                    "params": {"type": ["object", "array"]}
                },
                "required": ["jsonrpc", "method"]
            }),
        )?;

        self.add_schema(
            RESPONSE_SCHEMA,
            &json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "result": {},
                    "id": id
                },
                "required": ["jsonrpc", "result", "id"]
            }),
        )?;

        self.add_schema(
            ERROR_RESPONSE_SCHEMA,
            &json!({
                "type": "object",
                "properties": {
                    "jsonrpc": version,
                    "error": {
                        "type": "object",
                        "properties": {
                            "code": {"type": "integer"},
                            "message": {"type": "string"},
                            "data": {}
                        },
                        "required": ["code", "message"]
                    },
                    "id": {
                        "oneOf": [
                            {"type": "string"},
                            {"type": "integer"},
                            {"type": "null"}
                        ]
                    }
                },
                "required": ["jsonrpc", "error", "id"]
            }),
        )?;

        self.add_schema(
            "initialize",
            &json!({
                "type": "object",
                "properties": {
                    "protocolVersion": {"type": "string"},
                    "capabilities": {"type": "object"},
                    "clientInfo": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "version": {"type": "string"}
                        },
                        "required": ["name", "version"]
                    }
                },
                "required": ["protocolVersion", "clientInfo"]
            }),
        )?;

        self.add_schema(
            "tools/call",
            &json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "arguments": {"type": "object"}
                },
                "required": ["name"]
            }),
        )?;

        debug!("Loaded {} built-in JSON schemas", self.schemas.len());
        Ok(())
    }

    /// Add a JSON schema to the validator
    #[inline]
    pub fn add_schema(&mut self, name: &str, schema: &Value) -> Result<()> {
        let compiled = jsonschema::validator_for(schema)
            .map_err(|e| anyhow!("Failed to compile schema '{}': {}", name, e))?;

        self.schemas.insert(name.to_string(), compiled);
        Ok(())
    }

    /// Validate a value against a named schema
    #[inline]
    pub fn validate_with_schema(&self, schema_name: &str, value: &Value) -> Result<()> {
        let schema = self
            .schemas
            .get(schema_name)
            .ok_or_else(|| anyhow!("Schema '{}' not found", schema_name))?;

        if let Some(errors) = collect_errors(schema, value) {
            return Err(anyhow!(
                "Schema validation failed for '{}': {}",
                schema_name,
                errors
            ));
        }

        Ok(())
    }

    /// Classify a raw JSON value as a JSON-RPC message and validate its
    /// envelope
    #[inline]
    pub fn validate_raw_message(&self, value: &Value) -> Result<JsonRpcMessage> {
        let Some(object) = value.as_object() else {
            return Err(anyhow!("JSON-RPC message must be an object"));
        };

        if object.contains_key("method") {
            if object.contains_key("id") {
                self.validate_with_schema(REQUEST_SCHEMA, value)?;
                return Ok(JsonRpcMessage::Request(serde_json::from_value(
                    value.clone(),
                )?));
            }
            self.validate_with_schema(NOTIFICATION_SCHEMA, value)?;
            return Ok(JsonRpcMessage::Notification(serde_json::from_value(
                value.clone(),
            )?));
        }

        if object.contains_key("result") {
            self.validate_with_schema(RESPONSE_SCHEMA, value)?;
            return Ok(JsonRpcMessage::Response(serde_json::from_value(
                value.clone(),
            )?));
        }

        if object.contains_key("error") {
            self.validate_with_schema(ERROR_RESPONSE_SCHEMA, value)?;
            return Ok(JsonRpcMessage::ErrorResponse(serde_json::from_value(
                value.clone(),
            )?));
        }

        Err(anyhow!(
            "Value does not match any known JSON-RPC message type"
        ))
    }

    /// Validate the parameters of a request for the methods that take any
    #[inline]
    pub fn validate_params(&self, method: &str, params: Option<&Value>) -> McpResult<()> {
        let Some(schema) = self.schemas.get(method) else {
            debug!("No parameter validation schema for method: {}", method);
            return Ok(());
        };

        let params = params.ok_or_else(|| McpError::InvalidParameters {
            message: format!("{} request missing parameters", method),
        })?;

        match collect_errors(schema, params) {
            Some(errors) => Err(McpError::InvalidParameters {
                message: format!("Invalid {} parameters: {}", method, errors),
            }),
            None => Ok(()),
        }
    }
}

/// Compile a tool's `inputSchema`
#[inline]
pub fn compile_tool_schema(tool: &Tool) -> McpResult<Validator> {
    jsonschema::validator_for(&tool.input_schema).map_err(|e| McpError::InternalError {
        message: format!("Invalid input schema for tool '{}': {}", tool.name, e),
    })
}

/// Check call arguments against a compiled tool schema
#[inline]
pub fn validate_tool_arguments(tool: &str, schema: &Validator, arguments: &Value) -> McpResult<()> {
    match collect_errors(schema, arguments) {
        Some(message) => Err(McpError::InvalidToolParameters {
            tool: tool.to_string(),
            message,
        }),
        None => Ok(()),
    }
}

/// Check whether a protocol version is one this server speaks
#[inline]
pub fn is_protocol_version_supported(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}

fn collect_errors(schema: &Validator, value: &Value) -> Option<String> {
    let messages: Vec<String> = schema.iter_errors(value).map(|e| e.to_string()).collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages.join(", "))
    }
}
