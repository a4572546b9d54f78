//! MCP Tools Implementation
//!
//! The database exploration tools and their registration with the server.

use crate::config::QueryConfig;
use crate::database::{Backend, Params, QueryOutcome};
use crate::format::{format_results, format_table_schema, save_full_results};
use crate::mcp::errors::McpResult;
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lists every table
pub struct AllTableNamesHandler {
    backend: Arc<dyn Backend>,
}

/// Lists tables whose name contains a substring
pub struct FilterTableNamesHandler {
    backend: Arc<dyn Backend>,
}

/// Describes columns, keys, and relationships of tables
pub struct SchemaDefinitionsHandler {
    backend: Arc<dyn Backend>,
}

/// Runs arbitrary SQL
pub struct ExecuteQueryHandler {
    backend: Arc<dyn Backend>,
    settings: QueryConfig,
}

impl AllTableNamesHandler {
    #[inline]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Create the all_table_names tool definition
    #[inline]
    pub fn tool_definition(db_info: &str) -> Tool {
        Tool {
            name: "all_table_names".to_string(),
            description: Some(format!(
                "Return all table names in the database separated by comma. {}",
                db_info
            )),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AllTableNamesHandler {
    #[inline]
    async fn handle(&self, _params: CallToolParams) -> Result<CallToolResult> {
        let tables = self.backend.table_names().await?;
        Ok(CallToolResult::text(tables.join(", ")))
    }
}

impl FilterTableNamesHandler {
    #[inline]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Create the filter_table_names tool definition
    #[inline]
    pub fn tool_definition(db_info: &str) -> Tool {
        Tool {
            name: "filter_table_names".to_string(),
            description: Some(format!(
                "Return all table names in the database containing the substring 'q' separated by comma. {}",
                db_info
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "q": {
                        "type": "string",
                        "title": "Q"
                    }
                },
                "required": ["q"]
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for FilterTableNamesHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let q = args
            .get("q")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Missing required parameter: q"))?;

        let tables: Vec<String> = self
            .backend
            .table_names()
            .await?
            .into_iter()
            .filter(|name| name.contains(q))
            .collect();

        debug!("{} tables match '{}'", tables.len(), q);
        Ok(CallToolResult::text(tables.join(", ")))
    }
}

impl SchemaDefinitionsHandler {
    #[inline]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Create the schema_definitions tool definition
    #[inline]
    pub fn tool_definition(db_info: &str) -> Tool {
        Tool {
            name: "schema_definitions".to_string(),
            description: Some(format!(
                "Returns schema and relation information for the given tables. {}",
                db_info
            )),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table_names": {
                        "type": "array",
                        "items": {"type": "string"},
                        "title": "Table Names"
                    }
                },
                "required": ["table_names"]
            }),
        }
    }

    async fn describe(&self, table: &str) -> Result<String> {
        let columns = self.backend.columns(table).await?;
        if columns.is_empty() {
            bail!("Table '{}' does not exist", table);
        }
        let primary_key = self.backend.primary_key(table).await?;
        let foreign_keys = self.backend.foreign_keys(table).await?;

        Ok(format_table_schema(table, &columns, &primary_key, &foreign_keys))
    }
}

#[async_trait]
impl ToolHandler for SchemaDefinitionsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let table_names: Vec<String> = args
            .get("table_names")
            .cloned()
            .map(serde_json::from_value::<Vec<String>>)
            .transpose()?
            .ok_or_else(|| anyhow!("Missing required parameter: table_names"))?;

        let mut schemas = Vec::with_capacity(table_names.len());
        for table in &table_names {
            schemas.push(self.describe(table).await?);
        }

        Ok(CallToolResult::text(schemas.join("\n")))
    }
}

impl ExecuteQueryHandler {
    #[inline]
    pub fn new(backend: Arc<dyn Backend>, settings: QueryConfig) -> Self {
        Self { backend, settings }
    }

    /// Create the execute_query tool definition
    #[inline]
    pub fn tool_definition(db_info: &str, settings: &QueryConfig) -> Tool {
        let mut parts = vec![format!(
            "Execute a SQL query and return results in a readable format. Results will be truncated after {} characters.",
            settings.max_chars
        )];
        if settings.local_files_path.is_some() {
            parts.push(
                "Claude Desktop may fetch the full result set via an url for analysis and artifacts."
                    .to_string(),
            );
        }
        parts.push(db_info.to_string());

        Tool {
            name: "execute_query".to_string(),
            description: Some(parts.join(" ")),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "title": "Query"
                    },
                    "params": {
                        "anyOf": [
                            {"type": "object", "additionalProperties": true},
                            {"type": "null"}
                        ],
                        "default": null,
                        "title": "Params"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    /// Run `query` and render its outcome as tool text
    #[inline]
    pub async fn run(&self, query: &str, params: &Params) -> Result<String> {
        info!("Executing query: {}", query);
        if !params.is_empty() {
            let shown = serde_json::Value::Object(params.clone());
            info!("With parameters: {}", shown);
        }

        let (columns, rows) = match self.backend.execute(query, params).await? {
            QueryOutcome::Affected(count) => {
                let message = format!("Success: {} rows affected", count);
                info!("{}", message);
                return Ok(message);
            }
            QueryOutcome::Rows { columns, rows } => (columns, rows),
        };

        if rows.is_empty() {
            return Ok("No rows returned".to_string());
        }

        let (displayed, mut output) = format_results(&columns, &rows, self.settings.max_chars);
        let _ = write!(output, "\nResult: {} rows", rows.len());
        if displayed < rows.len() {
            output.push_str(" (output truncated)");
        }

        if let Some(dir) = &self.settings.local_files_path {
            output.push_str(&save_full_results(dir, &rows).await?);
        }

        Ok(output)
    }
}

#[async_trait]
impl ToolHandler for ExecuteQueryHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Missing required parameter: query"))?;
        let query_params: Map<String, Value> = match args.get("params") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        match self.run(query, &query_params).await {
            Ok(text) => Ok(CallToolResult::text(text)),
            Err(e) => {
                let message = error_message(&e);
                error!("Error executing query: {}", message);
                Ok(CallToolResult::error(format!("Error: {}", message)))
            }
        }
    }
}

/// Join an error with its causes, skipping causes whose text the message
/// already carries (sqlx repeats the database error in its source)
#[inline]
pub fn error_message(error: &anyhow::Error) -> String {
    let mut message = String::new();
    for cause in error.chain() {
        let text = cause.to_string();
        if message.contains(&text) {
            continue;
        }
        if !message.is_empty() {
            message.push_str(": ");
        }
        message.push_str(&text);
    }
    message
}

/// Register all four database tools on `server`
#[inline]
pub async fn register_database_tools(
    server: &McpServer,
    backend: &Arc<dyn Backend>,
    db_info: &str,
    settings: &QueryConfig,
) -> McpResult<()> {
    server
        .register_tool(
            AllTableNamesHandler::tool_definition(db_info),
            AllTableNamesHandler::new(Arc::clone(backend)),
        )
        .await?;
    server
        .register_tool(
            FilterTableNamesHandler::tool_definition(db_info),
            FilterTableNamesHandler::new(Arc::clone(backend)),
        )
        .await?;
    server
        .register_tool(
            SchemaDefinitionsHandler::tool_definition(db_info),
            SchemaDefinitionsHandler::new(Arc::clone(backend)),
        )
        .await?;
    server
        .register_tool(
            ExecuteQueryHandler::tool_definition(db_info, settings),
            ExecuteQueryHandler::new(Arc::clone(backend), settings.clone()),
        )
        .await?;

    Ok(())
}
