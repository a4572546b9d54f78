use console::style;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::database::{self, Backend, DatabaseUrl};
use crate::mcp::McpServer;
use crate::mcp::tools::{error_message, register_database_tools};
use crate::shutdown::ShutdownSignals;
use crate::{AlchemyError, Result};

/// Name reported to MCP clients
pub const SERVER_NAME: &str = "MCP Alchemy";

/// How a `serve` run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The client closed stdin or the server failed
    Finished,
    /// A termination signal arrived
    Signalled(&'static str),
}

async fn open_database(config: &Config) -> Result<(DatabaseUrl, Arc<dyn Backend>)> {
    config.validate()?;
    let url = config.database_url()?;
    let backend = database::connect(&url)
        .await
        .map_err(|e| AlchemyError::Database(error_message(&e)))?;
    Ok((url, backend))
}

/// Connect to the configured database and serve MCP on stdio until EOF or
/// one of `signals` arrives
#[inline]
pub async fn serve_mcp(config: &Config, signals: &mut ShutdownSignals) -> Result<ServeOutcome> {
    let (url, backend) = open_database(config).await?;
    let db_info = database::db_info(backend.as_ref(), &url.info)
        .await
        .map_err(|e| AlchemyError::Database(error_message(&e)))?;

    let server = Arc::new(McpServer::new(
        SERVER_NAME.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    )?);
    register_database_tools(&server, &backend, &db_info, &config.query).await?;
    info!("Registered tools: {}", server.tool_names().await.join(", "));

    info!("Starting MCP Alchemy server...");
    let outcome = tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            if let Err(e) = result {
                error!("Server error: {}", error_message(&e));
            }
            ServeOutcome::Finished
        }
        signal = signals.recv() => {
            info!("Received {}. Shutting down gracefully...", signal);
            ServeOutcome::Signalled(signal)
        }
    };

    backend.close().await;
    info!("Server shutdown complete.");
    Ok(outcome)
}

/// Connect once and print the database summary
#[inline]
pub async fn show_info(config: &Config) -> Result<()> {
    let (url, backend) = open_database(config).await?;
    let db_info = database::db_info(backend.as_ref(), &url.info)
        .await
        .map_err(|e| AlchemyError::Database(error_message(&e)))?;
    let tables = backend
        .table_names()
        .await
        .map_err(|e| AlchemyError::Database(error_message(&e)))?;
    backend.close().await;

    println!("{}", style("Database").bold().cyan());
    println!("  {}", db_info);
    println!("  Tables: {}", style(tables.len()).cyan());
    Ok(())
}

/// Print the resolved configuration with the password masked
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    let redacted = config.redacted();

    println!("{}", style("Current Configuration").bold().cyan());
    println!();
    print!("{}", redacted.to_toml()?);

    println!();
    match config.validate() {
        Ok(()) => println!("Status: {}", style("valid").green()),
        Err(e) => println!("Status: {} ({})", style("invalid").red(), e),
    }
    Ok(())
}
