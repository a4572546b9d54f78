use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlchemyError>;

#[derive(Error, Debug)]
pub enum AlchemyError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("MCP error: {0}")]
    Mcp(#[from] mcp::McpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod format;
pub mod logging;
pub mod mcp;
pub mod shutdown;
