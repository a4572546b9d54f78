//! MCP (Model Context Protocol) Server Implementation
//!
//! A tools-only MCP server speaking JSON-RPC 2.0 over stdio.

#[cfg(test)]
mod tests;

pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod validation;

pub use errors::{McpError, McpResult};
pub use server::{ConnectionState, McpServer, MessageHandler, ToolHandler};
