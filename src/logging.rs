use tracing_subscriber::EnvFilter;

/// Filter used when neither `--log-level` nor `RUST_LOG` is given
pub const DEFAULT_FILTER: &str = "mcp_alchemy=info";

/// Install the global subscriber.
///
/// Output goes to stderr; stdout carries the MCP protocol.
#[inline]
pub fn init_logging(level: Option<&str>) {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn build_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(directives) => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}
