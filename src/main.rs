use clap::{Parser, Subcommand};
use mcp_alchemy::Result;
use mcp_alchemy::commands::{ServeOutcome, serve_mcp, show_config, show_info};
use mcp_alchemy::config::{Config, ConfigArgs, load_dotenv};
use mcp_alchemy::logging::init_logging;
use mcp_alchemy::shutdown::ShutdownSignals;
use tracing::debug;

#[derive(Parser)]
#[command(name = "mcp-alchemy")]
#[command(about = "An MCP server that lets AI assistants explore and query SQL databases")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Log filter directives, e.g. "mcp_alchemy=debug" (defaults to RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio (default)
    Serve,
    /// Connect to the database and print what the server would report
    Info,
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = load_dotenv();
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());
    if let Some(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let config = Config::resolve(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            // Installed before connecting so a SIGTERM during startup is not lost
            let mut signals = ShutdownSignals::install()?;
            if let ServeOutcome::Signalled(_) = serve_mcp(&config, &mut signals).await? {
                // stdin is read on a blocking thread that the runtime would
                // otherwise wait on
                std::process::exit(0);
            }
        }
        Commands::Info => {
            show_info(&config).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use serial_test::serial;

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["mcp-alchemy"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(parsed.command.is_none());
            assert!(matches!(
                parsed.command.unwrap_or(Commands::Serve),
                Commands::Serve
            ));
        }
    }

    #[test]
    fn serve_command() {
        let cli = Cli::try_parse_from(["mcp-alchemy", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Some(Commands::Serve)));
        }
    }

    #[test]
    fn flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mcp-alchemy",
            "info",
            "--db-url",
            "sqlite:///app.db",
            "--max-chars",
            "500",
            "--log-level",
            "mcp_alchemy=debug",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Some(Commands::Info)));
            assert_eq!(parsed.config.db_url.as_deref(), Some("sqlite:///app.db"));
            assert_eq!(parsed.config.max_chars, Some(500));
            assert_eq!(parsed.log_level.as_deref(), Some("mcp_alchemy=debug"));
        }
    }

    #[test]
    fn max_chars_must_be_a_number() {
        let cli = Cli::try_parse_from(["mcp-alchemy", "--max-chars", "lots"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    #[serial]
    fn settings_from_environment() {
        // SAFETY: serialized with every other test that touches these variables
        unsafe {
            std::env::set_var("DB_URL", "postgresql://app@db/app");
            std::env::set_var("EXECUTE_QUERY_MAX_CHARS", "250");
        }

        let cli = Cli::try_parse_from(["mcp-alchemy", "--max-chars", "100"]);

        // SAFETY: as above
        unsafe {
            std::env::remove_var("DB_URL");
            std::env::remove_var("EXECUTE_QUERY_MAX_CHARS");
        }

        let parsed = cli.expect("environment values parse");
        assert_eq!(
            parsed.config.db_url.as_deref(),
            Some("postgresql://app@db/app")
        );
        // Flags win over the environment
        assert_eq!(parsed.config.max_chars, Some(100));
    }

    #[test]
    fn config_command() {
        let cli = Cli::try_parse_from(["mcp-alchemy", "config"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Some(Commands::Config)));
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["mcp-alchemy", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["mcp-alchemy", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
