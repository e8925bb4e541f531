use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use streamgate::commands::jwt::{JwtCommand, handle_jwt_command};
use streamgate::config::ServerConfig;
use streamgate::logging::{self, LogFormat};
use streamgate::server;

#[derive(Parser)]
#[command(
    name = "streamgate",
    about = "Authenticated push-event streaming server",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    ///
    /// Everything else is configured through environment variables
    /// (XSUAA_*, VCAP_SERVICES, STREAMGATE_*).
    Serve {
        /// Listen address, overrides STREAMGATE_BIND
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Log output format, overrides STREAMGATE_LOG_FORMAT
        #[arg(long)]
        log_format: Option<LogFormat>,

        /// Debug logging when RUST_LOG is unset
        #[arg(long, short)]
        verbose: bool,
    },

    /// JWT utilities for local testing
    #[command(subcommand)]
    Jwt(JwtCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            log_format,
            verbose,
        } => {
            let mut config = ServerConfig::from_env().context("Invalid configuration")?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(format) = log_format {
                config.log_format = format;
            }

            logging::init(config.log_format, verbose)?;
            server::serve(config).await
        }

        Command::Jwt(command) => handle_jwt_command(command),
    }
}
