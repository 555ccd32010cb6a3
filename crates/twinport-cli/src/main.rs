mod apps;

use anyhow::{anyhow, Context};
use apps::{Chat, StaticSite};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Instrument;
use twinport_http::server::shutdown_signal;
use twinport_http::{
    init_logging, log_shutdown_info, log_startup_info, Application, LoggingConfig, Server,
    ServerConfig,
};

const STATIC_SITE_PORT: u16 = 9917;
const CHAT_PORT: u16 = 8009;

#[derive(Parser)]
#[command(name = "twinport")]
#[command(about = "HTTP and WebSocket demo servers sharing one port")]
struct Cli {
    /// Emit JSON log records instead of human-readable output
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the static demo site
    ServeStatic {
        #[command(flatten)]
        listen: ListenArgs,

        /// Directory holding index.html and the scripts it loads
        #[arg(long, default_value = ".")]
        assets: PathBuf,

        /// Line log for routing misses
        #[arg(long, default_value = "log.txt")]
        log_file: PathBuf,
    },

    /// Run the WebSocket chat room
    Chat {
        #[command(flatten)]
        listen: ListenArgs,
    },
}

/// Listener flags; they take precedence over `TWINPORT_*` variables
#[derive(Args, Debug, Default)]
struct ListenArgs {
    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(long)]
    port: Option<u16>,
}

impl ListenArgs {
    fn resolve(&self, default_port: u16) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::from_env().context("invalid server configuration")?;

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        match self.port {
            Some(port) => config.port = port,
            None if std::env::var_os("TWINPORT_PORT").is_none() => config.port = default_port,
            None => {}
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logging = if cli.json_logs {
        LoggingConfig::production()
    } else {
        LoggingConfig::default()
    }
    .with_service("twinport");
    init_logging(&logging).map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let span = logging.service_span();
    match cli.command {
        Commands::ServeStatic {
            listen,
            assets,
            log_file,
        } => {
            let config = listen.resolve(STATIC_SITE_PORT)?;
            serve("twinport-static", config, StaticSite::new(assets, log_file))
                .instrument(span)
                .await
        }
        Commands::Chat { listen } => {
            let config = listen.resolve(CHAT_PORT)?;
            serve("twinport-chat", config, Chat::new())
                .instrument(span)
                .await
        }
    }
}

async fn serve<A: Application>(name: &str, config: ServerConfig, app: A) -> anyhow::Result<()> {
    let bound = Server::new(config, app)?.bind().await?;
    log_startup_info(
        name,
        env!("CARGO_PKG_VERSION"),
        &bound.local_addr().to_string(),
    );
    println!("Server started http://{}", bound.local_addr());

    bound.serve_with_shutdown(shutdown_signal()).await?;

    log_shutdown_info(name);
    println!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "twinport",
            "serve-static",
            "--port",
            "8080",
            "--assets",
            "site",
        ])
        .unwrap();
        match cli.command {
            Commands::ServeStatic {
                listen,
                assets,
                log_file,
            } => {
                assert_eq!(listen.port, Some(8080));
                assert_eq!(assets, PathBuf::from("site"));
                assert_eq!(log_file, PathBuf::from("log.txt"));
            }
            Commands::Chat { .. } => panic!("expected serve-static"),
        }

        let cli = Cli::try_parse_from(["twinport", "chat", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Chat { .. }));
    }

    #[test]
    #[serial]
    fn test_default_port_depends_on_command() {
        env::remove_var("TWINPORT_PORT");
        env::remove_var("TWINPORT_HOST");

        let config = ListenArgs::default().resolve(STATIC_SITE_PORT).unwrap();
        assert_eq!(config.port, 9917);
        assert_eq!(config.host, "0.0.0.0");

        let config = ListenArgs::default().resolve(CHAT_PORT).unwrap();
        assert_eq!(config.port, 8009);
    }

    #[test]
    #[serial]
    fn test_flags_override_environment() {
        env::set_var("TWINPORT_PORT", "7000");

        let config = ListenArgs::default().resolve(CHAT_PORT).unwrap();
        assert_eq!(config.port, 7000);

        let listen = ListenArgs {
            host: Some("127.0.0.1".to_string()),
            port: Some(7100),
        };
        let config = listen.resolve(CHAT_PORT).unwrap();
        assert_eq!(config.port, 7100);
        assert_eq!(config.host, "127.0.0.1");

        env::remove_var("TWINPORT_PORT");
    }
}
