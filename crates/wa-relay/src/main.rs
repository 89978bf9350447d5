use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, debug, error, info, warn};
use tokio::net::TcpListener;

use wa_relay::api::{AppState, create_router};
use wa_relay::auth::AuthState;
use wa_relay::config::{self, AppConfig, ConfigValidationError};
use wa_session::{HttpBridgeProvider, LifecycleManager, SessionProvider};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.common.config {
        Some(path) => config::expand_path(path)?,
        None => config::default_config_path()?,
    };
    let app_config = config::load(&config_path)?;

    init_logging(&cli.common, &app_config.logging.level);
    debug!("using configuration file {}", config_path.display());

    match cli.command.unwrap_or_default() {
        Command::Serve(cmd) => serve(app_config, cmd),
        Command::Config { command } => {
            handle_config(&cli.common, &config_path, &app_config, command)
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "HTTP relay for a single paired messaging session.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP API server (default)
    Serve(ServeCommand),
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Serve(ServeCommand::default())
    }
}

#[derive(Debug, Clone, Default, Args)]
struct ServeCommand {
    /// Address to bind to (overrides server.bind)
    #[arg(long, env = "WA_RELAY_BIND")]
    bind: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration with secrets redacted
    Show,
}

fn init_logging(common: &CommonOpts, configured_level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    if common.quiet {
        log::set_max_level(LevelFilter::Off);
        return;
    }

    let level_filter = effective_log_level(common, configured_level);
    let level = level_filter.to_string().to_lowercase();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "wa_relay={level},wa_session={level},tower_http={level}"
        ))
    });

    if common.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_ansi(io::stderr().is_terminal()))
            .try_init()
            .ok();
    }

    // Also init env_logger for compatibility with log crate users
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.filter_level(level_filter);
    builder.try_init().ok();
}

fn effective_log_level(common: &CommonOpts, configured_level: &str) -> LevelFilter {
    if common.trace {
        return LevelFilter::Trace;
    }
    if common.debug {
        return LevelFilter::Debug;
    }
    match common.verbose {
        0 => LevelFilter::from_str(configured_level).unwrap_or(LevelFilter::Info),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn handle_config(
    common: &CommonOpts,
    config_path: &std::path::Path,
    app_config: &AppConfig,
    command: ConfigCommand,
) -> Result<()> {
    let mut stdout = io::stdout();
    match command {
        ConfigCommand::Path => writeln!(stdout, "{}", config_path.display())?,
        ConfigCommand::Show => {
            let redacted = app_config.redacted();
            let rendered = if common.json {
                serde_json::to_string_pretty(&redacted).context("serializing configuration")?
            } else {
                toml::to_string_pretty(&redacted).context("serializing configuration")?
            };
            writeln!(stdout, "{rendered}")?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn serve(app_config: AppConfig, cmd: ServeCommand) -> Result<()> {
    app_config.validate().context("invalid configuration")?;
    let api_token = app_config
        .auth
        .resolve_api_token()?
        .ok_or_else(|| anyhow!(ConfigValidationError::MissingApiToken))?;

    let bridge_config = app_config.bridge.to_bridge_config()?;
    info!("using messaging bridge at {}", bridge_config.base_url);
    let bridge = Arc::new(HttpBridgeProvider::new(bridge_config).context("creating bridge client")?);

    // Subscribe before the pump starts so no early event is missed.
    let provider: Arc<dyn SessionProvider> = bridge.clone();
    let lifecycle = LifecycleManager::new(provider, app_config.pairing.to_lifecycle_config());
    let pump = bridge.spawn_event_pump();

    let state = AppState::new(lifecycle.clone(), AuthState::new(api_token));
    let app = create_router(state);

    let bind = cmd.bind.unwrap_or(app_config.server.bind);
    let port = cmd.port.unwrap_or(app_config.server.port);
    let listener = TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("binding {bind}:{port}"))?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    lifecycle.shutdown();
    bridge.stop();
    if let Err(err) = pump.await {
        warn!("bridge event pump ended abnormally: {err}");
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CommonOpts {
        CommonOpts {
            config: None,
            quiet: false,
            verbose: 0,
            debug: false,
            trace: false,
            json: false,
        }
    }

    #[test]
    fn test_effective_log_level() {
        assert_eq!(effective_log_level(&opts(), "warn"), LevelFilter::Warn);
        assert_eq!(effective_log_level(&opts(), "bogus"), LevelFilter::Info);

        let verbose = CommonOpts {
            verbose: 1,
            ..opts()
        };
        assert_eq!(effective_log_level(&verbose, "warn"), LevelFilter::Debug);

        let trace = CommonOpts {
            trace: true,
            debug: true,
            ..opts()
        };
        assert_eq!(effective_log_level(&trace, "info"), LevelFilter::Trace);
    }

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::try_parse_from(["wa-relay"]).unwrap();
        assert!(matches!(cli.command.unwrap_or_default(), Command::Serve(_)));

        let cli = Cli::try_parse_from(["wa-relay", "config", "show", "--json"]).unwrap();
        assert!(cli.common.json);
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                command: ConfigCommand::Show
            })
        ));
    }
}
