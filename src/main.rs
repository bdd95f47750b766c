//! draftsmith server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use draftsmith::api::{AppState, create_router};
use draftsmith::backend::{AnthropicBackend, AnthropicConfig};
use draftsmith::config::{self, AppConfig, AppPaths};

#[derive(Debug, Parser)]
#[command(name = "draftsmith", version, about = "Stream single-file web apps from a description")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Args)]
struct CommonOpts {
    /// Path to an alternate config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (repeat for more).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Shorthand for -v.
    #[arg(long, global = true)]
    debug: bool,

    /// Shorthand for -vv.
    #[arg(long, global = true)]
    trace: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    /// Disable ANSI colors in log output.
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server (the default).
    Serve(ServeArgs),

    /// Inspect or manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Default, Args)]
struct ServeArgs {
    /// Bind address override.
    #[arg(long)]
    host: Option<String>,

    /// Port override.
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Directory with the bundled client.
    #[arg(long)]
    static_dir: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file path.
    Path,
    /// Overwrite the config file with defaults.
    Reset,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    match cli.command.unwrap_or_else(|| Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            let config = load_config(&cli.common)?;
            run_server(config, args)
        }
        Command::Config { action } => handle_config(&cli.common, action),
    }
}

fn effective_log_level(common: &CommonOpts) -> &'static str {
    if common.quiet {
        "error"
    } else if common.trace || common.verbose >= 2 {
        "trace"
    } else if common.debug || common.verbose == 1 {
        "debug"
    } else {
        "info"
    }
}

fn init_logging(common: &CommonOpts) {
    let level = effective_log_level(common);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("draftsmith={level},tower_http={level}")));

    let registry = tracing_subscriber::registry().with(env_filter);
    if common.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_ansi(!common.no_color))
            .try_init()
            .ok();
    }
}

fn load_config(common: &CommonOpts) -> Result<AppConfig> {
    match &common.config {
        Some(path) => config::load_from(path),
        None => config::load_or_init(&AppPaths::discover()),
    }
}

fn config_file_path(common: &CommonOpts) -> PathBuf {
    common
        .config
        .clone()
        .unwrap_or_else(|| AppPaths::discover().config_file())
}

fn handle_config(common: &CommonOpts, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(common)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", config_file_path(common).display());
        }
        ConfigAction::Reset => {
            let path = config_file_path(common);
            config::write_default_config(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

#[tokio::main]
async fn run_server(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(static_dir) = args.static_dir {
        config.server.static_dir = static_dir;
    }

    // Fail fast on a missing key instead of erroring on the first request.
    let backend_config = AnthropicConfig::from_backend_config(&config.backend)?;
    let backend = Arc::new(AnthropicBackend::new(backend_config)?);
    info!(
        model = %config.backend.model,
        static_dir = %config.server.static_dir,
        "starting draftsmith"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = create_router(AppState::new(config, backend));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
