mod config_commands;
mod identity_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use overmsg_config::OvermsgConfig;

#[derive(Parser)]
#[command(name = "overmsg", about = "Overmsg: presence-aware message relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Look for config files only in this directory.
    #[arg(long, global = true, env = "OVERMSG_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (HTTP API and transport listener).
    Serve {
        #[arg(long, env = "OVERMSG_BIND")]
        bind: Option<String>,
        #[arg(long, env = "OVERMSG_HTTP_PORT")]
        http_port: Option<u16>,
        #[arg(long, env = "OVERMSG_TCP_PORT")]
        tcp_port: Option<u16>,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Manage identities directly in the store.
    Identity {
        #[command(subcommand)]
        action: identity_commands::IdentityAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Apply command-line listener overrides on top of the file config.
fn apply_overrides(
    mut config: OvermsgConfig,
    bind: Option<String>,
    http_port: Option<u16>,
    tcp_port: Option<u16>,
) -> OvermsgConfig {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = http_port {
        config.server.http_port = port;
    }
    if let Some(port) = tcp_port {
        config.server.tcp_port = port;
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = cli.config_dir.clone() {
        overmsg_config::set_config_dir(dir);
    }

    match cli.command {
        Commands::Serve {
            bind,
            http_port,
            tcp_port,
        } => {
            info!(version = env!("CARGO_PKG_VERSION"), "overmsg starting");
            let config = apply_overrides(
                overmsg_config::discover_and_load(),
                bind,
                http_port,
                tcp_port,
            );
            overmsg_gateway::start_relay(&config).await
        },
        Commands::Config { action } => config_commands::handle_config(action),
        Commands::Identity { action } => identity_commands::handle_identity(action).await,
    }
}
