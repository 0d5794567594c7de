use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "messenger-relay")]
#[command(about = "Messenger webhook relay to a conversational backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.messenger-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook server. Environment variables (and a .env file) override the config file.
    Serve {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.messenger-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 8020)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Report required settings that are not set.
    CheckConfig {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.messenger-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Register the page's Get Started button and persistent menu.
    SetupProfile {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.messenger-relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring .env: {}", e);
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("messenger-relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig { config }) => match run_check_config(config) {
            Ok(true) => {}
            Ok(false) => std::process::exit(2),
            Err(e) => {
                log::error!("check-config failed: {:#}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::SetupProfile { config }) => {
            if let Err(e) = run_setup_profile(config).await {
                log::error!("setup-profile failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting relay on {}:{} (config {})",
        config.gateway.bind,
        config.gateway.port,
        path.display()
    );
    relay::gateway::run_gateway(config).await
}

/// Prints every missing setting; Ok(false) when anything is missing.
fn run_check_config(config_path: Option<PathBuf>) -> anyhow::Result<bool> {
    let (config, path) = relay::config::load_config(config_path)?;
    println!("config: {}", path.display());
    println!(
        "page id: {}",
        relay::config::resolve_page_id(&config).as_deref().unwrap_or("(not set)")
    );
    println!(
        "forward mode: {}",
        relay::config::resolve_forward_mode(&config).as_str()
    );
    let missing = relay::config::missing_settings(&config);
    if missing.is_empty() {
        println!("all required settings are present");
        return Ok(true);
    }
    for name in &missing {
        println!("missing: {}", name);
    }
    Ok(false)
}

async fn run_setup_profile(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = relay::config::load_config(config_path)?;
    let client = relay::messenger::MessengerClient::from_config(&config);
    client.setup_get_started_button().await?;
    client.set_persistent_menu().await?;
    println!("page profile updated");
    Ok(())
}
