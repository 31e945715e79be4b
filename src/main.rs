use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use marquee::{
    adapters::{AppState, router},
    config::{ServerConfig, ServerConfigValidator, load_config},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "marquee.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "marquee.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "marquee.toml")]
        config: String,
    },
    /// Start the API server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "marquee.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config_found = Path::new(config_path).exists();
    let config = if config_found {
        load_config(config_path)
            .await
            .with_context(|| format!("Failed to load config from {config_path}"))?
    } else {
        ServerConfig::default()
    };
    ServerConfigValidator::validate(&config)
        .map_err(|e| color_eyre::eyre::eyre!("Invalid configuration: {e}"))?;

    tracing_setup::init_tracing(&config.logging)?;
    if !config_found {
        tracing::warn!(config_path, "Config file not found, using built-in defaults");
    }

    let shutdown_timeout = config.shutdown.timeout()?;
    let listen_addr = config.listen_addr.clone();
    let env = config.env.clone();

    let state = AppState::from_config(config)?;
    let _sweeper = state.registry.spawn_sweeper();

    let graceful_shutdown = Arc::new(GracefulShutdown::with_timeout(shutdown_timeout));
    let signal_handler = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, env = %env, "Starting server");

    let tasks = state.tasks.clone();
    let server = axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown.shutdown_signal());

    graceful_shutdown.serve_until_drained(server, &tasks).await?;
    tracing::info!(addr = %listen_addr, "Stopped server");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Environment: {}", config.env);
            println!(
                "   • Rate Limiter: {}",
                if config.limiter.enabled {
                    format!("{} rps, burst {}", config.limiter.rps, config.limiter.burst)
                } else {
                    "disabled".to_string()
                }
            );
            println!(
                "   • Trusted Origins: {}",
                config.cors.trusted_origins.len()
            );
            println!("   • Mailer: {:?}", config.mailer.kind);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:4000')");
            println!("   • Use humantime durations such as '5s' or '250ms'");
            println!("   • Trusted origins need a scheme, e.g. 'https://example.com'");
            println!("   • The webhook mailer needs an http(s) url");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Marquee API configuration

# The address to listen on
listen_addr = "127.0.0.1:4000"
env = "development"

# Per-client token buckets
[limiter]
enabled = true
rps = 2.0
burst = 4
sweep_interval = "1m"
idle_retention = "3m"
trusted_proxies = []

# Deadline for in-flight requests once shutdown starts
[shutdown]
timeout = "5s"

[store]
query_timeout = "3s"

[cors]
trusted_origins = []

# "log" writes notifications to the log; "webhook" POSTs them to `url`
[mailer]
kind = "log"
sender = "Marquee <no-reply@marquee.local>"
timeout = "5s"
# url = "http://localhost:8025/send"

[logging]
level = "info"
json = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'marquee serve --config {config_path}' to start the server");
    Ok(())
}
