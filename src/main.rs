//! micro: convention-based service registry and call router
//!
//! Discovers callable functions from `{project}/services/{service}/{logic}`
//! and serves them as `/{service}/{logic}/{function}` over HTTP and as
//! `call` events over a WebSocket.
//!
//! Usage:
//!   micro --project-dir demo                 # Serve the bundled demo project
//!   micro --project-dir demo --port 9000     # Override the configured port
//!   micro --project-dir app --env prod       # Load config/config.prod.toml

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use micro::demo_catalog;
use micro_server::{CallLogger, CallRouter, ConfigLoader, OriginGuard};
use micro_services::RegistryBuilder;
use micro_transport::TransportServer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "micro", about = "Convention-based service registry and call router")]
struct Cli {
    /// Project directory holding the services and config directories
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Config directory (or `{dir}.toml` file) relative to the project
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Environment selecting `config.{env}.toml`
    #[arg(long, env = "SERVER_ENV")]
    env: Option<String>,

    /// Port to listen on, overriding the configuration (0 for OS-assigned)
    #[arg(long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let project_dir = cli
        .project_dir
        .canonicalize()
        .unwrap_or_else(|_| cli.project_dir.clone());

    let mut loader = ConfigLoader::new();
    let mut config = match loader.load(&project_dir, &cli.config_dir, cli.env.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    println!();
    println!("  micro");
    println!("  Project:    {}", project_dir.display());
    println!("  Env:        {}", config.env);
    println!(
        "  Config:     {}",
        if loader.loaded_files().is_empty() {
            "(defaults)".to_string()
        } else {
            loader
                .loaded_files()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        }
    );

    let catalog = demo_catalog();
    let registry = RegistryBuilder::new(&catalog).build(&config.services_path(&project_dir));
    if registry.is_empty() {
        warn!("No callable functions found under {}", config.services_path(&project_dir).display());
    }
    println!("  Functions:  {}", registry.len());
    println!();

    let mut router = CallRouter::new(Arc::new(registry))
        .with_restriction_token(config.restriction.token.clone());
    if !config.origin_rules.is_empty() {
        router.add_middleware(OriginGuard::new(config.origin_rules.clone()));
    }
    router.add_middleware(CallLogger);

    let transport_config = config.transport_config(&project_dir);
    let mut transport = match TransportServer::start(transport_config, router).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    info!("micro listening on {}:{}", config.hostname, transport.port());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    info!("Shutting down...");
    transport.stop().await;
}
