//! walletiq API Server Binary
//!
//! Seamless wallet HTTP API for game-provider callbacks and the admin
//! back-office.

use clap::Parser;
use walletiq::api::ApiServer;
use walletiq::config::WalletConfig;
use walletiq::storage::Storage;

#[derive(Parser, Debug)]
#[command(name = "walletiq-api")]
#[command(about = "Seamless wallet transaction processor", long_about = None)]
struct Args {
    /// Configuration file (TOML); flags below override its values
    #[arg(long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    db_path: Option<String>,

    /// Allowed CORS origins (comma-separated, use * for all)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Admin API key required in X-API-Key for /api/admin routes
    #[arg(long)]
    admin_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => WalletConfig::load(path)?,
        None => WalletConfig::default(),
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db_path) = args.db_path {
        config.storage.data_directory = db_path;
    }
    if let Some(origins) = args.cors_origins {
        config.server.allowed_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(key) = args.admin_api_key {
        config.server.admin_api_key = Some(key);
    }
    config.validate()?;

    println!("Opening wallet database: {}", config.storage.data_directory);
    let storage = Storage::open(&config.storage.data_directory)?;
    println!("Database opened successfully");

    let server = ApiServer::new(config, storage);
    server.run().await?;

    Ok(())
}
