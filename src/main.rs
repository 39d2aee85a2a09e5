use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use smshubd::bootstrap::Server;
use smshubd::config::Config;
use smshubd::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "smshubd")]
#[command(author, version, about = "Multi-tenant SMS message hub")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&config.telemetry)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting smshubd"
    );

    info!(
        environment = ?config.environment,
        tenants = config.tenants.len(),
        api_address = %config.api.address,
        "configuration loaded"
    );

    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
