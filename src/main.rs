use anyhow::Result;
use clap::Parser;
use debrid_fuse::config::CliArgs;
use debrid_fuse::{Config, ProviderRegistry};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "debrid-fuse")]
#[command(about = "A read-only FUSE filesystem streaming debrid-hosted media")]
struct Cli {
    /// Directory to mount the filesystem at
    #[arg(short, long)]
    mount_point: Option<PathBuf>,

    /// Catalog database URL (e.g. sqlite:///var/lib/debrid/catalog.db)
    #[arg(short, long)]
    database_url: Option<String>,

    /// Path to a config file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable FUSE protocol debugging
    #[arg(long)]
    debug_fuse: bool,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_with_cli(&CliArgs {
        mount_point: cli.mount_point,
        database_url: cli.database_url,
        config_file: cli.config,
        debug_fuse: cli.debug_fuse,
    })?;
    config.validate()?;

    let level = match cli.verbose {
        0 => config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Provider adapters are registered by embedding applications; the
    // standalone binary serves whatever URLs the catalog already holds.
    debrid_fuse::run(config, ProviderRegistry::new()).await
}
