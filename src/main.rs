//! Veplane CLI entry point

use anyhow::{Context, Result};
use clap::Parser;

use veplane::cli::{serve, Cli, Commands};
use veplane::infrastructure::config::ConfigLoader;
use veplane::infrastructure::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };

    let _log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Serve { bind } => serve::serve(config, bind).await,
        Commands::Migrate => {
            let database_url = format!("sqlite:{}", config.database.path);
            let pool = veplane::adapters::sqlite::create_pool(&database_url, None)
                .await
                .context("Failed to connect to database")?;
            let applied = veplane::adapters::sqlite::run_migrations(&pool)
                .await
                .context("Migration failed")?;
            println!("Applied {applied} migration(s)");
            Ok(())
        }
        Commands::ConfigCheck => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}
