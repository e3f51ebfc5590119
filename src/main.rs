//! Tarjama - Arabic to English Translation
//!
//! This is the main entry point: it makes sure the Marian model artifacts
//! are cached locally, builds an inference session, and serves one
//! translation per invocation.

use clap::Parser;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tarjama::acquire::ArtifactStore;
use tarjama::cli::{Args, Commands};
use tarjama::config::Config;
use tarjama::error::{Result, TranslateError};
use tarjama::inference::InferenceSession;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    run(args.command, &config).await?;

    Ok(())
}

async fn run(command: Commands, config: &Config) -> Result<()> {
    let store = ArtifactStore::new(&config.model, &config.fetch)?;

    match command {
        Commands::Translate { text } => {
            let paths = store.ensure_all().await?;
            let mut session = InferenceSession::load(&paths, &config.inference)?;

            match session.translate(&text) {
                Ok(translation) => println!("{}", translation),
                Err(TranslateError::EmptyInput) => {
                    eprintln!("Please enter Arabic text to translate.");
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Fetch { force } => {
            if force {
                info!("Removing cached artifacts before re-download");
                for spec in ArtifactStore::artifacts() {
                    store.remove(&spec)?;
                }
            }

            let paths = store.ensure_all().await?;
            println!("Model artifacts ready:");
            println!("  weights:   {}", paths.weights.display());
            println!("  config:    {}", paths.config.display());
            println!("  tokenizer: {}", paths.tokenizer.display());
        }
        Commands::Status => {
            println!("\nModel artifacts:");
            println!(
                "{:<12} {:<22} {:<10} {:<10}",
                "Name", "Filename", "Size (MB)", "State"
            );
            println!("{}", "-".repeat(56));

            for spec in ArtifactStore::artifacts() {
                println!(
                    "{:<12} {:<22} {:<10.1} {:<10}",
                    spec.name,
                    spec.filename,
                    spec.size_mb,
                    store.state(&spec).as_str()
                );
            }
        }
    }

    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let log_dir = std::env::current_dir()?.join(".tarjama").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation; the guard must outlive main for the file writer to
    // flush, so it is leaked on purpose.
    let file_appender = rolling::daily(&log_dir, "tarjama.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
