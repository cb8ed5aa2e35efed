use clap::{Parser, Subcommand};
use hk_dist::{DistConfig, builder, generator, web};
use hk_core::{LogContext, init_server_logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "hkdist")]
#[command(about = "Distribution service for hk binaries and patches")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $HKDIST_CONFIG, then hkdist.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the release API
    Web,
    /// Generate patches and converge the next table, forever
    Gen,
    /// Build the configured branch and register it as current
    Build,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<DistConfig> {
    let mut config = match path {
        Some(path) => DistConfig::from_file(&path)?,
        None => return Ok(DistConfig::load()?),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config)?;
    match cli.command {
        Commands::Web => web::run(config).await,
        Commands::Gen => generator::run(config).await,
        Commands::Build => builder::run(config).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_server_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let context = LogContext::new("main", "hkdist");
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            context.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
