use clap::{Parser, Subcommand};
use hk_core::{DistClient, LogContext, Platform, ReleaseList, init_cli_logging};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod output;
mod update;

use config::Config;
use update::{UpdateOutcome, Updater, VERSION};


#[derive(Parser)]
#[command(name = "hk")]
#[command(about = "Heroku command-line client")]
#[command(version = VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show hk version
    Version,

    /// Download and install the current version of hk
    #[command(hide = true)]
    Update,

    /// List published releases
    Releases {
        /// Only releases of this command
        #[arg(long)]
        cmd: Option<String>,

        /// Only releases for this platform, e.g. linux-amd64
        #[arg(long)]
        plat: Option<String>,
    },

    /// Show the current release for a platform
    Current {
        /// Platform to query, defaults to this machine's
        #[arg(long)]
        plat: Option<Platform>,

        #[arg(long, default_value = "hk")]
        cmd: String,
    },
}

fn version_line() -> String {
    format!("hk/{} ({})", VERSION, Platform::current())
}

fn dist_client(config: &Config) -> anyhow::Result<DistClient> {
    let user_agent = version_line();
    Ok(DistClient::new(&config.dist.url, &user_agent, config.dist.timeout())?)
}

async fn run(command: &Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Version => {
            println!("{}", version_line());
        }
        Commands::Update => match Updater::new(config)?.update().await? {
            UpdateOutcome::UpToDate => tracing::debug!("Already up to date"),
            UpdateOutcome::Updated { version } => println!("Updated to {}", version),
        },
        Commands::Releases { cmd, plat } => {
            let releases = match dist_client(config)?.list_releases(None).await? {
                ReleaseList::Modified { releases, .. } => releases,
                ReleaseList::NotModified => Vec::new(),
            };
            let matching = output::filter_releases(&releases, cmd.as_deref(), plat.as_deref());
            println!("{}", output::release_table(&matching));
        }
        Commands::Current { plat, cmd } => {
            let plat = plat.clone().unwrap_or_else(Platform::current);
            let info = dist_client(config)?.current_info(cmd, &plat).await?;
            println!("{} {}", info.version, hex::encode(&info.sha256));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_cli_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let context = LogContext::new("main", "hk");
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            context.error(&format!("{:#}", e));
            return ExitCode::FAILURE;
        }
    };

    let result = run(&cli.command, &config).await;

    if config.update.background_check && !matches!(cli.command, Commands::Update) {
        update::background_check(&config);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hk: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
