use clap::{Parser, Subcommand};
use logsync::config::LoggingConfig;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "logsync")]
#[command(about = "Ship, bucket and watch nginx access logs", long_about = None)]
struct Cli {
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail the access log and deliver new lines to the ingestor
    Ship,
    /// Receive batches over HTTP and append them to bucket files
    Ingest,
    /// Run one freshness scan followed by one hourly-summary pass
    Monitor {
        /// Send a test email and exit
        #[arg(long)]
        test_mail: bool,
        /// Skip the hourly summary
        #[arg(long)]
        skip_hourly: bool,
    },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Config {
        action: ConfigAction::Init { stdout },
    } = cli.command
    {
        init_tracing(&LoggingConfig::default())?;
        return logsync::cli::config::init(stdout);
    }

    let config = match logsync::cli::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(&config.logging)?;

    let result = match cli.command {
        Commands::Ship => logsync::cli::ship::run(&config).await,
        Commands::Ingest => logsync::cli::ingest::run(&config).await,
        Commands::Monitor {
            test_mail,
            skip_hourly,
        } => logsync::cli::monitor::run(&config, test_mail, skip_hourly).await,
        Commands::Config { .. } => Ok(()),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result.map_err(|e| e.into())
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("logsync={}", logging.level)));

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
