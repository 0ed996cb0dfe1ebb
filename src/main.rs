use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use signworks::config::SiteConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "signworks")]
#[command(version, about = "Content backend and AI content pipeline for a signage fabrication studio")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: signworks.toml in the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create signworks.toml and the content database
    Init,
    /// Start the admin API server
    Serve {
        /// Port to serve on
        #[arg(short, long, default_value = "4610")]
        port: u16,

        /// Enable dev mode (permissive CORS, bind on all interfaces)
        #[arg(long)]
        dev: bool,

        /// Auto-open the admin URL after the server starts
        #[arg(long)]
        open: bool,
    },
    /// Run the content pipeline once, streaming progress to the terminal
    Pipeline {
        /// Skip the start confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Internal-linking passes
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },
    /// Show recent pipeline runs
    Runs {
        #[arg(long, default_value = "10")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum LinkCommands {
    /// Extract linkable keywords from published content into rules
    Extract,
    /// Inject anchors for stored rules into post bodies
    Apply {
        /// Skip the rewrite confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("signworks.toml"));

    match &cli.command {
        Commands::Init => {
            cmd::cmd_init(&config_path)?;
        }
        Commands::Serve { port, dev, open } => {
            let config = SiteConfig::load(&config_path)?;
            cmd::cmd_serve(config, *port, *dev, *open).await?;
        }
        Commands::Pipeline { yes } => {
            let config = SiteConfig::load(&config_path)?;
            cmd::cmd_pipeline(config, *yes, cli.verbose).await?;
        }
        Commands::Link { command } => {
            let config = SiteConfig::load(&config_path)?;
            match command {
                LinkCommands::Extract => cmd::cmd_link_extract(config).await?,
                LinkCommands::Apply { yes } => cmd::cmd_link_apply(config, *yes).await?,
            }
        }
        Commands::Runs { limit } => {
            let config = SiteConfig::load(&config_path)?;
            cmd::cmd_runs(config, *limit).await?;
        }
    }

    Ok(())
}
