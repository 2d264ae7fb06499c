//! CLI entry and dispatch.

use anyhow::{Context, Result};
use campus_core::config::{self, paths};
use campus_core::{interrupt, logging};
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "campus")]
#[command(version)]
#[command(about = "Terminal client for the campus e-learning platform")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Base URL of the course backend (overrides config)
    #[arg(long, global = true, env = "CAMPUS_API_URL", value_name = "URL")]
    api_url: Option<String>,

    /// Base URL of the identity provider (overrides config)
    #[arg(long, global = true, env = "CAMPUS_IDENTITY_URL", value_name = "URL")]
    identity_url: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in through the identity provider
    Login {
        /// Paste the redirect URL (or code) instead of waiting for the browser callback
        #[arg(long)]
        paste: bool,
    },
    /// Log out and remove the stored session
    Logout,
    /// Show the logged-in user, roles and token lifetime
    Whoami,
    /// List or create courses
    Courses {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum CourseCommands {
    /// List all courses
    List,
    /// Create a course (admin only)
    Create {
        /// Course title
        #[arg(long)]
        title: String,
        /// Course description
        #[arg(long)]
        description: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Print a fresh config generated from defaults
    Generate,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = match logging::init(&paths::logs_dir()) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    interrupt::init()?;

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli {
        command,
        api_url,
        identity_url,
    } = cli;

    let mut config = config::Config::load().context("load config")?;
    if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
        config.api.base_url = url;
    }
    if let Some(url) = identity_url.filter(|u| !u.trim().is_empty()) {
        config.identity.server_url = url;
    }
    tracing::debug!(
        issuer = %config.identity.issuer(),
        api = %config.api.base_url,
        "configuration loaded"
    );

    // default to the interactive client
    let Some(command) = command else {
        return commands::tui::run(&config).await;
    };

    match command {
        Commands::Login { paste } => commands::auth::login(&config, paste).await,
        Commands::Logout => commands::auth::logout(&config).await,
        Commands::Whoami => commands::auth::whoami(&config).await,
        Commands::Courses { command } => match command {
            CourseCommands::List => commands::courses::list(&config).await,
            CourseCommands::Create { title, description } => {
                commands::courses::create(&config, &title, &description).await
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
        },
    }
}
