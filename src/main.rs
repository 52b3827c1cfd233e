use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use channel_archiver::discord::DiscordSession;
use channel_archiver::settings::load_token;
use channel_archiver::{Archiver, Cli, Commands, Result, RunOutcome, Settings, env_loader};

#[tokio::main]
async fn main() {
    let dotenv = env_loader::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Some(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            mode,
            archive_dir,
        } => run(config, mode, archive_dir).await,
        Commands::Check { config } => check(config).await,
    };

    // A hard-limit rejection lands here too: exit at once, nothing to retry.
    if let Err(e) = result {
        error!(error = %e, hard_limit = e.is_hard_limit(), "archiver stopped");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_settings(config: Option<PathBuf>) -> Result<Settings> {
    let mut settings = Settings::load(config.as_deref())?;
    settings.apply_env()?;
    Ok(settings)
}

fn open_session(settings: &Settings) -> Result<DiscordSession> {
    let token = load_token()?;
    DiscordSession::new(
        &settings.discord.api_base_url,
        &token,
        settings.request_timeout(),
    )
}

async fn run(
    config: Option<PathBuf>,
    mode: Option<channel_archiver::ArchiveMode>,
    archive_dir: Option<PathBuf>,
) -> Result<()> {
    let mut settings = load_settings(config)?;
    if let Some(mode) = mode {
        settings.archive.mode = mode;
    }
    if let Some(dir) = archive_dir {
        settings.archive.dir = dir;
    }

    let session = Arc::new(open_session(&settings)?);
    let mut archiver = Archiver::new(session, settings);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match archiver.run(shutdown).await? {
        RunOutcome::Completed { messages } => {
            info!(messages, "completed");
        }
        RunOutcome::Stopped { messages } => {
            info!(messages, degraded = archiver.is_degraded(), "stopped");
        }
    }
    Ok(())
}

async fn check(config: Option<PathBuf>) -> Result<()> {
    let settings = load_settings(config)?;
    let session = open_session(&settings)?;

    let (me, target, destination) = channel_archiver::check(&session, &settings).await?;

    println!("Connected as {}", me.tag());
    println!("Archiving #{} ({})", target.display_name(), target.id);
    println!(
        "Delivering to #{} ({})",
        destination.display_name(),
        destination.id
    );
    Ok(())
}
