use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::settings::ArchiveMode;

#[derive(Parser)]
#[command(name = "channel-archiver")]
#[command(about = "Archive a Discord channel's history into zip bundles")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Archive the channel history and deliver the bundle
    Run {
        /// Settings file (TOML), defaults to archiver.toml if present
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stop after the backfill (once) or keep archiving new messages (follow)
        #[arg(short, long, value_enum)]
        mode: Option<ArchiveMode>,

        /// Directory for attachments, manifest and bundles
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },

    /// Check the credential and resolve the configured channels
    Check {
        /// Settings file (TOML), defaults to archiver.toml if present
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
