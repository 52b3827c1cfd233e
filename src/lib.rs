pub mod archiver;
pub mod attachments;
pub mod cli;
pub mod delivery;
pub mod discord;
pub mod env_loader;
pub mod error;
pub mod history;
pub mod model;
pub mod packager;
pub mod session;
pub mod settings;
pub mod snapshot;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use archiver::{Archiver, RunOutcome, RunState, check};
pub use cli::{Cli, Commands};
pub use error::{AppError, Result};
pub use settings::{ArchiveMode, Settings};
