//! Command dispatch: bridges CLI args to the sync layer and output formatting.

pub mod config_cmd;
pub mod snapshot;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a cluster-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Snapshot(args) => snapshot::handle(args, resolved, global).await,
        Command::Watch(args) => watch::handle(args, resolved, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not need a cluster connection".into(),
        )),
    }
}
