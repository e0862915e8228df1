//! Command dispatch: bridges CLI args -> monitor operations -> output.

pub mod config_cmd;
pub mod devices;
pub mod reboot;
pub mod util;
pub mod watch;

use fleetpulse_core::Monitor;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a backend-bound command to the appropriate handler.
///
/// The monitor is already bootstrapped. Its periodic tasks run only for
/// `watch` and for a reboot that is being followed.
pub async fn dispatch(cmd: Command, monitor: &Monitor, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => devices::handle(monitor, args, global).await,
        Command::Reboot(args) => reboot::handle(monitor, args, global).await,
        Command::Watch(args) => watch::handle(monitor, args, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "config and completions are handled before dispatch".into(),
        )),
    }
}
