//! Shared helpers for command handlers.

use std::time::Duration;

use fleetpulse_core::{DeviceFilter, DisplayStatus};

use crate::cli::{FilterArgs, StatusFilter};
use crate::error::CliError;

/// Prompt for confirmation unless `--yes` was given.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Translate the CLI filter flags.
pub fn device_filter(args: &FilterArgs) -> DeviceFilter {
    DeviceFilter {
        search: args.search.clone(),
        building: args.building.clone(),
        tech: args.tech.clone(),
        status: args.status.map(|s| match s {
            StatusFilter::Online => DisplayStatus::Online,
            StatusFilter::Offline => DisplayStatus::Offline,
            StatusFilter::Rebooting => DisplayStatus::Rebooting,
            StatusFilter::OfflinePending => DisplayStatus::OfflinePending,
        }),
    }
}

/// Whole-second human duration, e.g. `1m 32s`.
pub fn human_duration(d: Duration) -> String {
    humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_flags_translate() {
        let args = FilterArgs {
            search: Some("lobby".into()),
            status: Some(StatusFilter::OfflinePending),
            ..FilterArgs::default()
        };
        let filter = device_filter(&args);
        assert_eq!(filter.search.as_deref(), Some("lobby"));
        assert_eq!(filter.status, Some(DisplayStatus::OfflinePending));
        assert!(filter.building.is_none());
    }

    #[test]
    fn durations_drop_subsecond_noise() {
        assert_eq!(human_duration(Duration::from_millis(92_400)), "1m 32s");
    }
}
