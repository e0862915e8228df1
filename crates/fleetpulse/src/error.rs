//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetpulse_config::ConfigError;
use fleetpulse_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the backend at {url}")]
    #[diagnostic(
        code(fleetpulse::connection_failed),
        help(
            "Check that the backend is running and accessible.\n\
             URL: {url}\n\
             Override it with --backend or: fleetpulse config set backend <url>"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Could not load the device list: {message}")]
    #[diagnostic(
        code(fleetpulse::bootstrap_failed),
        help("The backend did not return an inventory. Check its logs, then retry.")
    )]
    BootstrapFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("The backend rejected the request credentials")]
    #[diagnostic(
        code(fleetpulse::auth_failed),
        help(
            "Verify the API key for profile '{profile}'.\n\
             Run: fleetpulse config set-key --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    // ── Devices ──────────────────────────────────────────────────────

    #[error("device '{address}' not found")]
    #[diagnostic(
        code(fleetpulse::not_found),
        help("Run: fleetpulse devices list to see monitored devices")
    )]
    NotFound { address: String },

    #[error("A reboot of '{address}' is already in progress")]
    #[diagnostic(
        code(fleetpulse::reboot_in_progress),
        help("Wait for the device to come back, or follow it with: fleetpulse watch")
    )]
    RebootInProgress { address: String },

    #[error("Reboot of '{address}' was rejected: {message}")]
    #[diagnostic(code(fleetpulse::reboot_rejected))]
    RebootRejected { address: String, message: String },

    #[error("'{address}' did not come back within {elapsed}")]
    #[diagnostic(
        code(fleetpulse::reboot_stalled),
        help("The device may need on-site attention.")
    )]
    RebootStalled { address: String, elapsed: String },

    // ── Backend ──────────────────────────────────────────────────────

    #[error("Backend error: {message}")]
    #[diagnostic(code(fleetpulse::backend))]
    Backend { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetpulse::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetpulse::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fleetpulse config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(fleetpulse::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Request timed out")]
    #[diagnostic(
        code(fleetpulse::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout,

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::BootstrapFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::RebootInProgress { .. } => exit_code::CONFLICT,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::BootstrapFailed { message } => CliError::BootstrapFailed { message },

            CoreError::Timeout => CliError::Timeout,

            CoreError::NoDeviceSelected => CliError::Validation {
                field: "address".into(),
                reason: "no device selected".into(),
            },

            CoreError::DeviceNotFound { address } => CliError::NotFound { address },

            CoreError::RebootInProgress { address } => CliError::RebootInProgress { address },

            CoreError::RebootRejected { address, message } => {
                CliError::RebootRejected { address, message }
            }

            CoreError::ResolutionFailed { address, reason } => CliError::Backend {
                message: format!("could not resolve {address}: {reason}"),
            },

            CoreError::Backend {
                status: Some(401 | 403),
                ..
            } => CliError::AuthFailed {
                profile: "current".into(),
            },

            CoreError::Backend { message, .. } => CliError::Backend { message },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::DeviceNotFound {
                    address: "a".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::RebootInProgress {
                    address: "a".into(),
                },
                exit_code::CONFLICT,
            ),
            (CoreError::Timeout, exit_code::TIMEOUT),
            (
                CoreError::BootstrapFailed {
                    message: "down".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::Backend {
                    message: "nope".into(),
                    status: Some(401),
                },
                exit_code::AUTH,
            ),
            (CoreError::NoDeviceSelected, exit_code::USAGE),
            (
                CoreError::RebootRejected {
                    address: "a".into(),
                    message: "busy".into(),
                },
                exit_code::GENERAL,
            ),
        ];
        for (core, code) in cases {
            let label = core.to_string();
            assert_eq!(CliError::from(core).exit_code(), code, "{label}");
        }
    }
}
