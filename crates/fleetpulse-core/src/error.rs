// ── Core error types ──
//
// User-facing errors from fleetpulse-core. Consumers never see raw HTTP
// bodies or JSON parse failures; the `From<fleetpulse_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Could not load the device list: {message}")]
    BootstrapFailed { message: String },

    // ── Reboot requests ──────────────────────────────────────────────
    #[error("No device selected")]
    NoDeviceSelected,

    #[error("Device not found: {address}")]
    DeviceNotFound { address: String },

    #[error("A reboot of {address} is already in progress")]
    RebootInProgress { address: String },

    #[error("Reboot of {address} rejected: {message}")]
    RebootRejected { address: String, message: String },

    // ── Resolution ───────────────────────────────────────────────────
    #[error("Could not resolve {address}: {reason}")]
    ResolutionFailed { address: String, reason: String },

    // ── Backend (wrapped, not exposed raw) ───────────────────────────
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Cannot connect to backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Backend request timed out")]
    Timeout,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fleetpulse_api::Error> for CoreError {
    fn from(err: fleetpulse_api::Error) -> Self {
        if err.is_timeout() {
            return CoreError::Timeout;
        }
        match err {
            fleetpulse_api::Error::Transport(ref e) => {
                if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Backend {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            fleetpulse_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            fleetpulse_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            fleetpulse_api::Error::Backend { status, message } => CoreError::Backend {
                message,
                status: Some(status),
            },
            fleetpulse_api::Error::Deserialization { message, body: _ } => CoreError::Backend {
                message: format!("unexpected response: {message}"),
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CoreError;

    #[test]
    fn backend_status_is_kept() {
        let err: CoreError = fleetpulse_api::Error::Backend {
            status: 503,
            message: "csv missing".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Backend { status: Some(503), .. }));
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let parse_err = url::Url::parse("not a url").err();
        let Some(parse_err) = parse_err else {
            panic!("expected a parse error");
        };
        let err: CoreError = fleetpulse_api::Error::InvalidUrl(parse_err).into();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
