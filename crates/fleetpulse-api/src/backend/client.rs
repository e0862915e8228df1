// Backend HTTP client
//
// Wraps `reqwest::Client` with backend URL construction and response
// decoding. The backend answers errors with a `{"success": false, "error"}`
// JSON body (often with a text/plain content type), so bodies are always
// read as text first and decoded by hand.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::backend::models::{RebootRequest, RebootResponse, ResolveResponse, UpstreamDevice};
use crate::error::Error;
use crate::transport::TransportConfig;

const BODY_PREVIEW_CHARS: usize = 200;

/// Raw HTTP client for the device backend.
///
/// Cheap to clone: the inner `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// Create a new backend client from a `TransportConfig`.
    ///
    /// `base_url` is the backend root, e.g. `http://localhost:5050`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a backend client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch the canonical device list.
    ///
    /// `GET /api/devices`
    pub async fn list_devices(&self) -> Result<Vec<UpstreamDevice>, Error> {
        let url = self.url("api/devices")?;
        debug!("fetching device list");
        let (status, body) = self.get_text(url).await?;
        if !status.is_success() {
            return Err(backend_error(status, &body));
        }
        decode(&body)
    }

    /// Resolve a device's logical address to a network address.
    ///
    /// `GET /resolve?host={host}`
    ///
    /// The backend reports lookup failures as non-2xx responses with a JSON
    /// body; those come back as `Ok` with `success == false`.
    pub async fn resolve(&self, host: &str) -> Result<ResolveResponse, Error> {
        let mut url = self.url("resolve")?;
        url.query_pairs_mut().append_pair("host", host);
        debug!(host, "resolving address");
        let (status, body) = self.get_text(url).await?;
        decode_envelope(status, &body)
    }

    /// Submit a reboot command for `host`.
    ///
    /// `POST /reboot` with `{"host": "..."}`
    pub async fn reboot(&self, host: &str) -> Result<RebootResponse, Error> {
        let url = self.url("reboot")?;
        debug!(host, "submitting reboot");
        let (status, body) = self.post_text(url, &RebootRequest { host }).await?;
        decode_envelope(status, &body)
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a backend path, keeping any base path prefix.
    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get_text(&self, url: Url) -> Result<(reqwest::StatusCode, String), Error> {
        trace!("GET {}", url);
        let resp = self.http.get(url).send().await?;
        read_body(resp).await
    }

    async fn post_text(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<(reqwest::StatusCode, String), Error> {
        trace!("POST {}", url);
        let resp = self.http.post(url).json(body).send().await?;
        read_body(resp).await
    }
}

async fn read_body(resp: reqwest::Response) -> Result<(reqwest::StatusCode, String), Error> {
    let status = resp.status();
    let body = resp.text().await?;
    Ok((status, body))
}

/// Decode a `{success, ...}` envelope regardless of HTTP status.
///
/// Non-2xx responses whose body is not such an envelope become
/// `Error::Backend`.
fn decode_envelope<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &str,
) -> Result<T, Error> {
    if status.is_success() {
        return decode(body);
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) if value.get("error").is_some() || value.get("success").is_some() => {
            serde_json::from_value(value).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.to_owned(),
            })
        }
        _ => Err(backend_error(status, body)),
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

fn backend_error(status: reqwest::StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| preview(body));
    Error::Backend {
        status: status.as_u16(),
        message,
    }
}

fn preview(body: &str) -> String {
    body.trim().chars().take(BODY_PREVIEW_CHARS).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn url_keeps_base_path_prefix() {
        let client = BackendClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://ops.example.net/fleet/").unwrap(),
        );
        assert_eq!(
            client.url("api/devices").unwrap().as_str(),
            "https://ops.example.net/fleet/api/devices"
        );
    }

    #[test]
    fn error_envelope_on_non_success_is_decoded() {
        let resp: RebootResponse = decode_envelope(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"success": false, "error": "script failed"}"#,
        )
        .unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("script failed"));
    }

    #[test]
    fn plain_text_error_becomes_backend_error() {
        let err = decode_envelope::<RebootResponse>(
            reqwest::StatusCode::BAD_GATEWAY,
            "upstream unavailable",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Backend { status: 502, ref message } if message == "upstream unavailable"));
    }
}
