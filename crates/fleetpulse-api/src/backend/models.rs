// Backend wire types
//
// JSON shapes returned by the device backend. Field names follow the
// backend's camelCase convention; everything beyond the descriptive device
// fields is optional because older backends omit it.

use serde::{Deserialize, Serialize};

/// One entry of `GET /api/devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamDevice {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default)]
    pub building: String,
    #[serde(default)]
    pub tech: String,

    // Observations the backend may have made itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
}

impl UpstreamDevice {
    /// Build a descriptive-only record (no backend observations).
    pub fn new(
        address: impl Into<String>,
        name: impl Into<String>,
        building: impl Into<String>,
        tech: impl Into<String>,
        mac: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            mac: mac.into(),
            building: building.into(),
            tech: tech.into(),
            ip: None,
            status: None,
            last_seen: None,
            latency_ms: None,
        }
    }
}

/// Response of `GET /resolve?host=...`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ResolveResponse {
    /// Human-readable failure reason, combining `error` and `details`.
    pub fn failure_reason(&self) -> String {
        match (self.error.as_deref(), self.details.as_deref()) {
            (Some(e), Some(d)) => format!("{e}: {d}"),
            (Some(e), None) => e.to_owned(),
            (None, Some(d)) => d.to_owned(),
            (None, None) => "resolution failed".to_owned(),
        }
    }
}

/// Body of `POST /reboot`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RebootRequest<'a> {
    pub host: &'a str,
}

/// Response of `POST /reboot`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upstream_device_tolerates_missing_observations() {
        let dev: UpstreamDevice = serde_json::from_value(json!({
            "name": "Salle A-1010",
            "address": "a1010.example.net",
            "mac": "00:11:22:33:44:55",
            "building": "A",
            "tech": "VIA",
            "isRebooting": false
        }))
        .unwrap();
        assert_eq!(dev.address, "a1010.example.net");
        assert!(dev.ip.is_none());
        assert!(dev.status.is_none());
    }

    #[test]
    fn upstream_device_reads_camel_case_observations() {
        let dev: UpstreamDevice = serde_json::from_value(json!({
            "address": "b2.example.net",
            "status": "online",
            "lastSeen": "Mon, 02 Jan 2006 15:04:05 GMT",
            "latencyMs": 12
        }))
        .unwrap();
        assert_eq!(dev.status.as_deref(), Some("online"));
        assert_eq!(dev.last_seen.as_deref(), Some("Mon, 02 Jan 2006 15:04:05 GMT"));
        assert_eq!(dev.latency_ms, Some(12));
    }

    #[test]
    fn failure_reason_combines_fields() {
        let resp = ResolveResponse {
            error: Some("Erreur DNS".into()),
            details: Some("no such host".into()),
            ..ResolveResponse::default()
        };
        assert_eq!(resp.failure_reason(), "Erreur DNS: no such host");
        assert_eq!(ResolveResponse::default().failure_reason(), "resolution failed");
    }
}
