// Cloud API response types
//
// Every endpoint wraps its payload in the same envelope:
// `{ "status": "OK", "statusCode": 200, "data": { ... } }`.
// Error envelopes omit `data`, so it is optional throughout.

use serde::{Deserialize, Serialize};

// ── Response Envelope ────────────────────────────────────────────────

/// Standard MEATER cloud response envelope.
///
/// `status_code` mirrors the HTTP status on the happy path, but the cloud
/// also reports failures (401, 429, 500, ...) inside the envelope, so
/// callers classify this value rather than the transport status.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub data: Option<T>,
    /// The undecoded body, kept for diagnostics.
    #[serde(skip)]
    pub raw: String,
}

// ── Login ────────────────────────────────────────────────────────────

/// Payload of a successful `POST /login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    pub token: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

// ── Devices ──────────────────────────────────────────────────────────

/// Payload of `GET /devices`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicesData {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// A single probe as reported by the cloud.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Stable probe identifier.
    pub id: String,
    /// Unix timestamp (seconds) of the last reading the cloud received.
    #[serde(default)]
    pub updated_at: i64,
    pub temperature: ProbeTemperature,
    /// Present (and non-null) only while the probe is assigned to a cook.
    #[serde(default)]
    pub cook: Option<Cook>,
}

/// Live probe temperatures.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProbeTemperature {
    pub internal: f64,
    pub ambient: f64,
}

/// An active cook session on a probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cook {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// e.g. `"Started"`, `"Ready For Resting"`. Empty when idle.
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub temperature: CookTemperature,
    #[serde(default)]
    pub time: CookTime,
}

impl Cook {
    /// A cook block counts as active only when it carries a state.
    pub fn is_active(&self) -> bool {
        !self.state.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CookTemperature {
    #[serde(default)]
    pub target: f64,
    #[serde(default)]
    pub peak: f64,
}

/// Cook timing in seconds. The cloud reports `-1` for an unknown estimate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CookTime {
    #[serde(default)]
    pub elapsed: i64,
    #[serde(default)]
    pub remaining: i64,
}

impl Device {
    /// The cook block, if one is present and active.
    pub fn active_cook(&self) -> Option<&Cook> {
        self.cook.as_ref().filter(|c| c.is_active())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_without_cook_block() {
        let device: Device = serde_json::from_value(json!({
            "id": "probe-1",
            "updated_at": 1_700_000_000,
            "temperature": { "internal": 21.5, "ambient": 22.0 }
        }))
        .unwrap();
        assert!(device.cook.is_none());
        assert!(device.active_cook().is_none());
    }

    #[test]
    fn null_cook_block_is_absent() {
        let device: Device = serde_json::from_value(json!({
            "id": "probe-1",
            "updated_at": 1,
            "temperature": { "internal": 20, "ambient": 20 },
            "cook": null
        }))
        .unwrap();
        assert!(device.cook.is_none());
    }

    #[test]
    fn empty_cook_state_is_inactive() {
        let device: Device = serde_json::from_value(json!({
            "id": "probe-1",
            "updated_at": 1,
            "temperature": { "internal": 20, "ambient": 20 },
            "cook": { "id": "c1", "name": "Brisket", "state": "" }
        }))
        .unwrap();
        assert!(device.cook.is_some());
        assert!(device.active_cook().is_none());
    }

    #[test]
    fn active_cook_parses_nested_blocks() {
        let device: Device = serde_json::from_value(json!({
            "id": "probe-2",
            "updated_at": 1_700_000_100,
            "temperature": { "internal": 54.2, "ambient": 140.0 },
            "cook": {
                "id": "cook-9",
                "name": "Steak",
                "state": "Started",
                "temperature": { "target": 57, "peak": 55.1 },
                "time": { "elapsed": 600, "remaining": -1 }
            }
        }))
        .unwrap();
        let cook = device.active_cook().unwrap();
        assert_eq!(cook.name, "Steak");
        assert!((cook.temperature.target - 57.0).abs() < f64::EPSILON);
        assert_eq!(cook.time.remaining, -1);
    }

    #[test]
    fn error_envelope_has_no_data() {
        let resp: ApiResponse<DevicesData> =
            serde_json::from_value(json!({ "status": "Unauthorized", "statusCode": 401 }))
                .unwrap();
        assert_eq!(resp.status_code, 401);
        assert!(resp.data.is_none());
    }
}
