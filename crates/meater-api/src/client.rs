// MEATER cloud HTTP client
//
// Wraps `reqwest::Client` with endpoint URL construction, bearer-token and
// locale headers, and envelope decoding. Envelope status codes are passed
// through untouched; deciding what a 401 or 429 means is the caller's job.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{ApiResponse, DevicesData, LoginData};
use crate::transport::TransportConfig;

/// Production endpoint root. Endpoint paths are joined relative to it.
pub const DEFAULT_BASE_URL: &str = "https://public-api.cloud.meater.com/v1/";

/// Raw HTTP client for the MEATER cloud public API.
pub struct MeaterClient {
    http: reqwest::Client,
    base_url: Url,
}

impl MeaterClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url: normalize_base(base_url),
        }
    }

    /// Convenience constructor from a URL string (used by tests against a
    /// mock server).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self::with_client(http, Url::parse(base_url)?))
    }

    /// The endpoint root all requests are built from.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Exchange credentials for a bearer token.
    ///
    /// `POST {base}/login` with `{"email": ..., "password": ...}`
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<ApiResponse<LoginData>, Error> {
        let url = self.base_url.join("login")?;
        debug!("POST {}", url);

        let body = json!({
            "email": email,
            "password": password.expose_secret(),
        });

        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Transport)?;

        decode_envelope(resp).await
    }

    /// List all probes on the account.
    ///
    /// `GET {base}/devices` with `Authorization: Bearer <token>` and
    /// `Accept-Language: <language>`.
    pub async fn devices(
        &self,
        token: &SecretString,
        language: &str,
    ) -> Result<ApiResponse<DevicesData>, Error> {
        let url = self.base_url.join("devices")?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::ACCEPT_LANGUAGE, language)
            .send()
            .await
            .map_err(Error::Transport)?;

        decode_envelope(resp).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Ensure the base path ends in `/` so `Url::join` appends rather than
/// replaces the last segment.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Decode the `{ status, statusCode, data }` envelope.
///
/// The envelope is decoded regardless of HTTP status because the cloud
/// returns error envelopes with 4xx/5xx codes. A body that is not an
/// envelope becomes `Deserialization` on HTTP success and `Http` otherwise.
async fn decode_envelope<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<ApiResponse<T>, Error> {
    let status = resp.status();
    let body = resp.text().await.map_err(Error::Transport)?;
    trace!(http_status = status.as_u16(), body = %body, "cloud response");

    match serde_json::from_str::<ApiResponse<T>>(&body) {
        Ok(mut envelope) => {
            envelope.raw = body;
            Ok(envelope)
        }
        Err(e) if status.is_success() => Err(Error::Deserialization {
            message: e.to_string(),
            body,
        }),
        Err(_) => Err(Error::Http {
            status: status.as_u16(),
            body,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn base_without_trailing_slash_is_normalized() {
        let url = normalize_base(Url::parse("http://127.0.0.1:9000").unwrap());
        assert_eq!(url.join("login").unwrap().path(), "/login");

        let url = normalize_base(Url::parse("https://example.com/v1").unwrap());
        assert_eq!(url.join("devices").unwrap().path(), "/v1/devices");
    }

    #[test]
    fn default_base_joins_endpoints() {
        let client =
            MeaterClient::from_reqwest(DEFAULT_BASE_URL, reqwest::Client::new()).unwrap();
        assert_eq!(
            client.base_url().join("devices").unwrap().as_str(),
            "https://public-api.cloud.meater.com/v1/devices"
        );
    }
}
