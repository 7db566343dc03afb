//! Remote-device sync client
//!
//! The other half of the pairing flow: what a second device uses to
//! exchange the on-screen PIN for a token and upload its transaction
//! batch to the host's LAN endpoint.

use thiserror::Error;

use crate::models::{PairRequest, PairResponse, ServerStatus, SyncDataPayload, SyncDataResponse};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid sync endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Sync HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Pairing rejected: {0}")]
    Rejected(String),
    #[error("Sync upload failed: {0}")]
    Upload(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Token handed back after a successful pairing
#[derive(Debug, Clone)]
pub struct PairedDevice {
    pub token: String,
    /// Seconds until the host session expires
    pub expires_in: u64,
}

/// HTTP client for the host's pairing endpoint
#[derive(Clone)]
pub struct SyncClient {
    base_url: String,
    client: reqwest::Client,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Exchange the PIN shown on the host for a sync token
    pub async fn pair(&self, pin: &str, device_name: &str) -> ClientResult<PairedDevice> {
        let response = self
            .client
            .post(format!("{}/pair", self.base_url))
            .json(&PairRequest {
                pin: pin.to_string(),
                device_name: device_name.to_string(),
            })
            .send()
            .await?;

        let payload = response.json::<PairResponse>().await?;
        if !payload.success {
            return Err(ClientError::Rejected(payload.message));
        }
        let token = payload
            .token
            .ok_or_else(|| ClientError::Rejected("response did not include a token".to_string()))?;

        Ok(PairedDevice {
            token,
            expires_in: payload.expires_in.unwrap_or(0),
        })
    }

    /// Upload the transaction batch; one submission per pairing
    pub async fn push(
        &self,
        token: &str,
        payload: &SyncDataPayload,
    ) -> ClientResult<SyncDataResponse> {
        let response = self
            .client
            .post(format!("{}/sync", self.base_url))
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Upload(parse_api_error(status.as_u16(), &body)));
        }

        Ok(response.json::<SyncDataResponse>().await?)
    }

    /// Poll the host's status endpoint
    pub async fn status(&self) -> ClientResult<ServerStatus> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await?;
        Ok(response.json::<ServerStatus>().await?)
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
}

fn parse_api_error(status: u16, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error {
            return format!("{} ({status})", message.trim());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("{trimmed} ({status})")
    }
}

fn normalize_endpoint(raw: String) -> ClientResult<String> {
    let endpoint = raw.trim();
    if endpoint.is_empty() {
        return Err(ClientError::InvalidEndpoint(
            "endpoint must not be empty".to_string(),
        ));
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(ClientError::InvalidEndpoint(
            "endpoint must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("192.168.1.20:8080".to_string()).is_err());
        assert_eq!(
            normalize_endpoint("http://192.168.1.20:8080/".to_string()).unwrap(),
            "http://192.168.1.20:8080"
        );
    }

    #[test]
    fn test_parse_api_error_prefers_json_body() {
        let message = parse_api_error(401, r#"{"error": "Unauthorized: unknown sync token"}"#);
        assert_eq!(message, "Unauthorized: unknown sync token (401)");

        assert_eq!(parse_api_error(500, ""), "HTTP 500");
        assert_eq!(parse_api_error(502, "bad gateway"), "bad gateway (502)");
    }
}
