//! Authenticated HTTP client for the Mixin API

use super::auth::SessionSigner;
use super::types::{Envelope, MultisigUtxo, ProxyRequest, SubmittedTransaction};
use super::MultisigApi;
use crate::config::{Keystore, RelayerConfig};
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

/// Mixin API client bound to one keystore session
pub struct MixinClient {
    http: Client,
    base_url: String,
    signer: SessionSigner,
}

impl MixinClient {
    /// Create a new client from keystore credentials
    pub fn new(keystore: &Keystore, config: &RelayerConfig) -> RelayerResult<Self> {
        let signer = SessionSigner::from_keystore(keystore)?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("mixin-multisig-relayer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            signer,
        })
    }

    /// Send a signed request and unwrap the response envelope
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        uri: &str,
        body: Vec<u8>,
        operation: &str,
    ) -> RelayerResult<T> {
        let token = self.signer.sign_request(method.as_str(), uri, &body)?;
        let request_id = Uuid::new_v4();

        debug!("{} {} (request {})", method, uri, request_id);

        let response = self
            .http
            .request(method, format!("{}{}", self.base_url, uri))
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(CONTENT_TYPE, "application/json")
            .header("X-Request-Id", request_id.to_string())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        unwrap_envelope(status, &bytes, operation)
    }
}

#[async_trait]
impl MultisigApi for MixinClient {
    async fn read_multisigs(
        &self,
        offset: DateTime<Utc>,
        limit: usize,
    ) -> RelayerResult<Vec<MultisigUtxo>> {
        let uri = multisigs_uri(offset, limit);
        self.request(Method::GET, &uri, Vec::new(), "read multisigs")
            .await
    }

    async fn send_raw_transaction(&self, raw: &str) -> RelayerResult<SubmittedTransaction> {
        let body = serde_json::to_vec(&ProxyRequest {
            method: "sendrawtransaction",
            params: vec![raw],
        })?;
        self.request(Method::POST, "/external/proxy", body, "send raw transaction")
            .await
    }
}

/// Query string keys are sorted so the signed URI matches what is sent
fn multisigs_uri(offset: DateTime<Utc>, limit: usize) -> String {
    let offset = offset
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
        .replace(':', "%3A");
    format!("/multisigs?limit={}&offset={}", limit, offset)
}

fn unwrap_envelope<T: DeserializeOwned>(
    status: StatusCode,
    bytes: &[u8],
    operation: &str,
) -> RelayerResult<T> {
    let envelope: Envelope<T> = match serde_json::from_slice(bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("{} returned unparseable body (HTTP {})", operation, status);
            return Err(RelayerError::UnexpectedResponse {
                operation: operation.to_string(),
                message: format!("HTTP {}: {}", status, e),
            });
        }
    };

    if let Some(error) = envelope.error {
        return Err(RelayerError::Api {
            status: if error.status == 0 {
                status.as_u16()
            } else {
                error.status
            },
            code: error.code,
            description: error.description,
        });
    }

    envelope.data.ok_or_else(|| RelayerError::UnexpectedResponse {
        operation: operation.to_string(),
        message: format!("HTTP {} without data", status),
    })
}
