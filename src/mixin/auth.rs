//! Request signing for the Mixin API
//!
//! Every request carries a short-lived EdDSA JWT bound to the request method,
//! URI and body through the `sig` claim.

use crate::config::Keystore;
use crate::error::{RelayerError, RelayerResult};

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::SigningKey;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Token lifetime in seconds
const TOKEN_TTL_SECS: i64 = 3600;

/// PKCS#8 v1 prefix for a bare Ed25519 seed (RFC 8410)
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// JWT claims expected by the Mixin API
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Client (user or bot) ID
    pub uid: String,
    /// Session ID
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique request nonce
    pub jti: String,
    /// Hex SHA-256 of the signed request
    pub sig: String,
    pub scp: String,
}

/// Signs authentication tokens for one Mixin session
pub struct SessionSigner {
    client_id: String,
    session_id: String,
    scope: String,
    key: EncodingKey,
}

impl SessionSigner {
    /// Build a signer from keystore credentials
    pub fn from_keystore(keystore: &Keystore) -> RelayerResult<Self> {
        let seed = decode_seed(&keystore.private_key)?;

        let mut der = ED25519_PKCS8_PREFIX.to_vec();
        der.extend_from_slice(&seed);

        Ok(Self {
            client_id: keystore.client_id.clone(),
            session_id: keystore.session_id.clone(),
            scope: keystore.scope.clone(),
            key: EncodingKey::from_ed_der(&der),
        })
    }

    /// Sign a bearer token for a request issued now
    pub fn sign_request(&self, method: &str, uri: &str, body: &[u8]) -> RelayerResult<String> {
        self.sign_at(method, uri, body, chrono::Utc::now().timestamp(), Uuid::new_v4())
    }

    fn sign_at(
        &self,
        method: &str,
        uri: &str,
        body: &[u8],
        issued_at: i64,
        jti: Uuid,
    ) -> RelayerResult<String> {
        let claims = Claims {
            uid: self.client_id.clone(),
            sid: self.session_id.clone(),
            iat: issued_at,
            exp: issued_at + TOKEN_TTL_SECS,
            jti: jti.to_string(),
            sig: request_digest(method, uri, body),
            scp: self.scope.clone(),
        };

        encode(&Header::new(Algorithm::EdDSA), &claims, &self.key)
            .map_err(|e| RelayerError::Auth(format!("Failed to sign token: {}", e)))
    }
}

/// Hex SHA-256 of `METHOD + URI + BODY`
fn request_digest(method: &str, uri: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(uri.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Accepts any base64 flavour the dashboard or SDKs emit
fn decode_seed(encoded: &str) -> RelayerResult<[u8; 32]> {
    let encoded = encoded.trim();
    let bytes = [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(encoded).ok())
        .ok_or_else(|| RelayerError::Auth("private_key is not valid base64".to_string()))?;

    if bytes.len() != 32 && bytes.len() != 64 {
        return Err(RelayerError::Auth(format!(
            "unsupported private_key length {} (expected Ed25519 key)",
            bytes.len()
        )));
    }

    let mut seed = [0u8; 32];
    seed.copy_from_slice(&bytes[..32]);

    // 64-byte keys are seed || public key
    if bytes.len() == 64 {
        let derived = SigningKey::from_bytes(&seed).verifying_key();
        if derived.as_bytes()[..] != bytes[32..] {
            return Err(RelayerError::Auth(
                "private_key public half does not match its seed".to_string(),
            ));
        }
    }

    Ok(seed)
}
