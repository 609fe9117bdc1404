//! Mixin API payload types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a multisig output as reported by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtxoState {
    Unspent,
    Signed,
    Spent,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for UtxoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UtxoState::Unspent => "unspent",
            UtxoState::Signed => "signed",
            UtxoState::Spent => "spent",
            UtxoState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A pending multisig UTXO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultisigUtxo {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub user_id: String,
    pub utxo_id: String,
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub output_index: u32,
    /// Decimal string, kept verbatim
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub threshold: u8,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub memo: String,
    pub state: UtxoState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub signed_by: String,
    /// Hex encoded transaction carrying the collected signatures
    #[serde(default)]
    pub signed_tx: String,
}

/// Result of a raw transaction broadcast
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedTransaction {
    #[serde(default)]
    pub hash: String,
}

/// Error envelope returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub description: String,
}

/// Every response is either `{"data": ...}` or `{"error": ...}`
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
    pub error: Option<ApiErrorBody>,
}

/// JSON-RPC style request forwarded to a kernel node
#[derive(Debug, Serialize)]
pub(crate) struct ProxyRequest<'a> {
    pub method: &'a str,
    pub params: Vec<&'a str>,
}
