//! Mixin module - remote wallet-custody service access
//!
//! This module provides:
//! - Request signing with the keystore session key
//! - The authenticated HTTP client for listing and broadcasting
//! - Decoding of signed kernel transactions

pub mod auth;
pub mod client;
pub mod transaction;
pub mod types;

pub use client::MixinClient;
pub use transaction::Transaction;
pub use types::{MultisigUtxo, SubmittedTransaction, UtxoState};

use crate::error::RelayerResult;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Operations the relayer needs from the custody service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MultisigApi: Send + Sync {
    /// List up to `limit` multisig outputs created after `offset`, oldest first
    async fn read_multisigs(
        &self,
        offset: DateTime<Utc>,
        limit: usize,
    ) -> RelayerResult<Vec<MultisigUtxo>>;

    /// Broadcast a hex encoded signed transaction
    async fn send_raw_transaction(&self, raw: &str) -> RelayerResult<SubmittedTransaction>;
}
