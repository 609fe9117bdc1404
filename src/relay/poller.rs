//! Fixed-interval polling loop over pending multisig outputs

use super::handler::{handle_output, HandleOutcome};
use crate::config::RelayerConfig;
use crate::mixin::MultisigApi;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Start of every pass
pub fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Walks the multisig listing page by page and hands each output to the handler
pub struct Poller<A: ?Sized> {
    api: Arc<A>,
    interval: Duration,
    limit: usize,
}

impl<A> Poller<A>
where
    A: MultisigApi + ?Sized,
{
    /// Create a new poller
    pub fn new(api: Arc<A>, config: &RelayerConfig) -> Self {
        Self {
            api,
            interval: config.poll_interval,
            limit: config.page_limit,
        }
    }

    /// Main polling loop. Returns once `shutdown` is cancelled; a page that is
    /// already being processed is finished first.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut cursor = epoch();

        info!(
            "Poller started (interval {:?}, page limit {})",
            self.interval, self.limit
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    cursor = self.tick(cursor).await;
                }
            }
        }

        info!("Poller stopped");
    }

    /// Process one page after `cursor` and return the cursor for the next tick.
    ///
    /// The cursor follows each output's creation time, then falls back to the
    /// epoch when the page comes back short so the next tick starts a new pass.
    /// Outputs inserted behind the cursor during a pass are only seen on the
    /// following pass.
    pub async fn tick(&self, cursor: DateTime<Utc>) -> DateTime<Utc> {
        let outputs = match self.api.read_multisigs(cursor, self.limit).await {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!("read multisigs failed: {}", e);
                return cursor;
            }
        };

        let mut cursor = cursor;
        let mut submitted = 0usize;

        for output in &outputs {
            cursor = output.created_at;

            match handle_output(self.api.as_ref(), output).await {
                Ok(HandleOutcome::Submitted { hash, signers }) => {
                    submitted += 1;
                    info!(
                        "Submitted output {} as transaction {} ({} signers)",
                        output.utxo_id,
                        hash.as_deref().unwrap_or("unknown"),
                        signers
                    );
                }
                Ok(HandleOutcome::AwaitingSignatures { signature_maps }) => {
                    debug!(
                        "Output {} signed but not aggregated yet ({} signature maps)",
                        output.utxo_id, signature_maps
                    );
                }
                Ok(HandleOutcome::Skipped) => {}
                Err(e) => {
                    warn!(
                        utxo_id = %output.utxo_id,
                        state = %output.state,
                        "handle output failed: {}",
                        e
                    );
                }
            }
        }

        debug!(
            "Fetched {} outputs, submitted {}, cursor {}",
            outputs.len(),
            submitted,
            cursor
        );

        if outputs.len() < self.limit {
            cursor = epoch();
        }

        cursor
    }
}
