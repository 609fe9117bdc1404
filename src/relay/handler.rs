//! Per-output broadcast decision

use crate::error::HandlerError;
use crate::mixin::{MultisigApi, MultisigUtxo, Transaction, UtxoState};

/// What happened to a single output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Output is not in the signed state
    Skipped,
    /// Signed but the quorum has not produced an aggregated signature yet
    AwaitingSignatures { signature_maps: usize },
    /// Raw transaction was accepted for broadcast. The hash is unknown when
    /// the network did not echo one and the payload is in the msgpack encoding.
    Submitted { hash: Option<String>, signers: usize },
}

/// Broadcast `output` if its collected signatures are complete.
///
/// Nothing is recorded locally, so an output still listed as signed after it
/// was confirmed will be sent again on the next pass; the network rejects or
/// ignores the duplicate.
pub async fn handle_output<A>(api: &A, output: &MultisigUtxo) -> Result<HandleOutcome, HandlerError>
where
    A: MultisigApi + ?Sized,
{
    if output.state != UtxoState::Signed {
        return Ok(HandleOutcome::Skipped);
    }

    let tx = Transaction::from_raw(&output.signed_tx).map_err(HandlerError::Decode)?;
    let signers = match &tx.aggregated_signature {
        Some(aggregated) => aggregated.signers.len(),
        None => {
            return Ok(HandleOutcome::AwaitingSignatures {
                signature_maps: tx.signature_maps,
            })
        }
    };

    let submitted = api
        .send_raw_transaction(&output.signed_tx)
        .await
        .map_err(HandlerError::Submit)?;

    let hash = if submitted.hash.is_empty() {
        tx.payload_hash()
    } else {
        Some(submitted.hash)
    };

    Ok(HandleOutcome::Submitted { hash, signers })
}
