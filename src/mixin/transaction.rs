//! Decoding of signed kernel transactions
//!
//! Only enough of the encoding is interpreted to locate the signature
//! section; inputs and outputs are walked but not kept. Binary layout (big
//! endian, version 2 and later):
//!
//! ```text
//! magic 0x7777 | 0x00 version | asset[32]
//! u16 inputs  { hash[32] u16 index var genesis  deposit? mint? }
//! u16 outputs { 0x00 type  var amount  u16 keys{[32]}  mask[32]  var script  withdrawal? }
//! u16 references{[32]}                  (version 4+)
//! u16 extra_len extra                   (u32 length from version 5)
//! 0xFFFF 0xFF01 sig[64] signers         (aggregated)
//!   or u16 maps { u16 n { u16 index sig[64] } }
//! ```
//!
//! `var` is a u16 length followed by that many bytes; optional sections start
//! with `0x0000` when absent and the magic when present. Payloads without the
//! magic predate the binary encoding and are msgpack maps.

use crate::error::{RelayerError, RelayerResult};

use serde::de::IgnoredAny;
use serde::Deserialize;
use sha3::{Digest, Sha3_256};

const MAGIC: [u8; 2] = [0x77, 0x77];
const NULL: [u8; 2] = [0x00, 0x00];

const TX_VERSION_COMMON_ENCODING: u8 = 0x02;
const TX_VERSION_BLAKE3_HASH: u8 = 0x03;
const TX_VERSION_REFERENCES: u8 = 0x04;
const TX_VERSION_HASH_SIGNATURE: u8 = 0x05;

const MAX_ENCODING_INT: u16 = 0xFFFF;
const AGGREGATED_SIGNATURE_PREFIX: u16 = 0xFF01;
const SIGNERS_BITMAP: u8 = 0x00;
const SIGNERS_SPARSE: u8 = 0x01;

/// Aggregated signature produced once the signer quorum is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedSignature {
    /// Member indexes that took part in the aggregation
    pub signers: Vec<u16>,
}

/// Decoded view of a signed transaction
#[derive(Debug, Clone)]
pub struct Transaction {
    pub aggregated_signature: Option<AggregatedSignature>,
    /// Per-input signature maps, used before aggregation
    pub signature_maps: usize,
    payload_hash: Option<[u8; 32]>,
}

/// Msgpack shape of transactions written before the binary encoding
#[derive(Deserialize)]
struct LegacyTransaction {
    #[serde(rename = "Signatures", default)]
    signatures: Option<Vec<IgnoredAny>>,
    #[serde(rename = "AggregatedSignature", default)]
    aggregated_signature: Option<LegacyAggregatedSignature>,
}

#[derive(Deserialize)]
struct LegacyAggregatedSignature {
    #[serde(rename = "Signers", default)]
    signers: Vec<u16>,
}

impl Transaction {
    /// Decode a hex payload as returned in `signed_tx`
    pub fn from_raw(raw: &str) -> RelayerResult<Self> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| RelayerError::Decode(format!("invalid hex: {}", e)))?;
        Self::decode(&bytes)
    }

    /// Decode either encoding
    pub fn decode(bytes: &[u8]) -> RelayerResult<Self> {
        if bytes.starts_with(&MAGIC) {
            Self::decode_binary(bytes)
        } else {
            Self::decode_legacy(bytes)
        }
    }

    fn decode_legacy(bytes: &[u8]) -> RelayerResult<Self> {
        let legacy: LegacyTransaction = rmp_serde::from_slice(bytes)
            .map_err(|e| RelayerError::Decode(format!("invalid msgpack transaction: {}", e)))?;

        Ok(Self {
            aggregated_signature: legacy
                .aggregated_signature
                .map(|sig| AggregatedSignature {
                    signers: sig.signers,
                }),
            signature_maps: legacy.signatures.map_or(0, |s| s.len()),
            payload_hash: None,
        })
    }

    fn decode_binary(bytes: &[u8]) -> RelayerResult<Self> {
        let mut reader = Reader::new(bytes);
        reader.take(2)?;

        let version = reader.u16()?;
        if !(TX_VERSION_COMMON_ENCODING as u16..=TX_VERSION_HASH_SIGNATURE as u16)
            .contains(&version)
        {
            return Err(RelayerError::Decode(format!(
                "unsupported transaction version {}",
                version
            )));
        }
        let version = version as u8;
        reader.hash()?; // asset

        let input_count = reader.u16()?;
        for _ in 0..input_count {
            reader.skip_input()?;
        }

        let output_count = reader.u16()?;
        for _ in 0..output_count {
            reader.skip_output()?;
        }

        if version >= TX_VERSION_REFERENCES {
            let reference_count = reader.u16()? as usize;
            reader.take(reference_count * 32)?;
        }

        let extra_len = if version >= TX_VERSION_HASH_SIGNATURE {
            reader.u32()? as usize
        } else {
            reader.u16()? as usize
        };
        reader.take(extra_len)?;

        let payload_hash = payload_hash(version, &bytes[..reader.position()]);

        let marker = reader.u16()?;
        let (aggregated_signature, signature_maps) = if marker == MAX_ENCODING_INT {
            (Some(reader.aggregated_signature()?), 0)
        } else {
            for _ in 0..marker {
                reader.skip_signature_map()?;
            }
            (None, marker as usize)
        };

        if !reader.is_empty() {
            return Err(RelayerError::Decode(format!(
                "{} trailing bytes after signatures",
                reader.remaining()
            )));
        }

        Ok(Self {
            aggregated_signature,
            signature_maps,
            payload_hash: Some(payload_hash),
        })
    }

    /// Kernel transaction hash, known only for the binary encoding
    pub fn payload_hash(&self) -> Option<String> {
        self.payload_hash.map(hex::encode)
    }
}

/// Hash of the unsigned payload followed by an empty signature map
fn payload_hash(version: u8, unsigned: &[u8]) -> [u8; 32] {
    if version >= TX_VERSION_BLAKE3_HASH {
        let mut hasher = blake3::Hasher::new();
        hasher.update(unsigned);
        hasher.update(&NULL);
        *hasher.finalize().as_bytes()
    } else {
        let mut hasher = Sha3_256::new();
        hasher.update(unsigned);
        hasher.update(NULL);
        hasher.finalize().into()
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> RelayerResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(RelayerError::Decode(format!(
                "unexpected end of data at offset {} (need {} bytes, have {})",
                self.pos,
                n,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> RelayerResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> RelayerResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> RelayerResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn hash(&mut self) -> RelayerResult<&'a [u8]> {
        self.take(32)
    }

    fn var(&mut self) -> RelayerResult<&'a [u8]> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    /// Reads the null/magic prefix of an optional section
    fn present(&mut self, section: &str) -> RelayerResult<bool> {
        match self.take(2)? {
            p if p == NULL => Ok(false),
            p if p == MAGIC => Ok(true),
            p => Err(RelayerError::Decode(format!(
                "invalid {} prefix {}",
                section,
                hex::encode(p)
            ))),
        }
    }

    fn skip_input(&mut self) -> RelayerResult<()> {
        self.hash()?;
        self.u16()?;
        self.var()?;

        if self.present("deposit")? {
            self.hash()?; // chain
            self.var()?; // asset key
            self.var()?; // transaction
            self.take(8)?; // output index
            self.var()?; // amount
        }
        if self.present("mint")? {
            self.var()?; // group
            self.take(8)?; // batch
            self.var()?; // amount
        }
        Ok(())
    }

    fn skip_output(&mut self) -> RelayerResult<()> {
        let kind = self.take(2)?;
        if kind[0] != 0x00 {
            return Err(RelayerError::Decode(format!(
                "invalid output type {}",
                hex::encode(kind)
            )));
        }
        self.var()?;
        let keys = self.u16()? as usize;
        self.take(keys * 32)?;
        self.hash()?; // mask
        self.var()?; // script

        if self.present("withdrawal")? {
            self.var()?; // address
            self.var()?; // tag
        }
        Ok(())
    }

    fn skip_signature_map(&mut self) -> RelayerResult<()> {
        let count = self.u16()? as usize;
        self.take(count * (2 + 64))?;
        Ok(())
    }

    fn aggregated_signature(&mut self) -> RelayerResult<AggregatedSignature> {
        let prefix = self.u16()?;
        if prefix != AGGREGATED_SIGNATURE_PREFIX {
            return Err(RelayerError::Decode(format!(
                "invalid aggregated signature prefix {:#06x}",
                prefix
            )));
        }
        self.take(64)?;

        let signers = match self.u8()? {
            // bit j of byte i marks member i * 8 + j
            SIGNERS_BITMAP => {
                let bitmap = self.var()?;
                bitmap
                    .iter()
                    .enumerate()
                    .flat_map(|(i, byte)| {
                        (0..8u16)
                            .filter(move |bit| byte & (1u8 << *bit) != 0)
                            .map(move |bit| i as u16 * 8 + bit)
                    })
                    .collect()
            }
            SIGNERS_SPARSE => {
                let count = self.u16()? as usize;
                let mut signers = Vec::with_capacity(count);
                for _ in 0..count {
                    signers.push(self.u16()?);
                }
                signers
            }
            mask => {
                return Err(RelayerError::Decode(format!(
                    "invalid aggregated signers mask {:#04x}",
                    mask
                )))
            }
        };

        Ok(AggregatedSignature { signers })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Serialize;

    /// Builds encoded transactions for tests
    pub(crate) struct TxBuilder {
        version: u8,
        inputs: Vec<Vec<u8>>,
        outputs: Vec<Vec<u8>>,
        references: usize,
        extra: Vec<u8>,
        signatures: Signatures,
    }

    enum Signatures {
        Maps(Vec<usize>),
        Aggregated(Vec<u16>),
    }

    fn var(out: &mut Vec<u8>, data: &[u8]) {
        out.extend_from_slice(&(data.len() as u16).to_be_bytes());
        out.extend_from_slice(data);
    }

    impl TxBuilder {
        pub(crate) fn new() -> Self {
            Self {
                version: TX_VERSION_HASH_SIGNATURE,
                inputs: Vec::new(),
                outputs: Vec::new(),
                references: 0,
                extra: Vec::new(),
                signatures: Signatures::Maps(Vec::new()),
            }
        }

        pub(crate) fn version(mut self, version: u8) -> Self {
            self.version = version;
            self
        }

        pub(crate) fn input(mut self) -> Self {
            let mut input = vec![0xAB; 32];
            input.extend_from_slice(&1u16.to_be_bytes());
            var(&mut input, &[]);
            input.extend_from_slice(&NULL);
            input.extend_from_slice(&NULL);
            self.inputs.push(input);
            self
        }

        pub(crate) fn deposit_input(mut self) -> Self {
            let mut input = vec![0u8; 32];
            input.extend_from_slice(&0u16.to_be_bytes());
            var(&mut input, &[]);
            input.extend_from_slice(&MAGIC);
            input.extend_from_slice(&[0x11; 32]);
            var(&mut input, b"0x0000000000000000000000000000000000000000");
            var(&mut input, b"deadbeef");
            input.extend_from_slice(&3u64.to_be_bytes());
            var(&mut input, &[0x05, 0xF5, 0xE1, 0x00]);
            input.extend_from_slice(&NULL);
            self.inputs.push(input);
            self
        }

        pub(crate) fn output(mut self, keys: usize) -> Self {
            let mut output = vec![0x00, 0x00];
            var(&mut output, &[0x01, 0x00]);
            output.extend_from_slice(&(keys as u16).to_be_bytes());
            for _ in 0..keys {
                output.extend_from_slice(&[0xCD; 32]);
            }
            output.extend_from_slice(&[0xEF; 32]);
            var(&mut output, &[0xFF, 0xFE, 0x02]);
            output.extend_from_slice(&NULL);
            self.outputs.push(output);
            self
        }

        pub(crate) fn references(mut self, count: usize) -> Self {
            self.references = count;
            self
        }

        pub(crate) fn extra(mut self, extra: &[u8]) -> Self {
            self.extra = extra.to_vec();
            self
        }

        pub(crate) fn signature_maps(mut self, sizes: &[usize]) -> Self {
            self.signatures = Signatures::Maps(sizes.to_vec());
            self
        }

        pub(crate) fn aggregated(mut self, signers: &[u16]) -> Self {
            self.signatures = Signatures::Aggregated(signers.to_vec());
            self
        }

        pub(crate) fn payload(&self) -> Vec<u8> {
            let mut out = MAGIC.to_vec();
            out.extend_from_slice(&[0x00, self.version]);
            out.extend_from_slice(&[0x42; 32]);
            out.extend_from_slice(&(self.inputs.len() as u16).to_be_bytes());
            for input in &self.inputs {
                out.extend_from_slice(input);
            }
            out.extend_from_slice(&(self.outputs.len() as u16).to_be_bytes());
            for output in &self.outputs {
                out.extend_from_slice(output);
            }
            if self.version >= TX_VERSION_REFERENCES {
                out.extend_from_slice(&(self.references as u16).to_be_bytes());
                for _ in 0..self.references {
                    out.extend_from_slice(&[0x33; 32]);
                }
            }
            if self.version >= TX_VERSION_HASH_SIGNATURE {
                out.extend_from_slice(&(self.extra.len() as u32).to_be_bytes());
            } else {
                out.extend_from_slice(&(self.extra.len() as u16).to_be_bytes());
            }
            out.extend_from_slice(&self.extra);
            out
        }

        pub(crate) fn build(&self) -> Vec<u8> {
            let mut out = self.payload();
            match &self.signatures {
                Signatures::Maps(sizes) => {
                    out.extend_from_slice(&(sizes.len() as u16).to_be_bytes());
                    for size in sizes {
                        out.extend_from_slice(&(*size as u16).to_be_bytes());
                        for i in 0..*size {
                            out.extend_from_slice(&(i as u16).to_be_bytes());
                            out.extend_from_slice(&[0x5A; 64]);
                        }
                    }
                }
                Signatures::Aggregated(signers) => {
                    out.extend_from_slice(&MAX_ENCODING_INT.to_be_bytes());
                    out.extend_from_slice(&AGGREGATED_SIGNATURE_PREFIX.to_be_bytes());
                    out.extend_from_slice(&[0x99; 64]);
                    out.push(SIGNERS_SPARSE);
                    out.extend_from_slice(&(signers.len() as u16).to_be_bytes());
                    for signer in signers {
                        out.extend_from_slice(&signer.to_be_bytes());
                    }
                }
            }
            out
        }

        pub(crate) fn build_hex(&self) -> String {
            hex::encode(self.build())
        }
    }

    #[derive(Serialize)]
    struct MsgpackAggregated {
        #[serde(rename = "Signers")]
        signers: Vec<u16>,
        #[serde(rename = "Signature")]
        signature: Vec<u8>,
    }

    #[derive(Serialize)]
    struct MsgpackTransaction {
        #[serde(rename = "Version")]
        version: u8,
        #[serde(rename = "Asset")]
        asset: Vec<u8>,
        #[serde(rename = "Extra")]
        extra: Vec<u8>,
        #[serde(rename = "Signatures")]
        signatures: Option<Vec<Vec<Vec<u8>>>>,
        #[serde(rename = "AggregatedSignature")]
        aggregated_signature: Option<MsgpackAggregated>,
    }

    /// Msgpack payload in the pre-binary layout
    pub(crate) fn legacy_tx(aggregated: bool) -> String {
        let tx = MsgpackTransaction {
            version: 1,
            asset: vec![0x42; 32],
            extra: b"memo".to_vec(),
            signatures: (!aggregated).then(|| vec![vec![vec![0x5A; 64]]]),
            aggregated_signature: aggregated.then(|| MsgpackAggregated {
                signers: vec![0, 1],
                signature: vec![0x99; 64],
            }),
        };
        hex::encode(rmp_serde::to_vec_named(&tx).unwrap())
    }

    #[test]
    fn test_decode_aggregated_signature() {
        let raw = TxBuilder::new()
            .input()
            .output(3)
            .references(2)
            .extra(b"memo")
            .aggregated(&[0, 2])
            .build_hex();

        let tx = Transaction::from_raw(&raw).unwrap();
        assert!(tx.aggregated_signature.is_some());
        assert_eq!(tx.aggregated_signature.unwrap().signers, vec![0, 2]);
    }

    #[test]
    fn test_decode_partial_signatures() {
        let raw = TxBuilder::new()
            .input()
            .input()
            .output(2)
            .signature_maps(&[1, 0])
            .build_hex();

        let tx = Transaction::from_raw(&raw).unwrap();
        assert!(tx.aggregated_signature.is_none());
        assert_eq!(tx.signature_maps, 2);
    }

    #[test]
    fn test_decode_every_binary_version() {
        for version in TX_VERSION_COMMON_ENCODING..=TX_VERSION_HASH_SIGNATURE {
            let raw = TxBuilder::new()
                .version(version)
                .input()
                .output(3)
                .references(1)
                .extra(b"memo")
                .aggregated(&[0, 1])
                .build_hex();

            let tx = Transaction::from_raw(&raw)
                .unwrap_or_else(|e| panic!("version {} failed: {}", version, e));
            assert!(tx.aggregated_signature.is_some(), "version {}", version);
        }
    }

    #[test]
    fn test_decode_version_2_without_references() {
        let builder = TxBuilder::new()
            .version(TX_VERSION_COMMON_ENCODING)
            .input()
            .output(3)
            .extra(&[0x01; 300]);
        let bytes = builder.build();

        // no references section; the extra length is a u16
        let tx = Transaction::decode(&bytes).unwrap();
        assert!(tx.aggregated_signature.is_none());
        assert_eq!(tx.signature_maps, 0);
    }

    #[test]
    fn test_decode_deposit_input() {
        let raw = TxBuilder::new().deposit_input().output(1).build_hex();
        let tx = Transaction::from_raw(&raw).unwrap();
        assert!(tx.aggregated_signature.is_none());
    }

    #[test]
    fn test_decode_bitmap_signers() {
        let mut bytes = TxBuilder::new().input().output(1).payload();
        bytes.extend_from_slice(&MAX_ENCODING_INT.to_be_bytes());
        bytes.extend_from_slice(&AGGREGATED_SIGNATURE_PREFIX.to_be_bytes());
        bytes.extend_from_slice(&[0x01; 64]);
        bytes.push(SIGNERS_BITMAP);
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&[0b0000_0101, 0b1000_0000]);

        let tx = Transaction::decode(&bytes).unwrap();
        assert_eq!(tx.aggregated_signature.unwrap().signers, vec![0, 2, 15]);
    }

    #[test]
    fn test_payload_hash_ignores_signatures() {
        let builder = TxBuilder::new().input().output(1).extra(b"x");
        let unsigned = Transaction::decode(&builder.build()).unwrap();
        let signed = Transaction::decode(&builder.aggregated(&[1]).build()).unwrap();
        assert_eq!(unsigned.payload_hash(), signed.payload_hash());
    }

    #[test]
    fn test_payload_hash_function_follows_version() {
        let v5 = TxBuilder::new().input().output(1);
        let unsigned = v5.payload();
        let tx = Transaction::decode(&v5.build()).unwrap();

        let mut expected = unsigned.clone();
        expected.extend_from_slice(&NULL);
        assert_eq!(
            tx.payload_hash().unwrap(),
            hex::encode(blake3::hash(&expected).as_bytes())
        );

        let v2 = TxBuilder::new()
            .version(TX_VERSION_COMMON_ENCODING)
            .input()
            .output(1);
        let mut expected = v2.payload();
        expected.extend_from_slice(&NULL);
        let tx = Transaction::decode(&v2.build()).unwrap();
        assert_eq!(
            tx.payload_hash().unwrap(),
            hex::encode(Sha3_256::digest(&expected))
        );
    }

    #[test]
    fn test_decode_legacy_msgpack() {
        let tx = Transaction::from_raw(&legacy_tx(true)).unwrap();
        assert!(tx.aggregated_signature.is_some());
        assert_eq!(tx.aggregated_signature.as_ref().unwrap().signers, vec![0, 1]);
        assert_eq!(tx.payload_hash(), None);

        let tx = Transaction::from_raw(&legacy_tx(false)).unwrap();
        assert!(tx.aggregated_signature.is_none());
        assert_eq!(tx.signature_maps, 1);
    }

    #[test]
    fn test_rejects_invalid_hex() {
        let err = Transaction::from_raw("zz").unwrap_err();
        assert!(matches!(err, RelayerError::Decode(_)));
    }

    #[test]
    fn test_rejects_garbage_without_magic() {
        // 0xc1 is never used by msgpack
        let err = Transaction::from_raw("c1c1c1").unwrap_err();
        assert!(err.to_string().contains("msgpack"));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = TxBuilder::new().input().output(1).build();
        bytes[3] = 0x01;
        assert!(Transaction::decode(&bytes).is_err());
        bytes[3] = 0x06;
        assert!(Transaction::decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let bytes = TxBuilder::new().input().output(1).aggregated(&[0]).build();
        let err = Transaction::decode(&bytes[..bytes.len() - 10]).unwrap_err();
        assert!(err.to_string().contains("unexpected end"));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = TxBuilder::new().input().output(1).build();
        bytes.push(0x00);
        assert!(Transaction::decode(&bytes).is_err());
    }

    #[test]
    fn test_rejects_empty_payload() {
        assert!(Transaction::from_raw("").is_err());
    }
}
