//! Minimal host-chain primitives the betting engines are expressed against.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest-unit scale of one coin.
pub const COIN: i64 = 100_000_000;

const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// 32-byte transaction id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

/// Reference to a specific transaction output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub n: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, n: u32) -> Self {
        Self { txid, n }
    }
}

/// Raw output script, kept as opaque bytes.
///
/// The engines only ever need two things from a script: whether it is an
/// OP_RETURN carrier (and its payload), and byte equality against known
/// oracle / fee-payout scripts.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Build an OP_RETURN script carrying `payload`. Picks the smallest
    /// push opcode that can hold the length; payloads past `u32::MAX`
    /// do not occur.
    pub fn op_return(payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(payload.len() + 5);
        bytes.push(OP_RETURN);
        if payload.len() <= 0x4b {
            bytes.push(payload.len() as u8);
        } else if payload.len() <= u8::MAX as usize {
            bytes.push(OP_PUSHDATA1);
            bytes.push(payload.len() as u8);
        } else if payload.len() <= u16::MAX as usize {
            bytes.push(OP_PUSHDATA2);
            bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        } else {
            bytes.push(OP_PUSHDATA4);
            bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        }
        bytes.extend_from_slice(payload);
        Self(bytes)
    }

    pub fn is_op_return(&self) -> bool {
        self.0.first() == Some(&OP_RETURN)
    }

    /// Payload of an OP_RETURN script with a single push, if well-formed.
    pub fn op_return_payload(&self) -> Option<&[u8]> {
        if !self.is_op_return() {
            return None;
        }
        let (len, start) = match *self.0.get(1)? {
            n if n <= 0x4b => (n as usize, 2),
            OP_PUSHDATA1 => (*self.0.get(2)? as usize, 3),
            OP_PUSHDATA2 => {
                let len = u16::from_le_bytes([*self.0.get(2)?, *self.0.get(3)?]);
                (len as usize, 4)
            }
            OP_PUSHDATA4 => {
                let len = u32::from_le_bytes([
                    *self.0.get(2)?,
                    *self.0.get(3)?,
                    *self.0.get(4)?,
                    *self.0.get(5)?,
                ]);
                (len as usize, 6)
            }
            _ => return None,
        };
        let payload = self.0.get(start..start + len)?;
        if start + len != self.0.len() {
            return None;
        }
        Some(payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Transaction output.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TxOut {
    pub value: i64,
    pub script: Script,
}

impl TxOut {
    pub fn new(value: i64, script: Script) -> Self {
        Self { value, script }
    }
}

/// Transaction input.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        Self { prevout }
    }
}

/// Transaction with its id cached at construction.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Transaction {
    txid: TxId,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
}

impl Transaction {
    pub fn new(vin: Vec<TxIn>, vout: Vec<TxOut>) -> Self {
        let txid = Self::compute_txid(&vin, &vout);
        Self { txid, vin, vout }
    }

    pub fn txid(&self) -> TxId {
        self.txid
    }

    fn compute_txid(vin: &[TxIn], vout: &[TxOut]) -> TxId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(vin.len() as u32).to_le_bytes());
        for input in vin {
            hasher.update(input.prevout.txid.as_bytes());
            hasher.update(&input.prevout.n.to_le_bytes());
        }
        hasher.update(&(vout.len() as u32).to_le_bytes());
        for output in vout {
            hasher.update(&output.value.to_le_bytes());
            hasher.update(&(output.script.0.len() as u32).to_le_bytes());
            hasher.update(&output.script.0);
        }
        TxId(*hasher.finalize().as_bytes())
    }
}

/// Block as seen by the betting engines: timestamp plus ordered transactions.
///
/// In a proof-of-stake block `txs[0]` is the (empty) coinbase and `txs[1]`
/// the coinstake that carries stake return and betting payouts.
#[derive(Clone, Debug)]
pub struct Block {
    pub time: i64,
    pub txs: Vec<Transaction>,
}

impl Block {
    pub fn coinstake(&self) -> Option<&Transaction> {
        self.txs.get(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_return_payload_roundtrip() {
        let payload = vec![0x42, 0x01, 0x03, 0xde, 0xad];
        let script = Script::op_return(&payload);
        assert!(script.is_op_return());
        assert_eq!(script.op_return_payload(), Some(payload.as_slice()));
    }

    #[test]
    fn test_op_return_pushdata1_for_long_payloads() {
        let payload = vec![0xaa; 120];
        let script = Script::op_return(&payload);
        assert_eq!(script.0[1], 0x4c);
        assert_eq!(script.op_return_payload(), Some(payload.as_slice()));
    }

    #[test]
    fn test_op_return_pushdata2_past_255_bytes() {
        // A field event with a large contender list encodes past 255
        // bytes and must still round-trip.
        let payload = vec![0xab; 300];
        let script = Script::op_return(&payload);
        assert_eq!(script.0[1], 0x4d);
        assert_eq!(&script.0[2..4], &300u16.to_le_bytes());
        assert_eq!(script.op_return_payload(), Some(payload.as_slice()));
    }

    #[test]
    fn test_op_return_pushdata4_past_u16_lengths() {
        let payload = vec![0xcd; 70_000];
        let script = Script::op_return(&payload);
        assert_eq!(script.0[1], 0x4e);
        assert_eq!(script.op_return_payload(), Some(payload.as_slice()));
    }

    #[test]
    fn test_truncated_pushdata2_length_rejected() {
        let script = Script::new(vec![0x6a, 0x4d, 0x2c]);
        assert_eq!(script.op_return_payload(), None);
    }

    #[test]
    fn test_non_op_return_has_no_payload() {
        let script = Script::new(vec![0x76, 0xa9, 0x14]);
        assert!(!script.is_op_return());
        assert_eq!(script.op_return_payload(), None);
    }

    #[test]
    fn test_truncated_op_return_rejected() {
        // Declared length runs past the end of the script.
        let script = Script::new(vec![0x6a, 0x10, 0x01, 0x02]);
        assert_eq!(script.op_return_payload(), None);
    }

    #[test]
    fn test_txid_is_deterministic_and_input_sensitive() {
        let out = TxOut::new(100, Script::op_return(&[1, 2, 3]));
        let tx_a = Transaction::new(vec![], vec![out.clone()]);
        let tx_b = Transaction::new(vec![], vec![out.clone()]);
        assert_eq!(tx_a.txid(), tx_b.txid());

        let tx_c = Transaction::new(vec![], vec![TxOut::new(101, out.script.clone())]);
        assert_ne!(tx_a.txid(), tx_c.txid());
    }
}
