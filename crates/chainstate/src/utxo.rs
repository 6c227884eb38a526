//! UTXO entries and the storage-backed utxo set.

use taxd_consensus::constants::UTXO_EXPIRY_WINDOW;
use taxd_primitives::outpoint::OutPoint;
use taxd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::compress::{
    compress_amount, compress_script, decompress_amount, decompress_script_from, put_vlq,
    read_vlq, UtxoDecodeError,
};

/// The output was contained in a coinbase transaction.
pub const TF_COINBASE: u8 = 1 << 0;
/// The output has been spent.
pub const TF_SPENT: u8 = 1 << 1;
/// The output has been modified since it was loaded.
pub const TF_MODIFIED: u8 = 1 << 2;
/// The output has been recorded as expired.
pub const TF_EXPIRED: u8 = 1 << 3;

pub const OUTPOINT_KEY_LEN: usize = 36;

/// One transaction output's chain state: how much it pays, its spending
/// condition, the height that created it, and its packed status flags.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtxoEntry {
    pub amount: i64,
    pub pk_script: Vec<u8>,
    pub block_height: i32,
    pub packed_flags: u8,
}

impl UtxoEntry {
    pub fn new(amount: i64, pk_script: Vec<u8>, block_height: i32, is_coinbase: bool) -> Self {
        Self {
            amount,
            pk_script,
            block_height,
            packed_flags: if is_coinbase { TF_COINBASE } else { 0 },
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.packed_flags & TF_COINBASE == TF_COINBASE
    }

    pub fn is_spent(&self) -> bool {
        self.packed_flags & TF_SPENT == TF_SPENT
    }

    pub fn is_modified(&self) -> bool {
        self.packed_flags & TF_MODIFIED == TF_MODIFIED
    }

    /// Whether the expired flag has been recorded on this entry. Independent
    /// of [`check_expired`](Self::check_expired), which computes expiry from
    /// heights alone.
    pub fn is_expired(&self) -> bool {
        self.packed_flags & TF_EXPIRED == TF_EXPIRED
    }

    /// Whether the output has outlived the retention window as of
    /// `tx_height`. A distance of exactly the window is still live.
    pub fn check_expired(&self, tx_height: i32) -> bool {
        tx_height - self.block_height > UTXO_EXPIRY_WINDOW
    }

    /// Records the output as expired. Idempotent; no other bits change.
    pub fn mark_expired(&mut self) {
        self.packed_flags |= TF_EXPIRED;
    }

    /// Marks the output as spent and modified. Spending an output that is
    /// already spent has no effect.
    pub fn mark_spent(&mut self) {
        if self.is_spent() {
            return;
        }
        self.packed_flags |= TF_SPENT | TF_MODIFIED;
    }

    /// Serializes the entry in the current chain-state format: VLQ header
    /// code `(height << 1) | coinbase`, compressed amount, compressed script.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.pk_script.len());
        let code = ((self.block_height as u64) << 1) | u64::from(self.is_coinbase());
        put_vlq(&mut buf, code);
        put_vlq(&mut buf, compress_amount(self.amount as u64));
        buf.extend_from_slice(&compress_script(&self.pk_script));
        buf
    }

    /// Inverse of [`encode`](Self::encode). Spent/modified/expired flags are
    /// not persisted and decode clear.
    pub fn decode(bytes: &[u8]) -> Result<Self, UtxoDecodeError> {
        let mut cursor = 0usize;
        let code = read_vlq(bytes, &mut cursor)?;
        let amount = decompress_amount(read_vlq(bytes, &mut cursor)?) as i64;
        let pk_script = decompress_script_from(bytes, &mut cursor)?;
        if cursor != bytes.len() {
            return Err(UtxoDecodeError::TrailingBytes);
        }
        Ok(Self::new(
            amount,
            pk_script,
            (code >> 1) as i32,
            code & 0x01 == 0x01,
        ))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct OutPointKey([u8; OUTPOINT_KEY_LEN]);

impl OutPointKey {
    pub fn new(outpoint: &OutPoint) -> Self {
        let mut bytes = [0u8; OUTPOINT_KEY_LEN];
        bytes[..32].copy_from_slice(&outpoint.hash);
        bytes[32..].copy_from_slice(&outpoint.index.to_le_bytes());
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != OUTPOINT_KEY_LEN {
            return None;
        }
        let mut out = [0u8; OUTPOINT_KEY_LEN];
        out.copy_from_slice(bytes);
        Some(Self(out))
    }

    pub fn outpoint(&self) -> OutPoint {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&self.0[..32]);
        let index = u32::from_le_bytes([self.0[32], self.0[33], self.0[34], self.0[35]]);
        OutPoint { hash, index }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

pub fn outpoint_key_bytes(outpoint: &OutPoint) -> OutPointKey {
    OutPointKey::new(outpoint)
}

/// Live UTXO set backed by the storage trait.
pub struct UtxoSet<S> {
    store: S,
}

impl<S> UtxoSet<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> UtxoSet<S> {
    pub fn get(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StoreError> {
        let key = outpoint_key_bytes(outpoint);
        match self.store.get(Column::Utxo, key.as_bytes())? {
            Some(bytes) => Ok(Some(
                UtxoEntry::decode(&bytes).map_err(|err| StoreError::Backend(err.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    pub fn put(&self, batch: &mut WriteBatch, outpoint: &OutPoint, entry: &UtxoEntry) {
        let key = outpoint_key_bytes(outpoint);
        batch.put(Column::Utxo, key.as_bytes(), entry.encode());
    }

    pub fn delete(&self, batch: &mut WriteBatch, outpoint: &OutPoint) {
        let key = outpoint_key_bytes(outpoint);
        batch.delete(Column::Utxo, key.as_bytes());
    }
}
