//! Chain access boundary consumed by tax validation.

use std::collections::HashMap;
use std::sync::Arc;

use taxd_primitives::block::Block;
use taxd_primitives::outpoint::OutPoint;
use taxd_storage::{Column, KeyValueStore, StoreError, WriteBatch};

use crate::utxo::{outpoint_key_bytes, OutPointKey, UtxoEntry};

const META_BEST_HEIGHT_KEY: &[u8] = b"best_height";

#[derive(Debug)]
pub enum ChainError {
    /// The height is negative or beyond the indexed chain tip.
    HeightOutOfRange(i32),
    Store(StoreError),
    CorruptIndex(&'static str),
}

impl std::fmt::Display for ChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainError::HeightOutOfRange(height) => {
                write!(f, "height {height} is outside the indexed range")
            }
            ChainError::Store(err) => write!(f, "{err}"),
            ChainError::CorruptIndex(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        ChainError::Store(err)
    }
}

/// Read access to the authoritative chain, implemented by the storage layer
/// and mocked in tests.
pub trait ChainAccessor {
    fn block_by_height(&self, height: i32) -> Result<Block, ChainError>;

    /// Every output created at exactly `height`, regardless of current spent
    /// status.
    fn fetch_utxos_by_height(&self, height: i32)
        -> Result<HashMap<OutPoint, UtxoEntry>, ChainError>;
}

/// Unions the per-height output maps over `low..=high`. Each output is
/// created at exactly one height, so the union is total and order
/// independent.
pub fn fetch_utxos_in_range<C: ChainAccessor>(
    chain: &C,
    low: i32,
    high: i32,
) -> Result<HashMap<OutPoint, UtxoEntry>, ChainError> {
    let mut all = HashMap::new();
    for height in low..=high {
        all.extend(chain.fetch_utxos_by_height(height)?);
    }
    Ok(all)
}

pub fn height_key(height: i32) -> [u8; 4] {
    height.to_le_bytes()
}

/// Storage-backed chain accessor: block bodies by hash, a height index, and
/// a created-outputs-per-height index.
pub struct ChainStore<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> ChainStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn best_height(&self) -> Result<Option<i32>, ChainError> {
        let bytes = match self.store.get(Column::Meta, META_BEST_HEIGHT_KEY)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| ChainError::CorruptIndex("invalid best height"))?;
        Ok(Some(i32::from_le_bytes(bytes)))
    }

    /// Indexes a block body at `height` and advances the recorded tip when
    /// the height extends it.
    pub fn put_block(
        &self,
        batch: &mut WriteBatch,
        height: i32,
        block: &Block,
    ) -> Result<(), ChainError> {
        let hash = block.header.hash();
        batch.put(Column::HeightIndex, height_key(height), hash);
        batch.put(Column::BlockData, hash, block.consensus_encode());
        if self.best_height()?.map_or(true, |best| height > best) {
            batch.put(Column::Meta, META_BEST_HEIGHT_KEY, height_key(height));
        }
        Ok(())
    }

    /// Records outputs created at `height` in the by-height index.
    pub fn record_utxos<'a>(
        &self,
        batch: &mut WriteBatch,
        height: i32,
        utxos: impl IntoIterator<Item = (&'a OutPoint, &'a UtxoEntry)>,
    ) {
        for (outpoint, entry) in utxos {
            let mut key = Vec::with_capacity(4 + crate::utxo::OUTPOINT_KEY_LEN);
            key.extend_from_slice(&height_key(height));
            key.extend_from_slice(outpoint_key_bytes(outpoint).as_bytes());
            batch.put(Column::UtxoByHeight, key, entry.encode());
        }
    }

    fn check_height(&self, height: i32) -> Result<(), ChainError> {
        if height < 0 {
            return Err(ChainError::HeightOutOfRange(height));
        }
        match self.best_height()? {
            Some(best) if height <= best => Ok(()),
            _ => Err(ChainError::HeightOutOfRange(height)),
        }
    }
}

impl<S: KeyValueStore> ChainAccessor for ChainStore<S> {
    fn block_by_height(&self, height: i32) -> Result<Block, ChainError> {
        self.check_height(height)?;
        let hash = self
            .store
            .get(Column::HeightIndex, &height_key(height))?
            .ok_or(ChainError::HeightOutOfRange(height))?;
        let body = self
            .store
            .get(Column::BlockData, &hash)?
            .ok_or(ChainError::CorruptIndex("missing block body"))?;
        Block::consensus_decode(&body)
            .map_err(|_| ChainError::CorruptIndex("undecodable block body"))
    }

    fn fetch_utxos_by_height(
        &self,
        height: i32,
    ) -> Result<HashMap<OutPoint, UtxoEntry>, ChainError> {
        self.check_height(height)?;
        let prefix = height_key(height);
        let mut utxos = HashMap::new();
        for (key, value) in self.store.scan_prefix(Column::UtxoByHeight, &prefix)? {
            let outpoint_key = OutPointKey::from_slice(&key[prefix.len()..])
                .ok_or(ChainError::CorruptIndex("invalid utxo index key"))?;
            let entry = UtxoEntry::decode(&value)
                .map_err(|_| ChainError::CorruptIndex("undecodable utxo entry"))?;
            utxos.insert(outpoint_key.outpoint(), entry);
        }
        Ok(utxos)
    }
}
