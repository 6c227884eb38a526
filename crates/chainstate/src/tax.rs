//! Tax transaction validation.
//!
//! Outputs that outlive the retention window become expired, and any
//! transaction spending expired inputs must route a fixed percentage of their
//! value to its tax output. Every node derives the same verdict from the
//! same inputs: amounts are summed with checked arithmetic, the expected tax
//! uses integer truncation only, and the highest input height referenced by
//! each tax-bearing block forms a watermark that may never move backward.

use taxd_consensus::params::ConsensusParams;
use taxd_primitives::block::Block;
use taxd_primitives::outpoint::OutPoint;
use taxd_primitives::transaction::Transaction;

use crate::chain::{ChainAccessor, ChainError};
use crate::utxo::UtxoEntry;
use crate::view::UtxoViewpoint;

#[derive(Debug)]
pub enum TaxError {
    /// An input references an output absent from the supplied viewpoint:
    /// the output does not exist or was already spent in this view. Fatal to
    /// the block under validation.
    UnresolvedInput(OutPoint),
    /// The amount implicitly paid as tax does not equal the expected amount.
    TaxAmountMismatch { expected: i64, paid: i64 },
    /// Summing or scaling amounts left the valid money range.
    ValueOutOfRange,
    /// No tax-bearing ancestor exists within the accessible chain. Expected
    /// for early chain heights; callers treat it as "no watermark yet".
    NoPriorTaxBlock(ChainError),
    /// A tax block's aggregated input height moved below the previous
    /// watermark.
    WatermarkRegression { previous: i32, found: i32 },
}

impl std::fmt::Display for TaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxError::UnresolvedInput(outpoint) => {
                write!(
                    f,
                    "input references unknown or spent output at index {}",
                    outpoint.index
                )
            }
            TaxError::TaxAmountMismatch { expected, paid } => {
                write!(f, "tax amount mismatch: expected {expected}, paid {paid}")
            }
            TaxError::ValueOutOfRange => write!(f, "value out of range"),
            TaxError::NoPriorTaxBlock(err) => {
                write!(f, "no prior block with tax transactions: {err}")
            }
            TaxError::WatermarkRegression { previous, found } => {
                write!(
                    f,
                    "tax watermark regression: previous {previous}, found {found}"
                )
            }
        }
    }
}

impl std::error::Error for TaxError {}

/// Returns the block's tax transactions in block order. An empty result is
/// valid and common.
pub fn fetch_tax_transactions(block: &Block) -> Vec<&Transaction> {
    block
        .transactions
        .iter()
        .filter(|tx| tx.is_tax())
        .collect()
}

/// Walks backward from `height - 1` one block at a time and returns the most
/// recent ancestor carrying at least one tax transaction, along with its
/// height. Runs out of chain below the genesis for early heights, which
/// surfaces as the recoverable [`TaxError::NoPriorTaxBlock`].
pub fn fetch_prev_block_with_tax_txs<C: ChainAccessor>(
    chain: &C,
    height: i32,
) -> Result<(i32, Block), TaxError> {
    let mut cursor = height - 1;
    loop {
        let block = chain
            .block_by_height(cursor)
            .map_err(TaxError::NoPriorTaxBlock)?;
        if block.transactions.iter().any(Transaction::is_tax) {
            return Ok((cursor, block));
        }
        cursor -= 1;
    }
}

/// The maximum creation height over every input of every tax transaction in
/// the block. This anchors how far back expiry claims for the next
/// tax-bearing block must reach, so an unresolved input is a consensus
/// violation, not a skippable lookup miss.
pub fn fetch_highest_tax_input_height<V: UtxoViewpoint>(
    block: &Block,
    view: &V,
) -> Result<i32, TaxError> {
    let mut highest = 0i32;
    for tx in fetch_tax_transactions(block) {
        for input in &tx.vin {
            let entry = view
                .lookup_entry(&input.prevout)
                .ok_or_else(|| TaxError::UnresolvedInput(input.prevout.clone()))?;
            highest = highest.max(entry.block_height);
        }
    }
    Ok(highest)
}

/// Validates the tax a transaction pays on its inputs and returns the paid
/// amount.
///
/// The expected tax is `total_input * tax_rate / 100` with integer
/// truncation; the amount implicitly paid is the input total minus all
/// declared outputs, and the two must match exactly.
pub fn check_tx_tax_amount<V: UtxoViewpoint>(
    tx: &Transaction,
    view: &V,
    params: &ConsensusParams,
) -> Result<i64, TaxError> {
    let mut total_input: i64 = 0;
    for input in &tx.vin {
        let entry = view
            .lookup_entry(&input.prevout)
            .ok_or_else(|| TaxError::UnresolvedInput(input.prevout.clone()))?;
        if entry.amount < 0 {
            return Err(TaxError::ValueOutOfRange);
        }
        total_input = total_input
            .checked_add(entry.amount)
            .ok_or(TaxError::ValueOutOfRange)?;
    }

    let expected = i128::from(total_input) * i128::from(params.tax_rate) / 100;
    let expected = i64::try_from(expected).map_err(|_| TaxError::ValueOutOfRange)?;

    let mut total_output: i64 = 0;
    for output in &tx.vout {
        if output.value < 0 {
            return Err(TaxError::ValueOutOfRange);
        }
        total_output = total_output
            .checked_add(output.value)
            .ok_or(TaxError::ValueOutOfRange)?;
    }

    let paid = total_input
        .checked_sub(total_output)
        .ok_or(TaxError::ValueOutOfRange)?;
    if paid != expected {
        taxd_log::log_warn!(
            "tax amount mismatch: inputs {total_input}, outputs {total_output}, expected tax {expected}, paid {paid}"
        );
        return Err(TaxError::TaxAmountMismatch { expected, paid });
    }

    Ok(paid)
}

/// Resolves every input across the given tax transactions, preserving
/// per-transaction, per-input order, and tracks the largest creation height
/// seen. The height becomes the watermark for the next validation round.
pub fn fetch_and_validate_expired_utxos_and_largest_height<V: UtxoViewpoint>(
    tax_txs: &[&Transaction],
    view: &V,
) -> Result<(Vec<UtxoEntry>, i32), TaxError> {
    let mut entries = Vec::new();
    let mut largest_height = 0i32;
    for tx in tax_txs {
        for input in &tx.vin {
            let entry = view
                .lookup_entry(&input.prevout)
                .ok_or_else(|| TaxError::UnresolvedInput(input.prevout.clone()))?;
            largest_height = largest_height.max(entry.block_height);
            entries.push(entry.clone());
        }
    }
    Ok((entries, largest_height))
}

/// Monotone expiry-sweep watermark, advanced once per tax-bearing block in
/// chain order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TaxWatermark {
    /// No tax-bearing block has been processed yet.
    #[default]
    AwaitingTaxBlock,
    /// Highest input height referenced by the last processed tax block.
    Established(i32),
}

impl TaxWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn height(&self) -> Option<i32> {
        match self {
            TaxWatermark::AwaitingTaxBlock => None,
            TaxWatermark::Established(height) => Some(*height),
        }
    }

    /// Moves the watermark to `found`. Re-claiming the same height is
    /// allowed; moving below the previous watermark is a consensus
    /// violation.
    pub fn advance(&mut self, found: i32) -> Result<(), TaxError> {
        if let TaxWatermark::Established(previous) = *self {
            if found < previous {
                taxd_log::log_warn!(
                    "tax watermark regression: previous {previous}, found {found}"
                );
                return Err(TaxError::WatermarkRegression { previous, found });
            }
        }
        *self = TaxWatermark::Established(found);
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct TaxBlockSummary {
    /// Total tax paid across the block's tax transactions.
    pub total_tax: i64,
    /// Every resolved input entry, in per-transaction, per-input order.
    pub expired_utxos: Vec<UtxoEntry>,
    /// Largest creation height referenced; the new watermark.
    pub max_input_height: i32,
}

/// Validates the tax section of one block against a consistent viewpoint
/// snapshot and advances the watermark.
///
/// A block without tax transactions is a no-op: `Ok(None)`, watermark
/// untouched. On any error the watermark is left unchanged and the block
/// must be rejected.
pub fn validate_block_tax<V: UtxoViewpoint>(
    block: &Block,
    view: &V,
    params: &ConsensusParams,
    watermark: &mut TaxWatermark,
) -> Result<Option<TaxBlockSummary>, TaxError> {
    let tax_txs = fetch_tax_transactions(block);
    if tax_txs.is_empty() {
        return Ok(None);
    }

    let mut total_tax: i64 = 0;
    for tx in &tax_txs {
        let paid = check_tx_tax_amount(tx, view, params)?;
        total_tax = total_tax
            .checked_add(paid)
            .ok_or(TaxError::ValueOutOfRange)?;
    }

    let (expired_utxos, max_input_height) =
        fetch_and_validate_expired_utxos_and_largest_height(&tax_txs, view)?;
    watermark.advance(max_input_height)?;

    taxd_log::log_debug!(
        "tax block validated: {} tax txs, total tax {total_tax}, watermark {max_input_height}",
        tax_txs.len()
    );

    Ok(Some(TaxBlockSummary {
        total_tax,
        expired_utxos,
        max_input_height,
    }))
}
