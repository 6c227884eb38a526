//! UTXO chain state: entries, codecs, viewpoints, and tax validation.

pub mod chain;
pub mod compress;
pub mod legacy;
pub mod tax;
pub mod utxo;
pub mod view;

pub use chain::{fetch_utxos_in_range, ChainAccessor, ChainError, ChainStore};
pub use compress::UtxoDecodeError;
pub use legacy::deserialize_utxo_entry_v0;
pub use tax::{
    check_tx_tax_amount, fetch_and_validate_expired_utxos_and_largest_height,
    fetch_highest_tax_input_height, fetch_prev_block_with_tax_txs, fetch_tax_transactions,
    validate_block_tax, TaxBlockSummary, TaxError, TaxWatermark,
};
pub use utxo::{UtxoEntry, UtxoSet, TF_COINBASE, TF_EXPIRED, TF_MODIFIED, TF_SPENT};
pub use view::{UtxoView, UtxoViewpoint};
