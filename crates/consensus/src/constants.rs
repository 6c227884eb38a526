//! Consensus-wide constants shared across validation.

/// Number of blocks an output may remain unspent before it is considered
/// expired (network rule).
///
/// Derived from a 7-year retention target at the 10-minute block cadence:
/// (7y x 365d x 24h + 2d x 24h) x 6.
pub const UTXO_EXPIRY_WINDOW: i32 = 368_208;

/// Coinbase transaction outputs can only be spent after this number of new blocks.
pub const COINBASE_MATURITY: i32 = 100;

/// The maximum allowed size for a serialized block, in bytes (network rule).
pub const MAX_BLOCK_SIZE: u32 = 2_000_000;

/// Maximum script size (consensus).
pub const MAX_SCRIPT_SIZE: usize = 10_000;
