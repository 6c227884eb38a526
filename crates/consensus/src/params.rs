//! Consensus parameter definitions.

use crate::constants::UTXO_EXPIRY_WINDOW;
use crate::money::Amount;
use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// Immutable per-network consensus parameters, threaded explicitly through
/// every validation call. Nothing here is read from the environment.
#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub hash_genesis_block: Hash256,
    pub genesis_time: u32,
    pub pow_target_spacing: i64,
    /// Percentage of expired input value a tax transaction must pay.
    pub tax_rate: i64,
    /// Outputs at or below this value are treated as dust by policy code.
    pub dust_satoshi_amount: Amount,
    /// Blocks an output may remain unspent before it expires.
    pub utxo_expiry_window: i32,
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }

    if hex.is_empty() || hex.len() > 64 || hex.len() % 2 == 1 {
        return Err(HexError::InvalidLength);
    }

    let mut hex_owned = hex.to_string();
    if hex_owned.len() < 64 {
        let mut padded = String::with_capacity(64);
        for _ in 0..(64 - hex_owned.len()) {
            padded.push('0');
        }
        padded.push_str(&hex_owned);
        hex_owned = padded;
    }

    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        let byte = u8::from_str_radix(&hex_owned[start..start + 2], 16)
            .map_err(|_| HexError::InvalidHex)?;
        *byte_out = byte;
    }
    bytes.reverse();

    Ok(bytes)
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
    }
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        hash_genesis_block: hash256_from_hex(
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        )
        .expect("mainnet genesis hash"),
        genesis_time: 1_231_006_505,
        pow_target_spacing: 600,
        tax_rate: 10,
        dust_satoshi_amount: 546,
        utxo_expiry_window: UTXO_EXPIRY_WINDOW,
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        hash_genesis_block: hash256_from_hex(
            "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
        )
        .expect("testnet genesis hash"),
        genesis_time: 1_296_688_602,
        pow_target_spacing: 600,
        tax_rate: 10,
        dust_satoshi_amount: 546,
        utxo_expiry_window: UTXO_EXPIRY_WINDOW,
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        hash_genesis_block: hash256_from_hex(
            "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
        )
        .expect("regtest genesis hash"),
        genesis_time: 1_296_688_602,
        pow_target_spacing: 600,
        tax_rate: 10,
        // Regtest keeps the mainnet dust floor so tax fixtures carry over.
        dust_satoshi_amount: 546,
        utxo_expiry_window: UTXO_EXPIRY_WINDOW,
    }
}
