//! Consensus constants, monetary units, and network parameters.

pub mod constants;
pub mod money;
pub mod params;

pub use params::{consensus_params, hash256_from_hex, ConsensusParams, Network};

/// A 256-bit hash in internal (little-endian) byte order.
pub type Hash256 = [u8; 32];
