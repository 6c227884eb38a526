//! Decoder for the legacy version 0 utxo snapshot format.
//!
//! The v0 layout groups every unspent output of one transaction into a single
//! blob:
//!
//! ```text
//! <version><height><header code><unspentness bitmap>[<compressed txout>,...]
//! ```
//!
//! All varints are VLQs. The header code packs the coinbase flag in bit 0,
//! output 0 and output 1 presence in bits 1 and 2, and the bitmap byte count
//! in the remaining bits; when bits 1 and 2 are both clear the count is
//! stored as N-1, since at least one output must be unspent. Bitmap bits are
//! consumed LSB first and cover outputs from index 2 upward. Each present
//! output is a compressed amount followed by a compressed script.
//!
//! Historical snapshots were written with this exact layout, so it is frozen;
//! the fixtures in the tests below are authoritative.

use std::collections::HashMap;

use crate::compress::{decompress_amount, decompress_script_from, read_vlq, UtxoDecodeError};
use crate::utxo::UtxoEntry;

/// Decodes one v0 blob into a map from output index to its entry.
///
/// Returned entries carry only the coinbase flag; spent, modified, and
/// expired state is not part of the legacy format. Duplicate output indexes
/// cannot occur within one blob, but callers merging blobs keyed by
/// transaction hash inherit the historical overwrite-on-insert behavior.
pub fn deserialize_utxo_entry_v0(
    serialized: &[u8],
) -> Result<HashMap<u32, UtxoEntry>, UtxoDecodeError> {
    let mut cursor = 0usize;
    let _version = read_vlq(serialized, &mut cursor)?;
    let block_height = read_vlq(serialized, &mut cursor)?;
    let code = read_vlq(serialized, &mut cursor)?;

    let is_coinbase = code & 0x01 == 0x01;
    let output0_unspent = code & 0x02 == 0x02;
    let output1_unspent = code & 0x04 == 0x04;
    let mut num_bitmap_bytes = code >> 3;
    if !output0_unspent && !output1_unspent {
        num_bitmap_bytes += 1;
    }
    let num_bitmap_bytes =
        usize::try_from(num_bitmap_bytes).map_err(|_| UtxoDecodeError::Truncated)?;

    if serialized.len().saturating_sub(cursor) < num_bitmap_bytes {
        return Err(UtxoDecodeError::Truncated);
    }
    let bitmap = &serialized[cursor..cursor + num_bitmap_bytes];
    cursor += num_bitmap_bytes;

    let mut unspent_indexes = Vec::new();
    if output0_unspent {
        unspent_indexes.push(0u32);
    }
    if output1_unspent {
        unspent_indexes.push(1u32);
    }
    for (byte_index, byte) in bitmap.iter().enumerate() {
        let mut bits = *byte;
        let mut bit_offset = 0u32;
        while bits != 0 {
            if bits & 0x01 == 0x01 {
                unspent_indexes.push(2 + byte_index as u32 * 8 + bit_offset);
            }
            bits >>= 1;
            bit_offset += 1;
        }
    }

    let mut entries = HashMap::with_capacity(unspent_indexes.len());
    for output_index in unspent_indexes {
        let amount = decompress_amount(read_vlq(serialized, &mut cursor)?);
        let pk_script = decompress_script_from(serialized, &mut cursor)?;
        entries.insert(
            output_index,
            UtxoEntry::new(amount as i64, pk_script, block_height as i32, is_coinbase),
        );
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utxo::TF_COINBASE;

    fn hex_to_bytes(hex: &str) -> Vec<u8> {
        assert!(hex.len() % 2 == 0, "odd-length hex fixture");
        (0..hex.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("hex fixture"))
            .collect()
    }

    struct Expected {
        index: u32,
        amount: i64,
        script: &'static str,
        block_height: i32,
        coinbase: bool,
    }

    fn check_vector(name: &str, serialized: &str, expected: &[Expected]) {
        let entries = deserialize_utxo_entry_v0(&hex_to_bytes(serialized))
            .unwrap_or_else(|err| panic!("{name}: unexpected error: {err}"));
        assert_eq!(entries.len(), expected.len(), "{name}: entry count");
        for want in expected {
            let entry = entries
                .get(&want.index)
                .unwrap_or_else(|| panic!("{name}: missing output {}", want.index));
            assert_eq!(entry.amount, want.amount, "{name}: amount");
            assert_eq!(
                entry.pk_script,
                hex_to_bytes(want.script),
                "{name}: script"
            );
            assert_eq!(entry.block_height, want.block_height, "{name}: height");
            assert_eq!(entry.is_coinbase(), want.coinbase, "{name}: coinbase");
            assert_eq!(
                entry.packed_flags,
                if want.coinbase { TF_COINBASE } else { 0 },
                "{name}: only the coinbase flag may be set"
            );
        }
    }

    // The serialized fixtures below are verbatim v0 snapshot values taken
    // from the main chain.

    #[test]
    fn v0_only_output_0_coinbase() {
        // From tx 0e3e2357e806b6cdb1f70b54c3a3a17b6714ee1f0e68bebb44a74b1efd512098.
        check_vector(
            "only output 0, coinbase",
            "010103320496b538e853519c726a2c91e61ec11600ae1390813a627c66fb8be7947be63c52",
            &[Expected {
                index: 0,
                amount: 5_000_000_000,
                script: "410496b538e853519c726a2c91e61ec11600ae1390813a627c66fb8be7947be63c52da7589379515d4e0a604f8141781e62294721166bf621e73a82cbf2342c858eeac",
                block_height: 1,
                coinbase: true,
            }],
        );
    }

    #[test]
    fn v0_only_output_1_not_coinbase() {
        // From tx 8131ffb0a2c945ecaf9b9063e59558784f9c3a74741ce6ae2a18d0571dac15bb.
        check_vector(
            "only output 1, not coinbase",
            "01858c21040700ee8bd501094a7d5ca318da2506de35e1cb025ddc",
            &[Expected {
                index: 1,
                amount: 1_000_000,
                script: "76a914ee8bd501094a7d5ca318da2506de35e1cb025ddc88ac",
                block_height: 100_001,
                coinbase: false,
            }],
        );
    }

    #[test]
    fn v0_only_output_2_coinbase() {
        // Adapted from tx df3f3f442d9699857f7f49de4ff0b5d0f3448bec31cdc7b5bf6d25f2abd637d5.
        check_vector(
            "only output 2, coinbase",
            "0185843c010182b095bf4100da33f77cee27c2a975ed5124d7e4f7f975135101",
            &[Expected {
                index: 2,
                amount: 100_937_281,
                script: "76a914da33f77cee27c2a975ed5124d7e4f7f97513510188ac",
                block_height: 99_004,
                coinbase: true,
            }],
        );
    }

    #[test]
    fn v0_outputs_0_and_2_not_coinbase() {
        // Adapted from tx 4a16969aa4764dd7507fc1de7f0baa4850a246de90c45e59a3207f9a26b5036f.
        check_vector(
            "outputs 0 and 2, not coinbase",
            "0185f90b0a011200e2ccd6ec7c6e2e581349c77e067385fa8236bf8a800900b8025be1b3efc63b0ad48e7f9f10e87544528d58",
            &[
                Expected {
                    index: 0,
                    amount: 20_000_000,
                    script: "76a914e2ccd6ec7c6e2e581349c77e067385fa8236bf8a88ac",
                    block_height: 113_931,
                    coinbase: false,
                },
                Expected {
                    index: 2,
                    amount: 15_000_000,
                    script: "76a914b8025be1b3efc63b0ad48e7f9f10e87544528d5888ac",
                    block_height: 113_931,
                    coinbase: false,
                },
            ],
        );
    }

    #[test]
    fn v0_only_output_22_not_coinbase() {
        // Adapted from tx 1b02d1c8cfef60a189017b9a420c682cf4a0028175f2f563209e4ff61c8c3620.
        check_vector(
            "only output 22, not coinbase",
            "0193d06c100000108ba5b9e763011dd46a006572d820e448e12d2bbb38640bc718e6",
            &[Expected {
                index: 22,
                amount: 366_875_659,
                script: "a9141dd46a006572d820e448e12d2bbb38640bc718e687",
                block_height: 338_156,
                coinbase: false,
            }],
        );
    }

    #[test]
    fn v0_decode_is_deterministic() {
        let bytes =
            hex_to_bytes("01858c21040700ee8bd501094a7d5ca318da2506de35e1cb025ddc");
        let first = deserialize_utxo_entry_v0(&bytes).expect("first decode");
        let second = deserialize_utxo_entry_v0(&bytes).expect("second decode");
        assert_eq!(first, second);
    }

    #[test]
    fn v0_truncated_input_fails_cleanly() {
        let bytes =
            hex_to_bytes("010103320496b538e853519c726a2c91e61ec11600ae1390813a627c66fb8be7947be63c52");
        // Every strict prefix must fail without panicking; the structure
        // leaves no optional tail.
        for len in 0..bytes.len() {
            let result = deserialize_utxo_entry_v0(&bytes[..len]);
            assert!(result.is_err(), "prefix of {len} bytes must fail");
        }
    }

    #[test]
    fn v0_truncated_bitmap_is_truncated_error() {
        // Header code 0x10 claims a 3-byte bitmap but only one byte follows.
        let bytes = [0x01, 0x05, 0x10, 0x00];
        assert_eq!(
            deserialize_utxo_entry_v0(&bytes),
            Err(UtxoDecodeError::Truncated)
        );
    }

    #[test]
    fn v0_unterminated_varint_is_invalid() {
        // Height varint keeps its continuation bit set past end of input.
        let bytes = [0x01, 0x85, 0x8c];
        assert_eq!(
            deserialize_utxo_entry_v0(&bytes),
            Err(UtxoDecodeError::InvalidVarInt)
        );
    }
}
