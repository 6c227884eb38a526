//! VLQ varints and the amount/script compression used by utxo serialization.
//!
//! The byte layouts here are consensus-frozen: historical chain-state
//! snapshots were written with them, so every branch must stay exactly
//! reversible.

use secp256k1::PublicKey;

/// Number of script size values reserved for the special compressed forms.
const NUM_SPECIAL_SCRIPTS: u64 = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtxoDecodeError {
    /// Fewer bytes are available than the structure claims are needed.
    Truncated,
    /// A variable-length integer is unterminated or does not fit in 64 bits.
    InvalidVarInt,
    /// A compressed pubkey x-coordinate is not on the curve.
    InvalidScript,
    TrailingBytes,
}

impl std::fmt::Display for UtxoDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UtxoDecodeError::Truncated => write!(f, "unexpected end of utxo data"),
            UtxoDecodeError::InvalidVarInt => write!(f, "malformed variable-length integer"),
            UtxoDecodeError::InvalidScript => write!(f, "invalid compressed script"),
            UtxoDecodeError::TrailingBytes => write!(f, "trailing bytes after utxo entry"),
        }
    }
}

impl std::error::Error for UtxoDecodeError {}

/// Appends `value` as a variable-length quantity: MSB base-128 with the high
/// bit as a continuation flag and an offset of one applied to each
/// continuation byte, most significant group first.
pub fn put_vlq(buf: &mut Vec<u8>, mut value: u64) {
    let mut scratch = [0u8; 10];
    let mut len = 0usize;
    loop {
        let high_bit = if len == 0 { 0x00 } else { 0x80 };
        scratch[len] = (value & 0x7f) as u8 | high_bit;
        len += 1;
        if value <= 0x7f {
            break;
        }
        value = (value >> 7) - 1;
    }
    buf.extend(scratch[..len].iter().rev());
}

/// Reads a VLQ starting at `*cursor`, advancing the cursor past it.
pub fn read_vlq(bytes: &[u8], cursor: &mut usize) -> Result<u64, UtxoDecodeError> {
    let mut value: u64 = 0;
    loop {
        let byte = match bytes.get(*cursor) {
            Some(byte) => *byte,
            None => return Err(UtxoDecodeError::InvalidVarInt),
        };
        *cursor += 1;
        value = value
            .checked_mul(0x80)
            .and_then(|shifted| shifted.checked_add(u64::from(byte & 0x7f)))
            .ok_or(UtxoDecodeError::InvalidVarInt)?;
        if byte & 0x80 != 0x80 {
            break;
        }
        value = value.checked_add(1).ok_or(UtxoDecodeError::InvalidVarInt)?;
    }
    Ok(value)
}

/// Compresses an amount by factoring out powers of ten and packing the last
/// significant digit, the Bitcoin Core scheme. Exactly reversible.
pub fn compress_amount(mut amount: u64) -> u64 {
    if amount == 0 {
        return 0;
    }
    let mut exponent: u64 = 0;
    while amount % 10 == 0 && exponent < 9 {
        amount /= 10;
        exponent += 1;
    }
    if exponent < 9 {
        let last_digit = amount % 10;
        amount /= 10;
        1 + 10 * (9 * amount + last_digit - 1) + exponent
    } else {
        10 + 10 * (amount - 1)
    }
}

pub fn decompress_amount(compressed: u64) -> u64 {
    if compressed == 0 {
        return 0;
    }
    let mut value = compressed - 1;
    let exponent = value % 10;
    value /= 10;
    let mut amount = if exponent < 9 {
        let last_digit = value % 9 + 1;
        value /= 9;
        value * 10 + last_digit
    } else {
        value + 1
    };
    for _ in 0..exponent {
        amount *= 10;
    }
    amount
}

/// Compresses a script, including its VLQ size/type prefix.
///
/// Special forms: 0 = P2PKH hash, 1 = P2SH hash, 2/3 = compressed P2PK,
/// 4/5 = uncompressed P2PK stored as its x-coordinate with the y parity
/// folded into the type. Anything else is stored raw with the size offset by
/// the number of special forms.
pub fn compress_script(script: &[u8]) -> Vec<u8> {
    if script.len() == 25
        && script[0] == 0x76
        && script[1] == 0xa9
        && script[2] == 0x14
        && script[23] == 0x88
        && script[24] == 0xac
    {
        let mut out = Vec::with_capacity(21);
        put_vlq(&mut out, 0);
        out.extend_from_slice(&script[3..23]);
        return out;
    }

    if script.len() == 23 && script[0] == 0xa9 && script[1] == 0x14 && script[22] == 0x87 {
        let mut out = Vec::with_capacity(21);
        put_vlq(&mut out, 1);
        out.extend_from_slice(&script[2..22]);
        return out;
    }

    if script.len() == 35
        && script[0] == 0x21
        && script[34] == 0xac
        && (script[1] == 0x02 || script[1] == 0x03)
        && PublicKey::from_slice(&script[1..34]).is_ok()
    {
        let mut out = Vec::with_capacity(33);
        put_vlq(&mut out, u64::from(script[1]));
        out.extend_from_slice(&script[2..34]);
        return out;
    }

    if script.len() == 67
        && script[0] == 0x41
        && script[66] == 0xac
        && script[1] == 0x04
        && PublicKey::from_slice(&script[1..66]).is_ok()
    {
        // The y parity selects type 4 or 5 so decompression can rebuild it.
        let oddness = script[65] & 0x01;
        let mut out = Vec::with_capacity(33);
        put_vlq(&mut out, u64::from(4 + oddness));
        out.extend_from_slice(&script[2..34]);
        return out;
    }

    let mut out = Vec::with_capacity(script.len() + 2);
    put_vlq(&mut out, script.len() as u64 + NUM_SPECIAL_SCRIPTS);
    out.extend_from_slice(script);
    out
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
) -> Result<&'a [u8], UtxoDecodeError> {
    let end = cursor
        .checked_add(len)
        .ok_or(UtxoDecodeError::Truncated)?;
    if end > bytes.len() {
        return Err(UtxoDecodeError::Truncated);
    }
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}

/// Reads one compressed script starting at `*cursor` and expands it to the
/// original script bytes.
pub fn decompress_script_from(
    bytes: &[u8],
    cursor: &mut usize,
) -> Result<Vec<u8>, UtxoDecodeError> {
    let size = read_vlq(bytes, cursor)?;
    match size {
        0 => {
            let hash = read_exact(bytes, cursor, 20)?;
            let mut script = Vec::with_capacity(25);
            script.extend_from_slice(&[0x76, 0xa9, 0x14]);
            script.extend_from_slice(hash);
            script.extend_from_slice(&[0x88, 0xac]);
            Ok(script)
        }
        1 => {
            let hash = read_exact(bytes, cursor, 20)?;
            let mut script = Vec::with_capacity(23);
            script.extend_from_slice(&[0xa9, 0x14]);
            script.extend_from_slice(hash);
            script.push(0x87);
            Ok(script)
        }
        2 | 3 => {
            let x = read_exact(bytes, cursor, 32)?;
            let mut script = Vec::with_capacity(35);
            script.push(0x21);
            script.push(size as u8);
            script.extend_from_slice(x);
            script.push(0xac);
            Ok(script)
        }
        4 | 5 => {
            let x = read_exact(bytes, cursor, 32)?;
            let mut compressed = [0u8; 33];
            compressed[0] = size as u8 - 2;
            compressed[1..].copy_from_slice(x);
            let pubkey = PublicKey::from_slice(&compressed)
                .map_err(|_| UtxoDecodeError::InvalidScript)?;
            let mut script = Vec::with_capacity(67);
            script.push(0x41);
            script.extend_from_slice(&pubkey.serialize_uncompressed());
            script.push(0xac);
            Ok(script)
        }
        _ => {
            let len = usize::try_from(size - NUM_SPECIAL_SCRIPTS)
                .map_err(|_| UtxoDecodeError::Truncated)?;
            Ok(read_exact(bytes, cursor, len)?.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq_roundtrip(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        put_vlq(&mut buf, value);
        let mut cursor = 0;
        assert_eq!(read_vlq(&buf, &mut cursor), Ok(value));
        assert_eq!(cursor, buf.len());
        buf
    }

    #[test]
    fn vlq_known_encodings() {
        assert_eq!(vlq_roundtrip(0), vec![0x00]);
        assert_eq!(vlq_roundtrip(0x7f), vec![0x7f]);
        assert_eq!(vlq_roundtrip(0x80), vec![0x80, 0x00]);
        assert_eq!(vlq_roundtrip(100_001), vec![0x85, 0x8c, 0x21]);
        assert_eq!(vlq_roundtrip(113_931), vec![0x85, 0xf9, 0x0b]);
        assert_eq!(vlq_roundtrip(338_156), vec![0x93, 0xd0, 0x6c]);
        vlq_roundtrip(u64::MAX);
    }

    #[test]
    fn vlq_unterminated_is_invalid() {
        let mut cursor = 0;
        assert_eq!(
            read_vlq(&[0x85, 0x8c], &mut cursor),
            Err(UtxoDecodeError::InvalidVarInt)
        );
    }

    #[test]
    fn amount_compression_roundtrip() {
        for amount in [
            0u64,
            1,
            546,
            1_000_000,
            5_000_000_000,
            15_000_000,
            20_000_000,
            100_937_281,
            366_875_659,
            2_100_000_000_000_000,
        ] {
            assert_eq!(decompress_amount(compress_amount(amount)), amount);
        }
    }

    #[test]
    fn amount_known_compressions() {
        // Values observed in the legacy snapshot fixtures.
        assert_eq!(compress_amount(5_000_000_000), 50);
        assert_eq!(compress_amount(1_000_000), 7);
        assert_eq!(compress_amount(20_000_000), 18);
        assert_eq!(compress_amount(15_000_000), 137);
        assert_eq!(decompress_amount(50), 5_000_000_000);
        assert_eq!(decompress_amount(7), 1_000_000);
    }

    #[test]
    fn p2pkh_script_roundtrip() {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[0x76, 0xa9, 0x14]);
        script.extend_from_slice(&[0x11; 20]);
        script.extend_from_slice(&[0x88, 0xac]);

        let compressed = compress_script(&script);
        assert_eq!(compressed.len(), 21);
        assert_eq!(compressed[0], 0x00);

        let mut cursor = 0;
        let decompressed = decompress_script_from(&compressed, &mut cursor).expect("decompress");
        assert_eq!(decompressed, script);
        assert_eq!(cursor, compressed.len());
    }

    #[test]
    fn p2sh_script_roundtrip() {
        let mut script = Vec::with_capacity(23);
        script.extend_from_slice(&[0xa9, 0x14]);
        script.extend_from_slice(&[0x33; 20]);
        script.push(0x87);

        let compressed = compress_script(&script);
        assert_eq!(compressed[0], 0x01);

        let mut cursor = 0;
        let decompressed = decompress_script_from(&compressed, &mut cursor).expect("decompress");
        assert_eq!(decompressed, script);
    }

    #[test]
    fn raw_script_roundtrip() {
        let script = vec![0x51, 0x52, 0x93];
        let compressed = compress_script(&script);
        assert_eq!(compressed[0] as usize, script.len() + 6);

        let mut cursor = 0;
        let decompressed = decompress_script_from(&compressed, &mut cursor).expect("decompress");
        assert_eq!(decompressed, script);
    }

    #[test]
    fn truncated_script_data_fails() {
        // Type 0 (P2PKH) claims 20 hash bytes but only 4 follow.
        let bytes = [0x00, 0xaa, 0xbb, 0xcc, 0xdd];
        let mut cursor = 0;
        assert_eq!(
            decompress_script_from(&bytes, &mut cursor),
            Err(UtxoDecodeError::Truncated)
        );
    }

    #[test]
    fn invalid_pubkey_x_fails() {
        // x of all ones is past the field modulus, so no curve point exists.
        let mut bytes = vec![0x04];
        bytes.extend_from_slice(&[0xff; 32]);
        let mut cursor = 0;
        assert_eq!(
            decompress_script_from(&bytes, &mut cursor),
            Err(UtxoDecodeError::InvalidScript)
        );
    }
}
