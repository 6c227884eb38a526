use taxd_consensus::Hash256;
use taxd_primitives::block::{Block, BlockHeader, CURRENT_VERSION};
use taxd_primitives::encoding::{decode, encode, DecodeError, Decoder};
use taxd_primitives::outpoint::OutPoint;
use taxd_primitives::transaction::{Transaction, TxIn, TxOut, TX_TYPE_STANDARD, TX_TYPE_TAX};

fn seq_hash(start: u8) -> Hash256 {
    std::array::from_fn(|i| start.wrapping_add(i as u8))
}

fn push_hash_le(buffer: &mut Vec<u8>, start: u8) {
    for byte in 0u8..=0x1f {
        buffer.push(start.wrapping_add(byte));
    }
}

fn sample_transaction(tx_type: u8) -> Transaction {
    Transaction {
        version: 1,
        tx_type,
        vin: vec![TxIn {
            prevout: OutPoint {
                hash: seq_hash(0x40),
                index: 3,
            },
            script_sig: vec![0x01, 0x02, 0x03],
            sequence: u32::MAX,
        }],
        vout: vec![
            TxOut {
                value: 5_000_000_000,
                script_pubkey: vec![0xac],
            },
            TxOut {
                value: 1_234,
                script_pubkey: vec![0x76, 0xa9],
            },
        ],
        lock_time: 7,
    }
}

#[test]
fn serialize_block_header() {
    let header = BlockHeader {
        version: CURRENT_VERSION,
        prev_block: seq_hash(0x00),
        merkle_root: seq_hash(0x20),
        time: 0x01020304,
        bits: 0x0a0b0c0d,
        nonce: 0x10572b0f,
    };

    let encoded = header.consensus_encode();
    let mut expected = Vec::new();
    expected.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
    push_hash_le(&mut expected, 0x00);
    push_hash_le(&mut expected, 0x20);
    expected.extend_from_slice(&0x01020304u32.to_le_bytes());
    expected.extend_from_slice(&0x0a0b0c0du32.to_le_bytes());
    expected.extend_from_slice(&0x10572b0fu32.to_le_bytes());
    assert_eq!(encoded, expected);

    let decoded = BlockHeader::consensus_decode_from(&mut Decoder::new(&encoded))
        .expect("decode block header");
    assert_eq!(decoded, header);
}

#[test]
fn serialize_transaction_roundtrip() {
    let tx = sample_transaction(TX_TYPE_STANDARD);
    let encoded = encode(&tx);

    let mut expected = Vec::new();
    expected.extend_from_slice(&1i32.to_le_bytes());
    expected.push(TX_TYPE_STANDARD);
    expected.push(1);
    push_hash_le(&mut expected, 0x40);
    expected.extend_from_slice(&3u32.to_le_bytes());
    expected.push(3);
    expected.extend_from_slice(&[0x01, 0x02, 0x03]);
    expected.extend_from_slice(&u32::MAX.to_le_bytes());
    expected.push(2);
    expected.extend_from_slice(&5_000_000_000i64.to_le_bytes());
    expected.push(1);
    expected.push(0xac);
    expected.extend_from_slice(&1_234i64.to_le_bytes());
    expected.push(2);
    expected.extend_from_slice(&[0x76, 0xa9]);
    expected.extend_from_slice(&7u32.to_le_bytes());
    assert_eq!(encoded, expected);

    let decoded: Transaction = decode(&encoded).expect("decode transaction");
    assert_eq!(decoded, tx);
}

#[test]
fn tax_type_tag_survives_roundtrip() {
    let tx = sample_transaction(TX_TYPE_TAX);
    let decoded: Transaction = decode(&encode(&tx)).expect("decode tax transaction");
    assert!(decoded.is_tax());
    assert_eq!(decoded, tx);
}

#[test]
fn serialize_block_roundtrip() {
    let block = Block {
        header: BlockHeader {
            version: CURRENT_VERSION,
            prev_block: seq_hash(0x00),
            merkle_root: seq_hash(0x20),
            time: 1_293_623_863,
            bits: 0x1b04864c,
            nonce: 0x10572b0f,
        },
        transactions: vec![
            sample_transaction(TX_TYPE_STANDARD),
            sample_transaction(TX_TYPE_TAX),
        ],
    };

    let encoded = block.consensus_encode();
    let decoded = Block::consensus_decode(&encoded).expect("decode block");
    assert_eq!(decoded, block);
}

#[test]
fn block_decode_rejects_trailing_bytes() {
    let block = Block {
        header: BlockHeader {
            version: CURRENT_VERSION,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
        },
        transactions: Vec::new(),
    };
    let mut encoded = block.consensus_encode();
    encoded.push(0x00);
    assert_eq!(
        Block::consensus_decode(&encoded),
        Err(DecodeError::TrailingBytes)
    );
}

#[test]
fn transaction_decode_rejects_truncation() {
    let encoded = encode(&sample_transaction(TX_TYPE_STANDARD));
    for len in 0..encoded.len() {
        let result: Result<Transaction, _> = decode(&encoded[..len]);
        assert!(result.is_err(), "truncation at {len} must fail");
    }
}
