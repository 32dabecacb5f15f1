//! Result encoder
//!
//! Produces the bytes the oracle's Chainlink job transmits on-chain. All
//! output is a CBOR *array* (never a map, so byte layout cannot drift with
//! iteration order), rendered as a `0x`-prefixed hex string:
//!
//! - mode 0 and mode 2: `[justificationCid, [score, ...]]`
//! - mode 1: `[commitHash(16 bytes), justificationCid]`

use ciborium::value::Value;

/// Encode a standard / reveal result
pub fn encode_standard(justification_cid: &str, scores: &[u64]) -> Vec<u8> {
    let score_values = scores
        .iter()
        .map(|s| Value::Integer((*s).into()))
        .collect::<Vec<_>>();
    encode_value(&Value::Array(vec![
        Value::Text(justification_cid.to_string()),
        Value::Array(score_values),
    ]))
}

/// Encode a commit result: the truncated hash plus the justification CID
pub fn encode_commit(commit_hash: &[u8; 16], justification_cid: &str) -> Vec<u8> {
    encode_value(&Value::Array(vec![
        Value::Bytes(commit_hash.to_vec()),
        Value::Text(justification_cid.to_string()),
    ]))
}

/// Hex rendering shipped in the HTTP response body
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    // CBOR arrays of text/bytes/integers into a Vec cannot fail
    ciborium::ser::into_writer(value, &mut buf).expect("CBOR encoding into Vec");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Value {
        ciborium::de::from_reader(bytes).unwrap()
    }

    #[test]
    fn test_standard_encoding_shape() {
        let bytes = encode_standard("bafyJ", &[60, 40]);
        let value = decode(&bytes);
        let items = match value {
            Value::Array(items) => items,
            other => panic!("expected array, got {other:?}"),
        };
        assert_eq!(items[0], Value::Text("bafyJ".into()));
        let scores = match &items[1] {
            Value::Array(scores) => scores.clone(),
            other => panic!("expected score array, got {other:?}"),
        };
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], Value::Integer(60.into()));
        assert_eq!(scores[1], Value::Integer(40.into()));
    }

    #[test]
    fn test_standard_encoding_deterministic() {
        let a = encode_standard("bafyJ", &[600_000, 400_000]);
        let b = encode_standard("bafyJ", &[600_000, 400_000]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_standard_encoding_sensitive_to_inputs() {
        let base = encode_standard("bafyJ", &[60, 40]);
        assert_ne!(base, encode_standard("bafyK", &[60, 40]));
        assert_ne!(base, encode_standard("bafyJ", &[40, 60]));
    }

    #[test]
    fn test_commit_encoding_shape() {
        let hash = [7u8; 16];
        let bytes = encode_commit(&hash, "bafyJ");
        let value = decode(&bytes);
        match value {
            Value::Array(items) => {
                assert_eq!(items[0], Value::Bytes(hash.to_vec()));
                assert_eq!(items[1], Value::Text("bafyJ".into()));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_hex_rendering() {
        assert_eq!(to_hex(&[0x01, 0xab]), "0x01ab");
    }
}
