//! Transparent/compressed codec for cache payloads.

use crate::entry::PayloadVariant;
use crate::error::CodecError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Encode a logical value for storage, selecting the codec path per the
/// caller-supplied `want_compressed` flag. Returns the stored variant plus
/// the `objectSize` of the *serialized logical value*, which is always
/// measured before compression.
pub fn encode(value: &serde_json::Value, want_compressed: bool) -> Result<(PayloadVariant, u64), CodecError> {
    let serialized = serde_json::to_vec(value)?;
    let object_size = serialized.len() as u64;

    if !want_compressed {
        return Ok((PayloadVariant::Plain(value.clone()), object_size));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serialized)?;
    let compressed = encoder.finish()?;
    Ok((PayloadVariant::Compressed(compressed), object_size))
}

/// Decode a stored variant back into the logical value.
///
/// The codec never inspects payload structure beyond the
/// [`PayloadVariant`] discriminant itself; a variant that fails to
/// gzip-decode or parse as JSON is reported as [`CodecError`] so the
/// caller can self-invalidate the entry.
pub fn decode(variant: &PayloadVariant) -> Result<serde_json::Value, CodecError> {
    match variant {
        PayloadVariant::Plain(value) => Ok(value.clone()),
        PayloadVariant::Compressed(bytes) => {
            let mut decoder = GzDecoder::new(bytes.as_slice());
            let mut text = String::new();
            decoder.read_to_string(&mut text)?;
            let value = serde_json::from_str(&text)?;
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transparent_round_trips() {
        let value = json!({"a": 1, "b": "two"});
        let (variant, size) = encode(&value, false).unwrap();
        assert!(!variant.is_compressed());
        assert!(size > 0);
        assert_eq!(decode(&variant).unwrap(), value);
    }

    #[test]
    fn compressed_round_trips() {
        let value = json!({"series": [1, 2, 3, 4, 5], "label": "y"});
        let (variant, size) = encode(&value, true).unwrap();
        assert!(variant.is_compressed());
        assert!(size > 0);
        assert_eq!(decode(&variant).unwrap(), value);
    }

    #[test]
    fn corrupted_compressed_bytes_fail_decode() {
        let variant = PayloadVariant::Compressed(vec![0xff, 0x00, 0x01]);
        assert!(decode(&variant).is_err());
    }

    proptest::proptest! {
        /// `decode(encode(v)) == v` regardless of codec path, for arbitrary
        /// JSON-safe string/number maps.
        #[test]
        fn encode_decode_round_trips_for_arbitrary_objects(
            keys in proptest::collection::vec("[a-z]{1,8}", 0..6),
            values in proptest::collection::vec(-1_000_000i64..1_000_000, 0..6),
            compressed in proptest::bool::ANY,
        ) {
            let mut map = serde_json::Map::new();
            for (k, v) in keys.into_iter().zip(values.into_iter()) {
                map.insert(k, serde_json::json!(v));
            }
            let value = serde_json::Value::Object(map);

            let (variant, size) = encode(&value, compressed).unwrap();
            proptest::prop_assert_eq!(variant.is_compressed(), compressed);
            proptest::prop_assert!(size > 0);
            proptest::prop_assert_eq!(decode(&variant).unwrap(), value);
        }
    }
}
