use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Content type of JSON request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Wire format of a bus payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON format (what most sensors publish).
    Json,

    /// CBOR format (compact binary, used by constrained devices).
    Cbor,
}

/// Encode a value as a JSON body.
pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(Error::from)
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => serde_json::from_slice(data).map_err(Error::from),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
    }
}

/// Try to auto-detect the format from the data.
///
/// Returns `Json` if the first non-whitespace byte is `{` or `[`, otherwise `Cbor`.
pub fn detect_format(data: &[u8]) -> Format {
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => Format::Json,
        _ => Format::Cbor,
    }
}

/// Decode bytes, auto-detecting the format.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    decode(data, detect_format(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: f64,
        timestamp: Option<i64>,
    }

    fn sample() -> Sample {
        Sample {
            value: 21.75,
            timestamp: Some(1_700_000_000),
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_format(b"{\"key\": \"value\"}"), Format::Json);
        assert_eq!(detect_format(b"  \n{\"value\": 1}"), Format::Json);
        assert_eq!(detect_format(b"[1, 2, 3]"), Format::Json);
        assert_eq!(detect_format(b"\xa1\x65value\xf9\x3c\x00"), Format::Cbor);
        assert_eq!(detect_format(b""), Format::Cbor);
    }

    #[test]
    fn test_auto_decode_json() {
        let json = encode_json(&sample()).unwrap();
        let decoded: Sample = decode_auto(&json).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_auto_decode_cbor() {
        let mut cbor = Vec::new();
        ciborium::into_writer(&sample(), &mut cbor).unwrap();

        let decoded: Sample = decode_auto(&cbor).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_json_float_is_exact() {
        // Needs serde_json's float_roundtrip parsing.
        let decoded: Sample = decode(b"{\"value\": 0.30000000000000004}", Format::Json).unwrap();
        assert_eq!(decoded.value, 0.1 + 0.2);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode::<Sample>(b"not json", Format::Json),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            decode::<Sample>(b"\xff\xff", Format::Cbor),
            Err(Error::Cbor(_))
        ));
    }
}
