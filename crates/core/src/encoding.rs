//! Byte-safe value encoding shared by the bootstrap generator and the
//! service-message wire format.
//!
//! Every value is carried as standard-alphabet base64 of its UTF-8 bytes, so
//! quotes, brackets and newlines in the raw text never reach the delimiter
//! grammar of either the generated script or the stdout protocol.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Errors produced when turning an encoded value back into text.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Decoded value is not valid UTF-8")]
    InvalidUtf8,
}

/// Encode a string as base64 of its UTF-8 bytes. Total over all inputs.
pub fn encode_value(value: &str) -> String {
    encode_bytes(value.as_bytes())
}

/// Encode raw bytes with the standard base64 alphabet.
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a value produced by [`encode_value`].
pub fn decode_value(encoded: &str) -> Result<String, EncodingError> {
    let bytes = decode_bytes(encoded)?;
    String::from_utf8(bytes).map_err(|_| EncodingError::InvalidUtf8)
}

/// Decode standard base64 into raw bytes.
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>, EncodingError> {
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| EncodingError::InvalidBase64(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_encodings() {
        assert_eq!(encode_value("Super"), "U3VwZXI=");
        assert_eq!(encode_value("Mario Bros"), "TWFyaW8gQnJvcw==");
        assert_eq!(encode_value(""), "");
    }

    #[test]
    fn delimiters_survive() {
        let raw = "it's ] a\n'trap' [x]";
        let encoded = encode_value(raw);
        assert!(!encoded.contains('\''));
        assert!(!encoded.contains(']'));
        assert_eq!(decode_value(&encoded).unwrap(), raw);
    }

    #[test]
    fn multibyte_characters_survive() {
        let raw = "héllo wörld ✓ 日本";
        assert_eq!(decode_value(&encode_value(raw)).unwrap(), raw);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(matches!(
            decode_value("not*base64"),
            Err(EncodingError::InvalidBase64(_))
        ));
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        let encoded = encode_bytes(&[0xff, 0xfe, 0xfd]);
        assert_eq!(decode_value(&encoded), Err(EncodingError::InvalidUtf8));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(s in any::<String>()) {
            prop_assert_eq!(decode_value(&encode_value(&s)).unwrap(), s);
        }
    }
}
