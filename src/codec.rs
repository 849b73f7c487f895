//! Text encoding for key, signature and record bytes.
//!
//! Standard padded base64. Decoding is strict: missing or surplus padding,
//! non-zero trailing bits and characters outside the alphabet are rejected,
//! so every accepted string is the unique encoding of its bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::Error;

/// Encodes raw bytes into storage-safe text.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes text produced by [`encode`] back into bytes.
pub fn decode(text: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(text)
        .map_err(|err| Error::Codec(err.to_string()))
}

/// Decodes text into a fixed-size array, failing on any other length.
pub fn decode_array<const N: usize>(text: &str) -> Result<[u8; N], Error> {
    let bytes = decode(text)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| Error::Codec(format!("expected {N} bytes, got {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let samples: [&[u8]; 5] = [b"", b"\x00", b"\xff\xfe", b"abc", &[7u8; 65]];
        for sample in samples {
            assert_eq!(decode(&encode(sample)).unwrap(), sample);
        }
    }

    #[test]
    fn test_known_encoding() {
        assert_eq!(encode(b"hello"), "aGVsbG8=");
        assert_eq!(decode("aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn test_rejects_wrong_alphabet() {
        assert!(matches!(decode("aGVs*G8="), Err(Error::Codec(_))));
        // URL-safe alphabet is not accepted
        assert!(matches!(decode("-_-_"), Err(Error::Codec(_))));
    }

    #[test]
    fn test_rejects_non_canonical_text() {
        // Missing padding
        assert!(decode("aGVsbG8").is_err());
        // Non-zero trailing bits ("aGVsbG9=" would decode to "hello" leniently)
        assert!(decode("aGVsbG9=").is_err());
    }

    #[test]
    fn test_decode_array_length() {
        let text = encode(&[1u8; 32]);
        assert_eq!(decode_array::<32>(&text).unwrap(), [1u8; 32]);
        assert!(matches!(decode_array::<64>(&text), Err(Error::Codec(_))));
    }
}
