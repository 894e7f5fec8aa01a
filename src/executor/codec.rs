//! Hex conversion for raw payloads.
//!
//! Raw methods carry their bytes as hex strings. Incoming messages may use
//! either case and may separate bytes with whitespace; outgoing results are
//! always lowercase with two digits per byte.

use crate::device::DeviceError;

/// Decode a hex message into bytes.
pub fn decode_hex(message: &str) -> Result<Vec<u8>, DeviceError> {
    let compact: String = message.split_whitespace().collect();
    hex::decode(&compact)
        .map_err(|e| DeviceError::Encoding(format!("invalid hex message '{message}': {e}")))
}

/// Encode bytes in canonical form.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_accepts_mixed_case_and_spaces() {
        assert_eq!(decode_hex("0A ff 10").unwrap(), vec![0x0a, 0xff, 0x10]);
        assert_eq!(decode_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_rejects_odd_length_and_garbage() {
        assert!(matches!(decode_hex("abc"), Err(DeviceError::Encoding(_))));
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_encode_is_lowercase_two_digit() {
        assert_eq!(encode_hex(&[0x00, 0x0a, 0xff]), "000aff");
        assert_eq!(encode_hex(&[]), "");
    }
}
