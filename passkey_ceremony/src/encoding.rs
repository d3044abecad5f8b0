//! Binary to text conversion for credential material.
//!
//! Everything that crosses the network or lands in storage as text uses the
//! URL-safe base64 alphabet without padding.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ring::rand::SecureRandom;

use crate::errors::PasskeyError;

pub fn base64url_encode(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Decodes URL-safe, unpadded base64.
///
/// Characters outside the URL-safe alphabet, `=` padding and impossible
/// trailing bits are all rejected.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, PasskeyError> {
    URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|e| PasskeyError::InvalidEncoding(e.to_string()))
}

pub(crate) fn gen_random_bytes(len: usize) -> Result<Vec<u8>, PasskeyError> {
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| PasskeyError::Crypto("Failed to generate random bytes".to_string()))?;
    Ok(bytes)
}

/// Serde adapter storing `Vec<u8>` fields as base64url text.
///
/// ```ignore
/// #[serde(with = "crate::encoding::base64url")]
/// value: Vec<u8>,
/// ```
pub(crate) mod base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::base64url_encode(bytes))
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::base64url_decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(base64url_encode(&[]), "");
        assert_eq!(base64url_decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_trailing_zero_bytes_are_preserved() {
        let input = vec![0x41, 0x00, 0x00, 0x00];
        let encoded = base64url_encode(&input);
        assert_eq!(base64url_decode(&encoded).unwrap(), input);

        let zeros = vec![0u8; 5];
        assert_eq!(base64url_decode(&base64url_encode(&zeros)).unwrap(), zeros);
    }

    #[test]
    fn test_url_safe_alphabet() {
        // 0xfb 0xff encodes to characters that differ between the standard and URL-safe alphabets
        let encoded = base64url_encode(&[0xfb, 0xff]);
        assert_eq!(encoded, "-_8");
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        let result = base64url_decode("+/8");
        assert!(matches!(result, Err(PasskeyError::InvalidEncoding(_))));
    }

    #[test]
    fn test_decode_rejects_padding() {
        let result = base64url_decode("QQ==");
        assert!(matches!(result, Err(PasskeyError::InvalidEncoding(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_length() {
        // A single trailing character can never encode a whole byte
        let result = base64url_decode("QUJDR");
        assert!(matches!(result, Err(PasskeyError::InvalidEncoding(_))));
    }

    #[test]
    fn test_gen_random_bytes() {
        let a = gen_random_bytes(32).unwrap();
        let b = gen_random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_adapter() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Wrapper {
            #[serde(with = "super::base64url")]
            data: Vec<u8>,
        }

        let value = Wrapper {
            data: vec![1, 2, 3, 0],
        };
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"data":"AQIDAA"}"#);
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);

        let bad = serde_json::from_str::<Wrapper>(r#"{"data":"AQID=="}"#);
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let encoded = base64url_encode(&bytes);
            prop_assert_eq!(base64url_decode(&encoded).unwrap(), bytes);
        }

        #[test]
        fn prop_round_trip_with_trailing_zeros(
            prefix in proptest::collection::vec(any::<u8>(), 0..64),
            zeros in 1usize..8,
        ) {
            let mut bytes = prefix;
            bytes.extend(std::iter::repeat_n(0u8, zeros));
            let encoded = base64url_encode(&bytes);
            prop_assert_eq!(base64url_decode(&encoded).unwrap(), bytes);
        }
    }
}
