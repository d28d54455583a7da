//! SCALE helpers for naming-map keys, call arguments and account info

use crate::{CoreError, Result};
use parity_scale_codec::{Decode, DecodeAll, Encode};

/// SCALE byte string: compact length followed by the bytes.
///
/// Map keys and call arguments of the naming registries are all `Vec<u8>`.
pub fn text(value: &str) -> Vec<u8> {
    value.as_bytes().encode()
}

/// Decode a complete value; trailing bytes are an error.
pub fn decode<T: Decode>(bytes: &[u8]) -> Result<T> {
    T::decode_all(&mut &bytes[..]).map_err(|e| CoreError::Codec(e.to_string()))
}

/// Text argument or key previously encoded with [`text`]
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(decode::<Vec<u8>>(bytes)?)
        .map_err(|e| CoreError::Codec(format!("text is not utf-8: {}", e)))
}

/// Balances of an account; the engine only ever writes zeroes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountData {
    pub free: u128,
    pub reserved: u128,
    pub frozen: u128,
    pub flags: u128,
}

/// Value stored under `System.Account`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct AccountInfo {
    pub nonce: u32,
    pub consumers: u32,
    pub providers: u32,
    pub sufficients: u32,
    pub data: AccountData,
}

impl AccountInfo {
    pub fn with_nonce(nonce: u32) -> Self {
        Self {
            nonce,
            ..Self::default()
        }
    }
}

/// Nonce of an account info entry.
///
/// Only the leading u32 is read, so ledgers with a different balance layout
/// still yield their nonce.
pub fn decode_account_nonce(bytes: &[u8]) -> Result<u32> {
    u32::decode(&mut &bytes[..]).map_err(|e| CoreError::Codec(format!("account info: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedns_api::RegistryRecord;

    #[test]
    fn test_text_prefixes_compact_length() {
        assert_eq!(text("com"), vec![0x0c, b'c', b'o', b'm']);

        let long = "x".repeat(64);
        let bytes = text(&long);
        assert_eq!(&bytes[..2], &[0x01, 0x01]);
        assert_eq!(decode_text(&bytes).unwrap(), long);
    }

    #[test]
    fn test_decode_rejects_truncated_record() {
        let bytes = RegistryRecord {
            endpoint: "http://localhost:3000/json/tldSpec.json".to_string(),
        }
        .encode();
        let err = decode::<RegistryRecord>(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CoreError::Codec(_)));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = RegistryRecord {
            endpoint: "x".to_string(),
        }
        .encode();
        bytes.push(0);
        assert!(decode::<RegistryRecord>(&bytes).is_err());
    }

    #[test]
    fn test_invalid_utf8_text() {
        let bytes = vec![0xffu8, 0xfe].encode();
        assert!(matches!(decode_text(&bytes), Err(CoreError::Codec(_))));
    }

    #[test]
    fn test_account_nonce() {
        let info = AccountInfo::with_nonce(42).encode();
        assert_eq!(info.len(), 80);
        assert_eq!(decode_account_nonce(&info).unwrap(), 42);
        assert_eq!(decode::<AccountInfo>(&info).unwrap().nonce, 42);
        assert!(decode_account_nonce(&[1, 2]).is_err());
    }
}
