//! Encoding utilities for hex and base64.
//!
//! Provides shared encoding/decoding functions used across workspace crates.
//! Trace JSON carries byte strings as base64; the replay engine keys its maps
//! by lowercase hex.

use sha2::{Digest, Sha512_256};

// =============================================================================
// Hex Encoding
// =============================================================================

/// Canonical hex form of a byte key: lowercase, no prefix.
///
/// This is the representation [`ByteArrayMap`](crate::ByteArrayMap) uses
/// internally and the order in which state listings are sorted.
pub fn to_hex_key(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parse a hex string (with or without 0x prefix) to raw bytes.
///
/// # Arguments
/// * `hex_str` - Hex string
/// * `context` - Description for error messages (e.g., "global key")
pub fn parse_hex_bytes(hex_str: &str, context: &str) -> Result<Vec<u8>, String> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| format!("Invalid {} hex '{}': {}", context, hex_str, e))
}

/// Format bytes as a `0x`-prefixed hex string for display.
pub fn format_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// =============================================================================
// Base64 Encoding/Decoding
// =============================================================================

/// Encode bytes to base64 string.
pub fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 string to bytes with context-aware error message.
pub fn base64_decode(b64: &str, context: &str) -> Result<Vec<u8>, String> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| format!("Failed to decode {} from base64: {}", context, e))
}

// =============================================================================
// Program Hashing
// =============================================================================

/// Domain separation prefix the chain uses when hashing program bytecode.
pub const PROGRAM_HASH_PREFIX: &[u8] = b"Program";

/// Content hash of a compiled program: SHA-512/256 over `"Program" || bytecode`.
///
/// This is the value the simulate endpoint reports as `approval-program-hash`,
/// `clear-state-program-hash` and `logic-sig-hash`.
pub fn program_hash(bytecode: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512_256::new();
    hasher.update(PROGRAM_HASH_PREFIX);
    hasher.update(bytecode);
    hasher.finalize().to_vec()
}

// =============================================================================
// Serde helpers
// =============================================================================

/// Serde adapter for `Vec<u8>` fields carried as base64 strings.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::base64_encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::base64_decode(&s, "byte field").map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional base64 byte fields.
pub mod option_base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&super::base64_encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| super::base64_decode(&s, "byte field").map_err(serde::de::Error::custom))
            .transpose()
    }
}
