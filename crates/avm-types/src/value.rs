//! Stack and storage values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::{format_hex, option_base64_bytes};

/// Type tag for byte-string values in trace JSON.
pub const AVM_TYPE_BYTES: u8 = 1;
/// Type tag for uint64 values in trace JSON.
pub const AVM_TYPE_UINT: u8 = 2;

/// A value on the AVM operand stack, in a scratch slot, or in application storage.
///
/// Serialized as `{"type": 1, "bytes": "<base64>"}` or `{"type": 2, "uint": n}`.
/// A uint value with `uint` omitted is zero, matching how the simulate
/// endpoint elides default fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAvmValue", into = "RawAvmValue")]
pub enum AvmValue {
    Bytes(Vec<u8>),
    Uint(u64),
}

impl AvmValue {
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        AvmValue::Bytes(bytes.into())
    }

    pub fn uint(value: u64) -> Self {
        AvmValue::Uint(value)
    }

    /// True for the value an untouched scratch slot holds.
    pub fn is_default(&self) -> bool {
        matches!(self, AvmValue::Uint(0))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            AvmValue::Bytes(_) => "byte[]",
            AvmValue::Uint(_) => "uint64",
        }
    }
}

impl Default for AvmValue {
    fn default() -> Self {
        AvmValue::Uint(0)
    }
}

impl fmt::Display for AvmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvmValue::Bytes(bytes) => write!(f, "{}", format_hex(bytes)),
            AvmValue::Uint(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawAvmValue {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(
        default,
        with = "option_base64_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uint: Option<u64>,
}

impl TryFrom<RawAvmValue> for AvmValue {
    type Error = String;

    fn try_from(raw: RawAvmValue) -> Result<Self, Self::Error> {
        match raw.kind {
            AVM_TYPE_BYTES => Ok(AvmValue::Bytes(raw.bytes.unwrap_or_default())),
            AVM_TYPE_UINT => Ok(AvmValue::Uint(raw.uint.unwrap_or(0))),
            other => Err(format!("unknown AVM value type {}", other)),
        }
    }
}

impl From<AvmValue> for RawAvmValue {
    fn from(value: AvmValue) -> Self {
        match value {
            AvmValue::Bytes(bytes) => RawAvmValue {
                kind: AVM_TYPE_BYTES,
                bytes: Some(bytes),
                uint: None,
            },
            AvmValue::Uint(uint) => RawAvmValue {
                kind: AVM_TYPE_UINT,
                bytes: None,
                uint: Some(uint),
            },
        }
    }
}
