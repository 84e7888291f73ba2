use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CAIP-2 namespace for EVM chains.
pub const EIP155: &str = "eip155";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    #[error("invalid chain id '{0}'")]
    InvalidChainId(String),
    #[error("invalid quantity '{0}'")]
    InvalidQuantity(String),
}

/// Numeric EVM chain id (`1` for mainnet, `137` for Polygon, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    /// `eip155:<id>` form used in namespaces and requests.
    pub fn caip2(&self) -> String {
        format!("{EIP155}:{}", self.0)
    }

    /// Parses `eip155:<decimal>`. Other namespaces are rejected.
    pub fn parse_caip2(value: &str) -> Result<Self, ProtoError> {
        let reference = value
            .strip_prefix(EIP155)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or_else(|| ProtoError::InvalidChainId(value.to_string()))?;
        reference
            .parse()
            .map(ChainId)
            .map_err(|_| ProtoError::InvalidChainId(value.to_string()))
    }

    /// Parses the `chainId` carried by wallet_* methods: `0x`-prefixed hex,
    /// or plain decimal.
    pub fn parse_hex(value: &str) -> Result<Self, ProtoError> {
        let trimmed = value.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse(),
        };
        parsed
            .map(ChainId)
            .map_err(|_| ProtoError::InvalidChainId(value.to_string()))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        ChainId(value)
    }
}

/// Parses a JSON-RPC quantity (`value`, `gas`, ...). dApps send these as hex
/// strings, decimal strings or bare numbers.
pub fn parse_quantity(value: &serde_json::Value) -> Result<u128, ProtoError> {
    match value {
        serde_json::Value::Number(number) => number
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| ProtoError::InvalidQuantity(number.to_string())),
        serde_json::Value::String(text) => {
            let trimmed = text.trim();
            let parsed = match trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
            {
                Some("") => Ok(0),
                Some(hex) => u128::from_str_radix(hex, 16),
                None => trimmed.parse(),
            };
            parsed.map_err(|_| ProtoError::InvalidQuantity(text.clone()))
        }
        other => Err(ProtoError::InvalidQuantity(other.to_string())),
    }
}
