//! Fixed-point token amounts

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Symbol used for synthetic RAM byte quantities
pub const RAM_SYMBOL: &str = "RAM";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AssetError {
    #[error("Malformed asset: {0}")]
    Malformed(String),

    #[error("Invalid asset symbol: {0}")]
    InvalidSymbol(String),

    #[error("Asset amount out of range: {0}")]
    Overflow(String),
}

/// A fixed-point value: `amount / 10^precision` units of `symbol`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub amount: i64,
    pub precision: u32,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, amount: i64, precision: u32) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            precision,
        }
    }

    /// RAM quantities are carried as an asset with zero precision
    pub fn ram(bytes: i64) -> Self {
        Self::new(RAM_SYMBOL, bytes, 0)
    }
}

impl FromStr for Asset {
    type Err = AssetError;

    /// Parses the node's text form, e.g. `"5.0000 EOS"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, symbol) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| AssetError::Malformed(s.to_string()))?;

        let symbol = symbol.trim();
        if symbol.is_empty() || symbol.len() > 7 || !symbol.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(AssetError::InvalidSymbol(symbol.to_string()));
        }

        let (negative, digits) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (digits, ""),
        };

        if whole.is_empty()
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(AssetError::Malformed(s.to_string()));
        }

        // node assets carry at most 18 decimals
        let precision = fraction.len() as u32;
        if precision > 18 {
            return Err(AssetError::Overflow(s.to_string()));
        }
        let magnitude: i64 = format!("{}{}", whole, fraction)
            .parse()
            .map_err(|_| AssetError::Overflow(s.to_string()))?;

        Ok(Self {
            symbol: symbol.to_string(),
            amount: if negative { -magnitude } else { magnitude },
            precision,
        })
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.amount < 0 { "-" } else { "" };
        let magnitude = self.amount.unsigned_abs();

        if self.precision == 0 {
            return write!(f, "{}{} {}", sign, magnitude, self.symbol);
        }

        let scale = 10u64.pow(self.precision);
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            magnitude / scale,
            magnitude % scale,
            self.symbol,
            width = self.precision as usize
        )
    }
}

/// Deserialize an [`Asset`] from its text form
pub fn deserialize_from_str<'de, D>(deserializer: D) -> Result<Asset, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    text.parse().map_err(serde::de::Error::custom)
}
