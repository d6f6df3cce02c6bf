//! Domain primitives: TimeMs, UserId, ExchangeCode, InstrumentId, TradeId, Side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Time in milliseconds since Unix epoch (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(Utc::now().timestamp_millis())
    }

    /// Parse an RFC 3339 timestamp with any offset and normalize it to UTC.
    pub fn parse_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        let dt = DateTime::parse_from_rfc3339(s.trim())?;
        Ok(TimeMs(dt.with_timezone(&Utc).timestamp_millis()))
    }
}

/// User identifier (UUID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new(id: Uuid) -> Self {
        UserId(id)
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s.trim()).map(UserId)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported exchange code {0}, expected 1 (Upbit), 2 (Bithumb), 3 (Binance) or 4 (OKX)")]
pub struct UnknownExchangeCode(pub i64);

/// Supported exchanges, identified by their persisted numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ExchangeCode {
    Upbit,
    Bithumb,
    Binance,
    Okx,
}

impl ExchangeCode {
    pub fn code(&self) -> i64 {
        match self {
            ExchangeCode::Upbit => 1,
            ExchangeCode::Bithumb => 2,
            ExchangeCode::Binance => 3,
            ExchangeCode::Okx => 4,
        }
    }
}

impl TryFrom<i64> for ExchangeCode {
    type Error = UnknownExchangeCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ExchangeCode::Upbit),
            2 => Ok(ExchangeCode::Bithumb),
            3 => Ok(ExchangeCode::Binance),
            4 => Ok(ExchangeCode::Okx),
            other => Err(UnknownExchangeCode(other)),
        }
    }
}

impl From<ExchangeCode> for i64 {
    fn from(code: ExchangeCode) -> Self {
        code.code()
    }
}

impl std::fmt::Display for ExchangeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeCode::Upbit => write!(f, "upbit"),
            ExchangeCode::Bithumb => write!(f, "bithumb"),
            ExchangeCode::Binance => write!(f, "binance"),
            ExchangeCode::Okx => write!(f, "okx"),
        }
    }
}

/// Instrument (coin) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub i64);

impl InstrumentId {
    pub fn new(id: i64) -> Self {
        InstrumentId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned trade identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub i64);

impl TradeId {
    pub fn new(id: i64) -> Self {
        TradeId(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for TradeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade side: Buy or Sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serialization() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"buy\"");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"sell\"");
        assert_eq!(Side::parse("sell"), Some(Side::Sell));
        assert_eq!(Side::parse("short"), None);
    }

    #[test]
    fn test_exchange_code_roundtrip_and_rejects_unknown() {
        for code in 1..=4 {
            let ex = ExchangeCode::try_from(code).unwrap();
            assert_eq!(ex.code(), code);
        }
        assert_eq!(ExchangeCode::try_from(5), Err(UnknownExchangeCode(5)));
        assert!(serde_json::from_str::<ExchangeCode>("0").is_err());
        assert_eq!(serde_json::to_string(&ExchangeCode::Binance).unwrap(), "3");
    }

    #[test]
    fn test_timems_rfc3339_normalizes_to_utc() {
        let kst = TimeMs::parse_rfc3339("2024-01-01T09:00:00+09:00").unwrap();
        let utc = TimeMs::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
        assert_eq!(kst, utc);
        assert_eq!(utc.as_ms(), 1_704_067_200_000);
        assert!(TimeMs::parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn test_user_id_parse() {
        let user = UserId::parse("bd70f700-5399-46e5-837d-2fc978b3c3b7").unwrap();
        assert_eq!(user.to_string(), "bd70f700-5399-46e5-837d-2fc978b3c3b7");
        assert!(UserId::parse("0x123").is_err());
    }

    #[test]
    fn test_timems_ordering() {
        assert!(TimeMs::new(1000) < TimeMs::new(2000));
    }
}
