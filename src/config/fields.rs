use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::types::{normalize_symbols, parse_decimal, TimeFrame, TradingMode};

/// Every operator-editable run parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigField {
    ApiKey,
    ApiSecret,
    Mode,
    Symbols,
    RsiInterval,
    RsiPeriod,
    RsiThresholdUp,
    RsiThresholdDown,
    RsiEntryLevelLow,
    VolumeSmaPeriod,
    VolumeFactor,
    PositionSizeUsdt,
    StopLossUsdt,
    TakeProfitUsdt,
    CycleSleepSeconds,
    OrderTimeoutSeconds,
}

pub const ALL_FIELDS: [ConfigField; 16] = [
    ConfigField::ApiKey,
    ConfigField::ApiSecret,
    ConfigField::Mode,
    ConfigField::Symbols,
    ConfigField::RsiInterval,
    ConfigField::RsiPeriod,
    ConfigField::RsiThresholdUp,
    ConfigField::RsiThresholdDown,
    ConfigField::RsiEntryLevelLow,
    ConfigField::VolumeSmaPeriod,
    ConfigField::VolumeFactor,
    ConfigField::PositionSizeUsdt,
    ConfigField::StopLossUsdt,
    ConfigField::TakeProfitUsdt,
    ConfigField::CycleSleepSeconds,
    ConfigField::OrderTimeoutSeconds,
];

/// Value held by one field of the edit form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Number(Decimal),
    /// Numeric field cleared by the operator, awaiting input.
    Empty,
    /// A lone `-` typed into a field that may go negative.
    Minus,
}

impl FieldValue {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FieldValue::Number(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FieldValue::Empty | FieldValue::Minus)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Number(d) => write!(f, "{}", d.normalize()),
            FieldValue::Empty => Ok(()),
            FieldValue::Minus => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Decimal,
}

/// Set of values a field may be saved with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    AnyText,
    Mode,
    Interval,
    Symbols,
    Positive,
    NonNegative,
    NonPositive,
    Between(Decimal, Decimal),
    ZeroOrAtLeast(Decimal),
}

impl Domain {
    pub fn contains(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Domain::AnyText, FieldValue::Text(_)) => true,
            (Domain::Mode, FieldValue::Text(s)) => matches!(s.as_str(), "paper" | "live"),
            (Domain::Interval, FieldValue::Text(s)) => TimeFrame::parse(s).map(|tf| tf.as_str() == s.as_str()).unwrap_or(false),
            (Domain::Symbols, FieldValue::Text(s)) => !s.is_empty() && normalize_symbols(s) == *s,
            (Domain::Positive, FieldValue::Number(d)) => *d > Decimal::ZERO,
            (Domain::NonNegative, FieldValue::Number(d)) => *d >= Decimal::ZERO,
            (Domain::NonPositive, FieldValue::Number(d)) => *d <= Decimal::ZERO,
            (Domain::Between(lo, hi), FieldValue::Number(d)) => d >= lo && d <= hi,
            (Domain::ZeroOrAtLeast(floor), FieldValue::Number(d)) => d.is_zero() || d >= floor,
            _ => false,
        }
    }
}

/// Reasons an operator edit is refused. The field keeps its prior value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditRejection {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("'{0}' is not a key=value assignment")]
    MalformedAssignment(String),
    #[error("{field}: '{input}' is not a number")]
    NotANumber { field: &'static str, input: String },
    #[error("{field}: must be a whole number")]
    NotAnInteger { field: &'static str },
    #[error("{field}: negative values are not allowed")]
    NegativeNotAllowed { field: &'static str },
    #[error("{field}: mode must be 'paper' or 'live'")]
    InvalidMode { field: &'static str },
}

/// Per-field validation, coercion and default, applied on load, edit and save.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Key in the flat `POST /api/config` payload.
    pub wire_key: &'static str,
    /// Candidate `(section, key)` locations in the nested remote config.
    pub remote: &'static [(&'static str, &'static str)],
    pub kind: FieldKind,
    pub domain: Domain,
    pub allows_negative: bool,
    pub default: FieldValue,
}

impl ConfigField {
    pub fn rule(self) -> FieldRule {
        use ConfigField::*;

        let text = |wire_key: &'static str,
                    remote: &'static [(&'static str, &'static str)],
                    domain: Domain,
                    default: &str| FieldRule {
            wire_key,
            remote,
            kind: FieldKind::Text,
            domain,
            allows_negative: false,
            default: FieldValue::Text(default.to_string()),
        };
        let number = |wire_key: &'static str,
                      remote: &'static [(&'static str, &'static str)],
                      kind: FieldKind,
                      domain: Domain,
                      allows_negative: bool,
                      default: Decimal| FieldRule {
            wire_key,
            remote,
            kind,
            domain,
            allows_negative,
            default: FieldValue::Number(default),
        };

        match self {
            ApiKey => text("apiKey", &[("BINANCE", "api_key")], Domain::AnyText, ""),
            ApiSecret => text("apiSecret", &[("BINANCE", "api_secret")], Domain::AnyText, ""),
            Mode => text("mode", &[("BINANCE", "mode")], Domain::Mode, "paper"),
            Symbols => text(
                "symbolsToTrade",
                &[("SYMBOLS", "symbols_to_trade"), ("TRADING", "symbols_to_trade"), ("TRADING", "symbol")],
                Domain::Symbols,
                "BTCUSDT",
            ),
            RsiInterval => text("rsiInterval", &[("TRADING", "rsi_interval")], Domain::Interval, "5m"),
            RsiPeriod => number(
                "rsiPeriod", &[("TRADING", "rsi_period")],
                FieldKind::Integer, Domain::Positive, false, dec!(14),
            ),
            RsiThresholdUp => number(
                "rsiThresholdUp", &[("TRADING", "rsi_threshold_up")],
                FieldKind::Decimal, Domain::Positive, false, dec!(1.5),
            ),
            RsiThresholdDown => number(
                "rsiThresholdDown", &[("TRADING", "rsi_threshold_down")],
                FieldKind::Decimal, Domain::NonPositive, true, dec!(-1.0),
            ),
            RsiEntryLevelLow => number(
                "rsiEntryLevelLow", &[("TRADING", "rsi_entry_level_low")],
                FieldKind::Decimal, Domain::Between(dec!(0), dec!(100)), false, dec!(25),
            ),
            VolumeSmaPeriod => number(
                "volumeSmaPeriod", &[("TRADING", "volume_sma_period")],
                FieldKind::Integer, Domain::Positive, false, dec!(20),
            ),
            VolumeFactor => number(
                "volumeFactor", &[("TRADING", "volume_factor")],
                FieldKind::Decimal, Domain::Positive, false, dec!(1.5),
            ),
            PositionSizeUsdt => number(
                "positionSizeUSDT", &[("TRADING", "position_size_usdt")],
                FieldKind::Decimal, Domain::Positive, false, dec!(50),
            ),
            StopLossUsdt => number(
                "stopLossUSDT", &[("TRADING", "stop_loss_usdt")],
                FieldKind::Decimal, Domain::NonPositive, true, dec!(0),
            ),
            TakeProfitUsdt => number(
                "takeProfitUSDT", &[("TRADING", "take_profit_usdt")],
                FieldKind::Decimal, Domain::NonNegative, false, dec!(0),
            ),
            CycleSleepSeconds => number(
                "cycleSleepSeconds", &[("TRADING", "cycle_sleep_seconds")],
                FieldKind::Integer, Domain::ZeroOrAtLeast(dec!(5)), false, dec!(0),
            ),
            OrderTimeoutSeconds => number(
                "orderTimeoutSeconds", &[("TRADING", "order_timeout_seconds")],
                FieldKind::Integer, Domain::Positive, false, dec!(60),
            ),
        }
    }

    pub fn wire_key(self) -> &'static str {
        self.rule().wire_key
    }

    /// Resolves a field from its wire key or remote key, ignoring case.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        ALL_FIELDS.into_iter().find(|field| {
            let rule = field.rule();
            rule.wire_key.eq_ignore_ascii_case(key)
                || rule.remote.iter().any(|(_, k)| k.eq_ignore_ascii_case(key))
        })
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_key())
    }
}

impl FieldRule {
    /// Projects a remote value: used when present, coercible and in domain,
    /// otherwise the default.
    pub fn project(&self, raw: Option<&Value>) -> FieldValue {
        let candidate = match (self.kind, raw) {
            (_, None) | (_, Some(Value::Null)) => None,
            (FieldKind::Text, Some(Value::String(s))) => Some(self.canonical_text(s)),
            (FieldKind::Text, Some(Value::Number(n))) => Some(self.canonical_text(&n.to_string())),
            (_, Some(Value::Number(n))) => parse_decimal(&n.to_string()).and_then(|d| self.shape_number(d)),
            (_, Some(Value::String(s))) => parse_decimal(s).and_then(|d| self.shape_number(d)),
            _ => None,
        };

        match candidate {
            Some(value) if self.accepts(&value) => value,
            _ => self.default.clone(),
        }
    }

    /// In domain and representable as the JSON number the backend expects.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        self.domain.contains(value) && self.encode(value).is_some()
    }

    /// Wire form of a value. `None` for pending values and for numbers that
    /// do not fit the field's JSON representation.
    pub fn encode(&self, value: &FieldValue) -> Option<Value> {
        match (self.kind, value) {
            (_, FieldValue::Text(s)) => Some(Value::String(s.clone())),
            (FieldKind::Integer, FieldValue::Number(d)) => d.to_i64().map(Value::from),
            (_, FieldValue::Number(d)) => d
                .to_f64()
                .filter(|f| f.is_finite())
                .map(Value::from),
            (_, FieldValue::Empty) | (_, FieldValue::Minus) => None,
        }
    }

    /// Checks the shape of an operator edit. Range checks happen on save so
    /// that partially typed values (`3` on the way to `30`) are accepted.
    pub fn parse_edit(&self, input: &str) -> Result<FieldValue, EditRejection> {
        let field = self.wire_key;

        if self.kind == FieldKind::Text {
            if self.domain == Domain::Mode {
                return TradingMode::from_str(input)
                    .map(|mode| FieldValue::Text(mode.as_str().to_string()))
                    .map_err(|_| EditRejection::InvalidMode { field });
            }
            return Ok(FieldValue::Text(input.to_string()));
        }

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(FieldValue::Empty);
        }
        if trimmed == "-" {
            return if self.allows_negative {
                Ok(FieldValue::Minus)
            } else {
                Err(EditRejection::NegativeNotAllowed { field })
            };
        }

        let value = parse_decimal(trimmed).ok_or_else(|| EditRejection::NotANumber {
            field,
            input: input.to_string(),
        })?;
        if value.is_sign_negative() && !value.is_zero() && !self.allows_negative {
            return Err(EditRejection::NegativeNotAllowed { field });
        }
        self.shape_number(value)
            .ok_or(EditRejection::NotAnInteger { field })
    }

    /// Final coercion before transmission: canonicalizes text and replaces
    /// anything outside the domain with `last_valid`, or the default when
    /// that is unusable too.
    pub fn coerce_for_save(&self, value: &FieldValue, last_valid: &FieldValue) -> FieldValue {
        let candidate = match value {
            FieldValue::Text(s) => self.canonical_text(s),
            other => other.clone(),
        };

        if self.accepts(&candidate) {
            candidate
        } else if self.accepts(last_valid) {
            last_valid.clone()
        } else {
            self.default.clone()
        }
    }

    fn canonical_text(&self, raw: &str) -> FieldValue {
        let text = match self.domain {
            Domain::Symbols => normalize_symbols(raw),
            Domain::Mode => raw.trim().to_lowercase(),
            Domain::Interval => raw.trim().to_string(),
            _ => raw.to_string(),
        };
        FieldValue::Text(text)
    }

    fn shape_number(&self, value: Decimal) -> Option<FieldValue> {
        let value = value.normalize();
        match self.kind {
            FieldKind::Integer if !value.fract().is_zero() => None,
            _ => Some(FieldValue::Number(value)),
        }
    }
}
