use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::trading::parse_decimal;

/// Exchange order identifier as reported by a worker. Workers report either
/// the numeric exchange id or a client order id string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OrderRef {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderRef::Numeric(id) => write!(f, "{}", id),
            OrderRef::Text(id) => write!(f, "{}", id),
        }
    }
}

/// One worker's execution state, replaced wholesale on every poll.
///
/// Workers fill these fields loosely, so each one decodes on its own: a value
/// of the wrong type becomes empty instead of failing the whole entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStatus {
    #[serde(default, deserialize_with = "loose_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "loose_text")]
    pub state: Option<String>,
    #[serde(default, alias = "pnl", alias = "open_pnl", deserialize_with = "loose_decimal")]
    pub current_pnl: Option<Decimal>,
    #[serde(default, alias = "realized_pnl", alias = "total_pnl", deserialize_with = "loose_decimal")]
    pub cumulative_pnl: Option<Decimal>,
    #[serde(default, deserialize_with = "loose_order_ref")]
    pub pending_entry_order_id: Option<OrderRef>,
    #[serde(default, deserialize_with = "loose_order_ref")]
    pub pending_exit_order_id: Option<OrderRef>,
    #[serde(default, deserialize_with = "loose_text")]
    pub last_error: Option<String>,
}

fn loose_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(loose_text(deserializer)?.unwrap_or_default())
}

fn loose_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Decimal>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(&s),
        _ => None,
    })
}

fn loose_order_ref<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<OrderRef>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => match n.as_i64() {
            Some(id) => Some(OrderRef::Numeric(id)),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| OrderRef::Numeric(f as i64))
                .or_else(|| Some(OrderRef::Text(n.to_string()))),
        },
        Value::String(s) if !s.trim().is_empty() => Some(OrderRef::Text(s)),
        _ => None,
    })
}

impl SymbolStatus {
    pub fn category(&self) -> StateCategory {
        StateCategory::classify(self.state.as_deref())
    }
}

/// Closed visual taxonomy over the backend's open set of state strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateCategory {
    InPosition,
    Error,
    Waiting,
    Inactive,
    Unknown,
}

impl StateCategory {
    pub fn classify(state: Option<&str>) -> Self {
        let Some(raw) = state.map(str::trim).filter(|s| !s.is_empty()) else {
            return StateCategory::Unknown;
        };

        let upper = raw.to_uppercase();
        match upper.as_str() {
            "IN_POSITION" => StateCategory::InPosition,
            "ERROR" => StateCategory::Error,
            "INACTIVE" => StateCategory::Inactive,
            s if s.contains("WAITING") => StateCategory::Waiting,
            _ => StateCategory::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StateCategory::InPosition => "in position",
            StateCategory::Error => "error",
            StateCategory::Waiting => "waiting",
            StateCategory::Inactive => "inactive",
            StateCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Decoded `GET /api/status` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStatus {
    pub bots_running: bool,
    pub statuses: Vec<SymbolStatus>,
}

impl FleetStatus {
    /// A body whose `statuses` is missing or not an array carries no usable
    /// data; the error string describes why.
    pub fn from_json(body: Value) -> Result<Self, String> {
        let Value::Object(mut fields) = body else {
            return Err("status body is not a JSON object".to_string());
        };

        let statuses = match fields.remove("statuses") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err("'statuses' is not an array".to_string()),
            None => return Err("'statuses' is missing".to_string()),
        };

        let bots_running = fields
            .get("bots_running")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if !statuses.iter().all(Value::is_object) {
            return Err("'statuses' holds a non-object entry".to_string());
        }

        let statuses = statuses
            .into_iter()
            .map(serde_json::from_value::<SymbolStatus>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("malformed status entry: {}", e))?;

        Ok(Self { bots_running, statuses })
    }
}

/// One atomic read of every symbol's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub statuses: Vec<SymbolStatus>,
    /// `None` when the snapshot was rehydrated from the durable cache.
    pub bots_running: Option<bool>,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PnlTotals {
    pub open_pnl: Decimal,
    pub realized_pnl: Decimal,
}

impl StatusSnapshot {
    pub fn fetched(status: FleetStatus, at: DateTime<Utc>) -> Self {
        Self {
            statuses: status.statuses,
            bots_running: Some(status.bots_running),
            fetched_at: Some(at),
        }
    }

    pub fn cached(statuses: Vec<SymbolStatus>) -> Self {
        Self {
            statuses,
            bots_running: None,
            fetched_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    /// Entries keyed by symbol. A repeated symbol overwrites the earlier
    /// entry but keeps the position where the symbol first appeared.
    pub fn keyed(&self) -> Vec<&SymbolStatus> {
        let mut slots: HashMap<&str, usize> = HashMap::new();
        let mut rows: Vec<&SymbolStatus> = Vec::with_capacity(self.statuses.len());

        for status in &self.statuses {
            match slots.get(status.symbol.as_str()) {
                Some(&idx) => rows[idx] = status,
                None => {
                    slots.insert(status.symbol.as_str(), rows.len());
                    rows.push(status);
                }
            }
        }

        rows
    }

    pub fn totals(&self) -> PnlTotals {
        self.keyed().into_iter().fold(PnlTotals::default(), |mut acc, s| {
            acc.open_pnl += s.current_pnl.unwrap_or(Decimal::ZERO);
            acc.realized_pnl += s.cumulative_pnl.unwrap_or(Decimal::ZERO);
            acc
        })
    }
}
