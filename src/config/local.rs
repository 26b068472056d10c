use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use super::fields::{ConfigField, EditRejection, FieldValue, ALL_FIELDS};
use crate::types::{derived_cycle_sleep_secs, split_symbols};

/// Sleep floor for an explicitly configured cycle.
const MIN_EXPLICIT_SLEEP_SECS: u64 = 5;

/// The backend's nested configuration, grouped by section
/// (`BINANCE`, `SYMBOLS`, `TRADING`). Values may be numbers or strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteConfig(pub Map<String, Value>);

impl RemoteConfig {
    pub fn from_json(body: Value) -> Result<Self, String> {
        match body {
            Value::Object(sections) => Ok(Self(sections)),
            _ => Err("configuration body is not a JSON object".to_string()),
        }
    }

    /// Case-insensitive `(section, key)` lookup.
    pub fn lookup(&self, section: &str, key: &str) -> Option<&Value> {
        let (_, block) = self.0.iter().find(|(name, _)| name.eq_ignore_ascii_case(section))?;
        let block = block.as_object()?;
        block
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    }
}

/// Flat JSON body sent to `POST /api/config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigPayload(pub Map<String, Value>);

impl ConfigPayload {
    #[cfg(test)]
    pub fn get(&self, field: ConfigField) -> Option<&Value> {
        self.0.get(field.wire_key())
    }
}

/// Flattened, typed edit form. Every field is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    values: BTreeMap<ConfigField, FieldValue>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            values: ALL_FIELDS
                .into_iter()
                .map(|field| (field, field.rule().default))
                .collect(),
        }
    }
}

impl LocalConfig {
    /// Projects each field independently; a missing or unusable remote
    /// value falls back to that field's default only.
    pub fn from_remote(remote: &RemoteConfig) -> Self {
        let values = ALL_FIELDS
            .into_iter()
            .map(|field| {
                let rule = field.rule();
                let raw = rule
                    .remote
                    .iter()
                    .find_map(|(section, key)| remote.lookup(section, key));
                (field, rule.project(raw))
            })
            .collect();
        Self { values }
    }

    /// Reads a transmitted payload back into form shape.
    #[cfg(test)]
    pub fn from_payload(payload: &ConfigPayload) -> Self {
        let values = ALL_FIELDS
            .into_iter()
            .map(|field| (field, field.rule().project(payload.get(field))))
            .collect();
        Self { values }
    }

    pub fn get(&self, field: ConfigField) -> FieldValue {
        self.values
            .get(&field)
            .cloned()
            .unwrap_or_else(|| field.rule().default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConfigField, &FieldValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    /// Applies one operator edit. A rejected edit leaves the prior value.
    pub fn edit(&mut self, field: ConfigField, input: &str) -> Result<(), EditRejection> {
        let value = field.rule().parse_edit(input)?;
        self.values.insert(field, value);
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.values.values().any(FieldValue::is_pending)
    }

    /// The form as it will be transmitted: text canonicalized, every value
    /// in its domain. Out-of-domain and pending values take the value from
    /// `last_valid`.
    pub fn normalized(&self, last_valid: &LocalConfig) -> LocalConfig {
        let values = ALL_FIELDS
            .into_iter()
            .map(|field| {
                let rule = field.rule();
                let value = rule.coerce_for_save(&self.get(field), &last_valid.get(field));
                (field, value)
            })
            .collect();
        Self { values }
    }

    /// Wire body. A value that cannot be encoded is sent as the field's
    /// default, so no key is ever `null`.
    pub fn to_payload(&self) -> ConfigPayload {
        let mut body = Map::new();
        for field in ALL_FIELDS {
            let rule = field.rule();
            let value = self.get(field);
            let encoded = rule
                .encode(&value)
                .or_else(|| rule.encode(&rule.default));
            match encoded {
                Some(encoded) => {
                    body.insert(rule.wire_key.to_string(), encoded);
                }
                None => warn!(field = rule.wire_key, "Dropping unencodable value from payload"),
            }
        }
        ConfigPayload(body)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.get(ConfigField::Symbols)
            .as_text()
            .map(split_symbols)
            .unwrap_or_default()
    }

    /// Sleep the workers will actually use between cycles.
    pub fn effective_cycle_sleep(&self) -> Duration {
        let explicit = self
            .get(ConfigField::CycleSleepSeconds)
            .as_decimal()
            .and_then(|d| d.to_u64())
            .unwrap_or(0);

        if explicit > 0 {
            return Duration::from_secs(explicit.max(MIN_EXPLICIT_SLEEP_SECS));
        }

        let interval = self.get(ConfigField::RsiInterval);
        Duration::from_secs(derived_cycle_sleep_secs(interval.as_text().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn full_remote() -> RemoteConfig {
        RemoteConfig::from_json(json!({
            "BINANCE": {"api_key": "k", "api_secret": "s", "mode": "live"},
            "SYMBOLS": {"symbols_to_trade": "BTCUSDT,ETHUSDT"},
            "TRADING": {
                "rsi_interval": "15m",
                "rsi_period": 10,
                "rsi_threshold_up": 2.5,
                "rsi_threshold_down": -2,
                "rsi_entry_level_low": 30,
                "volume_sma_period": 30,
                "volume_factor": "1.8",
                "position_size_usdt": 75.5,
                "stop_loss_usdt": -10,
                "take_profit_usdt": 20,
                "cycle_sleep_seconds": 30,
                "order_timeout_seconds": 45
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_from_remote_uses_remote_values() {
        let config = LocalConfig::from_remote(&full_remote());
        assert_eq!(config.get(ConfigField::Mode), FieldValue::Text("live".into()));
        assert_eq!(config.get(ConfigField::Symbols), FieldValue::Text("BTCUSDT,ETHUSDT".into()));
        assert_eq!(config.get(ConfigField::VolumeFactor), FieldValue::Number(dec!(1.8)));
        assert_eq!(config.get(ConfigField::StopLossUsdt), FieldValue::Number(dec!(-10)));
        assert_eq!(config.get(ConfigField::OrderTimeoutSeconds), FieldValue::Number(dec!(45)));
    }

    #[test]
    fn test_from_remote_defaults_each_missing_field_independently() {
        let template = full_remote();
        let trading_keys: Vec<String> = template.0["TRADING"].as_object().unwrap().keys().cloned().collect();

        for dropped in &trading_keys {
            let mut remote = template.clone();
            remote.0["TRADING"].as_object_mut().unwrap().remove(dropped);
            let config = LocalConfig::from_remote(&remote);

            for field in ALL_FIELDS {
                let rule = field.rule();
                let expected = if rule.remote.iter().any(|(_, k)| *k == dropped.as_str()) {
                    rule.default.clone()
                } else {
                    LocalConfig::from_remote(&template).get(field)
                };
                assert_eq!(config.get(field), expected, "dropping {} changed {}", dropped, field);
            }
        }
    }

    #[test]
    fn test_from_remote_defaults_only_dropped_fields_for_every_subset() {
        let template = full_remote();
        let expected_full = LocalConfig::from_remote(&template);
        let candidates = [
            ("BINANCE", "api_key"),
            ("BINANCE", "mode"),
            ("SYMBOLS", "symbols_to_trade"),
            ("TRADING", "rsi_period"),
            ("TRADING", "volume_factor"),
            ("TRADING", "stop_loss_usdt"),
        ];

        for mask in 0u32..(1 << candidates.len()) {
            let dropped: Vec<_> = candidates
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, pair)| *pair)
                .collect();

            let mut remote = template.clone();
            for (section, key) in &dropped {
                remote.0[*section].as_object_mut().unwrap().remove(*key);
            }
            let config = LocalConfig::from_remote(&remote);

            for field in ALL_FIELDS {
                let rule = field.rule();
                let expected = if rule.remote.iter().any(|pair| dropped.contains(pair)) {
                    rule.default.clone()
                } else {
                    expected_full.get(field)
                };
                assert_eq!(config.get(field), expected, "dropping {:?} changed {}", dropped, field);
            }
        }
    }

    #[test]
    fn test_from_remote_missing_section_defaults_its_fields() {
        let template = full_remote();
        let expected_full = LocalConfig::from_remote(&template);

        for section in ["BINANCE", "SYMBOLS", "TRADING"] {
            let mut remote = template.clone();
            remote.0.remove(section);
            let config = LocalConfig::from_remote(&remote);

            for field in ALL_FIELDS {
                let rule = field.rule();
                let still_present = rule
                    .remote
                    .iter()
                    .any(|(s, k)| *s != section && template.lookup(s, k).is_some());
                let expected = if !still_present {
                    rule.default.clone()
                } else {
                    expected_full.get(field)
                };
                assert_eq!(config.get(field), expected, "dropping {} changed {}", section, field);
            }
        }
    }

    #[test]
    fn test_from_remote_empty_and_garbage() {
        assert_eq!(LocalConfig::from_remote(&RemoteConfig::default()), LocalConfig::default());

        let garbage = RemoteConfig::from_json(json!({"TRADING": "oops", "BINANCE": {"mode": 7}})).unwrap();
        assert_eq!(LocalConfig::from_remote(&garbage), LocalConfig::default());
    }

    #[test]
    fn test_lookup_ignores_case() {
        let remote = RemoteConfig::from_json(json!({"trading": {"RSI_PERIOD": "9"}})).unwrap();
        let config = LocalConfig::from_remote(&remote);
        assert_eq!(config.get(ConfigField::RsiPeriod), FieldValue::Number(dec!(9)));
    }

    #[test]
    fn test_rejected_edit_keeps_prior_value() {
        let mut config = LocalConfig::default();
        config.edit(ConfigField::RsiPeriod, "21").unwrap();
        assert!(config.edit(ConfigField::RsiPeriod, "21a").is_err());
        assert_eq!(config.get(ConfigField::RsiPeriod), FieldValue::Number(dec!(21)));
    }

    #[test]
    fn test_minus_is_held_but_never_transmitted() {
        let last_valid = LocalConfig::from_remote(&full_remote());
        let mut config = last_valid.clone();

        config.edit(ConfigField::StopLossUsdt, "-").unwrap();
        assert_eq!(config.get(ConfigField::StopLossUsdt), FieldValue::Minus);
        assert!(config.has_pending());

        let sent = config.normalized(&last_valid).to_payload();
        assert_eq!(sent.get(ConfigField::StopLossUsdt), Some(&json!(-10.0)));

        config.edit(ConfigField::StopLossUsdt, "-7.5").unwrap();
        let sent = config.normalized(&last_valid).to_payload();
        assert_eq!(sent.get(ConfigField::StopLossUsdt), Some(&json!(-7.5)));
    }

    #[test]
    fn test_symbols_normalized_in_payload() {
        let mut config = LocalConfig::default();
        config.edit(ConfigField::Symbols, " ethusdt , adausdt ,,ethusdt").unwrap();
        let payload = config.normalized(&LocalConfig::default()).to_payload();
        assert_eq!(payload.get(ConfigField::Symbols), Some(&json!("ETHUSDT,ADAUSDT,ETHUSDT")));
    }

    #[test]
    fn test_blank_symbol_list_reverts_to_last_valid() {
        let last_valid = LocalConfig::from_remote(&full_remote());
        let mut config = last_valid.clone();
        config.edit(ConfigField::Symbols, " , ").unwrap();
        let normalized = config.normalized(&last_valid);
        assert_eq!(normalized.symbols(), vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let mut config = LocalConfig::from_remote(&full_remote());
        config.edit(ConfigField::Symbols, "solusdt,, btcusdt ").unwrap();
        config.edit(ConfigField::CycleSleepSeconds, "3").unwrap();
        config.edit(ConfigField::RsiThresholdDown, "-").unwrap();
        config.edit(ConfigField::RsiEntryLevelLow, "140").unwrap();
        config.edit(ConfigField::PositionSizeUsdt, "").unwrap();
        config.edit(ConfigField::Mode, "PAPER").unwrap();

        let defaults = LocalConfig::default();
        let once = config.normalized(&defaults);
        let twice = once.normalized(&defaults);
        assert_eq!(once, twice);
        assert!(!once.has_pending());

        let reread = LocalConfig::from_payload(&once.to_payload());
        assert_eq!(reread, once);
        assert_eq!(reread.to_payload(), once.to_payload());
    }

    #[test]
    fn test_oversized_integer_edit_never_sends_null() {
        let mut config = LocalConfig::default();
        config.edit(ConfigField::RsiPeriod, "99999999999999999999999").unwrap();

        let raw = config.to_payload();
        assert_eq!(raw.get(ConfigField::RsiPeriod), Some(&json!(14)));

        let sent = config.normalized(&LocalConfig::default()).to_payload();
        assert_eq!(sent.get(ConfigField::RsiPeriod), Some(&json!(14)));
        assert_eq!(sent.0.len(), ALL_FIELDS.len());
        assert!(sent.0.values().all(|v| !v.is_null()));
    }

    #[test]
    fn test_pending_form_payload_has_no_nulls() {
        let mut config = LocalConfig::default();
        config.edit(ConfigField::StopLossUsdt, "-").unwrap();
        config.edit(ConfigField::VolumeFactor, "").unwrap();

        let payload = config.to_payload();
        assert_eq!(payload.0.len(), ALL_FIELDS.len());
        assert!(payload.0.values().all(|v| !v.is_null()));
        assert_eq!(payload.get(ConfigField::StopLossUsdt), Some(&json!(0.0)));
        assert_eq!(payload.get(ConfigField::VolumeFactor), Some(&json!(1.5)));
    }

    #[test]
    fn test_integer_fields_are_json_integers() {
        let payload = LocalConfig::default().to_payload();
        assert_eq!(payload.get(ConfigField::RsiPeriod), Some(&json!(14)));
        assert_eq!(payload.get(ConfigField::CycleSleepSeconds), Some(&json!(0)));
        assert_eq!(payload.get(ConfigField::RsiThresholdUp), Some(&json!(1.5)));
    }

    #[test]
    fn test_effective_cycle_sleep() {
        let mut config = LocalConfig::default();
        assert_eq!(config.effective_cycle_sleep(), Duration::from_secs(300));

        config.edit(ConfigField::RsiInterval, "1h").unwrap();
        assert_eq!(config.effective_cycle_sleep(), Duration::from_secs(3600));

        config.edit(ConfigField::CycleSleepSeconds, "45").unwrap();
        assert_eq!(config.effective_cycle_sleep(), Duration::from_secs(45));

        config.edit(ConfigField::CycleSleepSeconds, "2").unwrap();
        assert_eq!(config.effective_cycle_sleep(), Duration::from_secs(5));
    }
}
