use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::types::SymbolStatus;

const STATUS_KEY: &str = "status_cache";

/// Durable slot for the last successfully polled `statuses` array.
pub struct StatusCache {
    db: Option<sled::Db>,
}

impl StatusCache {
    /// Opens the cache at `path`. A cache that cannot be opened is replaced
    /// by a disabled one.
    pub fn open(path: &Path) -> Self {
        match sled::open(path) {
            Ok(db) => {
                debug!(path = %path.display(), "Status cache opened");
                Self { db: Some(db) }
            }
            Err(e) => {
                warn!(path = %path.display(), "Status cache unavailable, continuing without it: {}", e);
                Self::disabled()
            }
        }
    }

    #[cfg(test)]
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db: Some(db) })
    }

    pub fn disabled() -> Self {
        Self { db: None }
    }

    /// Last stored statuses, or an empty list when nothing usable is stored.
    pub fn load(&self) -> Vec<SymbolStatus> {
        let Some(db) = &self.db else {
            return Vec::new();
        };

        match db.get(STATUS_KEY) {
            Ok(Some(bytes)) => parse_cached(&bytes),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read status cache: {}", e);
                Vec::new()
            }
        }
    }

    pub fn store(&self, statuses: &[SymbolStatus]) -> Result<()> {
        let Some(db) = &self.db else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(statuses)?;
        db.insert(STATUS_KEY, bytes)?;
        db.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn store_raw(&self, bytes: &[u8]) -> Result<()> {
        if let Some(db) = &self.db {
            db.insert(STATUS_KEY, bytes)?;
        }
        Ok(())
    }
}

/// Accepts only a JSON array whose every element is an object.
pub fn parse_cached(bytes: &[u8]) -> Vec<SymbolStatus> {
    let items = match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Array(items)) if items.iter().all(Value::is_object) => items,
        Ok(_) => {
            warn!("Ignoring status cache: not a list of objects");
            return Vec::new();
        }
        Err(e) => {
            warn!("Ignoring unreadable status cache: {}", e);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<SymbolStatus>(item) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Skipping malformed status cache entry: {}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderRef;
    use rust_decimal_macros::dec;

    fn sample() -> Vec<SymbolStatus> {
        vec![SymbolStatus {
            symbol: "BTCUSDT".into(),
            state: Some("IN_POSITION".into()),
            current_pnl: Some(dec!(12.5)),
            cumulative_pnl: Some(dec!(-3)),
            pending_entry_order_id: None,
            pending_exit_order_id: None,
            last_error: None,
        }]
    }

    #[test]
    fn test_store_then_load() {
        let cache = StatusCache::temporary().unwrap();
        assert!(cache.load().is_empty());

        cache.store(&sample()).unwrap();
        assert_eq!(cache.load(), sample());

        cache.store(&[]).unwrap();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn test_structurally_invalid_cache_is_empty() {
        let cache = StatusCache::temporary().unwrap();

        cache.store_raw(br#"{"symbol": "BTCUSDT"}"#).unwrap();
        assert!(cache.load().is_empty());

        cache.store_raw(br#"[{"symbol": "BTCUSDT"}, 3]"#).unwrap();
        assert!(cache.load().is_empty());

        cache.store_raw(b"not json").unwrap();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn test_parse_cached_tolerates_sparse_entries() {
        let parsed = parse_cached(br#"[{"symbol": "ETHUSDT"}, {}]"#);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].symbol, "ETHUSDT");
        assert_eq!(parsed[1].state, None);
    }

    #[test]
    fn test_parse_cached_keeps_entries_with_odd_fields() {
        let parsed = parse_cached(
            br#"[{"symbol": null, "pnl": "N/A"}, {"symbol": "ETHUSDT", "pending_entry_order_id": 12.0, "realized_pnl": "1.25"}]"#,
        );
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].symbol, "");
        assert_eq!(parsed[0].current_pnl, None);
        assert_eq!(parsed[1].pending_entry_order_id, Some(OrderRef::Numeric(12)));
        assert_eq!(parsed[1].cumulative_pnl, Some(dec!(1.25)));
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let cache = StatusCache::disabled();
        cache.store(&sample()).unwrap();
        assert!(cache.load().is_empty());
    }

    #[test]
    fn test_unopenable_path_degrades_to_disabled() {
        let file = std::env::temp_dir().join(format!("fleet-console-cache-{}", std::process::id()));
        std::fs::write(&file, b"not a directory").unwrap();

        let cache = StatusCache::open(&file.join("db"));
        cache.store(&sample()).unwrap();
        assert!(cache.load().is_empty());

        let _ = std::fs::remove_file(&file);
    }
}
