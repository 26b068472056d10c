use rust_decimal::Decimal;
use std::str::FromStr;

/// Floor applied to every derived cycle sleep.
const MIN_DERIVED_SLEEP_SECS: u64 = 60;

/// Normalizes a free-text symbol list into the comma-joined wire form.
///
/// Entries are trimmed and upper-cased, blanks are dropped. Order and
/// duplicates are preserved.
pub fn normalize_symbols(raw: &str) -> String {
    split_symbols(raw).join(",")
}

pub fn split_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses plain or scientific decimal notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Paper,
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }
}

impl FromStr for TradingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => Err(format!("unknown trading mode '{}'", other)),
        }
    }
}

/// Kline intervals the workers accept for RSI calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFrame {
    M1,   // 1 minute
    M3,   // 3 minutes
    M5,   // 5 minutes
    M15,  // 15 minutes
    M30,  // 30 minutes
    H1,   // 1 hour
    H2,   // 2 hours
    H4,   // 4 hours
    H6,   // 6 hours
    H8,   // 8 hours
    H12,  // 12 hours
    D1,   // 1 day
    D3,   // 3 days
    W1,   // 1 week
    MN1,  // 1 month
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::M1 => "1m",
            TimeFrame::M3 => "3m",
            TimeFrame::M5 => "5m",
            TimeFrame::M15 => "15m",
            TimeFrame::M30 => "30m",
            TimeFrame::H1 => "1h",
            TimeFrame::H2 => "2h",
            TimeFrame::H4 => "4h",
            TimeFrame::H6 => "6h",
            TimeFrame::H8 => "8h",
            TimeFrame::H12 => "12h",
            TimeFrame::D1 => "1d",
            TimeFrame::D3 => "3d",
            TimeFrame::W1 => "1w",
            TimeFrame::MN1 => "1M",
        }
    }

    fn all() -> [TimeFrame; 15] {
        [
            TimeFrame::M1,
            TimeFrame::M3,
            TimeFrame::M5,
            TimeFrame::M15,
            TimeFrame::M30,
            TimeFrame::H1,
            TimeFrame::H2,
            TimeFrame::H4,
            TimeFrame::H6,
            TimeFrame::H8,
            TimeFrame::H12,
            TimeFrame::D1,
            TimeFrame::D3,
            TimeFrame::W1,
            TimeFrame::MN1,
        ]
    }

    /// Exact, case-sensitive match (`1m` and `1M` are different intervals).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::all().into_iter().find(|tf| tf.as_str() == s)
    }
}

/// Sleep the workers use between cycles when no explicit value is configured.
///
/// Minutes and hours map to their length in seconds with a 60s floor; any
/// other unit or a malformed interval falls back to 60s. The unit letter is
/// matched case-insensitively, so `1M` behaves like `1m` here.
pub fn derived_cycle_sleep_secs(interval: &str) -> u64 {
    let interval = interval.trim();
    let Some(unit) = interval.chars().last() else {
        return MIN_DERIVED_SLEEP_SECS;
    };
    let amount = match interval[..interval.len() - unit.len_utf8()].parse::<u64>() {
        Ok(amount) => amount,
        Err(_) => return MIN_DERIVED_SLEEP_SECS,
    };

    match unit.to_ascii_lowercase() {
        'm' => amount.saturating_mul(60).max(MIN_DERIVED_SLEEP_SECS),
        'h' => amount.saturating_mul(3600).max(MIN_DERIVED_SLEEP_SECS),
        _ => MIN_DERIVED_SLEEP_SECS,
    }
}
