use std::fmt::Write;

use crate::config::{ConfigField, FieldValue, LocalConfig};
use crate::engine::{FleetBelief, PollState, PollView};
use crate::notifications::Notice;
use crate::types::{StateCategory, SymbolStatus};

const TABLE_WIDTH: usize = 96;

fn category_marker(category: StateCategory) -> &'static str {
    match category {
        StateCategory::InPosition => "●",
        StateCategory::Error => "✖",
        StateCategory::Waiting => "…",
        StateCategory::Inactive => "○",
        StateCategory::Unknown => "?",
    }
}

fn optional<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

fn money(value: Option<rust_decimal::Decimal>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

fn status_row(status: &SymbolStatus) -> String {
    let category = status.category();
    format!(
        "{:<12} {} {:<20} {:>12} {:>12} {:>12} {:>12}  {}",
        status.symbol,
        category_marker(category),
        status.state.as_deref().unwrap_or("N/A"),
        money(status.current_pnl),
        money(status.cumulative_pnl),
        optional(&status.pending_entry_order_id),
        optional(&status.pending_exit_order_id),
        status.last_error.as_deref().unwrap_or(""),
    )
}

/// Fleet status table with the freshness banner and active notices.
pub fn render_status(view: &PollView, belief: FleetBelief, notices: &[Notice]) -> String {
    let mut out = String::new();

    let freshness = match (view.state, view.snapshot.fetched_at) {
        (PollState::Fresh, Some(at)) => format!("{} (as of {})", view.state, at.format("%H:%M:%S")),
        (PollState::Stale, _) if view.snapshot.fetched_at.is_none() => {
            format!("{} (cached from a previous session)", view.state)
        }
        (state, _) => state.to_string(),
    };
    let _ = writeln!(out, "=== Fleet: {} | Data: {} ===", belief, freshness);

    if let Some(error) = &view.last_error {
        let _ = writeln!(out, "Last poll failed ({} error): {}", error.kind().label(), error);
    }

    if view.state == PollState::NoData {
        let _ = writeln!(out, "No status data available yet.");
    } else if view.snapshot.is_empty() {
        let _ = writeln!(out, "The backend reports no symbols.");
    } else {
        let _ = writeln!(
            out,
            "{:<12}   {:<20} {:>12} {:>12} {:>12} {:>12}  {}",
            "Symbol", "State", "Open PnL", "Realized", "Entry order", "Exit order", "Error"
        );
        let _ = writeln!(out, "{}", "-".repeat(TABLE_WIDTH));

        for status in view.snapshot.keyed() {
            let _ = writeln!(out, "{}", status_row(status));
        }

        let totals = view.snapshot.totals();
        let _ = writeln!(out, "{}", "-".repeat(TABLE_WIDTH));
        let _ = writeln!(
            out,
            "{:<35} {:>12.2} {:>12.2}",
            "Total", totals.open_pnl, totals.realized_pnl
        );
    }

    for notice in notices {
        let _ = writeln!(out, "[{}] {}", notice.severity.label(), notice.message);
    }

    out
}

/// The edit form, one field per line, secrets masked.
pub fn render_config(config: &LocalConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Fleet Configuration ===");

    for (field, value) in config.iter() {
        let shown = match (field, value) {
            (ConfigField::ApiKey | ConfigField::ApiSecret, FieldValue::Text(s)) if !s.is_empty() => {
                mask(s)
            }
            _ => value.to_string(),
        };
        let _ = writeln!(out, "{:<22} {}", field.wire_key(), shown);
    }

    let _ = writeln!(
        out,
        "{:<22} {}s",
        "(effective sleep)",
        config.effective_cycle_sleep().as_secs()
    );
    out
}

fn mask(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}
