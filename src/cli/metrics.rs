use super::ui;
use crate::core::history::{BalanceSnapshot, HistoryStore, TimeRange};
use crate::core::metrics::{self, MetricWindow};
use anyhow::Result;
use comfy_table::Cell;

fn window_row(name: &str, window: &MetricWindow) -> Vec<Cell> {
    let sign = if window.change.is_sign_negative() && !window.change.is_zero() {
        ""
    } else {
        "+"
    };
    vec![
        Cell::new(name),
        ui::change_cell(
            format!("{sign}{}", ui::format_usd(window.change)),
            window.change,
        ),
        ui::change_cell(
            format!("{sign}{:.2}%", window.percentage.round_dp(2)),
            window.percentage,
        ),
    ]
}

/// `None` when there is no history to compare against.
pub fn render_metrics(history: &[BalanceSnapshot]) -> Option<String> {
    let metrics = metrics::get_metrics(history)?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Window"),
        ui::header_cell("Change (USD)"),
        ui::header_cell("Change (%)"),
    ]);
    table.add_row(window_row("24h", &metrics.daily));
    table.add_row(window_row("7d", &metrics.weekly));
    table.add_row(window_row("30d", &metrics.monthly));

    Some(format!(
        "{}\n\n{table}",
        ui::style_text("Performance", ui::StyleType::Title)
    ))
}

pub fn run(history: &HistoryStore) -> Result<()> {
    let snapshots = history.get_history(TimeRange::Month)?;
    match render_metrics(&snapshots) {
        Some(output) => println!("{output}"),
        None => println!(
            "{}",
            ui::style_text(
                "No snapshots recorded yet. Run `balances --record` first.",
                ui::StyleType::Subtle
            )
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[test]
    fn test_render_metrics() {
        let now = Utc::now();
        let snapshots = vec![
            BalanceSnapshot {
                timestamp: now - Duration::days(1),
                total_usd: dec!(1000),
                per_exchange: BTreeMap::new(),
            },
            BalanceSnapshot {
                timestamp: now,
                total_usd: dec!(900),
                per_exchange: BTreeMap::new(),
            },
        ];

        let output = console::strip_ansi_codes(&render_metrics(&snapshots).unwrap()).to_string();
        assert!(output.contains("24h"));
        assert!(output.contains("-100.00"));
        assert!(output.contains("-10.00%"));
    }

    #[test]
    fn test_render_metrics_empty() {
        assert!(render_metrics(&[]).is_none());
    }
}
