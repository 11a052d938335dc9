use super::ui;
use crate::core::history::{BalanceSnapshot, HistoryStore, TimeRange};
use anyhow::Result;
use comfy_table::Cell;
use std::collections::BTreeSet;

/// Date, total and one column per exchange label seen in the range.
pub fn render_history(snapshots: &[BalanceSnapshot], range: TimeRange) -> String {
    let title = ui::style_text(&format!("Balance history ({range})"), ui::StyleType::Title);
    if snapshots.is_empty() {
        return format!(
            "{title}\n\n{}",
            ui::style_text("No snapshots recorded in this range", ui::StyleType::Subtle)
        );
    }

    let labels: BTreeSet<&str> = snapshots
        .iter()
        .flat_map(|s| s.per_exchange.keys().map(String::as_str))
        .collect();

    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Date"), ui::header_cell("Total (USD)")];
    header.extend(labels.iter().map(|l| ui::header_cell(l)));
    table.set_header(header);

    for snapshot in snapshots {
        let mut row = vec![
            Cell::new(snapshot.timestamp.format("%Y-%m-%d").to_string()),
            ui::usd_cell(snapshot.total_usd),
        ];
        row.extend(labels.iter().map(|label| match snapshot.per_exchange.get(*label) {
            Some(value) => ui::usd_cell(*value),
            None => ui::na_cell(false),
        }));
        table.add_row(row);
    }

    format!("{title}\n\n{table}")
}

pub fn run(history: &HistoryStore, range: TimeRange) -> Result<()> {
    let snapshots = history.get_history(range)?;
    println!("{}", render_history(&snapshots, range));
    Ok(())
}
