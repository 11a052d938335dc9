use super::{metrics, ui};
use crate::core::balance::{self, ExchangeBalanceReport};
use crate::core::history::HistoryStore;
use crate::exchanges::BalanceAggregator;
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

/// One table row per asset; failed exchanges show their error in place of assets.
pub fn render_reports(reports: &[ExchangeBalanceReport]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Exchange"),
        ui::header_cell("Asset"),
        ui::header_cell("Free"),
        ui::header_cell("Locked"),
        ui::header_cell("Total"),
        ui::header_cell("Value (USD)"),
    ]);

    for report in reports {
        if let Some(error) = &report.error {
            table.add_row(vec![
                Cell::new(&report.exchange),
                Cell::new(ui::style_text(error, ui::StyleType::Error)),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
                ui::na_cell(true),
            ]);
            continue;
        }

        if report.balances.is_empty() {
            table.add_row(vec![
                Cell::new(&report.exchange),
                Cell::new(ui::style_text("No balances", ui::StyleType::Subtle)),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
                ui::usd_cell(report.total_usd),
            ]);
            continue;
        }

        for (i, asset) in report.balances.iter().enumerate() {
            let exchange = if i == 0 { report.exchange.as_str() } else { "" };
            // The exchange subtotal goes on its first row.
            let value = if i == 0 {
                ui::usd_cell(report.total_usd)
            } else {
                Cell::new("")
            };
            table.add_row(vec![
                Cell::new(exchange),
                Cell::new(&asset.asset),
                Cell::new(ui::format_amount(asset.free)).set_alignment(CellAlignment::Right),
                Cell::new(ui::format_amount(asset.locked)).set_alignment(CellAlignment::Right),
                Cell::new(ui::format_amount(asset.total)).set_alignment(CellAlignment::Right),
                value,
            ]);
        }
    }

    let total = balance::total_usd(reports);
    let failed = reports.iter().filter(|r| r.is_error()).count();

    let mut output = format!(
        "{}\n\n",
        ui::style_text("Balances", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    output.push_str(&format!(
        "\n\n{}: {}",
        ui::style_text("Total (USD)", ui::StyleType::TotalLabel),
        ui::style_text(&ui::format_usd(total), ui::StyleType::TotalValue)
    ));
    if failed > 0 {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                &format!("{failed} account(s) could not be fetched and are excluded"),
                ui::StyleType::Error
            )
        ));
    }
    output
}

pub async fn run(
    aggregator: &BalanceAggregator,
    history: &HistoryStore,
    record: bool,
) -> Result<()> {
    let pb = ui::new_spinner("Fetching balances...");
    let reports = aggregator.get_all_balances().await;
    pb.finish_and_clear();

    println!("{}", render_reports(&reports));

    if record {
        let snapshots = history.save_snapshot(
            balance::total_usd(&reports),
            balance::per_exchange_usd(&reports),
        )?;
        println!(
            "\n{}",
            ui::style_text("Snapshot recorded", ui::StyleType::Subtle)
        );
        if let Some(output) = metrics::render_metrics(&snapshots) {
            ui::print_separator();
            println!("{output}");
        }
    }
    Ok(())
}
