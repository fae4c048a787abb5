use super::ui::{self, StyleType};
use crate::core::rebalance::{RebalanceReport, TradeAction};
use crate::core::snapshot::SnapshotEngine;
use anyhow::Result;
use comfy_table::{Cell, Color};

pub async fn run(engine: &SnapshotEngine) -> Result<()> {
    let report = engine.rebalance_suggestions().await?;
    display_report(&report);
    Ok(())
}

fn display_report(report: &RebalanceReport) {
    let currency = report.base_currency.as_str();
    println!(
        "\n{}",
        ui::style_text(
            &format!("Rebalance {} ({})", report.date, ui::format_money(report.total, currency)),
            StyleType::Title
        )
    );

    if report.suggestions.is_empty() {
        println!(
            "{}",
            ui::style_text("All sleeves are within their bands", StyleType::TotalLabel)
        );
    } else {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Sleeve"),
            ui::header_cell("Current"),
            ui::header_cell("Target"),
            ui::header_cell("Drift"),
            ui::header_cell("Band"),
            ui::header_cell("Action"),
            ui::header_cell("Trade value"),
        ]);

        for suggestion in &report.suggestions {
            let action = match suggestion.action() {
                TradeAction::Buy => Cell::new("Buy").fg(Color::Green),
                TradeAction::Sell => Cell::new("Sell").fg(Color::Red),
            };
            table.add_row(vec![
                Cell::new(suggestion.sleeve),
                ui::weight_cell(suggestion.current_weight),
                ui::weight_cell(suggestion.target_weight),
                ui::drift_cell(suggestion.drift, true),
                ui::weight_cell(suggestion.band),
                action,
                ui::money_cell(suggestion.trade_value.abs(), currency),
            ]);
        }
        println!("{table}");
    }

    if !report.unpolicied.is_empty() {
        let names: Vec<&str> = report.unpolicied.iter().map(|s| s.as_str()).collect();
        println!(
            "{} {}",
            ui::style_text("Sleeves without a target:", StyleType::Subtle),
            names.join(", ")
        );
    }
}
