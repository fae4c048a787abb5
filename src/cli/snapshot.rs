use super::positions;
use super::ui::{self, StyleType};
use crate::core::holding::AssetClass;
use crate::core::rebalance::SleeveDrift;
use crate::core::snapshot::{CloseOutcome, SnapshotEngine};
use crate::core::valuation::ValuationSnapshot;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use comfy_table::Cell;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

pub async fn refresh(engine: &SnapshotEngine) -> Result<()> {
    let pb = ui::new_spinner("Fetching prices...");
    let result = engine.refresh().await;
    pb.finish_and_clear();

    display_snapshot(&result?, None);
    Ok(())
}

pub async fn latest(engine: &SnapshotEngine) -> Result<()> {
    let view = engine.latest().await?;
    display_snapshot(&view.snapshot, view.drift.as_deref());
    Ok(())
}

pub async fn close(engine: &SnapshotEngine, date: Option<NaiveDate>, force: bool) -> Result<()> {
    let date = date.unwrap_or_else(|| Utc::now().date_naive());
    let pb = ui::new_spinner(&format!("Closing {date}..."));
    let result = engine.eod_close(date, force).await;
    pb.finish_and_clear();

    let closed = result?;
    let message = match closed.outcome {
        CloseOutcome::Created => format!("Recorded EOD snapshot for {date}"),
        CloseOutcome::Overwritten => format!("Replaced EOD snapshot for {date}"),
        CloseOutcome::Unchanged => {
            format!("EOD snapshot for {date} already exists; use --force to replace it")
        }
    };
    println!("{}", ui::style_text(&message, StyleType::TotalLabel));
    display_snapshot(&closed.snapshot, None);
    Ok(())
}

pub async fn history(engine: &SnapshotEngine, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let snapshots = engine.history(from, to).await?;
    if snapshots.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!("No EOD snapshots between {from} and {to}"),
                StyleType::Subtle
            )
        );
        return Ok(());
    }

    let sleeves: BTreeSet<AssetClass> = snapshots
        .iter()
        .flat_map(|s| s.sleeves.iter().map(|v| v.sleeve))
        .collect();

    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Date"), ui::header_cell("Total")];
    header.extend(sleeves.iter().map(|s| ui::header_cell(s.as_str())));
    header.push(ui::header_cell("Unpriced"));
    table.set_header(header);

    for snapshot in &snapshots {
        let mut row = vec![
            Cell::new(snapshot.date),
            ui::money_cell(snapshot.total, &snapshot.base_currency),
        ];
        row.extend(
            sleeves
                .iter()
                .map(|sleeve| ui::weight_cell(snapshot.weight(*sleeve))),
        );
        row.push(Cell::new(snapshot.unpriced().count()));
        table.add_row(row);
    }

    println!("\n{}", ui::style_text("Valuation History", StyleType::Title));
    println!("{table}");
    Ok(())
}

fn display_snapshot(snapshot: &ValuationSnapshot, drift: Option<&[SleeveDrift]>) {
    let currency = snapshot.base_currency.as_str();
    let title = format!("Valuation {} ({})", snapshot.date, snapshot.kind);
    println!("\n{}", ui::style_text(&title, StyleType::Title));

    println!("{}", positions::positions_table(snapshot));

    let mut sleeves = ui::new_styled_table();
    let mut header = vec![
        ui::header_cell("Sleeve"),
        ui::header_cell("Value"),
        ui::header_cell("Weight"),
    ];
    if drift.is_some() {
        header.push(ui::header_cell("Target"));
        header.push(ui::header_cell("Drift"));
    }
    sleeves.set_header(header);

    for sleeve in &snapshot.sleeves {
        let mut row = vec![
            Cell::new(sleeve.sleeve),
            ui::money_cell(sleeve.value, currency),
            ui::weight_cell(sleeve.weight),
        ];
        if let Some(drift) = drift {
            match drift.iter().find(|d| d.sleeve == sleeve.sleeve) {
                Some(d) => {
                    row.push(ui::weight_cell(d.target_weight));
                    row.push(ui::drift_cell(d.drift, d.out_of_band()));
                }
                None => {
                    row.push(ui::na_cell(false));
                    row.push(ui::na_cell(false));
                }
            }
        }
        sleeves.add_row(row);
    }
    // Policy sleeves the portfolio holds nothing in
    if let Some(drift) = drift {
        for d in drift.iter().filter(|d| snapshot.sleeve(d.sleeve).is_none()) {
            sleeves.add_row(vec![
                Cell::new(d.sleeve),
                ui::money_cell(Decimal::ZERO, currency),
                ui::weight_cell(d.current_weight),
                ui::weight_cell(d.target_weight),
                ui::drift_cell(d.drift, d.out_of_band()),
            ]);
        }
    }
    println!("{sleeves}");

    println!(
        "{} {}",
        ui::style_text("Total:", StyleType::TotalLabel),
        ui::style_text(&ui::format_money(snapshot.total, currency), StyleType::TotalValue)
    );

    let unpriced: Vec<_> = snapshot.unpriced().collect();
    if !unpriced.is_empty() {
        println!(
            "\n{}",
            ui::style_text(
                &format!("{} holding(s) excluded from the total:", unpriced.len()),
                StyleType::Error
            )
        );
        for holding in unpriced {
            if let Some(reason) = holding.unpriced_reason() {
                println!(
                    "  {} {}",
                    holding.instrument,
                    ui::style_text(&reason.to_string(), StyleType::Subtle)
                );
            }
        }
    }
}
