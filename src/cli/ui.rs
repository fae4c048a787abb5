use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::{Decimal, RoundingStrategy};
use std::time::Duration;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    TotalLabel,
    TotalValue,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::TotalLabel => style(text).bold(),
        StyleType::TotalValue => style(text).green().bold(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn format_money(value: Decimal, currency: &str) -> String {
    format!("{:.2} {}", round2(value), currency)
}

pub fn format_weight(weight: Decimal) -> String {
    format!("{:.2}%", round2(weight * Decimal::ONE_HUNDRED))
}

pub fn money_cell(value: Decimal, currency: &str) -> Cell {
    Cell::new(format_money(value, currency)).set_alignment(CellAlignment::Right)
}

pub fn weight_cell(weight: Decimal) -> Cell {
    Cell::new(format_weight(weight)).set_alignment(CellAlignment::Right)
}

/// Signed weight difference, green when under target and red when over.
pub fn drift_cell(drift: Decimal, out_of_band: bool) -> Cell {
    let text = format!("{:+.2} pp", round2(drift * Decimal::ONE_HUNDRED));
    let cell = Cell::new(text).set_alignment(CellAlignment::Right);
    match (out_of_band, drift.is_sign_negative()) {
        (false, _) => cell,
        (true, true) => cell.fg(Color::Green).add_attribute(Attribute::Bold),
        (true, false) => cell.fg(Color::Red).add_attribute(Attribute::Bold),
    }
}

/// Creates a cell for "N/A" values, with error-specific styling.
pub fn na_cell(has_error: bool) -> Cell {
    let color = if has_error {
        Color::Red
    } else {
        Color::DarkGrey
    };
    Cell::new("N/A").fg(color)
}

/// Creates a spinner for work of unknown length.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed_precise}]") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
