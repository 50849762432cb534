use serde_json::Value;
use comfy_table::{Table, Cell, ContentArrangement, Attribute, CellAlignment};
use colored::*;

use crate::fileserver::Catalog;
use crate::publish::{PublishReport, StepOutcome};

fn header(text: &str) -> Cell {
    Cell::new(text).fg(comfy_table::Color::Cyan).add_attribute(Attribute::Bold)
}

fn field(record: &Value, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "-".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Builds the catalog table, one row per asset in name order.
pub fn catalog_table(catalog: &Catalog) -> Table {
    let mut table = Table::new();
    table
        .set_header(vec![header("Name"), header("Source"), header("Scale"), header("URL")])
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (name, record) in catalog {
        table.add_row(vec![
            Cell::new(name).fg(comfy_table::Color::Green),
            Cell::new(field(record, "source")).fg(comfy_table::Color::Yellow).set_alignment(CellAlignment::Center),
            Cell::new(field(record, "scale")).fg(comfy_table::Color::White).set_alignment(CellAlignment::Right),
            Cell::new(field(record, "url")).fg(comfy_table::Color::DarkGrey),
        ]);
    }
    table
}

/// Prints the published assets.
pub fn display_catalog(catalog: &Catalog) {
    if catalog.is_empty() {
        println!("{}", "No assets published yet".yellow());
        return;
    }
    println!("\n{}", catalog_table(catalog));
    println!("{}", format!("Total assets: {}", catalog.len()).bright_green());
}

fn describe(step: &str, outcome: &StepOutcome) -> ColoredString {
    match outcome {
        StepOutcome::Succeeded(status) => format!("{} succeeded ({})", step, status).green(),
        StepOutcome::Failed { status, body } if body.trim().is_empty() => {
            format!("{} failed ({})", step, status).red()
        }
        StepOutcome::Failed { status, body } => {
            format!("{} failed ({}): {}", step, status, body.trim()).red()
        }
        StepOutcome::Skipped => format!("{} skipped", step).bright_black(),
    }
}

/// Prints the per-step result of a publish run.
pub fn display_report(report: &PublishReport) {
    println!("{}", format!("Asset '{}'", report.asset_name).bold());
    println!("  {}", describe("Upload", &report.upload));
    println!("  {}", describe("Metadata publish", &report.metadata));
    if report.upload.succeeded() && !report.metadata.succeeded() {
        println!(
            "  {}",
            "The archive is live on the server but not listed in the catalog".yellow()
        );
    }
}
