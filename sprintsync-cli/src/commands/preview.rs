//! `sprintsync preview`: inspect how the sheet maps before syncing.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use sprintsync_clients::{HttpSheetSource, SheetSource};
use sprintsync_core::config::sheet_csv_url;
use sprintsync_sheet::{map_rows, parse_csv, preview, SheetPreview};

/// Arguments for `sprintsync preview`.
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// CSV export URL; defaults to `SHEET_CSV_URL` or the published sheet.
    #[arg(long)]
    pub url: Option<String>,

    /// Number of fields to list, most populated first.
    #[arg(long, default_value_t = 25)]
    pub top: usize,

    /// Number of mapped rows to print.
    #[arg(long, default_value_t = 2)]
    pub sample: usize,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "field")]
    field: String,
    #[tabled(rename = "filled")]
    filled: usize,
    #[tabled(rename = "coverage")]
    coverage: String,
}

impl PreviewArgs {
    pub fn run(self) -> Result<()> {
        let url = self
            .url
            .clone()
            .unwrap_or_else(|| sheet_csv_url(&|key: &str| std::env::var(key).ok()));
        let source = HttpSheetSource::new(url.clone()).context("invalid sheet URL")?;
        let csv = super::runtime()?
            .block_on(source.fetch_csv())
            .with_context(|| format!("failed to download {url}"))?;

        let table = parse_csv(&csv).context("failed to parse sheet CSV")?;
        let mapped = map_rows(&table.header, &table.rows);
        let summary = preview(&table, &mapped, self.top, self.sample);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }
        print_summary(&summary)
    }
}

fn print_summary(summary: &SheetPreview) -> Result<()> {
    println!(
        "{} {} header columns | {} rows",
        "Sheet".bold(),
        summary.header_columns,
        summary.rows
    );

    if summary.top_fields.is_empty() {
        println!("{}", "No mapped fields.".yellow());
    } else {
        let rows: Vec<FieldRow> = summary
            .top_fields
            .iter()
            .map(|fill| FieldRow {
                field: fill.field.clone(),
                filled: fill.filled,
                coverage: coverage(fill.filled, summary.rows),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for (index, sample) in summary.samples.iter().enumerate() {
        println!("{}", format!("sample {}", index + 1).bright_black());
        println!("{}", serde_json::to_string_pretty(sample)?);
    }
    Ok(())
}

fn coverage(filled: usize, rows: usize) -> String {
    if rows == 0 {
        return "-".to_owned();
    }
    format!("{:.0}%", filled as f64 * 100.0 / rows as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coverage_is_a_rounded_percentage() {
        assert_eq!(coverage(1, 3), "33%");
        assert_eq!(coverage(2, 2), "100%");
        assert_eq!(coverage(0, 0), "-");
    }
}
