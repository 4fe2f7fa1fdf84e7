//! Spreadsheet export handling for `sprintsync-sheet`.
//!
//! [`parse_csv`] splits exported CSV text into a header and data rows,
//! [`map_rows`] turns those rows into [`CanonicalRow`]s, and [`preview`]
//! summarises how well each canonical field is populated.

mod error;
pub mod mapper;
mod parse;
pub mod preview;

pub use error::SheetError;
pub use mapper::{is_empty_value, map_rows, NO_FIELD_SENTINEL};
pub use parse::{parse_csv, SheetTable};
pub use preview::{preview, FieldFill, SheetPreview};

pub use sprintsync_core::CanonicalRow;

/// Parse exported CSV text and map every data row.
pub fn load_rows(csv_text: &str) -> Result<Vec<CanonicalRow>, SheetError> {
    let table = parse_csv(csv_text)?;
    Ok(map_rows(&table.header, &table.rows))
}
