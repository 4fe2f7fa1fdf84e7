use thiserror::Error;

/// Errors from reading a spreadsheet export.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("no rows found in CSV")]
    NoRows,

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),
}
