use crate::SheetError;

/// A CSV export split into its header record and data records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse CSV text. The first record is the header; blank lines are skipped
/// and records may be shorter or longer than the header.
///
/// Returns [`SheetError::NoRows`] when there is no data record after the header.
pub fn parse_csv(text: &str) -> Result<SheetTable, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?.iter().map(str::to_owned).collect::<Vec<_>>(),
        None => return Err(SheetError::NoRows),
    };

    let mut rows = Vec::new();
    for record in records {
        rows.push(record?.iter().map(str::to_owned).collect::<Vec<_>>());
    }
    if rows.is_empty() {
        return Err(SheetError::NoRows);
    }

    Ok(SheetTable { header, rows })
}
