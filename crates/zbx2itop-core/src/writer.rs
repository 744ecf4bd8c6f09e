//! CSV output in the layout expected by the iTop CSV import.

use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::io::Write;
use std::path::Path;

use crate::error::{ExportError, Result};
use crate::mapping::Row;

/// Write a header and rows to `writer`. Returns the number of rows written.
pub fn write_rows<W: Write>(
    writer: W,
    columns: &[String],
    rows: &[Row],
    separator: char,
) -> Result<usize> {
    if !separator.is_ascii() {
        return Err(ExportError::Config(format!(
            "separator '{}' is not ASCII",
            separator
        )));
    }
    if matches!(separator, '"' | '\r' | '\n') {
        return Err(ExportError::Config(format!(
            "separator {:?} clashes with CSV quoting or line endings",
            separator
        )));
    }
    let delimiter = separator as u8;

    let mut csv = WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::CRLF)
        .from_writer(writer);

    csv.write_record(columns)?;
    for row in rows {
        csv.write_record(row)?;
    }
    csv.flush()?;
    Ok(rows.len())
}

/// Write a CSV file, replacing any existing file.
pub fn write_csv(path: &Path, columns: &[String], rows: &[Row], separator: char) -> Result<usize> {
    let file = std::fs::File::create(path).map_err(|e| {
        ExportError::Io(format!("failed to create {}: {}", path.display(), e))
    })?;
    let written = write_rows(std::io::BufWriter::new(file), columns, rows, separator)?;
    tracing::info!(path = %path.display(), rows = written, "Wrote CSV");
    Ok(written)
}
