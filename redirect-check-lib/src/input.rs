//! Reading the input CSV into rows.
//!
//! The whole file is read before the pipeline starts. Records of any width are
//! accepted here; the schema check happens in the dispatcher so that short
//! rows are skipped and logged in one place.

use crate::error::{RedirectCheckError, RowError};
use crate::schema::Row;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Parse CSV data into rows. The first record is treated as the header and skipped.
pub fn read_rows<R: Read>(reader: R) -> Vec<Result<Row, RowError>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        match result {
            Ok(record) => {
                let line = record.position().map_or(0, |p| p.line());
                rows.push(Ok(Row::new(
                    line,
                    record.iter().map(str::to_string).collect(),
                )));
            }
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                // An I/O error leaves the reader in an unknown state
                let fatal = matches!(e.kind(), csv::ErrorKind::Io(_));
                rows.push(Err(RowError::Parse {
                    line,
                    message: e.to_string(),
                }));
                if fatal {
                    break;
                }
            }
        }
    }
    rows
}

/// Open and parse the input file. Failing to open it is fatal for the run.
pub fn read_rows_from_path<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<Result<Row, RowError>>, RedirectCheckError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        RedirectCheckError::input(
            path.to_string_lossy(),
            format!("Failed to open input file: {}", e),
        )
    })?;

    let rows = read_rows(file);
    tracing::info!(path = %path.display(), rows = rows.len(), "input file read");
    Ok(rows)
}
