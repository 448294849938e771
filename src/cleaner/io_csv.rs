// Primitives for reading and writing CSV tables.

use log::debug;
use snafu::prelude::*;

use survey_cleaning::Table;

use crate::cleaner::{
    CleanResult, CleaningSnafu, CsvLineParseSnafu, EmptyInputSnafu, InputNotFoundSnafu,
    OutputCsvSnafu, OutputIoSnafu,
};

/// Reads a delimited table. Every cell is kept as text; nothing is coerced
/// to a number, so token-like strings survive the round trip unchanged. The
/// first record defines the column labels.
pub fn read_table(path: &str) -> CleanResult<Table> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .context(InputNotFoundSnafu { path })?;
    let mut records = rdr.into_records();

    let header = match records.next() {
        Some(r) => r.context(CsvLineParseSnafu { path, lineno: 1usize })?,
        None => return EmptyInputSnafu { path }.fail(),
    };
    let columns: Vec<String> = header.iter().map(|s| s.to_string()).collect();
    debug!("read_table: {:?} columns: {:?}", path, columns);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, record) in records.enumerate() {
        // Line 1 is the header.
        let lineno = idx + 2;
        let record = record.context(CsvLineParseSnafu { path, lineno })?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    debug!("read_table: {:?} rows: {:?}", path, rows.len());

    Table::from_records(columns, rows).context(CleaningSnafu)
}

/// Serializes the header and every surviving row to a new CSV file.
pub fn write_table(table: &Table, path: &str) -> CleanResult<()> {
    let mut wtr = csv::WriterBuilder::new()
        .from_path(path)
        .context(OutputCsvSnafu { path })?;
    wtr.write_record(table.columns())
        .context(OutputCsvSnafu { path })?;
    for row in table.rows() {
        wtr.write_record(row.cells())
            .context(OutputCsvSnafu { path })?;
    }
    wtr.flush().context(OutputIoSnafu { path })?;
    Ok(())
}
