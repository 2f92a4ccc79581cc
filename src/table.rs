//! In-memory raw table plus loaders for the file formats sources publish.
//!
//! A [`RawTable`] is the unit of work the transform pipeline operates on:
//! ordered column names and string-valued rows. Loaders exist for CSV, XLSX,
//! and HTML tables; a failure to read the file at all is [`Error::Parsing`].
//! Individual cell weirdness is not an error here; cells are kept verbatim
//! and the typed parsers decide what they mean.

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Column-ordered table of string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names in file order. Renames keep this in sync with row keys.
    pub columns: Vec<String>,
    /// One map per row; a column absent from the map reads as missing.
    pub rows: Vec<HashMap<String, String>>,
}

impl RawTable {
    /// Build a table from a header and rows of cells. Rows shorter than the
    /// header are padded with missing cells; longer rows are truncated.
    pub fn from_rows(header: Vec<String>, data: Vec<Vec<String>>) -> Self {
        let rows = data
            .into_iter()
            .map(|cells| {
                header
                    .iter()
                    .cloned()
                    .zip(cells)
                    .filter(|(_, v)| !v.is_empty())
                    .collect()
            })
            .collect();
        Self {
            columns: header,
            rows,
        }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rename a column everywhere it appears. A missing column is a no-op.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        let mut present = false;
        for col in &mut self.columns {
            if col == from {
                *col = to.to_string();
                present = true;
            }
        }
        if !present {
            return;
        }
        for row in &mut self.rows {
            if let Some(v) = row.remove(from) {
                row.insert(to.to_string(), v);
            }
        }
    }

    /// Ensure a column exists in the header without touching row data.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    /// Read a cell; empty strings read as missing.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Write a cell, creating the column if needed.
    pub fn set(&mut self, row: usize, column: &str, value: String) {
        self.ensure_column(column);
        if let Some(r) = self.rows.get_mut(row) {
            r.insert(column.to_string(), value);
        }
    }

    /// Drop rows where every cell is empty or whitespace.
    pub fn drop_empty_rows(&mut self) {
        self.rows
            .retain(|row| row.values().any(|v| !v.trim().is_empty()));
    }
}

/// File format hint for [`read_artifact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    Csv,
    Xlsx,
    Html,
}

/// Hints for loading a raw file into a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Explicit format; inferred from the file extension when absent.
    #[serde(default)]
    pub format: Option<TableFormat>,
    /// Zero-based index of the header row (rows above it are discarded).
    #[serde(default)]
    pub header_row: usize,
    /// Worksheet name for XLSX files; the first sheet when absent.
    #[serde(default)]
    pub sheet: Option<String>,
}

/// Load a downloaded artifact into a [`RawTable`].
pub fn read_artifact(path: &Path, opts: &ReadOptions) -> Result<RawTable> {
    let format = opts.format.or_else(|| infer_format(path)).ok_or_else(|| {
        Error::Parsing(format!(
            "cannot infer table format for {}",
            path.display()
        ))
    })?;

    match format {
        TableFormat::Csv => read_csv(path, opts),
        TableFormat::Xlsx => read_xlsx(path, opts),
        TableFormat::Html => read_html(path, opts),
    }
}

fn infer_format(path: &Path) -> Option<TableFormat> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("csv") | Some("tsv") | Some("txt") => Some(TableFormat::Csv),
        Some("xlsx") | Some("xls") | Some("xlsm") => Some(TableFormat::Xlsx),
        Some("html") | Some("htm") => Some(TableFormat::Html),
        _ => None,
    }
}

fn read_csv(path: &Path, opts: &ReadOptions) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Parsing(format!("{}: {e}", path.display())))?;

    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Parsing(format!("{}: {e}", path.display())))?;
        raw_rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }

    table_from_offset(raw_rows, opts.header_row, path)
}

fn read_xlsx(path: &Path, opts: &ReadOptions) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| Error::Parsing(format!("{}: {e}", path.display())))?;

    let sheet_name = match &opts.sheet {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::Parsing(format!("{}: workbook has no sheets", path.display())))?,
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| Error::Parsing(format!("{}: sheet {sheet_name:?}: {e}", path.display())))?;

    let raw_rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(format_cell).collect())
        .collect();

    table_from_offset(raw_rows, opts.header_row, path)
}

fn format_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

fn read_html(path: &Path, opts: &ReadOptions) -> Result<RawTable> {
    let html = std::fs::read_to_string(path)
        .map_err(|e| Error::Parsing(format!("{}: {e}", path.display())))?;
    let document = Html::parse_document(&html);

    let table_sel = Selector::parse("table").expect("static selector");
    let row_sel = Selector::parse("tr").expect("static selector");
    let cell_sel = Selector::parse("th, td").expect("static selector");

    let table = document
        .select(&table_sel)
        .next()
        .ok_or_else(|| Error::Parsing(format!("{}: no <table> element", path.display())))?;

    let raw_rows: Vec<Vec<String>> = table
        .select(&row_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| {
                    cell.text()
                        .collect::<Vec<_>>()
                        .join(" ")
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect()
        })
        .collect();

    table_from_offset(raw_rows, opts.header_row, path)
}

fn table_from_offset(mut raw_rows: Vec<Vec<String>>, header_row: usize, path: &Path) -> Result<RawTable> {
    if raw_rows.len() <= header_row {
        return Err(Error::Parsing(format!(
            "{}: no header row at offset {header_row}",
            path.display()
        )));
    }
    let data = raw_rows.split_off(header_row + 1);
    let header = raw_rows
        .pop()
        .expect("offset bounds checked above");
    Ok(RawTable::from_rows(header, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn csv_roundtrip_with_header_offset() {
        let (_dir, path) = write_temp(
            "forecast.csv",
            "Agency Forecast Export\nListing ID,Title\n123,Road Study\n456,Bridge Repair\n",
        );
        let opts = ReadOptions {
            header_row: 1,
            ..Default::default()
        };
        let table = read_artifact(&path, &opts).unwrap();
        assert_eq!(table.columns, vec!["Listing ID", "Title"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "Title"), Some("Road Study"));
    }

    #[test]
    fn html_first_table_is_loaded() {
        let (_dir, path) = write_temp(
            "forecast.html",
            "<html><body><table>\
             <tr><th>ID</th><th>Title</th></tr>\
             <tr><td>9</td><td>Fleet  Maintenance</td></tr>\
             </table></body></html>",
        );
        let table = read_artifact(&path, &ReadOptions::default()).unwrap();
        assert_eq!(table.columns, vec!["ID", "Title"]);
        assert_eq!(table.get(0, "Title"), Some("Fleet Maintenance"));
    }

    #[test]
    fn unreadable_file_is_a_parsing_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        let err = read_artifact(&missing, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Parsing(_)));
    }

    #[test]
    fn unknown_extension_requires_a_hint() {
        let (_dir, path) = write_temp("blob.dat", "a,b\n1,2\n");
        assert!(read_artifact(&path, &ReadOptions::default()).is_err());

        let opts = ReadOptions {
            format: Some(TableFormat::Csv),
            ..Default::default()
        };
        let table = read_artifact(&path, &opts).unwrap();
        assert_eq!(table.get(0, "b"), Some("2"));
    }

    #[test]
    fn empty_rows_can_be_dropped() {
        let mut table = RawTable::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec!["1".into(), "2".into()],
                vec!["".into(), " ".into()],
                vec!["3".into(), "".into()],
            ],
        );
        table.drop_empty_rows();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn rename_moves_cell_data() {
        let mut table = RawTable::from_rows(
            vec!["Listing ID".into()],
            vec![vec!["123".into()]],
        );
        table.rename_column("Listing ID", "native_id");
        assert_eq!(table.get(0, "native_id"), Some("123"));
        assert_eq!(table.get(0, "Listing ID"), None);
        // renaming a column that is not present is a no-op
        table.rename_column("missing", "other");
        assert_eq!(table.columns, vec!["native_id"]);
    }
}
