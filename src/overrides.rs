use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use tracing::debug;

use crate::errors::{RelinkError, Result};
use crate::normalize::normalize;

/// Header of the column holding the source (erroneous) names.
pub const SOURCE_COLUMN: &str = "error";

/// Header of the column holding the replacement names.
pub const REPLACEMENT_COLUMN: &str = "to replace";

/// Name substitutions applied before the mapped-exact and name-only stages.
///
/// Keys are normalized source names; values are literal replacement names
/// (trimmed, otherwise untouched).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    entries: HashMap<String, String>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(source, replacement)` pairs, skipping blanks.
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: AsRef<str>,
        B: AsRef<str>,
    {
        let mut table = Self::new();
        for (source, replacement) in pairs {
            table.insert(source.as_ref(), replacement.as_ref());
        }
        table
    }

    /// Loads a two-column table from a spreadsheet (`.xlsx`, `.xlsm`, `.xls`,
    /// `.xlsb`, `.ods`; first sheet), a `.tsv` file, or a CSV file.
    ///
    /// Header labels are matched case- and whitespace-insensitively against
    /// `Error` and `To replace`; other columns are ignored.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RelinkError::MappingFileNotFound {
                path: path.display().to_string(),
            });
        }
        let label = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let table = match extension.as_deref() {
            Some("xlsx" | "xlsm" | "xls" | "xlsb" | "ods") => Self::from_workbook(path)?,
            Some("tsv") => Self::from_reader(std::fs::File::open(path)?, b'\t', &label)?,
            _ => Self::from_reader(std::fs::File::open(path)?, b',', &label)?,
        };
        debug!(path = %label, entries = table.len(), "loaded override table");
        Ok(table)
    }

    /// Reads the first sheet of a workbook.
    fn from_workbook(path: &Path) -> Result<Self> {
        let label = path.display().to_string();
        let format_error = |message: String| RelinkError::MappingFileFormat {
            message,
            path: label.clone(),
        };

        let mut workbook: Sheets<_> = open_workbook_auto(path)
            .map_err(|e| format_error(format!("cannot open workbook: {e}")))?;
        let Some(sheet) = workbook.sheet_names().first().cloned() else {
            return Err(format_error("workbook contains no sheets".to_string()));
        };
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| format_error(format!("cannot read sheet '{sheet}': {e}")))?;

        Self::from_rows(range.rows(), &label)
    }

    /// Builds a table from typed spreadsheet rows; the first row is the header.
    ///
    /// Rows where either cell is not a string (numbers, dates, errors, empty
    /// cells) or is blank are skipped.
    pub fn from_rows<'r, I>(rows: I, label: &str) -> Result<Self>
    where
        I: IntoIterator<Item = &'r [Data]>,
    {
        let mut rows = rows.into_iter();
        let header: Vec<String> = rows
            .next()
            .unwrap_or(&[])
            .iter()
            .map(|cell| match cell {
                Data::String(s) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect();
        let (source_col, replacement_col) = locate_columns(&header, label)?;

        let mut table = Self::new();
        for row in rows {
            if let (Some(Data::String(source)), Some(Data::String(replacement))) =
                (row.get(source_col), row.get(replacement_col))
            {
                table.insert(source, replacement);
            }
        }
        Ok(table)
    }

    /// Parses a delimited table from any reader. `label` names the source in errors.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8, label: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| RelinkError::MappingFileFormat {
                message: format!("cannot read header row: {e}"),
                path: label.to_string(),
            })?
            .clone();
        let header: Vec<&str> = headers.iter().collect();
        let (source_col, replacement_col) = locate_columns(&header, label)?;

        let mut table = Self::new();
        for (row, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| RelinkError::MappingFileFormat {
                message: format!("malformed row {}: {e}", row + 2),
                path: label.to_string(),
            })?;
            let (Some(source), Some(replacement)) =
                (record.get(source_col), record.get(replacement_col))
            else {
                continue;
            };
            table.insert(source, replacement);
        }
        Ok(table)
    }

    fn insert(&mut self, source: &str, replacement: &str) {
        let source = source.trim();
        let replacement = replacement.trim();
        if source.is_empty() || replacement.is_empty() {
            return;
        }
        self.entries
            .insert(normalize(source), replacement.to_string());
    }

    /// Returns the replacement registered for a name, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&normalize(name)).map(String::as_str)
    }

    /// Returns the replacement for `name`, or `name` itself.
    pub fn substitute<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Positions of the source and replacement columns in a header row.
fn locate_columns<S: AsRef<str>>(header: &[S], label: &str) -> Result<(usize, usize)> {
    let position = |wanted: &str| header.iter().position(|h| normalize(h.as_ref()) == wanted);
    match (position(SOURCE_COLUMN), position(REPLACEMENT_COLUMN)) {
        (Some(source), Some(replacement)) => Ok((source, replacement)),
        _ => {
            let found: Vec<&str> = header.iter().map(AsRef::as_ref).collect();
            Err(RelinkError::MappingFileFormat {
                message: format!(
                    "table must contain columns named 'Error' and 'To replace'; found columns: {found:?}"
                ),
                path: label.to_string(),
            })
        }
    }
}
