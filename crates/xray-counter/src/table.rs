//! CSV row source and sink.
//!
//! Parameter cells are JSON arrays, so quoting matters: fields containing
//! commas, quotes or line breaks are wrapped in double quotes with inner
//! quotes doubled, and quoted fields may span lines.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::TableError;

/// Input table: header plus rows of raw cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Borrowed view of one input row.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl<'a> Record<'a> {
    /// Cell value by column name, `None` if the column does not exist.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    #[must_use]
    pub fn values(&self) -> &'a [String] {
        self.values
    }
}

impl Table {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with empty cells.
    pub fn push_row(&mut self, mut row: Vec<String>) -> Result<(), TableError> {
        if row.len() > self.columns.len() {
            return Err(TableError::Malformed {
                line: self.rows.len() + 2,
                message: format!(
                    "row has {} fields but the header has {}",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn require_column(&self, column: &str) -> Result<(), TableError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(TableError::MissingColumn {
                column: column.to_string(),
                available: self.columns.clone(),
            })
        }
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Read a CSV file with a header row.
    pub fn read_csv(path: &Path) -> Result<Self, TableError> {
        let content = fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_csv(&content)
    }

    /// Parse CSV text with a header row.
    pub fn parse_csv(content: &str) -> Result<Self, TableError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut records = parse_records(content)?.into_iter();

        let Some(header) = records.next() else {
            return Err(TableError::Malformed {
                line: 1,
                message: "missing header row".to_string(),
            });
        };

        let mut table = Self::new(header);
        for row in records {
            table.push_row(row)?;
        }
        Ok(table)
    }
}

/// Value written into an output cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Null,
    Count(u64),
    Text(String),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Count(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Output table: input columns plus the result columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTable {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl OutputTable {
    /// Merge result cells into a copy of `input`.
    ///
    /// `results[row][i]` goes to `output_columns[i]`. An output column that
    /// already exists in the input is overwritten, otherwise it is appended.
    #[must_use]
    pub fn from_input(input: &Table, output_columns: &[String], results: Vec<Vec<CellValue>>) -> Self {
        let mut columns = input.columns.clone();
        let targets: Vec<usize> = output_columns
            .iter()
            .map(|name| {
                columns.iter().position(|c| c == name).unwrap_or_else(|| {
                    columns.push(name.clone());
                    columns.len() - 1
                })
            })
            .collect();

        let rows = input
            .rows
            .iter()
            .zip(results)
            .map(|(values, cells)| {
                let mut row: Vec<CellValue> = values.iter().map(|v| CellValue::from(v.as_str())).collect();
                row.resize(columns.len(), CellValue::Null);
                for (&target, cell) in targets.iter().zip(cells) {
                    row[target] = cell;
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Cell by row index and column name.
    #[must_use]
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellValue> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write_line(&mut writer, self.columns.iter().map(String::as_str))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            write_line(&mut writer, cells.iter().map(String::as_str))?;
        }
        writer.flush()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), TableError> {
        let io_err = |source| TableError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::create(path).map_err(io_err)?;
        self.write_to(io::BufWriter::new(file)).map_err(io_err)
    }

    #[must_use]
    pub fn to_csv_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Escape a CSV field value.
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
/// Doubles any existing quotes within the value.
#[must_use]
pub fn escape_field(value: &str) -> String {
    let needs_quoting = value.contains(',')
        || value.contains('"')
        || value.contains('\n')
        || value.contains('\r');

    if needs_quoting {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_line<'a, W: Write>(writer: &mut W, fields: impl Iterator<Item = &'a str>) -> io::Result<()> {
    let line: Vec<String> = fields.map(escape_field).collect();
    writeln!(writer, "{}", line.join(","))
}

/// Split CSV text into records of unescaped fields.
fn parse_records(content: &str) -> Result<Vec<Vec<String>>, TableError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // A quoted empty field still counts as content on its line.
    let mut quoted = false;
    let mut line = 1;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => {
                    if c == '\n' {
                        line += 1;
                    }
                    field.push(c);
                }
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quoted = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                quoted = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                // Blank lines carry no record.
                if !record.is_empty() || !field.is_empty() || quoted {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                quoted = false;
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(TableError::Malformed {
            line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() || quoted {
        record.push(field);
        records.push(record);
    }

    Ok(records)
}
