//! Stock code extraction from text, CSV and Excel files.
//!
//! Text and CSV files are split into lines and each line into columns on
//! `,`, `;` or tab. Excel workbooks are first flattened to CSV text (first
//! worksheet only) and then go through the same path. Duplicates are kept;
//! the backend reports them like any other code.

use crate::error::{ImportError, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use std::path::Path;

static COLUMN_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r",|;|\t").expect("valid regex"));
static INPUT_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n,;]+").expect("valid regex"));

/// How to read codes out of a tabular file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Skip the first line
    pub has_header: bool,
    /// Zero-based column holding the code
    pub code_column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Excel,
}

impl FileKind {
    /// Detect by extension (case-insensitive): `.txt`/`.csv` or `.xlsx`/`.xls`
    pub fn from_file_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".txt") || lower.ends_with(".csv") {
            Ok(Self::Text)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Ok(Self::Excel)
        } else {
            let ext = Path::new(&lower)
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            Err(ImportError::UnsupportedFileType(ext))
        }
    }
}

/// Read `path` and extract its codes.
///
/// The size limit is checked before the file is read.
pub fn parse_file(path: &Path, options: &ParseOptions, max_size: u64) -> Result<Vec<String>> {
    let size = std::fs::metadata(path)?.len();
    if size > max_size {
        return Err(ImportError::FileTooLarge { size, max: max_size });
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let kind = FileKind::from_file_name(&name)?;

    log::info!("Parsing stock code file {}", path.display());
    let bytes = std::fs::read(path)?;
    parse_kind(kind, &bytes, options)
}

/// Extract codes from an in-memory upload named `file_name`.
pub fn parse_bytes(
    file_name: &str,
    bytes: &[u8],
    options: &ParseOptions,
    max_size: u64,
) -> Result<Vec<String>> {
    let size = bytes.len() as u64;
    if size > max_size {
        return Err(ImportError::FileTooLarge { size, max: max_size });
    }
    let kind = FileKind::from_file_name(file_name)?;
    parse_kind(kind, bytes, options)
}

fn parse_kind(kind: FileKind, bytes: &[u8], options: &ParseOptions) -> Result<Vec<String>> {
    let content = match kind {
        FileKind::Text => {
            let text = String::from_utf8_lossy(bytes);
            text.trim_start_matches('\u{feff}').to_string()
        }
        FileKind::Excel => excel_to_csv(bytes)?,
    };

    let codes = parse_content(&content, options);
    if codes.is_empty() {
        return Err(ImportError::NoCodesFound);
    }

    log::info!("Extracted {} stock codes from file", codes.len());
    Ok(codes)
}

/// Extract the configured column from delimited text.
///
/// Blank lines are skipped; rows too short for the column are ignored.
pub fn parse_content(content: &str, options: &ParseOptions) -> Vec<String> {
    let start = usize::from(options.has_header);

    content
        .split('\n')
        .skip(start)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            COLUMN_SEPARATOR
                .split(line)
                .nth(options.code_column)
                .map(|cell| strip_quotes(cell.trim()).trim().to_string())
        })
        .filter(|code| !code.is_empty())
        .collect()
}

/// Remove one leading and one trailing quote character (`"` or `'`)
fn strip_quotes(cell: &str) -> &str {
    let cell = cell.strip_prefix(['"', '\'']).unwrap_or(cell);
    cell.strip_suffix(['"', '\'']).unwrap_or(cell)
}

/// Codes typed or pasted into the input box: split on newlines, commas and
/// semicolons, trimmed, empties dropped.
pub fn split_input_codes(text: &str) -> Vec<String> {
    INPUT_SEPARATOR
        .split(text.trim())
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .collect()
}

/// Column index as typed by the user; anything unparseable means column 0.
pub fn parse_column_index(raw: &str) -> usize {
    let digits: String = raw.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Convert the first worksheet of an xlsx/xls workbook to CSV text.
pub fn excel_to_csv(bytes: &[u8]) -> Result<String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::Spreadsheet("Workbook contains no worksheet".to_string()))?
        .map_err(|e| ImportError::Spreadsheet(e.to_string()))?;

    let lines: Vec<String> = range
        .rows()
        .map(|row| row.iter().map(cell_to_csv).collect::<Vec<_>>().join(","))
        .collect();

    Ok(lines.join("\n"))
}

fn cell_to_csv(cell: &Data) -> String {
    let raw = match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    };

    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw
    }
}
