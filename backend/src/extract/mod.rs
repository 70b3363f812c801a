//! CSV extraction.
//!
//! Reads a dataset's CSV file into a [`Batch`]. Parsing follows the usual
//! dataframe reader defaults: the first record is the header, blank lines
//! are skipped, short rows are padded with missing cells, and the common
//! missing-value markers (`NA`, `NULL`, `nan`, ...) become `None`.
//! No type coercion happens here; column types are inferred at load time.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ExtractError, ExtractResult};
use crate::models::{Batch, Dataset};

/// Values read as missing.
pub const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Default field delimiter.
pub const DEFAULT_DELIMITER: u8 = b',';

const UTF8_BOM: &str = "\u{feff}";

/// Produces a batch for a dataset.
pub trait Extract: Send + Sync {
    fn extract(&self, dataset: &Dataset) -> ExtractResult<Batch>;
}

/// Reads datasets from CSV files in a directory.
#[derive(Debug, Clone)]
pub struct CsvExtractor {
    data_dir: PathBuf,
    delimiter: u8,
}

impl CsvExtractor {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Full path of a dataset's source file.
    pub fn path_for(&self, dataset: &Dataset) -> PathBuf {
        self.data_dir.join(dataset.file)
    }
}

impl Extract for CsvExtractor {
    fn extract(&self, dataset: &Dataset) -> ExtractResult<Batch> {
        let parsed = read_csv(self.path_for(dataset), self.delimiter)?;
        Ok(parsed.batch)
    }
}

/// A parsed file and the encoding it was decoded from.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub batch: Batch,
    pub encoding: String,
}

/// Read and parse a CSV file.
pub fn read_csv(path: impl AsRef<Path>, delimiter: u8) -> ExtractResult<ParsedCsv> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ExtractError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    parse_bytes(&bytes, delimiter, path)
}

/// Parse CSV bytes. `path` is only used in error messages.
pub fn parse_bytes(bytes: &[u8], delimiter: u8, path: &Path) -> ExtractResult<ParsedCsv> {
    let (content, encoding) = decode_content(bytes).map_err(|message| ExtractError::Encoding {
        path: path.to_path_buf(),
        message,
    })?;
    let content = content.strip_prefix(UTF8_BOM).unwrap_or(&*content);
    let batch = parse_str(content, delimiter, path)?;
    Ok(ParsedCsv { batch, encoding })
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let charset = chardet::detect(bytes).0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to text. Valid UTF-8 is used as is; anything else is
/// sniffed and decoded with the detected legacy encoding.
pub fn decode_content(bytes: &[u8]) -> Result<(Cow<'_, str>, String), String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((Cow::Borrowed(text), "utf-8".to_string()));
    }

    let encoding = detect_encoding(bytes);
    if encoding == "utf-8" || encoding.is_empty() {
        return Err("invalid UTF-8 sequence".to_string());
    }
    let text = decode_as(bytes, &encoding)?;
    Ok((Cow::Owned(text), encoding))
}

/// Decode bytes with a named encoding.
pub fn decode_as(bytes: &[u8], encoding: &str) -> Result<String, String> {
    let codec = encoding_rs::Encoding::for_label(encoding.as_bytes())
        .ok_or_else(|| format!("unsupported encoding {}", encoding))?;
    let (text, _, had_errors) = codec.decode(bytes);
    if had_errors {
        return Err(format!("invalid {} sequence", encoding));
    }
    Ok(text.into_owned())
}

/// Parse CSV text into a batch.
pub fn parse_str(content: &str, delimiter: u8, path: &Path) -> ExtractResult<Batch> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let header = loop {
        match records.next() {
            None => {
                return Err(ExtractError::Empty {
                    path: path.to_path_buf(),
                })
            }
            Some(record) => {
                let record = record.map_err(|e| csv_error(path, e))?;
                if !is_blank(&record) {
                    break record;
                }
            }
        }
    };

    let mut batch = Batch::new(dedupe_headers(header.iter()));
    let width = batch.column_count();

    for record in records {
        let record = record.map_err(|e| csv_error(path, e))?;
        if is_blank(&record) {
            continue;
        }
        if record.len() > width {
            return Err(ExtractError::Parse {
                path: path.to_path_buf(),
                line: record.position().map(|p| p.line()).unwrap_or(0),
                message: format!("expected {} fields, saw {}", width, record.len()),
            });
        }

        let mut row: Vec<Option<String>> = record.iter().map(cell).collect();
        row.resize(width, None);
        batch.rows.push(row);
    }

    Ok(batch)
}

fn cell(raw: &str) -> Option<String> {
    if NA_VALUES.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

fn is_blank(record: &csv::StringRecord) -> bool {
    match record.len() {
        0 => true,
        1 => record[0].trim().is_empty(),
        _ => false,
    }
}

/// Header names: trimmed, unnamed columns labelled, duplicates suffixed
/// `.1`, `.2`, ... a suffixed name that is already taken gets its own suffix.
fn dedupe_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    raw.enumerate()
        .map(|(i, name)| {
            let name = name.trim();
            let mut header = if name.is_empty() {
                format!("Unnamed: {}", i)
            } else {
                name.to_string()
            };
            let mut count = counts.get(&header).copied().unwrap_or(0);
            while count > 0 {
                counts.insert(header.clone(), count + 1);
                header = format!("{}.{}", header, count);
                count = counts.get(&header).copied().unwrap_or(0);
            }
            counts.insert(header.clone(), count + 1);
            header
        })
        .collect()
}

fn csv_error(path: &Path, err: csv::Error) -> ExtractError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    ExtractError::Parse {
        path: path.to_path_buf(),
        line,
        message: err.to_string(),
    }
}
