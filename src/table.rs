//! Tabular input and output.
//!
//! The batch reads rows from a CSV table, looks fields up by column name, and
//! may add an output column holding the converted text. Snapshots are written
//! with temp file + rename so a reader never sees a half-written CSV, even if
//! the process is killed between rows.

use crate::archive::sibling_temp;
use crate::error::Pdf2ZipError;
use std::io::Read;
use std::path::Path;

/// An in-memory table: a header row plus string records of equal width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from headers and rows. Short rows are padded with empty
    /// fields; long rows are truncated to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self { headers, rows }
    }

    /// Read a CSV file whose first line is the header.
    pub fn read_csv(path: impl AsRef<Path>) -> Result<Self, Pdf2ZipError> {
        let path = path.as_ref();
        let read_err = |source: csv::Error| Pdf2ZipError::TableRead {
            path: path.to_path_buf(),
            source,
        };
        let file = std::fs::File::open(path).map_err(|e| read_err(e.into()))?;
        Self::from_reader(file).map_err(read_err)
    }

    /// Parse CSV from any reader.
    pub fn from_reader(reader: impl Read) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of `column`, or `None` if the header lacks it.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Like [`Table::column_index`] but fails with a descriptive error.
    pub fn require_column(&self, column: &str) -> Result<usize, Pdf2ZipError> {
        self.column_index(column)
            .ok_or_else(|| Pdf2ZipError::MissingColumn {
                column: column.to_string(),
                available: self.headers.join(", "),
            })
    }

    /// Return the index of `column`, appending an empty column if needed.
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.headers.push(column.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    /// Field value, or `None` if the row or column does not exist.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Overwrite one field. Out-of-range coordinates are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value.into();
        }
    }

    /// Serialise the table as CSV into any writer.
    pub fn write_to(&self, writer: impl std::io::Write) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write the table as CSV to `path` atomically (temp file + rename).
    pub fn write_csv_atomic(&self, path: impl AsRef<Path>) -> Result<(), Pdf2ZipError> {
        let path = path.as_ref();
        let write_err = |source: std::io::Error| Pdf2ZipError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(write_err)?;

        let mut tmp = sibling_temp(path).map_err(write_err)?;
        self.write_to(tmp.as_file_mut())
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "id,url\ndoc1,http://x/a.pdf\ndoc2,\n";

    #[test]
    fn parse_and_lookup() {
        let t = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(t.headers(), &["id".to_string(), "url".to_string()]);
        assert_eq!(t.len(), 2);
        let url = t.require_column("url").unwrap();
        assert_eq!(t.get(0, url), Some("http://x/a.pdf"));
        assert_eq!(t.get(1, url), Some(""));
        assert_eq!(t.get(9, url), None);
    }

    #[test]
    fn missing_column_lists_available() {
        let t = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        match t.require_column("pdf") {
            Err(Pdf2ZipError::MissingColumn { column, available }) => {
                assert_eq!(column, "pdf");
                assert_eq!(available, "id, url");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ensure_column_appends_once() {
        let mut t = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        let c = t.ensure_column("url_md_pdfium");
        assert_eq!(c, 2);
        assert_eq!(t.ensure_column("url_md_pdfium"), 2);
        t.set(0, c, "# Hello");
        assert_eq!(t.get(0, c), Some("# Hello"));
        assert_eq!(t.get(1, c), Some(""));
    }

    #[test]
    fn ragged_rows_are_padded() {
        let t = Table::from_reader("a,b,c\n1\n1,2,3,4\n".as_bytes()).unwrap();
        assert_eq!(t.get(0, 2), Some(""));
        assert_eq!(t.get(1, 2), Some("3"));
        assert_eq!(t.get(1, 3), None);
    }

    #[test]
    fn atomic_snapshot_round_trip_with_multiline_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/snapshot.csv");
        let mut t = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        let c = t.ensure_column("md");
        t.set(0, c, "# Title\n\nBody, with comma");

        t.write_csv_atomic(&path).unwrap();
        let back = Table::read_csv(&path).unwrap();
        assert_eq!(back, t);
    }

    #[cfg(unix)]
    #[test]
    fn snapshot_rewrite_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.csv");
        let t = Table::from_reader(SAMPLE.as_bytes()).unwrap();
        t.write_csv_atomic(&path).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        t.write_csv_atomic(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn read_missing_file() {
        let err = Table::read_csv("/definitely/not/here.csv").unwrap_err();
        match err {
            Pdf2ZipError::TableRead { ref source, .. } => assert!(source.is_io_error()),
            ref other => panic!("unexpected: {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn invalid_utf8_is_a_typed_read_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, b"id,url\n\xff\xfe,http://x/a.pdf\n").unwrap();

        match Table::read_csv(&path).unwrap_err() {
            Pdf2ZipError::TableRead { path: p, source } => {
                assert_eq!(p, path);
                assert!(matches!(source.kind(), csv::ErrorKind::Utf8 { .. }), "{source}");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
