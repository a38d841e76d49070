//! CSV Data Loader Module
//! Reads delimited files into a Record Table using Polars, whole or in bounded chunks.

use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse CSV {}: {source}", path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,
}

/// How a source file is read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Field separator byte.
    pub separator: u8,
    /// Rows per chunk; `None` reads the whole file in one pass.
    pub chunk_size: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            separator: b',',
            chunk_size: None,
        }
    }
}

impl LoadOptions {
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }
}

/// Loads CSV files as all-text tables; typing is left to the normalizer.
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    options: LoadOptions,
}

impl DataLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load a CSV file, chunk by chunk when a chunk size is configured.
    ///
    /// Every column comes back as a nullable string column. Empty fields are
    /// null, short rows are padded with nulls and long rows are truncated.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<DataFrame, LoaderError> {
        let path = path.as_ref();
        let bytes = read_source(path)?;
        self.parse(path, bytes)
    }

    /// Parse the bytes of a CSV file already read from `path`.
    ///
    /// `path` is only used in errors and logs.
    pub fn parse(&self, path: &Path, bytes: Vec<u8>) -> Result<DataFrame, LoaderError> {
        let df = match self.options.chunk_size {
            None => self.read_buffer(path, bytes)?,
            Some(0) => return Err(LoaderError::InvalidChunkSize),
            Some(chunk_size) => self.read_chunked(path, bytes, chunk_size)?,
        };

        debug!(
            "Loaded {} with shape {:?} (chunk size {:?})",
            path.display(),
            df.shape(),
            self.options.chunk_size
        );
        Ok(df)
    }

    /// Parse `chunk_size` records at a time, each behind a copy of the header,
    /// and stack the chunks in file order. One pass over the bytes.
    fn read_chunked(
        &self,
        path: &Path,
        bytes: Vec<u8>,
        chunk_size: usize,
    ) -> Result<DataFrame, LoaderError> {
        let ends = record_ends(&bytes, QUOTE);
        if ends.len() < 2 {
            // Header only, or nothing at all: same result as a single pass.
            return self.read_buffer(path, bytes);
        }

        let header = &bytes[..ends[0]];
        let mut table: Option<DataFrame> = None;
        let mut chunks = 0usize;

        for start in (1..ends.len()).step_by(chunk_size) {
            let stop = (start + chunk_size).min(ends.len());
            let (first, last) = (ends[start - 1], ends[stop - 1]);
            let mut buffer = Vec::with_capacity(header.len() + last - first);
            buffer.extend_from_slice(header);
            buffer.extend_from_slice(&bytes[first..last]);

            let chunk = self.read_buffer(path, buffer)?;
            chunks += 1;
            match table.as_mut() {
                None => table = Some(chunk),
                Some(table) => {
                    table
                        .vstack_mut(&chunk)
                        .map_err(|source| LoaderError::ParseError {
                            path: path.to_path_buf(),
                            source,
                        })?;
                }
            }
        }

        debug!("Read {} in {} chunk(s) of up to {} rows", path.display(), chunks, chunk_size);
        match table {
            Some(table) => Ok(table),
            None => self.read_buffer(path, bytes),
        }
    }

    fn read_buffer(&self, path: &Path, buffer: Vec<u8>) -> Result<DataFrame, LoaderError> {
        let parse_options = CsvParseOptions::default()
            .with_separator(self.options.separator)
            .with_quote_char(Some(QUOTE))
            .with_missing_is_null(true)
            .with_truncate_ragged_lines(true);

        CsvReadOptions::default()
            .with_parse_options(parse_options)
            .with_has_header(true)
            // Header only: every column stays text until normalized.
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(buffer))
            .finish()
            .map_err(|source| LoaderError::ParseError {
                path: path.to_path_buf(),
                source,
            })
    }
}

const QUOTE: u8 = b'"';

/// Read a source file in full, reporting a missing file as `FileNotFound`.
pub(crate) fn read_source(path: &Path) -> Result<Vec<u8>, LoaderError> {
    if !path.is_file() {
        return Err(LoaderError::FileNotFound(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoaderError::FileNotFound(path.to_path_buf())
        } else {
            LoaderError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// End offset (exclusive) of every record. Newlines inside quoted fields do
/// not end a record; a final record without a newline still counts.
fn record_ends(bytes: &[u8], quote: u8) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut quoted = false;
    for (i, &byte) in bytes.iter().enumerate() {
        if byte == quote {
            quoted = !quoted;
        } else if byte == b'\n' && !quoted {
            ends.push(i + 1);
        }
    }
    if ends.last().copied().unwrap_or(0) < bytes.len() {
        ends.push(bytes.len());
    }
    ends
}

/// Get list of column names from a DataFrame.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write csv");
        file
    }

    #[test]
    fn missing_file_is_reported() {
        let err = DataLoader::default()
            .load("/definitely/not/here.csv")
            .unwrap_err();
        assert!(matches!(err, LoaderError::FileNotFound(_)));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let file = write_csv("a,b\n1,2\n");
        let loader = DataLoader::new(LoadOptions::default().with_chunk_size(0));
        assert!(matches!(
            loader.load(file.path()),
            Err(LoaderError::InvalidChunkSize)
        ));
    }

    #[test]
    fn loads_every_column_as_text() {
        let file = write_csv("Sexo,Edad\nM,31\nF,\n");
        let df = DataLoader::default().load(file.path()).unwrap();

        assert_eq!(df.shape(), (2, 2));
        assert_eq!(column_names(&df), vec!["Sexo", "Edad"]);
        assert_eq!(df.column("Edad").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("Edad").unwrap().null_count(), 1);
    }

    #[test]
    fn chunked_read_matches_whole_read() {
        let file = write_csv("k,v\na,1\nb,2\nc,3\nd,4\ne,5\n");
        let whole = DataLoader::default().load(file.path()).unwrap();

        for chunk_size in [1, 2, 3, 5, 8] {
            let chunked = DataLoader::new(LoadOptions::default().with_chunk_size(chunk_size))
                .load(file.path())
                .unwrap();
            assert!(chunked.equals_missing(&whole), "chunk size {chunk_size}");
        }
    }

    #[test]
    fn chunked_read_handles_quoted_newlines_and_ragged_rows() {
        let file = write_csv(
            "Proveedor,Objeto,Ciudad\n\"ACME, SAS\",\"linea 1\nlinea 2\",Bello\nJuan,Obra\nAna,\"dice \"\"hola\"\"\",Itagui,extra\nLuz,Aseo,Medellin",
        );
        let whole = DataLoader::default().load(file.path()).unwrap();
        assert_eq!(whole.shape(), (4, 3));

        for chunk_size in [1, 2, 3, 4, 9] {
            let chunked = DataLoader::new(LoadOptions::default().with_chunk_size(chunk_size))
                .load(file.path())
                .unwrap();
            assert!(chunked.equals_missing(&whole), "chunk size {chunk_size}");
        }
    }

    #[test]
    fn record_ends_skip_quoted_newlines() {
        let bytes = b"a,b\n\"x\ny\",1\n2,3";
        assert_eq!(record_ends(bytes, QUOTE), vec![4, 12, 15]);
        assert_eq!(record_ends(b"a\n", QUOTE), vec![2]);
        assert!(record_ends(b"", QUOTE).is_empty());
    }

    #[test]
    fn header_only_file_chunked() {
        let file = write_csv("a,b\n");
        let df = DataLoader::new(LoadOptions::default().with_chunk_size(3))
            .load(file.path())
            .unwrap();
        assert_eq!(df.shape(), (0, 2));
    }

    #[test]
    fn custom_separator() {
        let file = write_csv("a;b\n1;2\n");
        let df = DataLoader::new(LoadOptions::default().with_separator(b';'))
            .load(file.path())
            .unwrap();
        assert_eq!(column_names(&df), vec!["a", "b"]);
    }
}
