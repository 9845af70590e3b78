use crate::codec::Utf8Transcoder;
use crate::{SyncError, SyncResult};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone)]
pub struct SourceMeta {
    /// "gzip", "zstd" or empty
    pub content_encoding: String,
    /// file name, used for extension fallback
    pub name_hint: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
    pub delimiter: u8,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
            delimiter: b',',
        }
    }
}

impl SourceMeta {
    /// Best-effort meta from a file name: `.gz` / `.zst` select decompression.
    pub fn from_path(path: &Path) -> Self {
        let name_hint = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let content_encoding = match path.extension().and_then(|s| s.to_str()) {
            Some("gz") => "gzip",
            Some("zst") => "zstd",
            _ => "",
        }
        .to_string();
        Self {
            content_encoding,
            name_hint,
            ..Default::default()
        }
    }
}

/// Wrap a raw reader with optional decompression and UTF-8 transcoding.
pub fn build_reader<R>(raw: R, meta: &SourceMeta) -> BoxedReader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let ce = meta.content_encoding.to_ascii_lowercase();
    let is_gzip = ce.split(',').any(|s| s.trim() == "gzip") || meta.name_hint.ends_with(".gz");
    let is_zstd = ce.split(',').any(|s| s.trim() == "zstd") || meta.name_hint.ends_with(".zst");

    let buf = BufReader::with_capacity(1 << 20, raw);
    let decompressed: BoxedReader = if is_gzip {
        Box::new(GzipDecoder::new(buf))
    } else if is_zstd {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    if meta.charset == encoding_rs::UTF_8 {
        decompressed
    } else {
        let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
        Box::new(StreamReader::new(framed))
    }
}

/// One source row, projected onto the columns the caller asked for.
///
/// Empty CSV fields are stored as `None` so they become `null` downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl Record {
    /// Build a record from `(column, value)` pairs; empty values become null.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Option<String>>) = pairs
            .into_iter()
            .map(|(k, v)| {
                let v: String = v.into();
                (k.into(), if v.is_empty() { None } else { Some(v) })
            })
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// `None` when the column is absent, `Some(None)` when it is present but null.
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| self.values[idx].as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(Option::as_deref))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A delimited file that can be streamed from the start any number of times.
#[derive(Debug, Clone)]
pub struct RecordSource {
    path: PathBuf,
    key_column: String,
    columns: Vec<String>,
    meta: SourceMeta,
}

impl RecordSource {
    pub fn new(path: impl Into<PathBuf>, key_column: impl Into<String>) -> Self {
        let path = path.into();
        let meta = SourceMeta::from_path(&path);
        Self {
            path,
            key_column: key_column.into(),
            columns: Vec::new(),
            meta,
        }
    }

    /// Only keep these columns in each `Record`. Columns the file lacks are ignored.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_meta(mut self, meta: SourceMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh stream positioned at the first data row.
    pub async fn open(&self) -> SyncResult<RecordStream> {
        let file = File::open(&self.path).await?;
        let reader = build_reader(file, &self.meta);
        RecordStream::new(reader, &self.key_column, &self.columns, self.meta.delimiter).await
    }
}

pub struct RecordStream {
    rdr: AsyncReader<BoxedReader>,
    columns: Arc<[String]>,
    indices: Vec<usize>,
    record: ByteRecord,
    rows_read: u64,
}

impl RecordStream {
    /// Read the header row and resolve the projection against it.
    ///
    /// An empty projection keeps every column. The key column is always kept
    /// and must be present in the header.
    pub async fn new(
        reader: BoxedReader,
        key_column: &str,
        projection: &[String],
        delimiter: u8,
    ) -> SyncResult<Self> {
        let mut rdr = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            // Larger internal buffer reduces syscalls and allocator churn
            .buffer_capacity(1 << 20)
            .create_reader(reader);

        let headers = rdr.headers().await?.clone();
        let key_idx = headers
            .iter()
            .position(|h| h == key_column)
            .ok_or_else(|| SyncError::MissingHeader(key_column.to_string()))?;

        let mut indices = vec![key_idx];
        if projection.is_empty() {
            indices.extend((0..headers.len()).filter(|&i| i != key_idx));
        } else {
            for wanted in projection {
                if let Some(idx) = headers.iter().position(|h| h == wanted) {
                    if !indices.contains(&idx) {
                        indices.push(idx);
                    }
                }
            }
        }

        let columns: Arc<[String]> = indices
            .iter()
            .map(|&i| headers[i].to_string())
            .collect::<Vec<_>>()
            .into();

        Ok(Self {
            rdr,
            columns,
            indices,
            record: ByteRecord::new(),
            rows_read: 0,
        })
    }

    /// Projected column names, key column first.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Next row, or `None` once the file is exhausted.
    pub async fn next_record(&mut self) -> SyncResult<Option<Record>> {
        // ByteRecord avoids decoding the columns nobody asked for
        if !self.rdr.read_byte_record(&mut self.record).await? {
            return Ok(None);
        }
        self.rows_read += 1;

        let values = self
            .indices
            .iter()
            .map(|&idx| match self.record.get(idx) {
                Some(bytes) if !bytes.is_empty() => {
                    Some(String::from_utf8_lossy(bytes).into_owned())
                }
                _ => None,
            })
            .collect();

        Ok(Some(Record {
            columns: Arc::clone(&self.columns),
            values,
        }))
    }
}
