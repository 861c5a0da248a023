//! Log file reader

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use contracts::Record;
use tracing::{debug, trace};
use zstd::stream::read::Decoder;

use crate::LogStreamError;

const READ_CHUNK: usize = 16 * 1024;

/// Streaming reader over a log file
///
/// Records come back one at a time in file order. A file that ends inside a
/// compressed frame or inside a record frame (writer crashed or still
/// running) reads as a normal end of stream.
pub struct LogReader {
    path: PathBuf,
    decoder: Decoder<'static, BufReader<File>>,
    buf: BytesMut,
    pending: VecDeque<Record>,
    eof: bool,
}

impl LogReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogStreamError> {
        let path = path.as_ref().to_path_buf();
        let decoder = Decoder::new(File::open(&path)?)?;
        Ok(Self {
            path,
            decoder,
            buf: BytesMut::with_capacity(READ_CHUNK),
            pending: VecDeque::new(),
            eof: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next record, or `None` at end of stream
    pub fn next_record(&mut self) -> Result<Option<Record>, LogStreamError> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }

            if let Some(batch) = codec::decode_frame(&mut self.buf)? {
                self.pending.extend(batch);
                continue;
            }

            if self.eof {
                if !self.buf.is_empty() {
                    debug!(
                        path = %self.path.display(),
                        leftover = self.buf.len(),
                        "Ignoring incomplete trailing frame"
                    );
                    self.buf.clear();
                }
                return Ok(None);
            }

            self.fill()?;
        }
    }

    /// Rewind and collect every record accepted by `filter`
    pub fn read_all<F>(&mut self, mut filter: F) -> Result<Vec<Record>, LogStreamError>
    where
        F: FnMut(&Record) -> bool,
    {
        self.rewind()?;
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            if filter(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Start again from the beginning of the file
    pub fn rewind(&mut self) -> Result<(), LogStreamError> {
        self.decoder = Decoder::new(File::open(&self.path)?)?;
        self.buf.clear();
        self.pending.clear();
        self.eof = false;
        Ok(())
    }

    fn fill(&mut self) -> Result<(), LogStreamError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.decoder.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    trace!(path = %self.path.display(), "Compressed stream ends mid-frame");
                    self.eof = true;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Iterator for LogReader {
    type Item = Result<Record, LogStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("path", &self.path)
            .field("buffered", &self.buf.len())
            .field("pending", &self.pending.len())
            .field("eof", &self.eof)
            .finish()
    }
}
