use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::violation::ViolationEvent;

pub const CSV_HEADER: &str = "Violation Type,Timestamp";

/// Durable, append-only store of violation events.
pub trait ViolationSink {
    fn append(&mut self, event: &ViolationEvent) -> Result<(), Error>;

    /// Called once at stream end; returns the number of persisted records.
    fn flush(&mut self) -> Result<usize, Error>;
}

impl<S: ViolationSink + ?Sized> ViolationSink for Box<S> {
    #[inline]
    fn append(&mut self, event: &ViolationEvent) -> Result<(), Error> {
        (**self).append(event)
    }

    #[inline]
    fn flush(&mut self) -> Result<usize, Error> {
        (**self).flush()
    }
}

/// Keeps every appended event in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub events: Vec<ViolationEvent>,
    pub flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ViolationSink for MemorySink {
    fn append(&mut self, event: &ViolationEvent) -> Result<(), Error> {
        self.events.push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<usize, Error> {
        self.flushes += 1;
        Ok(self.events.len())
    }
}

/// Buffered file that is only created by the first write.
#[derive(Debug)]
pub struct LazyFile {
    path: PathBuf,
    file: Option<BufWriter<File>>,
}

impl LazyFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        self.file.is_some()
    }
}

impl Write for LazyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                let file = File::create(&self.path)?;
                log::info!("writing violations to {}", self.path.display());
                BufWriter::new(file)
            }
        };

        self.file.insert(file).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// Writes `Violation Type,Timestamp` rows as they arrive.
///
/// The header goes out with the first row, so a stream without violations
/// leaves the writer untouched.
pub struct CsvSink<W: Write> {
    writer: W,
    header_written: bool,
    records: usize,
}

impl CsvSink<LazyFile> {
    /// The file at `path` is created with the first violation.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            if !dir.is_dir() {
                return Err(Error::Sink(format!(
                    "directory {} does not exist",
                    dir.display()
                )));
            }
        }

        Ok(Self::new(LazyFile::new(path)))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
            records: 0,
        }
    }

    #[inline]
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ViolationSink for CsvSink<W> {
    fn append(&mut self, event: &ViolationEvent) -> Result<(), Error> {
        if !self.header_written {
            writeln!(self.writer, "{}", CSV_HEADER)?;
            self.header_written = true;
        }

        writeln!(self.writer, "{},{}", event.kind, event.timestamp)?;
        self.records += 1;

        Ok(())
    }

    fn flush(&mut self) -> Result<usize, Error> {
        self.writer.flush()?;
        Ok(self.records)
    }
}
