//! Report sink
//!
//! Lines and the raw metrics body go straight to the destination; a failed
//! write ends the run.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Destination of the audit report
pub struct ReportSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    destination: String,
}

impl ReportSink {
    /// Report file that is created (or truncated) by the first write
    pub fn file(path: &Path) -> Self {
        let writer = DeferredFile {
            path: path.to_path_buf(),
            file: None,
        };
        Self::new(Box::new(writer), path.display().to_string())
    }

    /// Write the report to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()), "stdout")
    }
}

/// File writer that leaves an existing report alone until there is output
struct DeferredFile {
    path: PathBuf,
    file: Option<File>,
}

impl DeferredFile {
    fn file(&mut self) -> io::Result<&mut File> {
        match &mut self.file {
            Some(file) => Ok(file),
            slot @ None => {
                let file = File::create(&self.path).map_err(|e| {
                    io::Error::new(e.kind(), format!("creating {}: {e}", self.path.display()))
                })?;
                debug!(path = %self.path.display(), "Created report file");
                Ok(slot.insert(file))
            }
        }
    }
}

impl Write for DeferredFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> ReportSink<W> {
    pub fn new(writer: W, destination: impl Into<String>) -> Self {
        Self {
            writer,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Append one line
    pub fn write_line(&mut self, line: impl std::fmt::Display) -> Result<()> {
        writeln!(self.writer, "{line}")?;
        Ok(())
    }

    /// Write raw bytes as-is
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
