//! JSON Lines reserve file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use at_common::{Error, Result};

use super::{ReserveEntry, ReserveWriter};

/// Appends one entry per line to a file, opened on first write.
pub struct FileReserveWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileReserveWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileReserveWriter {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_writer_open(&mut self) -> Result<&mut BufWriter<File>> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            self.writer = Some(BufWriter::new(file));
        }
        self.writer
            .as_mut()
            .ok_or_else(|| Error::Storage(format!("{} is not open", self.path.display())))
    }
}

impl ReserveWriter for FileReserveWriter {
    fn name(&self) -> &'static str {
        "file"
    }

    /// An entry only counts as kept once it has reached the file.
    fn write(&mut self, entry: &ReserveEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let writer = self.ensure_writer_open()?;
        let written = writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.flush());
        if let Err(e) = written {
            // Discard the unwritten tail so a later flush cannot emit half a line
            if let Some(writer) = self.writer.take() {
                let _ = writer.into_parts();
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        if let Some(writer) = self.writer.take() {
            writer
                .into_inner()
                .map_err(|e| Error::Io(e.into_error()))?
                .sync_all()?;
        }
        Ok(())
    }
}

/// Read every entry of a reserve file. Blank lines are skipped.
pub fn read_reserve_file(path: &Path) -> Result<Vec<ReserveEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ReserveEntry = serde_json::from_str(&line).map_err(|e| {
            Error::Corrupted(format!("{} line {}: {}", path.display(), line_num + 1, e))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
