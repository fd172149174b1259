//! Consumers of monitoring samples.

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use verdict_common::{Error, Result, ResultExt};

use crate::sample::{MonitorKey, MonitorSample};

/// Receives every sample a monitor takes.
///
/// Handlers are owned by the monitor's thread; `cleanup` runs once when
/// the monitor stops, whatever the reason.
pub trait MonitorHandler: Send {
    fn on_sample(&mut self, sample: &MonitorSample) -> Result<()>;

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one delimited line per sample, flushed immediately.
///
/// The first line is a `#` header naming the columns, with spaces replaced
/// by underscores.
pub struct DelimitedFileHandler {
    path: PathBuf,
    delimiter: String,
    columns: Vec<MonitorKey>,
    writer: Option<BufWriter<File>>,
}

impl DelimitedFileHandler {
    /// Tab-separated file with the default columns.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_options(path, "\t", &MonitorKey::DEFAULT_COLUMNS)
    }

    pub fn with_options(
        path: impl Into<PathBuf>,
        delimiter: impl Into<String>,
        columns: &[MonitorKey],
    ) -> Result<Self> {
        let path = path.into();
        if columns.is_empty() {
            return Err(Error::validation("Monitor file needs at least one column"));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(format!("Creating directory for {}", path.display()))?;
        }
        let file = File::create(&path).context(format!("Creating monitor file {}", path.display()))?;

        let mut handler = Self {
            path,
            delimiter: delimiter.into(),
            columns: columns.to_vec(),
            writer: Some(BufWriter::new(file)),
        };
        let header = handler
            .columns
            .iter()
            .map(MonitorKey::column_name)
            .collect::<Vec<_>>()
            .join(&handler.delimiter);
        handler.write_line(&format!("#{}", header))?;
        Ok(handler)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::internal(format!("{} is already closed", self.path.display())))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl MonitorHandler for DelimitedFileHandler {
    fn on_sample(&mut self, sample: &MonitorSample) -> Result<()> {
        let line = self
            .columns
            .iter()
            .map(|key| sample.format_value(*key))
            .collect::<Vec<_>>()
            .join(&self.delimiter);
        self.write_line(&line)
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Keeps samples in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryHandler {
    samples: Arc<Mutex<Vec<MonitorSample>>>,
}

impl MemoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<MonitorSample> {
        self.samples.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }
}

impl MonitorHandler for MemoryHandler {
    fn on_sample(&mut self, sample: &MonitorSample) -> Result<()> {
        self.samples.lock().push(sample.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn sample(n: u64) -> MonitorSample {
        MonitorSample {
            timestamp: Local::now(),
            sample: n,
            cpu_core_percent: 12.0,
            cpu_total_percent: 3.0,
            resident_kb: 100,
            virtual_kb: 400,
            private_kb: None,
            threads: Some(1),
            handles: None,
        }
    }

    #[test]
    fn test_file_handler_writes_header_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("monitor.csv");
        let mut handler = DelimitedFileHandler::with_options(
            &path,
            ",",
            &[MonitorKey::Sample, MonitorKey::CpuCore, MonitorKey::KernelHandles],
        )
        .unwrap();

        handler.on_sample(&sample(1)).unwrap();
        // Visible before cleanup because every line is flushed
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "#Sample,CPU_core_%,Kernel_handles\n1,12,-1\n");

        handler.on_sample(&sample(2)).unwrap();
        handler.cleanup().unwrap();
        handler.cleanup().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(handler.on_sample(&sample(3)).is_err());
    }

    #[test]
    fn test_default_columns_are_tab_separated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.tsv");
        let mut handler = DelimitedFileHandler::new(&path).unwrap();
        handler.on_sample(&sample(1)).unwrap();

        let content = std::fs::read_to_string(handler.path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "#Time\tSample\tCPU_core_%\tResident_memory_kB\tVirtual_memory_kB\tThreads\tKernel_handles"
        );
        let fields: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(&fields[1..], &["1", "12", "100", "400", "1", "-1"]);
    }

    #[test]
    fn test_no_columns_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DelimitedFileHandler::with_options(dir.path().join("x"), "\t", &[]).is_err());
    }

    #[test]
    fn test_memory_handler_shares_buffer() {
        let handler = MemoryHandler::new();
        let mut writer = handler.clone();
        writer.on_sample(&sample(1)).unwrap();
        writer.on_sample(&sample(2)).unwrap();
        assert_eq!(handler.len(), 2);
        assert_eq!(handler.snapshot()[1].sample, 2);
    }
}
