//! Log sinks - where published log lines end up.
//!
//! The publish thread hands every line to a [`LogSink`] and closes the
//! current batch at each flush (and at shutdown).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::command::LogLine;
use crate::config::SinkConfig;
use crate::error::{EngineError, Result};

/// Durable destination of log lines, grouped into flush batches.
pub trait LogSink: Send {
    /// Append lines to the current batch.
    fn write_lines(&mut self, lines: &[LogLine]) -> Result<()>;

    /// Close the current batch. A batch with no lines leaves no trace.
    fn end_batch(&mut self) -> Result<()>;
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn write_lines(&mut self, lines: &[LogLine]) -> Result<()> {
        (**self).write_lines(lines)
    }

    fn end_batch(&mut self) -> Result<()> {
        (**self).end_batch()
    }
}

// ============================================================================
// File Sink
// ============================================================================

/// Writes batch `n` to `<dir>/<n>.log`, one line per record.
///
/// Batch numbers start at 1 and only advance when a file was written.
#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    echo: bool,
    batch: u64,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Create the log directory if needed.
    pub fn new(config: &SinkConfig) -> Result<Self> {
        fs::create_dir_all(&config.log_dir).map_err(EngineError::Sink)?;
        debug!(dir = %config.log_dir.display(), "file sink ready");
        Ok(Self {
            dir: config.log_dir.clone(),
            echo: config.echo,
            batch: 1,
            writer: None,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number the next non-empty batch will be written under
    pub fn next_batch(&self) -> u64 {
        self.batch
    }

    pub fn batch_path(&self, batch: u64) -> PathBuf {
        self.dir.join(format!("{batch}.log"))
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let file = File::create(self.batch_path(self.batch)).map_err(EngineError::Sink)?;
                if self.echo {
                    info!("============ Writing Log {} ============", self.batch);
                }
                BufWriter::new(file)
            }
        };
        Ok(self.writer.insert(writer))
    }
}

impl LogSink for FileSink {
    fn write_lines(&mut self, lines: &[LogLine]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let echo = self.echo;
        let writer = self.writer()?;
        for line in lines {
            writeln!(writer, "{line}").map_err(EngineError::Sink)?;
            if echo {
                info!("{line}");
            }
        }
        Ok(())
    }

    fn end_batch(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush().map_err(EngineError::Sink)?;
        debug!(batch = self.batch, "batch closed");
        self.batch += 1;
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// Collects batches in memory. Closed batches are never empty.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Vec<Vec<String>>,
    current: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closed batches, rendered
    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    /// Lines of the batch still open
    pub fn pending(&self) -> &[String] {
        &self.current
    }

    pub fn into_batches(self) -> Vec<Vec<String>> {
        self.batches
    }
}

impl LogSink for MemorySink {
    fn write_lines(&mut self, lines: &[LogLine]) -> Result<()> {
        self.current.extend(lines.iter().map(|line| line.to_string()));
        Ok(())
    }

    fn end_batch(&mut self) -> Result<()> {
        if !self.current.is_empty() {
            self.batches.push(std::mem::take(&mut self.current));
        }
        Ok(())
    }
}

/// A sink shared with the test that created it.
impl<S: LogSink> LogSink for std::sync::Arc<std::sync::Mutex<S>> {
    fn write_lines(&mut self, lines: &[LogLine]) -> Result<()> {
        self.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .write_lines(lines)
    }

    fn end_batch(&mut self) -> Result<()> {
        self.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .end_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Side;

    fn sample() -> Vec<LogLine> {
        vec![
            LogLine::Ack { user_id: 1, user_order_id: 1 },
            LogLine::BookUpdate { side: Side::Buy, top: Some((10, 5)) },
        ]
    }

    #[test]
    fn test_memory_sink_batches() {
        let mut sink = MemorySink::new();
        sink.write_lines(&sample()).unwrap();
        sink.end_batch().unwrap();
        sink.end_batch().unwrap();

        assert_eq!(sink.batches(), &[vec!["A, 1, 1".to_string(), "B, B, 10, 5".to_string()]]);
        assert!(sink.pending().is_empty());
    }

    #[test]
    fn test_file_sink_numbers_batches() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            log_dir: dir.path().join("logs"),
            echo: false,
        };
        let mut sink = FileSink::new(&config).unwrap();

        sink.write_lines(&sample()).unwrap();
        sink.end_batch().unwrap();
        sink.end_batch().unwrap();
        sink.write_lines(&sample()[..1]).unwrap();
        sink.end_batch().unwrap();

        let first = fs::read_to_string(sink.batch_path(1)).unwrap();
        assert_eq!(first, "A, 1, 1\nB, B, 10, 5\n");
        let second = fs::read_to_string(sink.batch_path(2)).unwrap();
        assert_eq!(second, "A, 1, 1\n");
        assert!(!sink.batch_path(3).exists());
        assert_eq!(sink.next_batch(), 3);
    }

    #[test]
    fn test_file_sink_empty_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            log_dir: dir.path().to_path_buf(),
            echo: false,
        };
        let mut sink = FileSink::new(&config).unwrap();

        sink.write_lines(&[]).unwrap();
        sink.end_batch().unwrap();

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(sink.next_batch(), 1);
    }
}
