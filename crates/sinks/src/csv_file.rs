//! Atomic CSV file sink.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use walletsync_core::error::{SinkError, SinkResult};
use walletsync_core::models::{NormalizedRow, ROW_HEADER};
use walletsync_core::ports::LocalSink;

/// Local sink writing one UTF-8 CSV file per wallet.
///
/// The file is written to a temporary sibling and renamed over the target,
/// so readers see either the previous file or the complete new one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFileSink;

impl CsvFileSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocalSink for CsvFileSink {
    #[instrument(skip_all, fields(path = %path.display(), rows = rows.len()))]
    async fn write(&self, rows: &[NormalizedRow], path: &Path) -> SinkResult<()> {
        let rows = rows.to_vec();
        let target = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            write_atomic(&target, |file| write_rows(&rows, file))
        })
        .await
        .map_err(|e| local_error(path, e))?
        .map_err(|e| local_error(path, e))?;

        debug!("CSV file replaced");
        Ok(())
    }
}

fn local_error(path: &Path, err: impl ToString) -> SinkError {
    SinkError::Local {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Header followed by one record per row.
fn write_rows<W: Write>(rows: &[NormalizedRow], out: W) -> io::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(ROW_HEADER)?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }
    writer.flush()
}

/// Write `path` through a temporary file in the same directory.
///
/// The temporary file is removed if `fill` or the rename fails, leaving any
/// existing file at `path` untouched.
fn write_atomic<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> io::Result<()>,
{
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    fill(&mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
