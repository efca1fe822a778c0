use crate::core::config::ExportConfig;
use crate::core::error::{ReadoutError, Result};
use crate::core::export::format::ExportFormat;
use crate::core::export::record::ExportRecord;
use crate::core::video::Timestamp;
use log::{error, info};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Local time as `YYYYmmddHHMMSS`, used in artifact names.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// `true` when `path` is an existing directory a file can be created in.
pub fn is_directory_writable(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => tempfile::tempfile_in(path).is_ok(),
        _ => false,
    }
}

pub struct Exporter {
    format: ExportFormat,
    out_dir: PathBuf,
    digit_count: usize,
}

impl Exporter {
    pub fn new(format: ExportFormat, out_dir: impl Into<PathBuf>, digit_count: usize) -> Self {
        Self {
            format,
            out_dir: out_dir.into(),
            digit_count,
        }
    }

    pub fn from_config(config: &ExportConfig, digit_count: usize) -> Self {
        Self::new(config.format, config.out_dir.clone(), digit_count)
    }

    pub fn format(
        &self,
        values: &[u64],
        failure_rates: &[f32],
        timestamps: &[Timestamp],
    ) -> Result<ExportRecord> {
        ExportRecord::from_series(values, failure_rates, timestamps, self.digit_count)
    }

    /// Write `record` into the output directory and return the artifact path.
    ///
    /// The content goes to a temporary file in the same directory and is
    /// renamed into place, so a failed export leaves nothing behind.
    pub fn export(&self, record: &ExportRecord) -> Result<PathBuf> {
        if !is_directory_writable(&self.out_dir) {
            error!("❌ Export destination not writable: {:?}", self.out_dir);
            let kind = if self.out_dir.exists() {
                io::ErrorKind::PermissionDenied
            } else {
                io::ErrorKind::NotFound
            };
            return Err(ReadoutError::Io(io::Error::new(
                kind,
                format!("export destination is not a writable directory: {:?}", self.out_dir),
            )));
        }

        let content = self.format.encode(record)?;
        let target = self.unique_target();

        let mut tmp = tempfile::Builder::new()
            .prefix(".result_")
            .suffix(".partial")
            .tempfile_in(&self.out_dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&target).map_err(|e| e.error)?;

        info!("💾 Exported {} rows to {:?}", record.len(), target);
        Ok(target)
    }

    fn unique_target(&self) -> PathBuf {
        let stamp = now_stamp();
        let ext = self.format.extension();
        let mut target = self.out_dir.join(format!("result_{}.{}", stamp, ext));
        let mut n = 1;
        while target.exists() {
            target = self.out_dir.join(format!("result_{}_{}.{}", stamp, n, ext));
            n += 1;
        }
        target
    }
}

/// Parse an exported artifact; the format follows the file extension.
pub fn read_back(path: impl AsRef<Path>) -> Result<ExportRecord> {
    let path = path.as_ref();
    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ExportFormat::from_extension)
        .ok_or_else(|| {
            ReadoutError::Validation(format!("unknown export extension: {:?}", path))
        })?;
    let text = fs::read_to_string(path)?;
    format.decode(&text)
}
