use crate::error::Result;
use crate::sample::{TrainingSample, TrainingStats};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Where the log lives under the data root.
pub const TRAINING_LOG_REL_PATH: &str = ".intentd/ml/training_samples.jsonl";

/// Durable append-only feedback log: one JSON object per line, UTF-8.
///
/// Created lazily on first append; never truncated or rewritten. Appends are
/// serialized behind a mutex so concurrent requests each land exactly one
/// complete line. Stats readers re-read the whole file and may or may not
/// observe an in-flight append (documented weak consistency).
pub struct FeedbackLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl FeedbackLog {
    /// Log handle rooted at `data_root` (current directory when `None`).
    #[must_use]
    pub fn at_data_root(data_root: Option<&Path>) -> Self {
        let root = data_root.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::at_path(root.join(TRAINING_LOG_REL_PATH))
    }

    #[must_use]
    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            append_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample as one line, creating parent directories on first
    /// use. Safe to call repeatedly; prior content is never touched.
    pub fn append(&self, sample: &TrainingSample) -> Result<()> {
        let mut line = serde_json::to_string(sample)?;
        line.push('\n');

        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Recompute aggregate statistics from the full log. Malformed lines are
    /// skipped (counted toward nothing); a missing file yields zeroed stats.
    pub fn stats(&self) -> Result<TrainingStats> {
        let mut stats = TrainingStats::default();

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                stats.finalize();
                return Ok(stats);
            }
            Err(err) => return Err(err.into()),
        };

        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TrainingSample>(line) {
                Ok(sample) => stats.record(&sample),
                Err(err) => {
                    log::debug!("Skipping corrupt feedback line: {err}");
                }
            }
        }

        stats.finalize();
        Ok(stats)
    }
}
