//! Write command - append stdin lines to a list.

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::BufRead;
use std::path::Path;
use yamal_core::{ListIndex, TimeLog, YamalConfig};

/// Options for [`run`].
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// Target list.
    pub list: ListIndex,
    /// Create the file with closable lists.
    pub closable: bool,
    /// Close the list after the last line.
    pub close: bool,
}

/// Run the write command.
pub fn run(path: &Path, options: WriteOptions) -> Result<()> {
    let config = YamalConfig::default()
        .with_closable(options.closable)
        .from_env()?;
    let log = TimeLog::open(path, config)
        .with_context(|| format!("Failed to open yamal file: {}", path.display()))?;

    let stdin = std::io::stdin();
    let written = append_lines(&log, options.list, stdin.lock())?;
    tracing::info!(list = %options.list, written, "Appended records");

    if options.close {
        log.yamal()
            .close_list(options.list)
            .with_context(|| format!("Failed to close {}", options.list))?;
    }
    log.close().context("Failed to close yamal file")?;
    Ok(())
}

/// Append each non-empty line of `input` as one record stamped with the
/// current time.
pub fn append_lines(log: &TimeLog, list: ListIndex, input: impl BufRead) -> Result<u64> {
    let mut written = 0u64;
    for line in input.lines() {
        let line = line.context("Failed to read input")?;
        if line.is_empty() {
            continue;
        }
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        log.append(list, timestamp, line.as_bytes())
            .with_context(|| format!("Failed to append record {}", written + 1))?;
        written += 1;
    }
    Ok(written)
}
