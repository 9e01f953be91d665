//! Stats command - summarize a yamal file.

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;
use yamal_core::{IterState, ListIndex, ListIter, Yamal, YamalConfig, YamalStats};

use super::list_name;

/// Run the stats command.
pub fn run(path: &Path, json: bool) -> Result<()> {
    tracing::info!(path = %path.display(), json, "Collecting stats");

    let config = YamalConfig::read_only().from_env()?;
    let yamal = Yamal::open(path, config)
        .with_context(|| format!("Failed to open yamal file: {}", path.display()))?;
    let stats = yamal.stats().context("Failed to collect stats")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &stats)?;
        writeln!(out)?;
    } else {
        render(&stats, &mut out)?;
    }
    Ok(())
}

/// Run the stats command in follow mode: every `interval`, print the
/// records appended to each list since the previous report.
///
/// Returns once every list has been closed.
pub fn follow(path: &Path, interval: Duration) -> Result<()> {
    tracing::info!(path = %path.display(), interval_ms = interval.as_millis() as u64, "Following stats");

    let config = YamalConfig::read_only().from_env()?;
    let yamal = Yamal::open(path, config)
        .with_context(|| format!("Failed to open yamal file: {}", path.display()))?;
    let mut counters = ListCounters::at_end(&yamal)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    loop {
        thread::sleep(interval);
        let deltas = counters.poll(&yamal)?;
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        for delta in deltas.iter().filter(|d| d.records > 0) {
            writeln!(
                out,
                "{now}  {:<22} {:>10} records {:>14} bytes",
                list_name(delta.list),
                delta.records,
                delta.payload_bytes
            )?;
        }
        out.flush()?;

        if counters.all_closed() {
            tracing::info!("All lists closed");
            return Ok(());
        }
    }
}

/// Records appended to one list between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListDelta {
    /// The list.
    pub list: ListIndex,
    /// New records.
    pub records: u64,
    /// Payload bytes of the new records.
    pub payload_bytes: u64,
}

/// Per-list cursors counting records as they are appended.
pub struct ListCounters {
    cursors: Vec<ListIter>,
}

impl ListCounters {
    /// Start counting after the records already present.
    pub fn at_end(yamal: &Yamal) -> Result<Self> {
        let cursors = ListIndex::all()
            .map(|list| yamal.end(list))
            .collect::<yamal_core::Result<Vec<_>>>()?;
        Ok(Self { cursors })
    }

    /// Drain every list up to its current end.
    pub fn poll(&mut self, yamal: &Yamal) -> Result<Vec<ListDelta>> {
        self.cursors
            .iter_mut()
            .map(|cursor| -> Result<ListDelta> {
                let mut delta = ListDelta {
                    list: cursor.list(),
                    records: 0,
                    payload_bytes: 0,
                };
                while let IterState::Positioned(_) = yamal.next(cursor)? {
                    delta.records += 1;
                    delta.payload_bytes += yamal.read(cursor)?.size() as u64;
                }
                Ok(delta)
            })
            .collect()
    }

    /// Whether every list has been closed.
    pub fn all_closed(&self) -> bool {
        self.cursors
            .iter()
            .all(|cursor| matches!(cursor.state(), IterState::Closed(_)))
    }
}

/// Write a human-readable summary.
pub fn render(stats: &YamalStats, out: &mut impl Write) -> Result<()> {
    writeln!(out, "File Information")?;
    writeln!(out, "================")?;
    writeln!(out, "Path:           {}", stats.path.display())?;
    writeln!(out, "Page Size:      {} bytes", stats.page_size)?;
    writeln!(out, "Reserved:       {} bytes", stats.reserved_size)?;
    writeln!(out, "Max Size:       {} bytes", stats.max_size)?;
    writeln!(out, "Closable:       {}", stats.closable)?;
    writeln!(out, "Last Sequence:  {}", stats.last_sequence)?;
    writeln!(out, "Total Records:  {}", stats.total_records())?;
    writeln!(out)?;

    writeln!(
        out,
        "{:<22} {:>10} {:>14} {:>12} {:>12} {:>7}",
        "LIST", "RECORDS", "BYTES", "HEAD", "TAIL", "CLOSED"
    )?;
    writeln!(out, "{}", "-".repeat(82))?;
    for list in &stats.lists {
        writeln!(
            out,
            "{:<22} {:>10} {:>14} {:>12} {:>12} {:>7}",
            list_name(list.list),
            list.records,
            list.payload_bytes,
            list.head.to_string(),
            list.tail.to_string(),
            if list.closed { "yes" } else { "no" }
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use yamal_core::ListIndex;

    #[test]
    fn render_lists_every_list() {
        let dir = tempdir().unwrap();
        let yamal = Yamal::open(dir.path().join("s.ytp"), YamalConfig::for_testing()).unwrap();
        yamal.append(ListIndex::MIN, b"abc").unwrap();
        yamal.append(ListIndex::MIN, b"de").unwrap();
        yamal.close_list(ListIndex::MAX).unwrap();

        let stats = yamal.stats().unwrap();
        let mut out = Vec::new();
        render(&stats, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Total Records:  2"));
        let data = text.lines().find(|l| l.starts_with("data ")).unwrap();
        assert!(data.contains(" 2 ") && data.contains(" 5 "));
        let last = text.lines().find(|l| l.starts_with("list_7")).unwrap();
        assert!(last.trim_end().ends_with("yes"));
        assert_eq!(text.lines().filter(|l| l.ends_with("no")).count(), 7);
    }

    #[test]
    fn counters_report_only_new_records() {
        let dir = tempdir().unwrap();
        let yamal = Yamal::open(dir.path().join("f.ytp"), YamalConfig::for_testing()).unwrap();
        let (a, b) = (ListIndex::MIN, ListIndex::MAX);
        yamal.append(a, b"before").unwrap();

        let mut counters = ListCounters::at_end(&yamal).unwrap();
        assert!(counters.poll(&yamal).unwrap().iter().all(|d| d.records == 0));

        yamal.append(a, b"one").unwrap();
        yamal.append(a, b"two").unwrap();
        yamal.append(b, b"three").unwrap();
        let deltas = counters.poll(&yamal).unwrap();
        assert_eq!(deltas[a.slot()].records, 2);
        assert_eq!(deltas[a.slot()].payload_bytes, 6);
        assert_eq!(deltas[b.slot()].records, 1);
        assert!(counters.poll(&yamal).unwrap().iter().all(|d| d.records == 0));
        assert!(!counters.all_closed());

        for list in ListIndex::all() {
            yamal.close_list(list).unwrap();
        }
        counters.poll(&yamal).unwrap();
        assert!(counters.all_closed());
    }

    #[test]
    fn stats_serialize_to_json() {
        let dir = tempdir().unwrap();
        let yamal = Yamal::open(dir.path().join("j.ytp"), YamalConfig::for_testing()).unwrap();
        yamal.append(ListIndex::MIN, b"x").unwrap();

        let value = serde_json::to_value(yamal.stats().unwrap()).unwrap();
        assert_eq!(value["lists"].as_array().unwrap().len(), 8);
        assert_eq!(value["lists"][0]["records"], 1);
    }
}
