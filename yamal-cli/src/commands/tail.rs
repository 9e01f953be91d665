//! Tail command - print the records of one list, optionally following it.

use anyhow::{Context, Result};
use chrono::DateTime;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;
use yamal_core::{IterState, ListIndex, TimeLog, TimedRecord, YamalConfig};

use super::list_name;

/// Options for [`run`].
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// List to print.
    pub list: ListIndex,
    /// Keep polling at the end of the list.
    pub follow: bool,
    /// Start at the current end instead of the head.
    pub from_end: bool,
    /// Write payloads as raw bytes, one per line.
    pub raw: bool,
    /// Delay between polls while following.
    pub poll: Duration,
    /// Stop after this many records.
    pub limit: Option<u64>,
}

/// Run the tail command.
pub fn run(path: &Path, options: &TailOptions) -> Result<()> {
    tracing::info!(path = %path.display(), list = %options.list, follow = options.follow, "Tailing list");

    let config = YamalConfig::read_only().from_env()?;
    let log = TimeLog::open(path, config)
        .with_context(|| format!("Failed to open yamal file: {}", path.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let printed = tail(&log, options, &mut out)?;
    tracing::debug!(printed, "Tail finished");
    Ok(())
}

/// Print records from `log` to `out`, returning how many were printed.
pub fn tail(log: &TimeLog, options: &TailOptions, out: &mut impl Write) -> Result<u64> {
    let mut iter = if options.from_end {
        log.end(options.list)?
    } else {
        log.begin(options.list)?
    };

    let mut printed = 0u64;
    loop {
        if options.limit.is_some_and(|limit| printed >= limit) {
            break;
        }
        match iter.state() {
            IterState::Positioned(_) => {
                let record = log.read(&iter)?;
                write_record(out, &record, options.raw)?;
                printed += 1;
                log.next(&mut iter)?;
            }
            IterState::AtListEnd(_) => {
                if !options.follow {
                    break;
                }
                out.flush()?;
                thread::sleep(options.poll);
                log.next(&mut iter)?;
            }
            IterState::Closed(list) => {
                tracing::info!(list = %list, "List closed");
                break;
            }
        }
    }

    out.flush()?;
    Ok(printed)
}

fn write_record(out: &mut impl Write, record: &TimedRecord<'_>, raw: bool) -> Result<()> {
    if raw {
        out.write_all(record.payload())?;
        out.write_all(b"\n")?;
        return Ok(());
    }
    writeln!(
        out,
        "{:>8}  {}  {:<20}  {:>12}  {}",
        record.sequence(),
        format_timestamp(record.timestamp()),
        list_name(record.list()),
        record.offset().to_string(),
        format_payload(record.payload())
    )?;
    Ok(())
}

/// Format nanoseconds since the epoch as UTC.
pub fn format_timestamp(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos)
        .format("%Y-%m-%d %H:%M:%S%.9f")
        .to_string()
}

/// Printable text is shown escaped, anything else as hex.
pub fn format_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(|c| c.is_control() && c != '\t') => {
            text.escape_debug().to_string()
        }
        _ => {
            let hex: String = payload.iter().map(|b| format!("{b:02x}")).collect();
            format!("0x{hex}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(list: ListIndex) -> TailOptions {
        TailOptions {
            list,
            follow: false,
            from_end: false,
            raw: true,
            poll: Duration::from_millis(1),
            limit: None,
        }
    }

    #[test]
    fn tail_prints_list_in_order() {
        let dir = tempdir().unwrap();
        let log = TimeLog::open(dir.path().join("t.ytp"), YamalConfig::for_testing()).unwrap();
        let list = ListIndex::new(2).unwrap();
        log.append(list, 1, b"one").unwrap();
        log.append(ListIndex::MIN, 2, b"other").unwrap();
        log.append(list, 3, b"two").unwrap();

        let mut out = Vec::new();
        assert_eq!(tail(&log, &options(list), &mut out).unwrap(), 2);
        assert_eq!(out, b"one\ntwo\n");
    }

    #[test]
    fn tail_respects_limit_and_from_end() {
        let dir = tempdir().unwrap();
        let log = TimeLog::open(dir.path().join("t.ytp"), YamalConfig::for_testing()).unwrap();
        let list = ListIndex::MIN;
        for i in 0..5u8 {
            log.append(list, 0, &[b'a' + i]).unwrap();
        }

        let mut out = Vec::new();
        let limited = TailOptions {
            limit: Some(2),
            ..options(list)
        };
        assert_eq!(tail(&log, &limited, &mut out).unwrap(), 2);
        assert_eq!(out, b"a\nb\n");

        let mut out = Vec::new();
        let from_end = TailOptions {
            from_end: true,
            ..options(list)
        };
        assert_eq!(tail(&log, &from_end, &mut out).unwrap(), 0);
    }

    #[test]
    fn follow_stops_at_closed_list() {
        let dir = tempdir().unwrap();
        let log = TimeLog::open(dir.path().join("t.ytp"), YamalConfig::for_testing()).unwrap();
        let list = ListIndex::MIN;
        log.append(list, 0, b"last").unwrap();
        log.yamal().close_list(list).unwrap();

        let mut out = Vec::new();
        let follow = TailOptions {
            follow: true,
            ..options(list)
        };
        assert_eq!(tail(&log, &follow, &mut out).unwrap(), 1);
    }

    #[test]
    fn payload_formatting() {
        assert_eq!(format_payload(b"hello"), "hello");
        assert_eq!(format_payload(&[0x00, 0xff]), "0x00ff");
        assert_eq!(format_payload(b"a\nb"), "0x610a62");
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00.000000000");
    }
}
