//! CLI command implementations.

pub mod cp;
pub mod stats;
pub mod tail;
pub mod write;

use anyhow::{Context, Result};
use yamal_core::{ListIndex, StreamList};

/// Parse a list given either as an index (`0`..`7`) or a stream name
/// (`data`, `peer-announcement`, ...).
pub fn parse_list(value: &str) -> Result<ListIndex> {
    if let Ok(index) = value.parse::<u8>() {
        return ListIndex::new(index).with_context(|| format!("Invalid list index: {value}"));
    }
    let stream: StreamList = value
        .parse()
        .with_context(|| format!("Unknown list name: {value}"))?;
    Ok(stream.into())
}

/// Display name for a list: the stream name when it has one.
pub fn list_name(list: ListIndex) -> String {
    StreamList::from_index(list)
        .map(|s| s.name().to_string())
        .unwrap_or_else(|| list.to_string())
}
