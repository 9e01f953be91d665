//! yamal core library
//!
//! A persisted, append-only, memory-mapped log shared by several logical
//! lists. Producers append records to a list without blocking readers;
//! readers iterate any list forward from its head or from a saved offset,
//! picking up records committed after they started.
//!
//! # Key Components
//!
//! - **Storage**: the backing file, mapped page by page and grown on demand
//! - **Directory**: per-list head/tail offsets and the lock-free link
//! - **Records**: two-phase reserve/commit of variable-length records
//! - **Iterators**: cursors over one list that can wait at its end
//! - **Time**: sequence numbers and timestamps stamped on every record
//! - **Streams**: named aliases for the fixed lists used by the messaging
//!   layer, with bulk close and flush
//!
//! # Example
//!
//! ```no_run
//! use yamal_core::prelude::*;
//!
//! let stream = Stream::open("/tmp/feed.ytp", YamalConfig::default())?;
//! stream.write(StreamList::Data, 1_700_000_000, b"tick")?;
//!
//! let mut iter = stream.begin(StreamList::Data)?;
//! while let IterState::Positioned(_) = iter.state() {
//!     let record = stream.read(&iter)?;
//!     println!("#{} @{}: {:?}", record.sequence(), record.timestamp(), record.payload());
//!     stream.next(&mut iter)?;
//! }
//! # Ok::<(), yamal_core::YamalError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod directory;
pub mod error;
pub mod iter;
mod maintenance;
pub mod prelude;
pub mod record;
pub mod stats;
pub mod storage;
pub mod stream;
pub mod time;
pub mod types;
mod yamal;

pub use config::{MaintenanceConfig, YamalConfig};
pub use error::{ErrorCategory, Result, YamalError};
pub use iter::{IterState, ListIter, Records};
pub use record::{RECORD_HEADER_SIZE, Record, Reservation};
pub use stats::{ListStats, YamalStats};
pub use stream::{Stream, StreamList};
pub use time::{TIME_HEADER_SIZE, TimeLog, TimedRecord, TimedReservation};
pub use types::{LIST_COUNT, LIST_MAX, LIST_MIN, ListIndex, Offset};
pub use yamal::Yamal;
