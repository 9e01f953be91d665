//! Prelude for convenient imports.
//!
//! ```
//! use yamal_core::prelude::*;
//! ```

// Core types
pub use crate::types::{LIST_MAX, LIST_MIN, ListIndex, Offset};

// Error handling
pub use crate::error::{Result, YamalError};

// Configuration
pub use crate::config::{MaintenanceConfig, YamalConfig};

// Log layers
pub use crate::iter::{IterState, ListIter};
pub use crate::record::{Record, Reservation};
pub use crate::stream::{Stream, StreamList};
pub use crate::time::{TimeLog, TimedRecord, TimedReservation};
pub use crate::yamal::Yamal;
