//! Core types for yamal.
//!
//! - `Offset`: stable byte offset into the mapped file
//! - `ListIndex`: bounds-checked index of one of the fixed logical lists

mod list;
mod offset;

pub use list::{LIST_COUNT, LIST_MAX, LIST_MIN, ListIndex};
pub use offset::Offset;
