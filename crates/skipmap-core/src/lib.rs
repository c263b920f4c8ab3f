//! Sorted in-memory map built on a skip list.
//!
//! [`SkipList`] keeps unique keys in ascending order and offers expected
//! `O(log n)` search, insertion and deletion without rebalancing. Node heights
//! come from an injectable random source, so a seeded or scripted generator
//! reproduces the exact same structure.
//!
//! ```
//! use skipmap_core::{DeleteOutcome, InsertOutcome, SkipList};
//!
//! let list = SkipList::new(6)?;
//! assert_eq!(list.insert(1, "First")?, InsertOutcome::Inserted);
//! assert_eq!(list.insert(1, "Fifth")?, InsertOutcome::AlreadyExists);
//! assert_eq!(list.get(&1), Some("First"));
//! assert_eq!(list.delete(&15), DeleteOutcome::NotFound);
//! # Ok::<(), skipmap_core::Error>(())
//! ```

pub mod config;
pub mod error;

mod level;
mod node;
mod skiplist;

pub use config::{Config, MAX_LEVEL_LIMIT};
pub use error::{Error, Result};
pub use skiplist::{DeleteOutcome, InsertOutcome, SkipList};
