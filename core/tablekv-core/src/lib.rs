//! # tablekv — typed tables over a sorted key-value store
//!
//! Each field of a record is stored as its own entry under the key
//! `table.column.owner.row`. Row ids come from a per-(owner, table) sequence
//! leased in blocks from the substrate.
//!
//! ## Quick start
//!
//! ```rust
//! use tablekv_core::{Owner, Query, Record, Store};
//!
//! #[derive(Debug, Default, Record)]
//! #[tkv(table_name = "balloons")]
//! struct Balloon {
//!     id: u32,
//!     color: String,
//!     size: i32,
//! }
//!
//! # fn main() -> tablekv_core::TkvResult<()> {
//! let store = Store::open_in_memory()?;
//! for (color, size) in [("WHITE", 366), ("RED", 695), ("BLUE", 112)] {
//!     let mut b = Balloon { id: 0, color: color.into(), size };
//!     store.save(&Owner::Root, &mut b)?;
//! }
//!
//! let warm: Vec<Balloon> = Query::new()
//!     .filter("color")
//!     .eq(["WHITE", "RED"])
//!     .run(&store, &Owner::Root)?;
//! assert_eq!(warm.len(), 2);
//! assert_eq!(warm[1].id, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! balloons.color.root.0 -> [tag 24] "WHITE"
//! balloons.size.root.0  -> [tag 5]  00 00 01 6e
//! ```
//!
//! ## Modules
//!
//! - [`codec`] — type tags and value encoding
//! - [`entry`] — keys and stored entries
//! - [`schema`] — the [`Record`] descriptor
//! - [`sequence`] — row id allocation
//! - [`storage`] — substrate backends (sled, memory)
//! - [`store`] — record operations ([`Store`])
//! - [`query`] — column filters
//! - [`config`] — [`StoreConfig`]
//! - [`logging`] — tracing subscriber setup

// The derive emits `::tablekv_core::` paths; this lets it run inside the crate.
extern crate self as tablekv_core;

pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod logging;
pub mod query;
pub mod schema;
pub mod sequence;
pub mod storage;
pub mod store;

pub use codec::{ColumnValue, Number, TypeTag, Value};
pub use config::{BackendKind, StoreConfig, WriteMode};
pub use entry::{Entry, Owner};
pub use error::{TkvError, TkvResult};
pub use query::{Filter, Operator, Query};
pub use schema::{ColumnDef, Record};
pub use storage::{KvBackend, MemoryBackend, SledBackend, WriteBatch};
pub use store::{RawRow, Store};

pub use tablekv_derive::Record;
