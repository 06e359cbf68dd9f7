//! Record store — whole-record operations fanned out over column entries.
//!
//! # Data flow
//!
//! - **save**: allocate a row id, decompose the record into one entry per
//!   stored column, write them (one atomic batch by default), then write the
//!   id back into the identity field.
//! - **load**: one point read per stored column.
//! - **load_all**: one prefix scan per column, all taken from one consistent
//!   view of the substrate; the row ordinal is parsed from each key and rows
//!   are returned in numeric order.
//! - **delete**: remove every column key of the row.
//!
//! # Example
//!
//! ```rust
//! use tablekv_core::{Owner, Record, Store};
//!
//! #[derive(Debug, Default, PartialEq, Record)]
//! struct Fruit {
//!     id: u32,
//!     name: String,
//! }
//!
//! # fn main() -> tablekv_core::TkvResult<()> {
//! let store = Store::open_in_memory()?;
//! let mut mango = Fruit { id: 0, name: "mango".into() };
//! store.save(&Owner::Root, &mut mango)?;
//!
//! let loaded: Fruit = store.load(&Owner::Root, mango.id)?;
//! assert_eq!(loaded, mango);
//! # Ok(())
//! # }
//! ```

use crate::codec::Value;
use crate::config::{BackendKind, StoreConfig, WriteMode};
use crate::entry::{Entry, Owner, check_ident, entry_key, prefix_key, row_under, unseal};
use crate::error::{TkvError, TkvResult};
use crate::schema::Record;
use crate::sequence::SequenceAllocator;
use crate::storage::{KvBackend, MemoryBackend, SledBackend, WriteBatch};
use ahash::AHashSet;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Untyped row as exchanged with JSON transports.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// Typed tables over a [`KvBackend`].
///
/// `Store` is `Send + Sync`; share it behind an `Arc` across threads.
pub struct Store {
    backend: Arc<dyn KvBackend>,
    sequences: SequenceAllocator,
    config: StoreConfig,
}

impl Store {
    /// Open a store as described by `config`.
    #[instrument(skip(config), fields(backend = ?config.backend))]
    pub fn open(config: StoreConfig) -> TkvResult<Self> {
        config.validate()?;
        let backend: Arc<dyn KvBackend> = match config.backend {
            BackendKind::Sled => {
                let path = config
                    .path
                    .as_deref()
                    .ok_or_else(|| TkvError::Config("sled backend requires a path".to_string()))?;
                std::fs::create_dir_all(path)?;
                Arc::new(SledBackend::open(path)?)
            }
            BackendKind::Temporary => Arc::new(SledBackend::open_temporary()?),
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        info!(write_mode = ?config.write_mode, "store opened");
        Ok(Self::with_backend(backend, config))
    }

    /// In-memory store with default settings.
    pub fn open_in_memory() -> TkvResult<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Wrap an existing backend.
    pub fn with_backend(backend: Arc<dyn KvBackend>, config: StoreConfig) -> Self {
        let sequences = SequenceAllocator::new(Arc::clone(&backend), config.sequence_bandwidth);
        Self {
            backend,
            sequences,
            config,
        }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Allocate the next row id for (owner, table).
    pub fn next_row_id(&self, owner: &Owner, table: &str) -> TkvResult<u32> {
        self.sequences.next(owner, table)
    }

    // ════════════════════════════════════════════
    // Single entries
    // ════════════════════════════════════════════

    /// Write one entry.
    pub fn put_entry(&self, entry: &Entry) -> TkvResult<()> {
        check_scope(&entry.table, &entry.owner)?;
        check_ident("column", &entry.column)?;
        self.backend.insert(entry.key().as_bytes(), &entry.sealed())
    }

    /// Read one entry; `NotFound` if the key is absent.
    pub fn get_entry(&self, table: &str, column: &str, owner: &Owner, row: u32) -> TkvResult<Entry> {
        check_scope(table, owner)?;
        check_ident("column", column)?;
        let key = entry_key(table, column, owner, row);
        let stored = self
            .backend
            .get(key.as_bytes())?
            .ok_or_else(|| TkvError::not_found(key.as_str()))?;
        Entry::from_stored(table, column, owner, row, &stored)
    }

    fn write_entries(&self, entries: &[Entry]) -> TkvResult<()> {
        match self.config.write_mode {
            WriteMode::Atomic => {
                let mut batch = WriteBatch::new();
                for entry in entries {
                    batch.put(entry.key(), entry.sealed());
                }
                self.backend.apply(batch)
            }
            WriteMode::PerEntry => {
                for entry in entries {
                    self.put_entry(entry)?;
                }
                Ok(())
            }
        }
    }

    // ════════════════════════════════════════════
    // Typed records
    // ════════════════════════════════════════════

    fn entries_of<R: Record>(owner: &Owner, record: &R, row: u32) -> TkvResult<Vec<Entry>> {
        R::stored_columns()
            .map(|col| -> TkvResult<Entry> {
                let value = record
                    .column_value(col.name)
                    .ok_or_else(|| TkvError::UnknownColumn {
                        table: R::TABLE_NAME.to_string(),
                        column: col.name.to_string(),
                    })?;
                Ok(Entry::new(R::TABLE_NAME, col.name, owner, row, &value))
            })
            .collect()
    }

    /// Persist `record` under a freshly allocated row id and write that id
    /// into its identity field.
    #[instrument(skip_all, fields(table = R::TABLE_NAME, owner = %owner))]
    pub fn save<R: Record>(&self, owner: &Owner, record: &mut R) -> TkvResult<u32> {
        let row = self.sequences.next(owner, R::TABLE_NAME)?;
        let entries = Self::entries_of(owner, record, row)?;
        self.write_entries(&entries)?;
        record.set_id(row);
        debug!(row, columns = entries.len(), "saved record");
        Ok(row)
    }

    /// Overwrite the row `row` with `record`. The allocator is not touched.
    #[instrument(skip_all, fields(table = R::TABLE_NAME, owner = %owner, row = row))]
    pub fn update<R: Record>(&self, owner: &Owner, record: &mut R, row: u32) -> TkvResult<()> {
        check_scope(R::TABLE_NAME, owner)?;
        let entries = Self::entries_of(owner, record, row)?;
        self.write_entries(&entries)?;
        record.set_id(row);
        debug!(columns = entries.len(), "updated record");
        Ok(())
    }

    /// Read one row. Every stored column must be present.
    #[instrument(skip_all, fields(table = R::TABLE_NAME, owner = %owner, row = row))]
    pub fn load<R: Record>(&self, owner: &Owner, row: u32) -> TkvResult<R> {
        check_scope(R::TABLE_NAME, owner)?;
        let mut record = R::default();
        for col in R::stored_columns() {
            let entry = self.get_entry(R::TABLE_NAME, col.name, owner, row)?;
            record.set_column(col.name, entry.value()?)?;
        }
        record.set_id(row);
        Ok(record)
    }

    /// Read every row of `R` owned by `owner`, in row order.
    pub fn load_all<R: Record>(&self, owner: &Owner) -> TkvResult<Vec<R>> {
        self.load_all_with(owner, |_| Ok(true))
    }

    /// Read every row of `R` whose entries all pass `predicate`.
    ///
    /// Every column is read from one consistent view, so a row written by an
    /// atomic batch is seen whole or not at all. The predicate sees entries
    /// column by column. Once it rejects an entry, that row is dropped and its
    /// remaining columns are skipped. Rows with no entry for some column keep
    /// that field's default value.
    #[instrument(skip_all, fields(table = R::TABLE_NAME, owner = %owner))]
    pub fn load_all_with<R, P>(&self, owner: &Owner, mut predicate: P) -> TkvResult<Vec<R>>
    where
        R: Record,
        P: FnMut(&Entry) -> TkvResult<bool>,
    {
        check_scope(R::TABLE_NAME, owner)?;
        let columns: Vec<&'static str> = R::stored_columns().map(|col| col.name).collect();
        let prefixes: Vec<String> = columns
            .iter()
            .map(|column| prefix_key(R::TABLE_NAME, column, owner))
            .collect();
        let scans = self.scan_columns(&prefixes)?;

        let mut rows: BTreeMap<u32, R> = BTreeMap::new();
        let mut excluded: AHashSet<u32> = AHashSet::new();

        for ((column, prefix), scan) in columns.iter().zip(&prefixes).zip(scans) {
            for (key, stored) in scan {
                let Some(row) = row_under(prefix.as_bytes(), &key) else {
                    continue;
                };
                let entry = Entry::from_stored(R::TABLE_NAME, column, owner, row, &stored)?;
                if excluded.contains(&entry.row) {
                    continue;
                }
                if !predicate(&entry)? {
                    excluded.insert(entry.row);
                    rows.remove(&entry.row);
                    continue;
                }
                let value = entry.value()?;
                let record = rows.entry(entry.row).or_insert_with(|| {
                    let mut r = R::default();
                    r.set_id(entry.row);
                    r
                });
                record.set_column(column, value)?;
            }
        }

        debug!(rows = rows.len(), excluded = excluded.len(), "loaded rows");
        Ok(rows.into_values().collect())
    }

    /// Remove every stored column of `row`. Absent keys are not an error.
    #[instrument(skip_all, fields(table = R::TABLE_NAME, owner = %owner, row = row))]
    pub fn delete<R: Record>(&self, owner: &Owner, row: u32) -> TkvResult<()> {
        check_scope(R::TABLE_NAME, owner)?;
        let keys = R::stored_columns().map(|col| entry_key(R::TABLE_NAME, col.name, owner, row));
        match self.config.write_mode {
            WriteMode::Atomic => {
                let mut batch = WriteBatch::new();
                for key in keys {
                    batch.remove(key);
                }
                self.backend.apply(batch)
            }
            WriteMode::PerEntry => {
                for key in keys {
                    self.backend.remove(key.as_bytes())?;
                }
                Ok(())
            }
        }
    }

    // ════════════════════════════════════════════
    // Untyped rows
    // ════════════════════════════════════════════

    /// Persist a JSON object as a new row of `table`.
    ///
    /// Numbers are stored as decimal literals, so their static type is
    /// decided by whoever reads them back. Field names are lower-cased, so
    /// two fields differing only in case are rejected, as is an empty object.
    /// Nothing is allocated for a rejected row.
    #[instrument(skip_all, fields(table = %table, owner = %owner))]
    pub fn insert_raw(&self, table: &str, owner: &Owner, fields: &RawRow) -> TkvResult<u32> {
        check_scope(table, owner)?;
        if fields.is_empty() {
            return Err(TkvError::UnsupportedType("row with no fields".to_string()));
        }
        let mut seen = AHashSet::with_capacity(fields.len());
        let values = fields
            .iter()
            .map(|(name, json)| -> TkvResult<(String, Value)> {
                check_ident("column", name)?;
                let column = name.to_lowercase();
                if !seen.insert(column.clone()) {
                    return Err(TkvError::UnsupportedType(format!(
                        "field {name:?} repeats column {column:?}"
                    )));
                }
                Ok((column, Value::from_json(json)?))
            })
            .collect::<TkvResult<Vec<_>>>()?;
        let row = self.sequences.next(owner, table)?;
        let entries: Vec<Entry> = values
            .iter()
            .map(|(name, value)| Entry::new(table, name, owner, row, value))
            .collect();
        self.write_entries(&entries)?;
        debug!(row, columns = entries.len(), "inserted raw row");
        Ok(row)
    }

    /// Read the named columns of every row of `table`, decoding each entry by
    /// its stored tag. Columns absent for a row are omitted from its map.
    #[instrument(skip_all, fields(table = %table, owner = %owner))]
    pub fn fetch_raw(&self, table: &str, owner: &Owner, columns: &[&str]) -> TkvResult<Vec<RawRow>> {
        check_scope(table, owner)?;
        let columns = columns
            .iter()
            .map(|column| -> TkvResult<String> {
                check_ident("column", column)?;
                Ok(column.to_lowercase())
            })
            .collect::<TkvResult<Vec<_>>>()?;
        let prefixes: Vec<String> = columns
            .iter()
            .map(|column| prefix_key(table, column, owner))
            .collect();
        let scans = self.scan_columns(&prefixes)?;

        let mut rows: BTreeMap<u32, RawRow> = BTreeMap::new();
        for ((column, prefix), scan) in columns.iter().zip(&prefixes).zip(scans) {
            for (key, stored) in scan {
                let Some(row) = row_under(prefix.as_bytes(), &key) else {
                    continue;
                };
                let entry = Entry::from_stored(table, column, owner, row, &stored)?;
                let json = entry.value()?.to_json()?;
                rows.entry(entry.row)
                    .or_default()
                    .insert(column.clone(), json);
            }
        }
        Ok(rows.into_values().collect())
    }

    fn scan_columns(&self, prefixes: &[String]) -> TkvResult<Vec<Vec<(Vec<u8>, Vec<u8>)>>> {
        let prefixes: Vec<&[u8]> = prefixes.iter().map(|p| p.as_bytes()).collect();
        self.backend.scan_prefixes(&prefixes)
    }

    // ════════════════════════════════════════════
    // Maintenance
    // ════════════════════════════════════════════

    /// Write every entry as `key=<key>, value=<json>` lines.
    pub fn dump_to<W: Write>(&self, w: &mut W) -> TkvResult<()> {
        for (key, stored) in self.backend.scan_prefix(b"")? {
            let key = String::from_utf8_lossy(&key);
            let (tag, payload) = unseal(&stored)?;
            let rendered = match crate::codec::decode(payload, tag).and_then(|v| v.to_json()) {
                Ok(json) => json.to_string(),
                Err(_) => format!("{payload:?}"),
            };
            writeln!(w, "key={key}, value={rendered}")?;
        }
        Ok(())
    }

    pub fn flush(&self) -> TkvResult<()> {
        self.backend.flush()
    }

    /// Release the row sequences and, if configured, flush the substrate.
    ///
    /// The store refuses new saves afterwards; reads keep working.
    pub fn close(&self) -> TkvResult<()> {
        let released = self.sequences.release();
        if self.config.flush_on_close {
            self.backend.flush()?;
        }
        released
    }

    pub fn is_closed(&self) -> bool {
        self.sequences.is_released()
    }
}

fn check_scope(table: &str, owner: &Owner) -> TkvResult<()> {
    check_ident("table", table)?;
    owner.validate()
}

impl Drop for Store {
    fn drop(&mut self) {
        if !self.sequences.is_released()
            && let Err(e) = self.close()
        {
            warn!(error = %e, "failed to close store");
        }
    }
}
