//! Entries and the key scheme.
//!
//! ```text
//! key        = table "." column "." owner "." row
//! prefix key = table "." column "." owner "."
//! sequence   = owner "." table
//! ```
//!
//! Rows are rendered as unsigned decimal without leading zeros. Stored values
//! carry their [`TypeTag`] as a leading envelope byte because the substrate
//! has no out-of-band per-key metadata.

use crate::codec::{self, TypeTag, Value};
use crate::error::{TkvError, TkvResult};
use std::fmt;

/// Identity owning a set of rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Owner {
    /// The well-known `root` sentinel.
    #[default]
    Root,
    /// A caller-supplied unique identifier.
    Id(String),
}

impl Owner {
    /// Owner with a caller-supplied identifier.
    pub fn id(id: impl Into<String>) -> TkvResult<Self> {
        let id = id.into();
        check_ident("owner", &id)?;
        Ok(Owner::Id(id))
    }

    /// Resolve an identifier as received from a transport; `"root"` maps to
    /// [`Owner::Root`].
    pub fn parse(raw: &str) -> TkvResult<Self> {
        if raw == "root" {
            Ok(Owner::Root)
        } else {
            Owner::id(raw)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Owner::Root => "root",
            Owner::Id(id) => id,
        }
    }

    /// Re-check an owner that may have been built from the variant directly.
    pub fn validate(&self) -> TkvResult<()> {
        check_ident("owner", self.as_str())
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Owner {
    type Error = TkvError;

    fn try_from(raw: &str) -> TkvResult<Self> {
        Owner::parse(raw)
    }
}

/// Reject names that cannot appear as one key segment.
pub fn check_ident(kind: &'static str, name: &str) -> TkvResult<()> {
    if name.is_empty() || name.contains('.') {
        return Err(TkvError::InvalidIdentifier {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Key of one cell.
pub fn entry_key(table: &str, column: &str, owner: &Owner, row: u32) -> String {
    format!("{table}.{column}.{owner}.{row}")
}

/// Key prefix covering every row of one column for one owner.
pub fn prefix_key(table: &str, column: &str, owner: &Owner) -> String {
    format!("{table}.{column}.{owner}.")
}

/// Key of the row sequence for one (owner, table) pair.
pub fn sequence_key(owner: &Owner, table: &str) -> String {
    format!("{owner}.{table}")
}

/// Row ordinal of `key` under `prefix`.
///
/// `None` unless the remainder is a canonical decimal `u32`, so keys of a
/// longer owner or column that share the prefix are never taken for rows.
pub fn row_under(prefix: &[u8], key: &[u8]) -> Option<u32> {
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() || !rest.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if rest.len() > 1 && rest[0] == b'0' {
        return None;
    }
    std::str::from_utf8(rest).ok()?.parse().ok()
}

/// Prepend the tag byte to an encoded payload.
pub fn seal(tag: TypeTag, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(tag.as_byte());
    out.extend_from_slice(payload);
    out
}

/// Split a stored value into its tag and payload.
pub fn unseal(stored: &[u8]) -> TkvResult<(TypeTag, &[u8])> {
    let (&tag, payload) = stored.split_first().ok_or(TkvError::InsufficientData {
        tag: "envelope",
        expected: 1,
        actual: 0,
    })?;
    Ok((TypeTag::from_byte(tag)?, payload))
}

/// The atomic persisted unit: one column of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub table: String,
    pub column: String,
    pub owner: Owner,
    pub row: u32,
    pub data: Vec<u8>,
    pub tag: TypeTag,
}

impl Entry {
    /// Build an entry with an encoded value. The column name is lower-cased.
    pub fn new(table: &str, column: &str, owner: &Owner, row: u32, value: &Value) -> Self {
        let (data, tag) = codec::encode(value);
        Entry {
            table: table.to_string(),
            column: column.to_lowercase(),
            owner: owner.clone(),
            row,
            data,
            tag,
        }
    }

    /// Rebuild an entry from its stored value.
    pub(crate) fn from_stored(
        table: &str,
        column: &str,
        owner: &Owner,
        row: u32,
        stored: &[u8],
    ) -> TkvResult<Self> {
        let (tag, payload) = unseal(stored)?;
        Ok(Entry {
            table: table.to_string(),
            column: column.to_string(),
            owner: owner.clone(),
            row,
            data: payload.to_vec(),
            tag,
        })
    }

    pub fn key(&self) -> String {
        entry_key(&self.table, &self.column, &self.owner, self.row)
    }

    pub fn prefix_key(&self) -> String {
        prefix_key(&self.table, &self.column, &self.owner)
    }

    /// Stored form of the value: tag byte followed by the payload.
    pub fn sealed(&self) -> Vec<u8> {
        seal(self.tag, &self.data)
    }

    pub fn value(&self) -> TkvResult<Value> {
        codec::decode(&self.data, self.tag)
    }
}
