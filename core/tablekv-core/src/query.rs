//! Query filters — per-column membership predicates evaluated during a
//! column-major scan.
//!
//! A [`Query`] is a conjunction of [`Filter`]s. Building never mutates the
//! receiver, so a base query can serve as a template:
//!
//! ```rust
//! use tablekv_core::query::Query;
//!
//! let base = Query::new().filter("color").eq(["WHITE", "RED"]);
//! let small = base.filter("size").eq([366]);
//! assert_eq!(base.filters().len(), 1);
//! assert_eq!(small.filters().len(), 2);
//! ```

use crate::codec::Value;
use crate::entry::{Entry, Owner};
use crate::error::TkvResult;
use crate::schema::Record;
use crate::store::Store;

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Value is one of the literals.
    Equal,
    /// Reserved. Evaluation accepts every entry.
    LessThan,
}

/// One column predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: String,
    op: Operator,
    values: Vec<Value>,
}

impl Filter {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Membership test against one entry of this filter's column.
    ///
    /// String and byte literals compare against the raw payload; other
    /// literals compare against the decoded value with
    /// [`Value::loosely_eq`], so numeric literals match any numeric entry of
    /// equal value. Decode errors propagate.
    pub fn accepts(&self, entry: &Entry) -> TkvResult<bool> {
        if self.op == Operator::LessThan {
            return Ok(true);
        }
        let mut decoded = None;
        for literal in &self.values {
            let hit = match literal {
                Value::String(s) => entry.data == s.as_bytes(),
                Value::Bytes(b) => entry.data == *b,
                other => {
                    if decoded.is_none() {
                        decoded = Some(entry.value()?);
                    }
                    decoded.as_ref().is_some_and(|v| v.loosely_eq(other))
                }
            };
            if hit {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Ordered conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a filter on `column`. The receiver is left untouched.
    pub fn filter(&self, column: &str) -> FilterBuilder {
        FilterBuilder {
            query: self.clone(),
            column: column.to_lowercase(),
        }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether `entry` keeps its row.
    ///
    /// Only filters naming the entry's column are consulted, so a filter on a
    /// column never seen for a row is vacuously satisfied.
    pub fn matches(&self, entry: &Entry) -> TkvResult<bool> {
        for filter in self.filters.iter().filter(|f| f.column == entry.column) {
            if !filter.accepts(entry)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Load every row of `R` owned by `owner` that passes this query.
    pub fn run<R: Record>(&self, store: &Store, owner: &Owner) -> TkvResult<Vec<R>> {
        if self.is_empty() {
            return store.load_all(owner);
        }
        store.load_all_with(owner, |entry| self.matches(entry))
    }
}

/// Pending filter returned by [`Query::filter`].
#[must_use]
pub struct FilterBuilder {
    query: Query,
    column: String,
}

impl FilterBuilder {
    /// Keep rows whose column equals any of `values`.
    pub fn eq<I, V>(self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.finish(Operator::Equal, values)
    }

    /// Reserved operator; recorded but inert during evaluation.
    pub fn lt<I, V>(self, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.finish(Operator::LessThan, values)
    }

    fn finish<I, V>(self, op: Operator, values: I) -> Query
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut query = self.query;
        query.filters.push(Filter {
            column: self.column,
            op,
            values: values.into_iter().map(Into::into).collect(),
        });
        query
    }
}
