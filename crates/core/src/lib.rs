//! An in-memory object indexer and graph datastore.
//!
//! Records ([`Record`]) carry a dynamic bag of named attributes whose
//! values are [`Atom`]s: numbers, strings, booleans, null, or references to
//! other records. An [`Index`] registers records, maintains per-attribute
//! equality and range structures plus the reference-edge graph, and keeps
//! them consistent as attributes mutate. Queries are built with [`Q`]
//! (including dotted paths that traverse references) and evaluate to
//! materialized record lists or to composable [`FilteredView`]s.
//!
//! ```
//! use facetdb_core::{attrs, Index, Q, Record};
//!
//! let index = Index::new();
//! let store = Record::with_attrs(attrs!["name" => "Big"]);
//! let ann = Record::with_attrs(attrs!["name" => "Ann", "employer" => &store, "wage" => 70_000]);
//! index.add_many([store, ann.clone()]);
//!
//! let q = Q::eq("employer.name", "Big").unwrap().and(Q::gt("wage", 60_000).unwrap());
//! assert_eq!(index.reduced_query(&q).collect(), vec![ann.clone()]);
//!
//! ann.set("wage", 55_000);
//! assert!(index.reduced_query(&q).collect().is_empty());
//! ```

pub mod db;
pub mod error;
pub mod query;

pub use db::index::Index;
pub use db::record::Record;
pub use db::view::FilteredView;
pub use error::QueryError;
pub use query::expr::{AttrPath, CmpOp, Q, QueryExpr};

pub use facetdb_primitives::{AttrId, RecordId};
pub use facetdb_value::{attrs, Atom, AtomKind};
