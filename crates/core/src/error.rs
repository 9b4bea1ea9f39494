use facetdb_value::AtomKind;
use thiserror::Error;

/// A query that could not be built.
///
/// Construction is the only fallible stage: evaluating a well-formed
/// expression never errors. Missing attributes, dangling references and
/// type-incompatible comparisons against stored values all degrade to empty
/// result sets at evaluation time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("malformed attribute path `{0}`")]
    MalformedPath(String),
    #[error("range bound for `{attr}` must be a finite number, found {found}")]
    NonNumericBound { attr: String, found: AtomKind },
    #[error("`between` bounds are inverted: {lo} > {hi}")]
    InvertedBounds { lo: f64, hi: f64 },
}
