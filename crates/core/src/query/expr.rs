use core::fmt;

use facetdb_value::Atom;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::error::QueryError;

/// A dotted attribute path, `a1.a2.….ak`.
///
/// A single-segment path queries the attribute directly; a longer path
/// traverses reference edges, one segment per hop. Paths are validated when
/// an expression is built, never during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrPath {
    segments: SmallVec<[Box<str>; 1]>,
}

impl AttrPath {
    pub fn parse(path: &str) -> Result<Self, QueryError> {
        let segments: SmallVec<[Box<str>; 1]> = path.split('.').map(Box::from).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(QueryError::MalformedPath(path.into()));
        }
        Ok(AttrPath { segments })
    }

    pub(crate) fn segments(&self) -> &[Box<str>] {
        &self.segments
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.iter().join("."))
    }
}

/// A strict or inclusive numeric comparison.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
        };
        f.write_str(s)
    }
}

/// A predicate over record attributes.
///
/// Built through [`Q`]; evaluation is infallible and returns the matching
/// handles relative to a scope (an index's handle set or a view's
/// allow-set). Unknown attributes, dangling references and non-numeric
/// values under a range operator all contribute nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// The constant predicate matching the whole scope.
    All,
    /// The constant predicate matching nothing.
    None,
    Eq(AttrPath, Atom),
    Ne(AttrPath, Atom),
    In(AttrPath, Vec<Atom>),
    Cmp(AttrPath, CmpOp, f64),
    /// Inclusive on both ends.
    Between(AttrPath, f64, f64),
    And(Vec<QueryExpr>),
    Or(Vec<QueryExpr>),
    Not(Box<QueryExpr>),
}

impl QueryExpr {
    pub fn and(self, other: QueryExpr) -> QueryExpr {
        QueryExpr::And(vec![self, other])
    }

    pub fn or(self, other: QueryExpr) -> QueryExpr {
        QueryExpr::Or(vec![self, other])
    }

    pub fn not(self) -> QueryExpr {
        QueryExpr::Not(Box::new(self))
    }
}

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryExpr::All => f.write_str("TRUE"),
            QueryExpr::None => f.write_str("FALSE"),
            QueryExpr::Eq(path, value) => write!(f, "({path} = {value})"),
            QueryExpr::Ne(path, value) => write!(f, "({path} <> {value})"),
            QueryExpr::In(path, values) => {
                write!(f, "({path} IN ({}))", values.iter().join(", "))
            }
            QueryExpr::Cmp(path, op, bound) => write!(f, "({path} {op} {bound})"),
            QueryExpr::Between(path, lo, hi) => write!(f, "({path} BETWEEN {lo} AND {hi})"),
            QueryExpr::And(children) if children.is_empty() => f.write_str("TRUE"),
            QueryExpr::And(children) => write!(f, "({})", children.iter().join(" AND ")),
            QueryExpr::Or(children) if children.is_empty() => f.write_str("FALSE"),
            QueryExpr::Or(children) => write!(f, "({})", children.iter().join(" OR ")),
            QueryExpr::Not(inner) => write!(f, "(NOT {inner})"),
        }
    }
}

/// The query builder.
///
/// Leaf constructors validate their path (and, for range operators, their
/// bound) up front and return a [`QueryError`] for anything malformed;
/// combinators over already-built expressions cannot fail.
pub struct Q;

impl Q {
    pub fn eq(path: &str, value: impl Into<Atom>) -> Result<QueryExpr, QueryError> {
        Ok(QueryExpr::Eq(AttrPath::parse(path)?, value.into()))
    }

    pub fn ne(path: &str, value: impl Into<Atom>) -> Result<QueryExpr, QueryError> {
        Ok(QueryExpr::Ne(AttrPath::parse(path)?, value.into()))
    }

    /// Matches any of `values`: the union of their posting lists.
    pub fn is_in<V: Into<Atom>>(
        path: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<QueryExpr, QueryError> {
        Ok(QueryExpr::In(
            AttrPath::parse(path)?,
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn gt(path: &str, bound: impl Into<Atom>) -> Result<QueryExpr, QueryError> {
        Self::cmp(path, CmpOp::Gt, bound)
    }

    pub fn ge(path: &str, bound: impl Into<Atom>) -> Result<QueryExpr, QueryError> {
        Self::cmp(path, CmpOp::Ge, bound)
    }

    pub fn lt(path: &str, bound: impl Into<Atom>) -> Result<QueryExpr, QueryError> {
        Self::cmp(path, CmpOp::Lt, bound)
    }

    pub fn le(path: &str, bound: impl Into<Atom>) -> Result<QueryExpr, QueryError> {
        Self::cmp(path, CmpOp::Le, bound)
    }

    fn cmp(path: &str, op: CmpOp, bound: impl Into<Atom>) -> Result<QueryExpr, QueryError> {
        let parsed = AttrPath::parse(path)?;
        Ok(QueryExpr::Cmp(parsed, op, Self::numeric(path, bound.into())?))
    }

    /// `lo <= value <= hi`.
    pub fn between(
        path: &str,
        lo: impl Into<Atom>,
        hi: impl Into<Atom>,
    ) -> Result<QueryExpr, QueryError> {
        let parsed = AttrPath::parse(path)?;
        let lo = Self::numeric(path, lo.into())?;
        let hi = Self::numeric(path, hi.into())?;
        if lo > hi {
            return Err(QueryError::InvertedBounds { lo, hi });
        }
        Ok(QueryExpr::Between(parsed, lo, hi))
    }

    pub fn and(children: impl IntoIterator<Item = QueryExpr>) -> QueryExpr {
        QueryExpr::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = QueryExpr>) -> QueryExpr {
        QueryExpr::Or(children.into_iter().collect())
    }

    pub fn not(inner: QueryExpr) -> QueryExpr {
        QueryExpr::Not(Box::new(inner))
    }

    pub fn all() -> QueryExpr {
        QueryExpr::All
    }

    pub fn none() -> QueryExpr {
        QueryExpr::None
    }

    /// The conjunction of one equality per pair, the shape behind the
    /// attribute-map sugar on `Index` and `FilteredView`.
    pub fn eq_all(attrs: &[(&str, Atom)]) -> Result<QueryExpr, QueryError> {
        let children = attrs
            .iter()
            .map(|(path, value)| Self::eq(path, value.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryExpr::And(children))
    }

    /// A range bound must be a finite number: NaN and the infinities would
    /// otherwise build expressions whose key ranges are unorderable.
    fn numeric(attr: &str, bound: Atom) -> Result<f64, QueryError> {
        bound
            .as_f64()
            .filter(|x| x.is_finite())
            .ok_or_else(|| QueryError::NonNumericBound {
                attr: attr.to_owned(),
                found: bound.kind(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facetdb_value::AtomKind;

    #[test]
    fn paths_validate_at_build_time() {
        assert!(AttrPath::parse("employer.name").is_ok());
        assert_eq!(
            AttrPath::parse(""),
            Err(QueryError::MalformedPath("".into()))
        );
        assert_eq!(
            Q::eq("a..b", 1).unwrap_err(),
            QueryError::MalformedPath("a..b".into())
        );
        assert!(Q::eq("a.b.", 1).is_err());
    }

    #[test]
    fn range_bounds_must_be_numeric() {
        assert_eq!(
            Q::gt("wage", "a lot").unwrap_err(),
            QueryError::NonNumericBound {
                attr: "wage".into(),
                found: AtomKind::Str,
            }
        );
        assert!(Q::between("wage", 1, 10).is_ok());
        assert_eq!(
            Q::between("wage", 10, 1).unwrap_err(),
            QueryError::InvertedBounds { lo: 10.0, hi: 1.0 }
        );
    }

    #[test]
    fn range_bounds_must_be_finite() {
        assert_eq!(
            Q::between("wage", f64::NAN, 5.0).unwrap_err(),
            QueryError::NonNumericBound {
                attr: "wage".into(),
                found: AtomKind::F64,
            }
        );
        assert!(Q::gt("wage", f64::INFINITY).is_err());
        assert!(Q::le("wage", f64::NEG_INFINITY).is_err());
        assert!(Q::lt("wage", f64::MAX).is_ok());
    }

    #[test]
    fn display_renders_sql_ish() {
        let q = Q::eq("employer.name", "Big")
            .unwrap()
            .and(Q::ge("wage", 60_000).unwrap());
        assert_eq!(q.to_string(), "((employer.name = 'Big') AND (wage >= 60000))");
        assert_eq!(
            Q::not(Q::is_in("age", [25, 30]).unwrap()).to_string(),
            "(NOT (age IN (25, 30)))"
        );
        assert_eq!(Q::all().to_string(), "TRUE");
    }
}
