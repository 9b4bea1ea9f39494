//! The value model for record attributes.
//!
//! An [`Atom`] is the single tagged value type an attribute can hold:
//! a 64-bit integer, a 64-bit float, a string, a boolean, null, or a
//! reference to another record by handle.
//!
//! ## Equality
//!
//! Equality is structural per variant, with one deliberate extension:
//! `I64(n)` equals `F64(x)` when `x` is finite, exactly integral, and equal
//! to `n`. The `Hash` implementation agrees, so `I64(30)` and `F64(30.0)`
//! land in the same posting list when used as an index key. A `Ref` is equal
//! only to a `Ref` with the same handle.
//!
//! ## Ordering
//!
//! Only the numeric variants are ordered, through [`Atom::as_f64`]. There is
//! intentionally no `Ord` on `Atom` itself: range queries are defined over
//! numerics only, and everything else stays invisible to them.
//!
//! Floats are carried as [`decorum::Total`] so that downstream structures
//! can key and order them; `Atom` itself defines equality as IEEE equality
//! with a single NaN class and signed zero collapsed, which is what keeps
//! `Eq` transitive across the int/float bridge.

use core::fmt;
use core::hash::{Hash, Hasher};

use decorum::Total;
pub use facetdb_primitives::RecordId;

/// A tagged attribute value.
#[derive(Debug, Clone)]
pub enum Atom {
    I64(i64),
    F64(Total<f64>),
    Str(Box<str>),
    Bool(bool),
    Null,
    /// A reference to another record, by engine-assigned handle.
    Ref(RecordId),
}

/// The variant tag of an [`Atom`], for diagnostics.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AtomKind {
    I64,
    F64,
    Str,
    Bool,
    Null,
    Ref,
}

impl fmt::Display for AtomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AtomKind::I64 => "int",
            AtomKind::F64 => "float",
            AtomKind::Str => "string",
            AtomKind::Bool => "bool",
            AtomKind::Null => "null",
            AtomKind::Ref => "ref",
        };
        f.write_str(s)
    }
}

/// `Some(n)` when `x` is finite, exactly integral, and representable as
/// `i64`. This is the bridge for cross-variant numeric equality.
fn as_exact_i64(x: f64) -> Option<i64> {
    // 2^63 is exactly representable; the open upper bound keeps the cast
    // in range.
    const LO: f64 = -9_223_372_036_854_775_808.0;
    const HI: f64 = 9_223_372_036_854_775_808.0;
    if x.is_finite() && x.fract() == 0.0 && x >= LO && x < HI {
        Some(x as i64)
    } else {
        None
    }
}

impl Atom {
    pub fn kind(&self) -> AtomKind {
        match self {
            Atom::I64(_) => AtomKind::I64,
            Atom::F64(_) => AtomKind::F64,
            Atom::Str(_) => AtomKind::Str,
            Atom::Bool(_) => AtomKind::Bool,
            Atom::Null => AtomKind::Null,
            Atom::Ref(_) => AtomKind::Ref,
        }
    }

    /// The numeric value of this atom, if it has one.
    ///
    /// Integers outside `±2^53` are cast with the usual `f64` rounding;
    /// range-query keys are defined as exactly this cast.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Atom::I64(n) => Some(*n as f64),
            Atom::F64(x) => Some(x.into_inner()),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Atom::I64(_) | Atom::F64(_))
    }

    /// The referenced handle, if this atom is a `Ref`.
    pub fn as_ref_id(&self) -> Option<RecordId> {
        match self {
            Atom::Ref(id) => Some(*id),
            _ => None,
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Atom::I64(a), Atom::I64(b)) => a == b,
            (Atom::F64(a), Atom::F64(b)) => {
                let (a, b) = (a.into_inner(), b.into_inner());
                // IEEE equality (so -0.0 == 0.0, keeping Eq transitive with
                // I64(0)), except that NaN equals NaN.
                a == b || (a.is_nan() && b.is_nan())
            }
            (Atom::I64(n), Atom::F64(x)) | (Atom::F64(x), Atom::I64(n)) => {
                as_exact_i64(x.into_inner()) == Some(*n)
            }
            (Atom::Str(a), Atom::Str(b)) => a == b,
            (Atom::Bool(a), Atom::Bool(b)) => a == b,
            (Atom::Null, Atom::Null) => true,
            (Atom::Ref(a), Atom::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Integral floats share the integer tag so the Hash/Eq contract
        // holds for cross-variant numeric equality.
        match self {
            Atom::I64(n) => {
                state.write_u8(0);
                n.hash(state);
            }
            Atom::F64(x) => {
                let v = x.into_inner();
                match as_exact_i64(v) {
                    Some(n) => {
                        state.write_u8(0);
                        n.hash(state);
                    }
                    None => {
                        state.write_u8(1);
                        // All NaN payloads are one equivalence class.
                        let bits = if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() };
                        bits.hash(state);
                    }
                }
            }
            Atom::Str(s) => {
                state.write_u8(2);
                s.hash(state);
            }
            Atom::Bool(b) => {
                state.write_u8(3);
                b.hash(state);
            }
            Atom::Null => state.write_u8(4),
            Atom::Ref(id) => {
                state.write_u8(5);
                id.hash(state);
            }
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::I64(n) => write!(f, "{n}"),
            Atom::F64(x) => write!(f, "{}", x.into_inner()),
            Atom::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Atom::Bool(b) => write!(f, "{b}"),
            Atom::Null => f.write_str("null"),
            Atom::Ref(id) => write!(f, "ref({id})"),
        }
    }
}

impl From<i64> for Atom {
    fn from(n: i64) -> Self {
        Atom::I64(n)
    }
}

impl From<i32> for Atom {
    fn from(n: i32) -> Self {
        Atom::I64(n.into())
    }
}

impl From<u32> for Atom {
    fn from(n: u32) -> Self {
        Atom::I64(n.into())
    }
}

impl From<f64> for Atom {
    fn from(x: f64) -> Self {
        Atom::F64(x.into())
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::Str(s.into())
    }
}

impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::Str(s.into())
    }
}

impl From<bool> for Atom {
    fn from(b: bool) -> Self {
        Atom::Bool(b)
    }
}

impl From<RecordId> for Atom {
    fn from(id: RecordId) -> Self {
        Atom::Ref(id)
    }
}

/// Builds an attribute list literal.
///
/// ```
/// use facetdb_value::{attrs, Atom};
///
/// let attrs = attrs!["name" => "A", "age" => 30];
/// assert_eq!(attrs[1].1, Atom::I64(30));
/// ```
#[macro_export]
macro_rules! attrs {
    ($($name:expr => $value:expr),* $(,)?) => {
        ::std::vec![
            $( (::std::boxed::Box::<str>::from($name), $crate::Atom::from($value)) ),*
        ]
    };
}
