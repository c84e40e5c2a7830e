//! Intervals and rectangular regions.
//!
//! An endpoint is either a bound expression or unknown; "unknown" is a real
//! discriminant (`None`), never a sentinel integer. Every operation defines
//! unknown as an absorbing element: arithmetic with an unknown endpoint stays
//! unknown, and a region with any unknown extent has unknown size.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;

use crate::{Expr, simplify};

/// Closed interval `[min, max]` of symbolic expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    /// Lower bound, `None` when unbounded below.
    pub min: Option<Expr>,
    /// Upper bound, `None` when unbounded above.
    pub max: Option<Expr>,
}

/// Bounds of the loop dimensions of one stage, keyed by variable name.
pub type DimBounds = BTreeMap<String, Interval>;

impl Interval {
    pub fn new(min: Expr, max: Expr) -> Self {
        Self { min: Some(min), max: Some(max) }
    }

    /// The unbounded interval.
    pub fn everything() -> Self {
        Self { min: None, max: None }
    }

    /// Single-point interval.
    pub fn point(e: Expr) -> Self {
        Self { min: Some(e.clone()), max: Some(e) }
    }

    pub fn constant(min: i64, max: i64) -> Self {
        Self::new(Expr::IntImm(min), Expr::IntImm(max))
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_some() && self.max.is_some()
    }

    /// `max - min + 1` when both endpoints are bound and the difference is a
    /// constant; `None` otherwise.
    pub fn extent(&self) -> Option<i64> {
        let (min, max) = (self.min.as_ref()?, self.max.as_ref()?);
        simplify(&(max.clone() - min.clone() + 1)).as_int()
    }

    /// Lower endpoint as a constant, if it is one.
    pub fn min_int(&self) -> Option<i64> {
        self.min.as_ref().and_then(Expr::as_int)
    }

    /// Upper endpoint as a constant, if it is one.
    pub fn max_int(&self) -> Option<i64> {
        self.max.as_ref().and_then(Expr::as_int)
    }

    /// Dimension-wise convex hull. Unknown on either side wins.
    pub fn hull(&self, other: &Interval) -> Interval {
        let min = match (&self.min, &other.min) {
            (Some(a), Some(b)) => Some(simplify(&Expr::min(a.clone(), b.clone()))),
            _ => None,
        };
        let max = match (&self.max, &other.max) {
            (Some(a), Some(b)) => Some(simplify(&Expr::max(a.clone(), b.clone()))),
            _ => None,
        };
        Interval { min, max }
    }

    /// Intersection; an unknown endpoint imposes no constraint.
    pub fn intersect(&self, other: &Interval) -> Interval {
        let min = match (&self.min, &other.min) {
            (Some(a), Some(b)) => Some(simplify(&Expr::max(a.clone(), b.clone()))),
            (Some(a), None) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        let max = match (&self.max, &other.max) {
            (Some(a), Some(b)) => Some(simplify(&Expr::min(a.clone(), b.clone()))),
            (Some(a), None) => Some(a.clone()),
            (None, b) => b.clone(),
        };
        Interval { min, max }
    }

    pub fn simplified(&self) -> Interval {
        Interval { min: self.min.as_ref().map(simplify), max: self.max.as_ref().map(simplify) }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = |e: &Option<Expr>| e.as_ref().map(|e| e.to_string()).unwrap_or_else(|| "?".to_string());
        write!(f, "[{}, {}]", end(&self.min), end(&self.max))
    }
}

/// Rectangular region: one interval per dimension, in dimension order.
///
/// A zero-dimensional region is a scalar and has size 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region(SmallVec<[Interval; 4]>);

impl Region {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        Self(intervals.into_iter().collect())
    }

    /// The unbounded region of the given dimensionality.
    pub fn everything(dimensions: usize) -> Self {
        Self((0..dimensions).map(|_| Interval::everything()).collect())
    }

    pub fn push(&mut self, interval: Interval) {
        self.0.push(interval);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, dim: usize) -> Option<&Interval> {
        self.0.get(dim)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.0.iter()
    }

    /// Dimension-wise hull with another region of the same arity.
    pub fn merge_with(&mut self, other: &Region) {
        assert_eq!(self.len(), other.len(), "cannot merge regions of different dimensionality");
        for (a, b) in self.0.iter_mut().zip(other.iter()) {
            *a = a.hull(b);
        }
    }

    pub fn hull(&self, other: &Region) -> Region {
        let mut merged = self.clone();
        merged.merge_with(other);
        merged
    }

    pub fn intersect(&self, other: &Region) -> Region {
        assert_eq!(self.len(), other.len(), "cannot intersect regions of different dimensionality");
        Region(self.0.iter().zip(other.iter()).map(|(a, b)| a.intersect(b)).collect())
    }

    /// Product of constant extents; `None` if any extent is unknown.
    pub fn size(&self) -> Option<i64> {
        let mut product = 1i64;
        for interval in &self.0 {
            product = product.checked_mul(interval.extent()?)?;
        }
        Some(product)
    }

    pub fn simplify(&mut self) {
        for interval in self.0.iter_mut() {
            *interval = interval.simplified();
        }
    }
}

impl std::ops::Index<usize> for Region {
    type Output = Interval;

    fn index(&self, dim: usize) -> &Interval {
        &self.0[dim]
    }
}

impl FromIterator<Interval> for Region {
    fn from_iter<T: IntoIterator<Item = Interval>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, interval) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{interval}")?;
        }
        write!(f, "}}")
    }
}
