//! Property tests for the interval and region algebra.

use proptest::prelude::*;

use crate::{Interval, Region};

fn constant_interval() -> impl Strategy<Value = Interval> {
    (-1000i64..1000, 0i64..1000).prop_map(|(lo, len)| Interval::constant(lo, lo + len))
}

fn constant_region(dims: usize) -> impl Strategy<Value = Region> {
    proptest::collection::vec(constant_interval(), dims).prop_map(Region::from_intervals)
}

proptest! {
    /// The hull contains both operands.
    #[test]
    fn hull_is_superset(a in constant_interval(), b in constant_interval()) {
        let h = a.hull(&b);
        prop_assert!(h.min_int().unwrap() <= a.min_int().unwrap());
        prop_assert!(h.min_int().unwrap() <= b.min_int().unwrap());
        prop_assert!(h.max_int().unwrap() >= a.max_int().unwrap());
        prop_assert!(h.max_int().unwrap() >= b.max_int().unwrap());
    }

    /// The intersection refines both operands.
    #[test]
    fn intersection_refines(a in constant_interval(), b in constant_interval()) {
        let i = a.intersect(&b);
        prop_assert!(i.min_int().unwrap() >= a.min_int().unwrap());
        prop_assert!(i.min_int().unwrap() >= b.min_int().unwrap());
        prop_assert!(i.max_int().unwrap() <= a.max_int().unwrap());
        prop_assert!(i.max_int().unwrap() <= b.max_int().unwrap());
    }

    /// Hull is commutative on constant intervals.
    #[test]
    fn hull_commutes(a in constant_interval(), b in constant_interval()) {
        prop_assert_eq!(a.hull(&b), b.hull(&a));
    }

    /// A region's size never shrinks under merge.
    #[test]
    fn merge_grows_size(a in constant_region(3), b in constant_region(3)) {
        let merged = a.hull(&b);
        prop_assert!(merged.size().unwrap() >= a.size().unwrap());
        prop_assert!(merged.size().unwrap() >= b.size().unwrap());
    }

    /// Unknown dimensions poison the size product.
    #[test]
    fn unknown_dimension_poisons_size(mut r in constant_region(3)) {
        prop_assert!(r.size().is_some());
        r.push(Interval::everything());
        prop_assert_eq!(r.size(), None);
    }
}
