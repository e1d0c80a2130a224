//! Groups source files into mosaics that can each be composited as one VRT.
//!
//! Files within a group never overlap, so a mosaic has no ambiguity about
//! which file wins a pixel. Groups are ordered so that, wherever two files
//! overlap, the higher-priority one lands in an earlier group and is drawn on
//! top.

use crate::coord::BoundingBox;

/// Anything with a geographic footprint.
pub trait Footprint {
    fn footprint(&self) -> BoundingBox;
}

impl Footprint for BoundingBox {
    fn footprint(&self) -> BoundingBox {
        *self
    }
}

/// Partitions `items`, given in descending priority, into mosaic groups.
///
/// An item goes into the group after the latest group holding any
/// higher-priority item it overlaps, or into the first group if it overlaps
/// none. Every item appears exactly once; within a group, items keep their
/// priority order and are pairwise disjoint.
pub fn group_by_priority<T: Footprint + Clone>(items: &[T]) -> Vec<Vec<T>> {
    let boxes: Vec<BoundingBox> = items.iter().map(Footprint::footprint).collect();
    let mut assigned: Vec<usize> = Vec::with_capacity(items.len());
    let mut groups: Vec<Vec<T>> = Vec::new();

    for (j, item) in items.iter().enumerate() {
        let group = (0..j)
            .filter(|&i| boxes[i].intersects(&boxes[j]))
            .map(|i| assigned[i] + 1)
            .max()
            .unwrap_or(0);
        assigned.push(group);
        if group == groups.len() {
            groups.push(Vec::new());
        }
        groups[group].push(item.clone());
    }

    groups
}
