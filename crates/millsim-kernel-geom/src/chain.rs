//! Path chaining to reduce non-cutting travel.

use serde::{Deserialize, Serialize};

use crate::Point2;

/// A 2D cutting path: an open polyline or a closed loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path2 {
    /// Points along the path. Closed loops do not repeat the first point.
    pub points: Vec<Point2>,
    /// Whether the path returns to its first point.
    pub closed: bool,
}

impl Path2 {
    /// An open polyline.
    pub fn open(points: Vec<Point2>) -> Self {
        Self {
            points,
            closed: false,
        }
    }

    /// A closed loop.
    pub fn closed(points: Vec<Point2>) -> Self {
        Self {
            points,
            closed: true,
        }
    }

    /// Check if the path has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Where the tool enters the path.
    pub fn start(&self) -> Option<Point2> {
        self.points.first().copied()
    }

    /// Where the tool leaves the path. A loop ends where it started.
    pub fn end(&self) -> Option<Point2> {
        if self.closed {
            self.start()
        } else {
            self.points.last().copied()
        }
    }

    /// Cutting points in travel order, closing loops explicitly.
    pub fn traversal(&self) -> Vec<Point2> {
        let mut pts = self.points.clone();
        if self.closed {
            if let Some(first) = self.points.first() {
                pts.push(*first);
            }
        }
        pts
    }

    /// Length of the cut, including the closing edge of a loop.
    pub fn length(&self) -> f64 {
        self.traversal().windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }
}

/// Reorder paths with greedy nearest-endpoint chaining.
///
/// The first path stays first. After each path, the remaining path whose
/// entry point is closest to the current exit point is taken next; an open
/// path is reversed when its far end is the closer one. Closed loops are
/// never reversed or rotated, and points inside a path are never reordered.
/// Empty paths are dropped.
pub fn optimize_path_connections(paths: Vec<Path2>) -> Vec<Path2> {
    let mut remaining: Vec<Path2> = paths.into_iter().filter(|p| !p.is_empty()).collect();
    if remaining.len() < 2 {
        return remaining;
    }

    let mut ordered = Vec::with_capacity(remaining.len());
    let first = remaining.remove(0);
    let mut current = first.end();
    ordered.push(first);

    while let Some(pos) = current {
        let mut best: Option<(usize, bool, f64)> = None;
        for (i, path) in remaining.iter().enumerate() {
            let mut candidates = vec![(false, path.start())];
            if !path.closed {
                candidates.push((true, path.end()));
            }
            for (reverse, entry) in candidates {
                let Some(entry) = entry else { continue };
                let dist = (entry - pos).norm();
                if best.is_none_or(|(_, _, d)| dist < d) {
                    best = Some((i, reverse, dist));
                }
            }
        }
        let Some((i, reverse, _)) = best else { break };
        let mut next = remaining.remove(i);
        if reverse {
            next.points.reverse();
        }
        current = next.end();
        ordered.push(next);
    }
    ordered
}
