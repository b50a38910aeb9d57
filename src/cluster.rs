//! Merging of overlapping detections.
//!
//! Matches that overlap, directly or through a chain of other matches with
//! the same name, end up in one cluster. Each cluster is replaced by the
//! coordinate-wise mean of its members.

use crate::types::ScanMatch;

/// Union-find forest with path halving and union by size.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge the sets of `a` and `b`; false if they were already one.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }
}

/// Cluster matches per name and replace every cluster by its mean.
///
/// Edges are averaged and rounded to the nearest pixel, scales averaged.
/// Singletons are returned unchanged. Output is ordered by each cluster's
/// first member in `matches`.
pub fn cluster_matches(matches: &[ScanMatch]) -> Vec<ScanMatch> {
    let mut sets = DisjointSet::new(matches.len());
    for i in 0..matches.len() {
        for j in i + 1..matches.len() {
            if matches[i].name == matches[j].name && matches[i].intersects(&matches[j]) {
                sets.union(i, j);
            }
        }
    }

    // members per root, roots in order of first appearance
    let mut order: Vec<usize> = Vec::new();
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); matches.len()];
    for i in 0..matches.len() {
        let root = sets.find(i);
        if members[root].is_empty() {
            order.push(root);
        }
        members[root].push(i);
    }

    order
        .into_iter()
        .map(|root| mean_match(matches, &members[root]))
        .collect()
}

fn mean_match(matches: &[ScanMatch], members: &[usize]) -> ScanMatch {
    let first = &matches[members[0]];
    if members.len() == 1 {
        return first.clone();
    }

    let n = members.len() as f64;
    let mean = |get: fn(&ScanMatch) -> f64| {
        members.iter().map(|&i| get(&matches[i])).sum::<f64>() / n
    };
    ScanMatch {
        left: mean(|m| m.left as f64).round() as i32,
        top: mean(|m| m.top as f64).round() as i32,
        right: mean(|m| m.right as f64).round() as i32,
        bottom: mean(|m| m.bottom as f64).round() as i32,
        scale: mean(|m| m.scale),
        scale_x: mean(|m| m.scale_x),
        scale_y: mean(|m| m.scale_y),
        name: first.name.clone(),
    }
}
