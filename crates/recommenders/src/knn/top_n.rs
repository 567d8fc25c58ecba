//! Bounded top-k selection over a similarity row.

use super::Neighbor;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap entry ordered so that the *worst* candidate sits at the top
#[derive(Debug, Clone, Copy)]
struct Ranked {
    index: usize,
    similarity: f64,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower similarity is "greater"; among equals the higher index is
        other
            .similarity
            .total_cmp(&self.similarity)
            .then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// The `k` best entries of `row`, best first.
///
/// Non-finite similarities (−∞, NaN) are never selected. Ties go to the
/// lower index. Runs in O(N log k).
pub fn top_n(row: &[f64], k: usize) -> Vec<Neighbor> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(k + 1);
    for (index, &similarity) in row.iter().enumerate() {
        if !similarity.is_finite() {
            continue;
        }
        let candidate = Ranked { index, similarity };
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(worst) = heap.peek() {
            if candidate < *worst {
                heap.pop();
                heap.push(candidate);
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|ranked| Neighbor {
            index: ranked.index,
            similarity: ranked.similarity,
        })
        .collect()
}
