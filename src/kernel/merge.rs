//! Ordered walk over the nonzeros of two sparse vectors

use crate::core::SparseVector;
use std::cmp::Ordering;

/// Yields `(xᵢ, yᵢ)` for every index set in `x` or `y`, in index order.
/// The missing side reads as 0.
pub(crate) struct Union<'a> {
    x: &'a SparseVector,
    y: &'a SparseVector,
    i: usize,
    j: usize,
}

impl Iterator for Union<'_> {
    type Item = (f32, f32);

    fn next(&mut self) -> Option<Self::Item> {
        let xi = self.x.indices.get(self.i);
        let yj = self.y.indices.get(self.j);
        let order = match (xi, yj) {
            (None, None) => return None,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        };

        Some(match order {
            Ordering::Less => {
                self.i += 1;
                (self.x.values[self.i - 1], 0.0)
            }
            Ordering::Greater => {
                self.j += 1;
                (0.0, self.y.values[self.j - 1])
            }
            Ordering::Equal => {
                self.i += 1;
                self.j += 1;
                (self.x.values[self.i - 1], self.y.values[self.j - 1])
            }
        })
    }
}

pub(crate) fn union<'a>(x: &'a SparseVector, y: &'a SparseVector) -> Union<'a> {
    Union { x, y, i: 0, j: 0 }
}

/// Like [`union`] but only indices set in both vectors
pub(crate) fn shared<'a>(
    x: &'a SparseVector,
    y: &'a SparseVector,
) -> impl Iterator<Item = (f32, f32)> + 'a {
    let mut j = 0;
    x.indices
        .iter()
        .zip(&x.values)
        .filter_map(move |(&index, &xv)| {
            while j < y.indices.len() && y.indices[j] < index {
                j += 1;
            }
            match y.indices.get(j) {
                Some(&other) if other == index => Some((xv, y.values[j])),
                _ => None,
            }
        })
}
