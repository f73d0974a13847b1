use serde::{Deserialize, Serialize};

/// Sparse row vector with strictly increasing indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    dim: usize,
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
        }
    }

    /// Build from unordered pairs; repeated indices are summed and zeros dropped.
    pub fn from_pairs(dim: usize, mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_by_key(|(i, _)| *i);
        let mut entries: Vec<(u32, f32)> = Vec::with_capacity(pairs.len());
        for (idx, value) in pairs {
            debug_assert!((idx as usize) < dim, "index {idx} out of range {dim}");
            match entries.last_mut() {
                Some((last, acc)) if *last == idx => *acc += value,
                _ => entries.push((idx, value)),
            }
        }
        entries.retain(|(_, v)| *v != 0.0);
        Self { dim, entries }
    }

    pub fn from_dense(values: &[f32]) -> Self {
        let entries = values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i as u32, *v))
            .collect();
        Self {
            dim: values.len(),
            entries,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut acc = 0.0f32;
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_val) = self.entries[i];
            let (b_idx, b_val) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += a_val * b_val;
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, v)| v * v).sum::<f32>().sqrt()
    }

    /// Cosine similarity; zero when either vector is zero.
    pub fn cosine(&self, other: &SparseVector) -> f32 {
        let denom = self.norm() * other.norm();
        if denom == 0.0 {
            return 0.0;
        }
        (self.dot(other) / denom).clamp(0.0, 1.0)
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self::from_pairs(
            self.dim,
            self.entries.iter().map(|(i, v)| (*i, v * factor)).collect(),
        )
    }

    /// `[self | other]` with `other`'s indices shifted by `self.dim()`.
    pub fn concat(&self, other: &SparseVector) -> Self {
        let offset = self.dim as u32;
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().map(|(i, v)| (i + offset, *v)));
        Self {
            dim: self.dim + other.dim,
            entries,
        }
    }

    pub fn to_dense(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.dim];
        for (i, v) in &self.entries {
            out[*i as usize] = *v;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_sorts_and_sums() {
        let v = SparseVector::from_pairs(5, vec![(3, 1.0), (1, 2.0), (3, 0.5)]);
        assert_eq!(v.iter().collect::<Vec<_>>(), vec![(1, 2.0), (3, 1.5)]);
    }

    #[test]
    fn test_dot_and_cosine() {
        let a = SparseVector::from_dense(&[1.0, 0.0, 1.0]);
        let b = SparseVector::from_dense(&[1.0, 1.0, 0.0]);
        assert_eq!(a.dot(&b), 1.0);
        assert!((a.cosine(&b) - 0.5).abs() < 1e-6);
        assert!((a.cosine(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.cosine(&SparseVector::zeros(3)), 0.0);
    }

    #[test]
    fn test_concat_shifts_indices() {
        let a = SparseVector::from_dense(&[0.0, 2.0]);
        let b = SparseVector::from_dense(&[1.0, 0.0, 3.0]);
        let c = a.concat(&b);
        assert_eq!(c.dim(), 5);
        assert_eq!(c.to_dense(), vec![0.0, 2.0, 1.0, 0.0, 3.0]);
    }
}
