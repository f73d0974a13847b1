use crate::features::SparseVector;

/// Dense symmetric n×n matrix of similarities in [0,1].
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    data: Vec<f32>,
}

impl SimilarityMatrix {
    fn from_fn(n: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = vec![0.0f32; n * n];
        for i in 0..n {
            for j in i..n {
                let v = f(i, j).clamp(0.0, 1.0);
                data[i * n + j] = v;
                data[j * n + i] = v;
            }
        }
        Self { n, data }
    }

    /// Pairwise cosine similarity; rows that are all zero score 0 everywhere.
    pub fn cosine(rows: &[SparseVector]) -> Self {
        let norms: Vec<f32> = rows.iter().map(SparseVector::norm).collect();
        Self::from_fn(rows.len(), |i, j| {
            let denom = norms[i] * norms[j];
            if denom == 0.0 {
                0.0
            } else {
                rows[i].dot(&rows[j]) / denom
            }
        })
    }

    pub fn cosine_dense(rows: &[Vec<f32>]) -> Self {
        let sparse: Vec<SparseVector> = rows.iter().map(|r| SparseVector::from_dense(r)).collect();
        Self::cosine(&sparse)
    }

    /// `1 − |a − b| / (max − min)` over the observed values. A missing value
    /// on either side scores 0; a constant column scores 1.
    pub fn scalar_closeness(values: &[Option<f64>]) -> Self {
        let present = values.iter().flatten();
        let min = present.clone().copied().fold(f64::INFINITY, f64::min);
        let max = present.copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        Self::from_fn(values.len(), |i, j| match (values[i], values[j]) {
            (Some(a), Some(b)) if range > 0.0 => (1.0 - (a - b).abs() / range) as f32,
            (Some(_), Some(_)) => 1.0,
            _ => 0.0,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f32 {
        self.data[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}
