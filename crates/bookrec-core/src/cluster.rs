//! Cluster Assigner: seeded k-means over the combined feature space.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ClusteringConfig;
use crate::error::{BookrecError, Result};
use crate::features::FeatureMatrix;
use crate::models::Dataset;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeans {
    pub k: usize,
    pub max_iterations: usize,
    /// Stop once no centroid moves farther than this.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::from_config(&ClusteringConfig::default())
    }
}

/// Result of one k-means run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    /// One label per row, in `0..k`, numbered by first appearance.
    pub labels: Vec<usize>,
    pub k: usize,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    pub iterations: usize,
}

impl ClusterAssignment {
    /// Number of rows carrying each label.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }
}

/// Quality of one candidate k.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterScore {
    pub k: usize,
    pub inertia: f64,
    /// Undefined with fewer than two clusters or fewer than three rows.
    pub silhouette: Option<f64>,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ClusteringConfig) -> Self {
        Self {
            k: config.k,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            seed: config.seed,
        }
    }

    pub fn with_k(self, k: usize) -> Self {
        Self { k, ..self }
    }

    pub fn fit(&self, rows: &[Vec<f32>]) -> Result<ClusterAssignment> {
        let n = rows.len();
        if self.k == 0 || n == 0 || self.k > n {
            return Err(BookrecError::InvalidClusterCount { k: self.k, rows: n });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centers = seed_centers(rows, self.k, &mut rng);
        let mut labels = vec![0usize; n];
        let mut iterations = 0;

        for iter in 0..self.max_iterations.max(1) {
            iterations = iter + 1;
            for (i, row) in rows.iter().enumerate() {
                labels[i] = nearest(row, &centers).0;
            }
            reseed_empty(rows, &mut labels, &mut centers);

            let updated = recompute_centers(rows, &labels, &centers);
            let shift = centers
                .iter()
                .zip(&updated)
                .map(|(a, b)| squared_distance(a, b).sqrt())
                .fold(0.0, f64::max);
            centers = updated;
            if shift <= self.tolerance {
                break;
            }
        }

        for (i, row) in rows.iter().enumerate() {
            labels[i] = nearest(row, &centers).0;
        }
        reseed_empty(rows, &mut labels, &mut centers);

        let inertia = rows
            .iter()
            .zip(&labels)
            .map(|(row, &l)| squared_distance(row, &centers[l]))
            .sum();

        debug!(k = self.k, iterations, inertia, "k-means converged");
        Ok(ClusterAssignment {
            labels: relabel(&labels, self.k),
            k: self.k,
            inertia,
            iterations,
        })
    }

    /// Fit every k in `range` for elbow and silhouette analysis. Values of k
    /// larger than the row count are skipped.
    pub fn evaluate(&self, rows: &[Vec<f32>], range: RangeInclusive<usize>) -> Result<Vec<ClusterScore>> {
        let mut scores = Vec::new();
        for k in range.filter(|&k| k > 0 && k <= rows.len()) {
            let fit = self.with_k(k).fit(rows)?;
            scores.push(ClusterScore {
                k,
                inertia: fit.inertia,
                silhouette: silhouette(rows, &fit.labels),
            });
        }
        if scores.is_empty() {
            return Err(BookrecError::InvalidClusterCount { k: 0, rows: rows.len() });
        }
        Ok(scores)
    }
}

/// Cluster the dataset and return the labelled snapshot.
pub fn assign_clusters(
    dataset: &Dataset,
    features: &FeatureMatrix,
    kmeans: &KMeans,
) -> Result<(Dataset, ClusterAssignment)> {
    let rows = features.combined_dense();
    let assignment = kmeans.fit(&rows)?;
    let labelled = dataset.with_clusters(&assignment.labels)?;
    info!(
        books = dataset.len(),
        k = assignment.k,
        inertia = assignment.inertia,
        "assigned clusters"
    );
    Ok((labelled, assignment))
}

/// Mean silhouette coefficient with Euclidean distance.
pub fn silhouette(rows: &[Vec<f32>], labels: &[usize]) -> Option<f64> {
    let n = rows.len();
    let k = labels.iter().max().map_or(0, |m| m + 1);
    let used = {
        let mut seen = vec![false; k];
        labels.iter().for_each(|&l| seen[l] = true);
        seen.iter().filter(|s| **s).count()
    };
    if used < 2 || used >= n {
        return None;
    }

    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] == 1 {
            continue;
        }
        let mut sums = vec![0.0f64; k];
        for j in 0..n {
            if i != j {
                sums[labels[j]] += squared_distance(&rows[i], &rows[j]).sqrt();
            }
        }
        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    Some(total / n as f64)
}

// ─── Internals ──────────────────────────────────────────────

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum()
}

fn nearest(row: &[f32], centers: &[Vec<f32>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (c, center) in centers.iter().enumerate() {
        let d = squared_distance(row, center);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

/// k-means++ seeding.
fn seed_centers(rows: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centers = vec![rows[rng.random_range(0..rows.len())].clone()];
    let mut dist: Vec<f64> = rows.iter().map(|r| squared_distance(r, &centers[0])).collect();

    while centers.len() < k {
        let total: f64 = dist.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.random::<f64>() * total;
            let mut idx = rows.len() - 1;
            for (i, d) in dist.iter().enumerate() {
                if target < *d {
                    idx = i;
                    break;
                }
                target -= d;
            }
            idx
        } else {
            rng.random_range(0..rows.len())
        };

        let center = rows[pick].clone();
        for (d, row) in dist.iter_mut().zip(rows) {
            *d = d.min(squared_distance(row, &center));
        }
        centers.push(center);
    }
    centers
}

/// Move the farthest point of a multi-member cluster into each empty one.
fn reseed_empty(rows: &[Vec<f32>], labels: &mut [usize], centers: &mut [Vec<f32>]) {
    let k = centers.len();
    loop {
        let mut sizes = vec![0usize; k];
        for &l in labels.iter() {
            sizes[l] += 1;
        }
        let Some(empty) = sizes.iter().position(|&s| s == 0) else {
            return;
        };

        let donor = (0..rows.len())
            .filter(|&i| sizes[labels[i]] > 1)
            .max_by(|&a, &b| {
                let da = squared_distance(&rows[a], &centers[labels[a]]);
                let db = squared_distance(&rows[b], &centers[labels[b]]);
                da.total_cmp(&db).then_with(|| b.cmp(&a))
            });
        let Some(point) = donor else {
            return;
        };

        labels[point] = empty;
        centers[empty] = rows[point].clone();
    }
}

fn recompute_centers(rows: &[Vec<f32>], labels: &[usize], previous: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let dim = rows.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0f64; dim]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (row, &l) in rows.iter().zip(labels) {
        counts[l] += 1;
        for (s, v) in sums[l].iter_mut().zip(row) {
            *s += *v as f64;
        }
    }
    sums.into_iter()
        .zip(counts)
        .enumerate()
        .map(|(c, (sum, count))| {
            if count == 0 {
                previous[c].clone()
            } else {
                sum.into_iter().map(|s| (s / count as f64) as f32).collect()
            }
        })
        .collect()
}

/// Renumber labels in order of first appearance.
fn relabel(labels: &[usize], k: usize) -> Vec<usize> {
    let mut mapping = vec![usize::MAX; k];
    let mut next = 0;
    labels
        .iter()
        .map(|&l| {
            if mapping[l] == usize::MAX {
                mapping[l] = next;
                next += 1;
            }
            mapping[l]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
            vec![10.0, 0.0],
            vec![10.1, 0.1],
        ]
    }

    #[test]
    fn test_every_row_gets_one_label_below_k() {
        let rows = blobs();
        for k in 1..=rows.len() {
            let fit = KMeans::new(k).fit(&rows).unwrap();
            assert_eq!(fit.labels.len(), rows.len());
            assert!(fit.labels.iter().all(|&l| l < k));
        }
    }

    #[test]
    fn test_separates_obvious_blobs() {
        let fit = KMeans::new(3).fit(&blobs()).unwrap();
        assert_eq!(fit.labels, vec![0, 0, 0, 1, 1, 1, 2, 2]);
        assert_eq!(fit.sizes(), vec![3, 3, 2]);
        assert!(fit.inertia < 0.1);
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let rows = blobs();
        let a = KMeans::new(4).fit(&rows).unwrap();
        let b = KMeans::new(4).fit(&rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicate_points_fill_every_cluster() {
        let rows = vec![vec![1.0, 1.0]; 4];
        let fit = KMeans::new(3).fit(&rows).unwrap();
        assert!(fit.sizes().iter().all(|&s| s > 0));
    }

    #[test]
    fn test_invalid_k() {
        let rows = blobs();
        assert!(matches!(
            KMeans::new(0).fit(&rows),
            Err(BookrecError::InvalidClusterCount { k: 0, .. })
        ));
        assert!(KMeans::new(9).fit(&rows).is_err());
        assert!(KMeans::new(2).fit(&[]).is_err());
    }

    #[test]
    fn test_evaluate_inertia_drops_and_silhouette_peaks_at_three() {
        let scores = KMeans::default().evaluate(&blobs(), 1..=5).unwrap();
        assert_eq!(scores.len(), 5);
        assert!(scores[0].silhouette.is_none());
        assert!(scores[2].inertia < scores[0].inertia);

        let best = scores
            .iter()
            .filter_map(|s| s.silhouette.map(|v| (s.k, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert_eq!(best.0, 3);
    }

    #[test]
    fn test_relabel_first_appearance() {
        assert_eq!(relabel(&[2, 2, 0, 1, 0], 3), vec![0, 0, 1, 2, 1]);
    }
}
