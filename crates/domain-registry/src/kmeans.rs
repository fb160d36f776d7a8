//! Fixed-seed k-means with silhouette-based k selection (§4.3
//! `kmeans_initialize`, `split`). Vectors are assumed L2-normalized, as
//! every embedding the gateway returns already is (`embedding-gateway`'s
//! normalize module), so cosine similarity is a plain dot product.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

const KMEANS_SEED: u64 = 0xC0FFEE;
const KMEANS_MAX_ITERS: usize = 100;

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine(a, b)
}

/// Public entry point for callers outside this module that already hold
/// borrowed embedding slices (`merge`'s centroid recomputation).
pub fn centroid_of_public(points: &[&[f32]]) -> Vec<f32> {
    centroid_of(points)
}

fn centroid_of<'a>(points: &[&'a [f32]]) -> Vec<f32> {
    let dim = points.first().map(|p| p.len()).unwrap_or(0);
    let mut sum = vec![0.0f32; dim];
    for p in points {
        for (s, v) in sum.iter_mut().zip(*p) {
            *s += v;
        }
    }
    let n = points.len().max(1) as f32;
    for s in sum.iter_mut() {
        *s /= n;
    }
    embedding_gateway::normalize::normalize(sum)
}

/// A single k-means run: returns `(centroids, assignment)` where
/// `assignment[i]` is the cluster index of `points[i]`.
fn kmeans_once(points: &[Vec<f32>], k: usize, seed: u64) -> (Vec<Vec<f32>>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..points.len()).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> = indices.into_iter().take(k).map(|i| points[i].clone()).collect();

    let mut assignment = vec![0usize; points.len()];
    for _ in 0..KMEANS_MAX_ITERS {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let mut best = 0usize;
            let mut best_dist = f32::MAX;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = cosine_distance(p, centroid);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            if assignment[i] != best {
                changed = true;
            }
            assignment[i] = best;
        }

        for c in 0..k {
            let members: Vec<&[f32]> = points
                .iter()
                .zip(&assignment)
                .filter(|(_, &a)| a == c)
                .map(|(p, _)| p.as_slice())
                .collect();
            if !members.is_empty() {
                centroids[c] = centroid_of(&members);
            }
        }

        if !changed {
            break;
        }
    }
    (centroids, assignment)
}

fn inertia(points: &[Vec<f32>], centroids: &[Vec<f32>], assignment: &[usize]) -> f32 {
    points
        .iter()
        .zip(assignment)
        .map(|(p, &a)| cosine_distance(p, &centroids[a]))
        .sum()
}

/// Runs k-means `restarts` times from different random seeds and keeps the
/// lowest-inertia result (§4.3: "fixed seed, KMEANS_INIT_RUNS restarts").
pub fn kmeans(points: &[Vec<f32>], k: usize, restarts: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
    assert!(k > 0 && k <= points.len(), "k must be in [1, n_points]");
    let mut best: Option<(Vec<Vec<f32>>, Vec<usize>, f32)> = None;
    for run in 0..restarts.max(1) {
        let (centroids, assignment) = kmeans_once(points, k, KMEANS_SEED.wrapping_add(run as u64));
        let score = inertia(points, &centroids, &assignment);
        if best.as_ref().map(|(_, _, s)| score < *s).unwrap_or(true) {
            best = Some((centroids, assignment, score));
        }
    }
    let (centroids, assignment, _) = best.expect("restarts >= 1");
    (centroids, assignment)
}

/// Mean silhouette coefficient over all points, using cosine distance.
/// `O(n^2)`, intended for the bounded sample `kmeans_initialize` draws, not
/// the whole corpus.
pub fn silhouette_score(points: &[Vec<f32>], assignment: &[usize], k: usize) -> f32 {
    if k < 2 || points.len() <= k {
        return f32::MIN;
    }

    let mut total = 0.0f32;
    let mut counted = 0usize;

    for i in 0..points.len() {
        let own_cluster = assignment[i];
        let mut own_dist_sum = 0.0f32;
        let mut own_count = 0usize;
        let mut other_cluster_avg: Vec<f32> = vec![0.0; k];
        let mut other_cluster_count: Vec<usize> = vec![0; k];

        for j in 0..points.len() {
            if i == j {
                continue;
            }
            let d = cosine_distance(&points[i], &points[j]);
            if assignment[j] == own_cluster {
                own_dist_sum += d;
                own_count += 1;
            } else {
                other_cluster_avg[assignment[j]] += d;
                other_cluster_count[assignment[j]] += 1;
            }
        }

        if own_count == 0 {
            continue;
        }
        let a = own_dist_sum / own_count as f32;
        let b = (0..k)
            .filter(|&c| c != own_cluster && other_cluster_count[c] > 0)
            .map(|c| other_cluster_avg[c] / other_cluster_count[c] as f32)
            .fold(f32::MAX, f32::min);
        if b == f32::MAX {
            continue;
        }
        let s = (b - a) / a.max(b);
        total += s;
        counted += 1;
    }

    if counted == 0 {
        f32::MIN
    } else {
        total / counted as f32
    }
}

/// Runs k-means for every `k` in `[k_min, k_max]` (clamped to the number of
/// points) and returns the `(centroids, assignment, k)` with the best
/// silhouette score.
pub fn best_k_by_silhouette(
    points: &[Vec<f32>],
    k_min: usize,
    k_max: usize,
    restarts: usize,
) -> (Vec<Vec<f32>>, Vec<usize>, usize) {
    let upper = k_max.min(points.len().saturating_sub(1)).max(k_min);
    let mut best: Option<(Vec<Vec<f32>>, Vec<usize>, usize, f32)> = None;

    for k in k_min..=upper {
        if k == 0 || k > points.len() {
            continue;
        }
        let (centroids, assignment) = kmeans(points, k, restarts);
        let score = silhouette_score(points, &assignment, k);
        if best.as_ref().map(|(_, _, _, s)| score > *s).unwrap_or(true) {
            best = Some((centroids, assignment, k, score));
        }
    }

    let (centroids, assignment, k, _) =
        best.unwrap_or_else(|| (vec![centroid_of(&points.iter().map(|p| p.as_slice()).collect::<Vec<_>>())], vec![0; points.len()], 1, 0.0));
    (centroids, assignment, k)
}
