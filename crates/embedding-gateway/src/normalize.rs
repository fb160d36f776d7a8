//! L2 normalization, shared by every vector the gateway returns (§4.2
//! contract: "Vectors are L2-normalized on the way out, so callers can use
//! dot product for cosine similarity"). Same algorithm as
//! `ob-semantic-matcher::centroid::{l2_norm, normalize}`.

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

pub fn normalize(v: Vec<f32>) -> Vec<f32> {
    let n = l2_norm(&v);
    if n > 0.0 {
        v.into_iter().map(|x| x / n).collect()
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let v = normalize(vec![3.0, 4.0]);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }
}
