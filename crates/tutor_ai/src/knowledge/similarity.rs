pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Callers pass precomputed norms; both must be non-zero.
pub fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        let a = [3.0f32, 4.0];
        assert_eq!(l2_norm(&a), 5.0);
        let b = [6.0f32, 8.0];
        let c = [-4.0f32, 3.0];
        let s_ab = cosine_similarity(&a, &b, l2_norm(&a), l2_norm(&b));
        let s_ac = cosine_similarity(&a, &c, l2_norm(&a), l2_norm(&c));
        assert!((s_ab - 1.0).abs() < 1e-6);
        assert!(s_ac.abs() < 1e-6);
    }
}
