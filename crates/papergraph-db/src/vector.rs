//! Vector math over stored embeddings.
//!
//! Vectors are L2-normalised on insert so cosine similarity is a dot product.

/// Scale `v` to unit length in place; zero vectors are left as is.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity of two normalised vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// `1 - cosine`, clamped to `[0, 2]`. `None` when the dimensions differ.
pub fn distance(a: &[f32], b: &[f32]) -> Option<f32> {
    (a.len() == b.len() && !a.is_empty()).then(|| (1.0 - cosine(a, b)).clamp(0.0, 2.0))
}
