//! Vector math helpers for latent factors

/// Dot product of two equally sized vectors
///
/// Extra trailing elements of the longer slice are ignored.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared euclidean norm
#[inline]
pub fn squared_norm(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum()
}

/// Logistic function, computed in f64 to stay finite for large |x|
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// ln(sigmoid(x)) without overflow for large negative `x`
#[inline]
pub fn log_sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        -(-x).exp().ln_1p()
    } else {
        x - x.exp().ln_1p()
    }
}

/// Cosine similarity between two embeddings; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a = squared_norm(a).sqrt();
    let norm_b = squared_norm(b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product(a, b) / (norm_a * norm_b)
}
