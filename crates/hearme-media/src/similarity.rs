//! Cosine similarity and the match decision.

use hearme_models::{Embedding, MatchStatus, Threshold, Verdict};

use crate::error::{MediaError, MediaResult};

/// Cosine similarity of two equal-length vectors.
///
/// Accumulates in `f64`. A zero-norm input yields `0.0` rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Apply the threshold. Inclusive: `similarity == threshold` matches.
pub fn decide(similarity: f32, threshold: Threshold) -> Verdict {
    let status = if similarity >= threshold.value() {
        MatchStatus::Match
    } else {
        MatchStatus::NotMatch
    };
    Verdict { similarity, status }
}

/// Compare a candidate embedding to a reference.
pub fn compare(
    candidate: &Embedding,
    reference: &Embedding,
    threshold: Threshold,
) -> MediaResult<Verdict> {
    if candidate.len() != reference.len() {
        return Err(MediaError::EmbeddingLengthMismatch {
            candidate: candidate.len(),
            reference: reference.len(),
        });
    }
    Ok(decide(
        cosine_similarity(candidate.as_slice(), reference.as_slice()),
        threshold,
    ))
}
