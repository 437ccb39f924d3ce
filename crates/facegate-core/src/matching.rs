//! Threshold matching of probe embeddings against stored identities.
//!
//! Distances are Euclidean over L2-normalized vectors, so the threshold
//! lives in a fixed 0.0–2.0 range regardless of the raw embedding scale.

use crate::types::{Embedding, Identity};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    /// Stored and probe embeddings come from different model dimensionality.
    /// This is data corruption, not a normal no-match.
    #[error("embedding dimension mismatch: stored {known}, probe {probe}")]
    ShapeMismatch { known: usize, probe: usize },
}

/// Strategy for deciding whether a probe embedding matches a set of known
/// embeddings for one identity.
pub trait Matcher {
    fn is_match(
        &self,
        known: &[Embedding],
        probe: &Embedding,
        threshold: f32,
    ) -> Result<bool, MatchError>;
}

/// Euclidean distance matcher.
///
/// Returns true as soon as any known embedding lies within `threshold` of
/// the probe. The scan order does not affect the boolean result, only the
/// work performed.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn is_match(
        &self,
        known: &[Embedding],
        probe: &Embedding,
        threshold: f32,
    ) -> Result<bool, MatchError> {
        for candidate in known {
            if candidate.dim() != probe.dim() {
                return Err(MatchError::ShapeMismatch {
                    known: candidate.dim(),
                    probe: probe.dim(),
                });
            }
            let distance = candidate.euclidean_distance(probe);
            tracing::debug!(distance, threshold, "embedding distance");
            if distance <= threshold {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Scan identities in enumeration order and return the first whose stored
/// embeddings match the probe, or `None` after scanning all of them.
pub fn first_match<'a>(
    identities: &'a [Identity],
    probe: &Embedding,
    threshold: f32,
) -> Result<Option<&'a Identity>, MatchError> {
    let matcher = EuclideanMatcher;
    for identity in identities {
        if matcher.is_match(&identity.embeddings, probe, threshold)? {
            return Ok(Some(identity));
        }
    }
    Ok(None)
}
