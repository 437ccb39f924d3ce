use serde::{Deserialize, Serialize};

/// Rectangular region of an image believed to contain one face.
///
/// Coordinates are pixel offsets into the decoded image, with
/// `top <= bottom` and `left <= right`. Produced by the locator, consumed
/// once by the extractor, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Face embedding vector (512-dimensional for the FaceNet model).
///
/// Two embeddings are only comparable if produced by the same model and
/// normalization scheme; `model_version` records the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model_version: Option<String>,
}

impl Embedding {
    /// Embedding with no recorded model version (stored legacy records).
    pub fn from_values(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean norm of the vector.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Callers must have checked dimensionality; see
    /// [`Matcher`](crate::matching::Matcher) for the checked comparison path.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        debug_assert_eq!(self.values.len(), other.values.len());
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Rescale to unit Euclidean norm.
    ///
    /// The all-zero vector has no direction and is returned unchanged;
    /// every other input comes back with norm 1.0 (within f32 tolerance).
    /// Mandatory before any distance comparison or persistence, so stored
    /// and probe vectors live on a common scale and the match threshold
    /// stays a single stable constant.
    pub fn normalized(mut self) -> Embedding {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
        self
    }
}

/// A registered identity: opaque id plus its stored embeddings.
///
/// Created exactly once at registration time with exactly one embedding.
/// Legacy store records may carry several.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub embeddings: Vec<Embedding>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_dimensions() {
        let r = FaceRegion {
            top: 10,
            right: 110,
            bottom: 130,
            left: 30,
        };
        assert_eq!(r.width(), 80);
        assert_eq!(r.height(), 120);
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::from_values(vec![0.5, 0.5, 0.0]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_unit_axes() {
        let a = Embedding::from_values(vec![1.0, 0.0]);
        let b = Embedding::from_values(vec![0.0, 1.0]);
        assert!((a.euclidean_distance(&b) - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_has_unit_norm() {
        let e = Embedding::from_values(vec![3.0, 4.0]).normalized();
        assert!((e.norm() - 1.0).abs() < 1e-6);
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert!((e.values[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_zero_vector_unchanged() {
        let e = Embedding::from_values(vec![0.0, 0.0, 0.0]).normalized();
        assert_eq!(e.values, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalized_is_idempotent() {
        let once = Embedding::from_values(vec![0.1, -2.5, 7.0]).normalized();
        let twice = once.clone().normalized();
        for (a, b) in once.values.iter().zip(twice.values.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalized_preserves_model_version() {
        let e = Embedding {
            values: vec![2.0, 0.0],
            model_version: Some("facenet-512".into()),
        }
        .normalized();
        assert_eq!(e.model_version.as_deref(), Some("facenet-512"));
    }
}
