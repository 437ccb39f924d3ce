//! Read/write adapters between stored JSON documents and embeddings.

use facegate_core::Embedding;
use serde::{Deserialize, Serialize};

/// Shape written for every newly created identity: one embedding under
/// the `encoding` key, mirroring the document layout older deployments
/// already hold.
#[derive(Serialize)]
pub(crate) struct NewRecord<'a> {
    pub user_id: &'a str,
    pub encoding: &'a [f32],
}

/// The two persisted shapes the read path accepts.
///
/// Variant order matters: a document carrying both keys resolves to the
/// current single-`encoding` shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredShape {
    Single { encoding: Vec<f32> },
    Legacy { face_encodings: Vec<Vec<f32>> },
}

/// Adapt one stored document into the canonical embedding list.
///
/// Returns `None` for documents matching neither shape; the caller skips
/// those records rather than failing the whole enumeration.
pub(crate) fn parse_embeddings(doc: &str) -> Option<Vec<Embedding>> {
    match serde_json::from_str::<StoredShape>(doc) {
        Ok(StoredShape::Single { encoding }) => Some(vec![Embedding::from_values(encoding)]),
        Ok(StoredShape::Legacy { face_encodings }) => Some(
            face_encodings
                .into_iter()
                .map(Embedding::from_values)
                .collect(),
        ),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_current_shape() {
        let doc = r#"{"user_id":"u-1","encoding":[0.1,0.2,0.3]}"#;
        let embeddings = parse_embeddings(doc).unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].values, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_legacy_shape() {
        let doc = r#"{"user_id":"u-2","face_encodings":[[1.0,0.0],[0.0,1.0]]}"#;
        let embeddings = parse_embeddings(doc).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[1].values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_legacy_shape_may_be_empty() {
        let doc = r#"{"face_encodings":[]}"#;
        assert_eq!(parse_embeddings(doc).unwrap().len(), 0);
    }

    #[test]
    fn test_neither_shape_is_skipped() {
        assert!(parse_embeddings(r#"{"user_id":"u-3"}"#).is_none());
        assert!(parse_embeddings(r#"{"encoding":"not a vector"}"#).is_none());
        assert!(parse_embeddings("not json at all").is_none());
    }

    #[test]
    fn test_both_keys_prefer_current_shape() {
        let doc = r#"{"encoding":[0.5],"face_encodings":[[1.0],[2.0]]}"#;
        let embeddings = parse_embeddings(doc).unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].values, vec![0.5]);
    }

    #[test]
    fn test_new_record_round_trips_through_current_shape() {
        let record = NewRecord {
            user_id: "u-4",
            encoding: &[0.25, -0.5],
        };
        let doc = serde_json::to_string(&record).unwrap();
        let embeddings = parse_embeddings(&doc).unwrap();
        assert_eq!(embeddings[0].values, vec![0.25, -0.5]);
    }
}
