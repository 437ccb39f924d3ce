use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance between normalized embeddings for a
    /// positive match. Calibrated for FaceNet-512 with L2 normalization:
    /// 0.8 is strict, 1.0 balanced, 1.2 permissive (full range 0.0–2.0).
    pub match_threshold: f32,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identities.db"));

        Self {
            model_dir,
            db_path,
            match_threshold: env_f32("FACEGATE_MATCH_THRESHOLD", 1.0),
        }
    }

    /// Path to the SCRFD face-location model.
    pub fn locator_model_path(&self) -> String {
        self.model_dir
            .join("scrfd_500m.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the FaceNet embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("facenet_512.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
