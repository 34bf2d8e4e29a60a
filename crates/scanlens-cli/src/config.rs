use std::path::PathBuf;

/// Application configuration, loaded from environment variables.
pub struct Config {
    /// Optional directory of local model files, searched before the hub.
    pub model_dir: Option<PathBuf>,
    /// Cache directory for directly downloaded models.
    pub cache_dir: PathBuf,
    /// Path to the SQLite history database.
    pub db_path: PathBuf,
    /// Minimum confidence for a primary-classifier detection to surface.
    pub confidence_threshold: f32,
    /// Minimum face-presence score for an emotion read.
    pub face_presence_threshold: f32,
    /// Minimum instance score for a reported pose.
    pub pose_score_threshold: f32,
    /// User id recorded with saved scans when none is given.
    pub default_user: String,
}

impl Config {
    /// Load configuration from `SCANLENS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("SCANLENS_MODEL_DIR").map(PathBuf::from).ok();

        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());

        let cache_dir = std::env::var("SCANLENS_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::var("XDG_CACHE_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(&home).join(".cache"))
                    .join("scanlens")
            });

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(&home).join(".local/share"))
            .join("scanlens");

        let db_path = std::env::var("SCANLENS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("history.db"));

        Self {
            model_dir,
            cache_dir,
            db_path,
            confidence_threshold: env_f32("SCANLENS_CONFIDENCE_THRESHOLD", 0.5),
            face_presence_threshold: env_f32("SCANLENS_FACE_PRESENCE_THRESHOLD", 0.8),
            pose_score_threshold: env_f32("SCANLENS_POSE_SCORE_THRESHOLD", 0.3),
            default_user: std::env::var("SCANLENS_USER").unwrap_or_else(|_| "local".to_string()),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_f32_parses_and_defaults() {
        assert_eq!(env_f32("SCANLENS_TEST_UNSET_VAR", 0.5), 0.5);
        std::env::set_var("SCANLENS_TEST_F32_VAR", "0.75");
        assert_eq!(env_f32("SCANLENS_TEST_F32_VAR", 0.5), 0.75);
        std::env::set_var("SCANLENS_TEST_F32_VAR", "not-a-number");
        assert_eq!(env_f32("SCANLENS_TEST_F32_VAR", 0.5), 0.5);
        std::env::remove_var("SCANLENS_TEST_F32_VAR");
    }
}
