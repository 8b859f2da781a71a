use rollcall_store::CameraConfig;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Minimum time after check-in before a match counts as check-out.
    pub debounce: Duration,
    /// Maximum age of a gallery snapshot before it is rebuilt from the
    /// identity store (the documented staleness bound).
    pub gallery_max_age: Duration,
    /// Consecutive per-frame failures (read or inference) a worker
    /// tolerates before terminating.
    pub max_consecutive_failures: u32,
    /// When set, annotated frames are exported as JPEGs to this
    /// directory instead of being discarded.
    pub export_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/rollcall/models"));

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        Self {
            model_dir,
            db_path,
            debounce: Duration::from_secs(env_u64("ROLLCALL_DEBOUNCE_SECS", 60)),
            gallery_max_age: Duration::from_secs(env_u64("ROLLCALL_GALLERY_MAX_AGE_SECS", 5)),
            max_consecutive_failures: env_u64("ROLLCALL_MAX_CONSECUTIVE_FAILURES", 30) as u32,
            export_dir: std::env::var("ROLLCALL_EXPORT_DIR").ok().map(PathBuf::from),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the face embedding model.
    pub fn embedder_model_path(&self) -> PathBuf {
        self.model_dir.join("facenet_512.onnx")
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors are fatal at startup, before any worker runs.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("no camera configurations found")]
    NoCameras,
    #[error("duplicate camera name: {0:?}")]
    DuplicateCameraName(String),
    #[error("camera {camera:?} has threshold {threshold} outside (0, 1]")]
    InvalidThreshold { camera: String, threshold: f32 },
}

/// Validate the camera set before starting workers: non-empty, unique
/// names, thresholds in (0, 1].
pub fn validate_configs(configs: &[CameraConfig]) -> Result<(), ConfigError> {
    if configs.is_empty() {
        return Err(ConfigError::NoCameras);
    }

    let mut seen = std::collections::HashSet::new();
    for config in configs {
        if !seen.insert(config.name.as_str()) {
            return Err(ConfigError::DuplicateCameraName(config.name.clone()));
        }
        if !(config.threshold > 0.0 && config.threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold {
                camera: config.name.clone(),
                threshold: config.threshold,
            });
        }
    }

    Ok(())
}
