use thiserror::Error;

/// Load-time configuration failures. None of these are recoverable at
/// runtime; a config is validated once before a session starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("bpm must be positive: {0}")]
    InvalidBpm(f64),

    #[error("beats per bar must be positive")]
    InvalidBeatsPerBar,

    #[error("encounter has no phases")]
    NoPhases,

    #[error("phase '{phase}' has no patterns")]
    NoPatterns { phase: String },

    #[error("pattern '{pattern}' grid must have exactly 64 steps, found {found}")]
    GridLength { pattern: String, found: usize },

    #[error("pattern '{pattern}' telegraph fraction out of range: {value}")]
    TelegraphFraction { pattern: String, value: f32 },

    #[error("phase thresholds must strictly decrease: '{phase}' (index {index})")]
    ThresholdOrder { phase: String, index: usize },

    #[error("course has no checkpoints")]
    NoCheckpoints,

    #[error("checkpoint {index} battle duration must be at least one bar")]
    ZeroBattleDuration { index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported config format: {0}")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
