use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WpcatError {
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Input path is not a regular file: {path}")]
    NotAFile { path: PathBuf },

    #[error("Category list is empty - provide at least one slug")]
    EmptyCategories,

    #[error("No post records found in export: {path}")]
    NoPosts { path: PathBuf },

    #[error("Export is not a WordPress RSS document: {message}")]
    NotAnExport { message: String },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed classifier response: {message}")]
    MalformedResponse { message: String },

    #[error("Claude CLI not found. Install it or switch classifier.backend to 'openai'")]
    ClaudeNotFound,

    #[error("Claude execution failed: {message}")]
    ClaudeExecutionFailed { message: String },

    #[error("Classifier request failed: {message}")]
    ClassifierFailed { message: String },

    #[error("API key not set: environment variable {var} is empty")]
    ApiKeyMissing { var: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidConfigValue { key: String, value: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, WpcatError>;

impl WpcatError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InputNotFound { .. } | Self::NotAFile { .. } => 2,
            Self::NoPosts { .. } | Self::NotAnExport { .. } | Self::Xml(_) => 3,
            Self::MalformedResponse { .. }
            | Self::ClaudeNotFound
            | Self::ClaudeExecutionFailed { .. }
            | Self::ClassifierFailed { .. }
            | Self::ApiKeyMissing { .. }
            | Self::Http(_) => 4,
            Self::ConfigParse { .. }
            | Self::TomlSer(_)
            | Self::TomlDe(_)
            | Self::ConfigKeyNotFound { .. }
            | Self::InvalidConfigValue { .. } => 5,
            Self::Cancelled => 130,
            _ => 1,
        }
    }

    /// Errors that belong to a single classifier call rather than the whole run.
    pub fn is_batch_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse { .. }
                | Self::ClaudeExecutionFailed { .. }
                | Self::ClassifierFailed { .. }
                | Self::Http(_)
        )
    }
}
