use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::error::{Result, WpcatError};

const CONFIG_FILE: &str = "config.toml";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# wpcat configuration file
# Location: ~/.wpcat/config.toml

[classifier]
# Which service classifies titles: "claude-cli" or "openai"
backend = "claude-cli"

# Model name (openai backend only)
model = "gpt-4o-mini"

# Chat completions endpoint (openai backend only)
endpoint = "https://api.openai.com/v1/chat/completions"

# Environment variable holding the API key (openai backend only)
api_key_env = "OPENAI_API_KEY"

# HTTP request timeout in seconds (openai backend only)
timeout_secs = 120

[reconcile]
# Titles sent per classifier call
batch_size = 50

# Give up on a post after this many unanswered submissions (0 = retry forever)
max_attempts = 5

# What to do when a whole batch fails (bad JSON, network error):
# "requeue" retries the batch later, "abort" stops the run
on_failure = "requeue"

[output]
# Suffixes used to derive default output paths from the input file name
xml_suffix = "-categorized.xml"
csv_suffix = "-categorized.csv"
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Classifier service selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    ClaudeCli,
    #[serde(rename = "openai")]
    OpenAi,
}

impl BackendKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ClaudeCli => "claude-cli",
            Self::OpenAi => "openai",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "claude-cli" | "claude" => Some(Self::ClaudeCli),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

/// Behavior when a classifier call fails as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Treat every post in the batch as unanswered
    #[default]
    Requeue,
    /// Stop the run with the error
    Abort,
}

impl FailurePolicy {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Requeue => "requeue",
            Self::Abort => "abort",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "requeue" => Some(Self::Requeue),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub backend: BackendKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// 0 means unbounded
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub on_failure: FailurePolicy,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            on_failure: FailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    #[serde(default = "default_xml_suffix")]
    pub xml_suffix: String,

    #[serde(default = "default_csv_suffix")]
    pub csv_suffix: String,
}

fn default_xml_suffix() -> String {
    "-categorized.xml".to_string()
}

fn default_csv_suffix() -> String {
    "-categorized.csv".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            xml_suffix: default_xml_suffix(),
            csv_suffix: default_csv_suffix(),
        }
    }
}

const KEYS: &[&str] = &[
    "classifier.backend",
    "classifier.model",
    "classifier.endpoint",
    "classifier.api_key_env",
    "classifier.timeout_secs",
    "reconcile.batch_size",
    "reconcile.max_attempts",
    "reconcile.on_failure",
    "output.xml_suffix",
    "output.csv_suffix",
];

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content).map_err(|e| WpcatError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    fn validate(&self) -> Result<()> {
        if self.reconcile.batch_size == 0 {
            return Err(WpcatError::InvalidConfigValue {
                key: "reconcile.batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "classifier.backend" => self.classifier.backend.id().to_string(),
            "classifier.model" => self.classifier.model.clone(),
            "classifier.endpoint" => self.classifier.endpoint.clone(),
            "classifier.api_key_env" => self.classifier.api_key_env.clone(),
            "classifier.timeout_secs" => self.classifier.timeout_secs.to_string(),
            "reconcile.batch_size" => self.reconcile.batch_size.to_string(),
            "reconcile.max_attempts" => self.reconcile.max_attempts.to_string(),
            "reconcile.on_failure" => self.reconcile.on_failure.id().to_string(),
            "output.xml_suffix" => self.output.xml_suffix.clone(),
            "output.csv_suffix" => self.output.csv_suffix.clone(),
            _ => return None,
        };
        Some(value)
    }

    /// Set a config value by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || WpcatError::InvalidConfigValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();

        match key {
            "classifier.backend" => {
                self.classifier.backend = BackendKind::from_id(value).ok_or_else(invalid)?;
            }
            "classifier.model" => self.classifier.model = value.to_string(),
            "classifier.endpoint" => self.classifier.endpoint = value.to_string(),
            "classifier.api_key_env" => self.classifier.api_key_env = value.to_string(),
            "classifier.timeout_secs" => {
                self.classifier.timeout_secs = value.parse().map_err(|_| invalid())?;
            }
            "reconcile.batch_size" => {
                let size: usize = value.parse().map_err(|_| invalid())?;
                if size == 0 {
                    return Err(invalid());
                }
                self.reconcile.batch_size = size;
            }
            "reconcile.max_attempts" => {
                self.reconcile.max_attempts = value.parse().map_err(|_| invalid())?;
            }
            "reconcile.on_failure" => {
                self.reconcile.on_failure = FailurePolicy::from_id(value).ok_or_else(invalid)?;
            }
            "output.xml_suffix" => self.output.xml_suffix = value.to_string(),
            "output.csv_suffix" => self.output.csv_suffix = value.to_string(),
            _ => {
                return Err(WpcatError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).map(|value| (key.to_string(), value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.classifier.backend, BackendKind::ClaudeCli);
        assert_eq!(config.reconcile.batch_size, 50);
        assert_eq!(config.reconcile.max_attempts, 5);
        assert_eq!(config.reconcile.on_failure, FailurePolicy::Requeue);
        assert_eq!(config.output.csv_suffix, "-categorized.csv");
    }

    #[test]
    fn test_template_matches_defaults() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [classifier]
            backend = "openai"

            [reconcile]
            max_attempts = 0
            on_failure = "abort"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.classifier.backend, BackendKind::OpenAi);
        assert_eq!(parsed.classifier.model, "gpt-4o-mini");
        assert_eq!(parsed.reconcile.max_attempts, 0);
        assert_eq!(parsed.reconcile.on_failure, FailurePolicy::Abort);
        assert_eq!(parsed.reconcile.batch_size, 50);
    }

    #[test]
    fn test_config_get_set() {
        let mut config = Config::default();

        config.set("classifier.backend", "openai").unwrap();
        assert_eq!(config.get("classifier.backend").unwrap(), "openai");

        config.set("reconcile.batch_size", "20").unwrap();
        assert_eq!(config.reconcile.batch_size, 20);

        assert!(config.set("reconcile.batch_size", "0").is_err());
        assert!(config.set("reconcile.on_failure", "explode").is_err());
        assert!(matches!(
            config.set("nope.key", "1"),
            Err(WpcatError::ConfigKeyNotFound { .. })
        ));
    }

    #[test]
    fn test_list_covers_all_keys() {
        let config = Config::default();
        let list = config.list();
        assert_eq!(list.len(), KEYS.len());
        assert!(list
            .iter()
            .any(|(k, v)| k == "reconcile.on_failure" && v == "requeue"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.set("reconcile.max_attempts", "9").unwrap();
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.reconcile.max_attempts, 9);
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_load_rejects_zero_batch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[reconcile]\nbatch_size = 0\n").unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(WpcatError::InvalidConfigValue { .. })
        ));
    }

    #[test]
    fn test_init_writes_template_once() {
        let dir = TempDir::new().unwrap();
        let path = Config::init(dir.path()).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        assert!(first.contains("max_attempts"));

        fs::write(&path, "[output]\ncsv_suffix = \".tsv\"\n").unwrap();
        Config::init(dir.path()).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains(".tsv"));
    }
}
