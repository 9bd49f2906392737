//! LLM Integration Module
//!
//! Backends that turn a prompt into raw completion text. The classifier
//! adapter owns the prompt and the validation; backends only move text.
//!
//! ## Backends
//!
//! - [`ClaudeCli`]: pipes the prompt into `claude --print`
//! - [`OpenAiChat`]: POSTs to an OpenAI-compatible chat completions endpoint
//!
//! ```rust
//! use wpcat_core::check_claude_cli;
//!
//! let available = check_claude_cli();
//! println!("Claude CLI available: {}", available);
//! ```
//!
//! ```rust,ignore
//! use wpcat_core::{build_backend, Config};
//!
//! let config = Config::default();
//! let backend = build_backend(&config.classifier)?;
//! let text = backend.complete("Your prompt here")?;
//! ```

use std::io::Write as IoWrite;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BackendKind, ClassifierConfig};
use crate::error::{Result, WpcatError};

/// A text completion service.
pub trait LlmBackend {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Send `prompt`, return the raw completion text.
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl<T: LlmBackend + ?Sized> LlmBackend for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }
}

/// Build the backend selected in the config.
pub fn build_backend(config: &ClassifierConfig) -> Result<Box<dyn LlmBackend>> {
    match config.backend {
        BackendKind::ClaudeCli => {
            require_claude_cli()?;
            Ok(Box::new(ClaudeCli::new(std::env::current_dir()?)))
        }
        BackendKind::OpenAi => {
            let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
            if api_key.trim().is_empty() {
                return Err(WpcatError::ApiKeyMissing {
                    var: config.api_key_env.clone(),
                });
            }
            Ok(Box::new(OpenAiChat::new(
                api_key,
                config.model.clone(),
                config.endpoint.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

// ============================================================================
// Claude CLI
// ============================================================================

/// Check whether the Claude CLI is available
///
/// True when `claude --version` runs successfully
pub fn check_claude_cli() -> bool {
    Command::new("claude")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Return an error when the Claude CLI is missing
pub fn require_claude_cli() -> Result<()> {
    if !check_claude_cli() {
        return Err(WpcatError::ClaudeNotFound);
    }
    Ok(())
}

/// Runs `claude --print` with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    working_dir: PathBuf,
}

impl ClaudeCli {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

impl LlmBackend for ClaudeCli {
    fn name(&self) -> &'static str {
        "claude-cli"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new("claude");
        cmd.arg("--print");
        cmd.current_dir(&self.working_dir);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| WpcatError::ClaudeExecutionFailed {
                message: format!("Failed to spawn claude: {}", e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|e| WpcatError::ClaudeExecutionFailed {
                    message: format!("Failed to write prompt: {}", e),
                })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| WpcatError::ClaudeExecutionFailed {
                message: format!("Execution failed: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WpcatError::ClaudeExecutionFailed {
                message: format!("Claude exited with error: {}", stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

const SYSTEM_PROMPT: &str = "You categorize blog posts. Reply with a JSON array only. \
Never use categories outside the allowed list and never add titles that were not given.";

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl OpenAiChat {
    pub fn new(api_key: String, model: String, endpoint: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_key,
            model,
            endpoint,
            client,
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| WpcatError::ClassifierFailed {
                message: "API key contains invalid header characters".to_string(),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

impl LlmBackend for OpenAiChat {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        debug!(endpoint = %self.endpoint, model = %self.model, "chat completion request");
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(WpcatError::ClassifierFailed {
                message: format!("{} returned {}: {}", self.endpoint, status, text),
            });
        }

        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| WpcatError::ClassifierFailed {
                message: "response contained no choices".to_string(),
            })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: String,
}

// ============================================================================
// Tests
// ============================================================================
