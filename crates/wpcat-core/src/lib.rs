pub mod batch;
pub mod category;
pub mod config;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod output;
pub mod reconcile;
pub mod wxr;

pub use batch::{chunk, DEFAULT_BATCH_SIZE};
pub use config::{BackendKind, Config, FailurePolicy};
pub use error::{Result, WpcatError};
pub use llm::{build_backend, check_claude_cli, require_claude_cli, ClaudeCli, LlmBackend, OpenAiChat};
pub use normalize::normalize_title;
pub use output::{default_output_path, render_table, write_outputs, OutputFormat, OutputTarget};
pub use reconcile::{NoopObserver, ReconcileObserver, ReconcilePolicy, ReconcileReport, Reconciler};
pub use wxr::{Export, Post, PostKind};

// Category system
pub use category::{
    AllowedCategories, CategoryAssignment, CategoryClassifier, Classification, Classify,
};
