use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use wpcat_core::{BackendKind, OutputFormat};

#[derive(Parser)]
#[command(name = "wpcat")]
#[command(about = "Categorize WordPress export posts with an LLM classifier")]
#[command(version)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors and retry warnings only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Base directory (default: ~/.wpcat)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// WordPress XML export with categories added
    Xml,
    /// CSV summary (id, title, categories)
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Xml => OutputFormat::Xml,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum BackendArg {
    /// Claude CLI (`claude --print`)
    ClaudeCli,
    /// OpenAI-compatible chat completions API
    Openai,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::ClaudeCli => BackendKind::ClaudeCli,
            BackendArg::Openai => BackendKind::OpenAi,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Categorize an export (prompts for anything not given as a flag)
    Run(RunArgs),

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// WordPress export file (WXR)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output formats to produce (repeatable or comma-separated)
    #[arg(short, long, value_enum, value_delimiter = ',')]
    pub format: Vec<FormatArg>,

    /// Output path for the XML export (default: <input>-categorized.xml)
    #[arg(long)]
    pub xml_out: Option<PathBuf>,

    /// Output path for the CSV summary (default: <input>-categorized.csv)
    #[arg(long)]
    pub csv_out: Option<PathBuf>,

    /// Allowed category slugs, comma-separated (e.g., "news,senior-life")
    #[arg(short, long)]
    pub categories: Option<String>,

    /// Classifier backend (overrides classifier.backend)
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Titles per classifier call (overrides reconcile.batch_size)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Give up on a post after N unanswered attempts, 0 = never (overrides reconcile.max_attempts)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Use defaults for output paths instead of asking
    #[arg(short, long)]
    pub yes: bool,

    /// Classify and report without writing files
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g., reconcile.batch_size)
        key: String,
    },

    /// Set a config value
    Set {
        /// Config key (e.g., classifier.backend)
        key: String,

        /// Value to set (e.g., "openai")
        value: String,
    },

    /// List all config values
    List,

    /// Show config file path
    Path,

    /// Create config file with default template
    Init,
}
