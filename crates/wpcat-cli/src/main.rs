use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use wpcat_core::config::Config;
use wpcat_core::{
    build_backend, default_output_path, write_outputs, AllowedCategories, CategoryClassifier,
    Export, OutputFormat, OutputTarget, ReconcilePolicy, Reconciler, Result, WpcatError,
};

mod args;
mod progress;
mod prompt;

use args::{Cli, Commands, ConfigAction, RunArgs, Shell};
use progress::{print_summary, ConsoleProgress};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    dotenvy::dotenv().ok();

    let base_dir = resolve_base_dir(cli.base_dir);

    let result = match cli.command {
        Some(Commands::Run(args)) => handle_run(args, &base_dir, cli.quiet),
        Some(Commands::Config { action }) => handle_config(action, &base_dir),
        Some(Commands::Completions { shell }) => {
            handle_completions(shell);
            Ok(())
        }
        None => handle_run(RunArgs::default(), &base_dir, cli.quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(WpcatError::Cancelled) => {
            println!("{}", "Operation cancelled. No files were written.".yellow());
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn default_log_level(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose, quiet)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn handle_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let shell = match shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
        Shell::Elvish => clap_complete::Shell::Elvish,
    };
    generate(shell, &mut cmd, "wpcat", &mut io::stdout());
}

fn resolve_base_dir(cli_base: Option<PathBuf>) -> PathBuf {
    if let Some(base) = cli_base {
        return base;
    }

    if let Ok(base) = std::env::var("WPCAT_BASE") {
        return PathBuf::from(base);
    }

    dirs::home_dir()
        .map(|h| h.join(".wpcat"))
        .unwrap_or_else(|| PathBuf::from(".wpcat"))
}

/// Everything a run needs, collected before any processing starts.
struct RunPlan {
    input: PathBuf,
    targets: Vec<OutputTarget>,
    allowed: AllowedCategories,
}

fn collect_plan(args: &RunArgs, config: &Config) -> Result<RunPlan> {
    let input = match &args.input {
        Some(path) => {
            prompt::validate_input_path(path)?;
            path.clone()
        }
        None => prompt::ask_input_path()?,
    };

    let formats: Vec<OutputFormat> = if args.format.is_empty() {
        prompt::ask_formats()?
    } else {
        let mut formats: Vec<OutputFormat> = Vec::new();
        for format in args.format.iter().map(|&f| OutputFormat::from(f)) {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        formats
    };

    let mut targets = Vec::with_capacity(formats.len());
    for format in formats {
        let flag = match format {
            OutputFormat::Xml => args.xml_out.clone(),
            OutputFormat::Csv => args.csv_out.clone(),
        };
        let path = match flag {
            Some(path) => path,
            None if args.yes => default_output_path(&input, format, &config.output),
            None => prompt::ask_output_path(&input, format, &config.output)?,
        };
        targets.push(OutputTarget { format, path });
    }

    let allowed = match &args.categories {
        Some(list) => AllowedCategories::parse(list)?,
        None => prompt::ask_categories()?,
    };

    Ok(RunPlan {
        input,
        targets,
        allowed,
    })
}

fn handle_run(args: RunArgs, base_dir: &Path, quiet: bool) -> Result<()> {
    let mut config = Config::load(base_dir)?;
    if let Some(backend) = args.backend {
        config.classifier.backend = backend.into();
    }
    if let Some(size) = args.batch_size {
        config.set("reconcile.batch_size", &size.to_string())?;
    }
    if let Some(attempts) = args.max_attempts {
        config.reconcile.max_attempts = attempts;
    }

    let plan = collect_plan(&args, &config)?;

    let mut export = Export::load(&plan.input)?;
    if !quiet {
        println!();
        println!(
            "{} {} ({} items, {} posts to categorize)",
            "Loaded:".green(),
            plan.input.display(),
            export.posts().len(),
            export.eligible_count()
        );
        println!(
            "{} {}",
            "Categories:".green(),
            plan.allowed.slugs().join(", ")
        );
    }

    let classifier = CategoryClassifier::new(build_backend(&config.classifier)?);
    let policy = ReconcilePolicy::from(&config.reconcile);
    debug!(?policy, backend = config.classifier.backend.id(), "run configuration");
    let reconciler = Reconciler::new(&classifier, &plan.allowed, policy);

    let mut progress = ConsoleProgress::new(quiet);
    let report = reconciler.run(export.posts_mut(), &mut progress)?;

    if !quiet {
        print_summary(&report);
    }

    if args.dry_run {
        println!();
        println!("{}", "[DRY RUN] No files written.".yellow());
        return Ok(());
    }

    write_outputs(&export, &plan.targets)?;
    if !quiet {
        println!();
        for target in &plan.targets {
            println!("{} {}", "Wrote:".green(), target.path.display());
        }
    }

    Ok(())
}

fn handle_config(action: ConfigAction, base_dir: &Path) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load(base_dir)?;
            match config.get(&key) {
                Some(value) => {
                    println!("{}", value);
                }
                None => {
                    return Err(WpcatError::ConfigKeyNotFound { key });
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load(base_dir)?;
            config.set(&key, &value)?;
            config.save(base_dir)?;
            println!("{} {} = {}", "Set:".green(), key, value);
        }
        ConfigAction::List => {
            let config = Config::load(base_dir)?;
            println!();
            for (key, value) in config.list() {
                println!("{} = {}", key.cyan(), value);
            }
            println!();
        }
        ConfigAction::Path => {
            let path = Config::path(base_dir);
            println!("{}", path.display());
        }
        ConfigAction::Init => {
            let path = Config::init(base_dir)?;
            println!("{} {}", "Initialized:".green(), path.display());
        }
    }

    Ok(())
}
