//! Interactive prompts for whatever `wpcat run` was not given as flags.

use std::path::{Path, PathBuf};

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, MultiSelect};
use wpcat_core::config::OutputConfig;
use wpcat_core::{default_output_path, AllowedCategories, OutputFormat, Result, WpcatError};

/// Prompt failures (Esc, Ctrl-C, closed terminal) all mean the user backed out.
fn cancelled(_: dialoguer::Error) -> WpcatError {
    WpcatError::Cancelled
}

/// Check that `path` names an existing regular file.
pub fn validate_input_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(WpcatError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(WpcatError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

pub fn ask_input_path() -> Result<PathBuf> {
    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Path to WordPress export (.xml)")
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            validate_input_path(Path::new(input.trim())).map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(cancelled)?;
    Ok(PathBuf::from(answer.trim()))
}

pub fn ask_formats() -> Result<Vec<OutputFormat>> {
    let formats = OutputFormat::all();
    let labels: Vec<&str> = formats.iter().map(|f| f.name()).collect();

    loop {
        let picked = MultiSelect::with_theme(&ColorfulTheme::default())
            .with_prompt("Output formats (space to toggle, enter to confirm)")
            .items(&labels)
            .defaults(&[true, false])
            .interact_opt()
            .map_err(cancelled)?
            .ok_or(WpcatError::Cancelled)?;

        if !picked.is_empty() {
            return Ok(picked.into_iter().map(|i| formats[i]).collect());
        }
        eprintln!("Select at least one format.");
    }
}

pub fn ask_output_path(
    input: &Path,
    format: OutputFormat,
    config: &OutputConfig,
) -> Result<PathBuf> {
    let default = default_output_path(input, format, config);
    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{} output path", format.name()))
        .default(default.display().to_string())
        .interact_text()
        .map_err(cancelled)?;

    let answer = answer.trim();
    if answer.is_empty() {
        return Ok(default);
    }
    Ok(PathBuf::from(answer))
}

pub fn ask_categories() -> Result<AllowedCategories> {
    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Allowed category slugs (comma-separated)")
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            AllowedCategories::parse(input)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(cancelled)?;
    AllowedCategories::parse(&answer)
}
