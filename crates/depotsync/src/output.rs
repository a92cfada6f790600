//! JSON rendering for command results.

use serde::Serialize;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub fn render(value: &impl Serialize, format: OutputFormat) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(value)?,
        OutputFormat::Json => serde_json::to_string(value)?,
    })
}

/// Print to stdout unless `--quiet`.
pub fn print(value: &impl Serialize, global: &GlobalOpts) -> Result<(), CliError> {
    if !global.quiet {
        println!("{}", render(value, global.output)?);
    }
    Ok(())
}
