//! Shell completion generation for partition-export
//!
//! Generates completion scripts for bash, zsh, fish, PowerShell and elvish.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io;

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

const BIN_NAME: &str = "partition-export";

/// Generate shell completion script on stdout
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish, powershell, elvish)
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let shell = parse_shell(shell_name)?;
    let mut cmd = CliArgs::command();
    generate(shell, &mut cmd, BIN_NAME, &mut io::stdout());
    Ok(())
}

/// Render a completion script into a string
pub fn completion_script(shell_name: &str) -> Result<String> {
    let shell = parse_shell(shell_name)?;
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        "powershell" | "pwsh" => Ok(Shell::PowerShell),
        "elvish" => Ok(Shell::Elvish),
        _ => Err(ConfigError::Generic(format!(
            "Unsupported shell: {}. Supported shells: bash, zsh, fish, powershell, elvish",
            shell_name
        ))
        .into()),
    }
}
