//! Command-line interface.
//!
//! Usage:
//!   bakery run <SCRIPT>... [--section NAME] [--var K=V] [--compat K=V]
//!                          [--no-optimize] [--continue-on-error]
//!                          [--timeout SECS] [--config PATH] [-v]
//!   bakery check <SCRIPT>... [--config PATH]

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::warn;

use crate::config::{default_config_path, Config};

// ── Public types ──────────────────────────────────────────────────────────────

/// Interpreter for INI-flavored build scripts.
#[derive(Debug, Parser)]
#[command(name = "bakery")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(short, long, global = true, env = "BAKERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Raise engine logging to debug
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the entry section of each script in order
    Run(RunArgs),
    /// Parse every code section and report errors without running
    Check {
        /// Script files to check
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Script files, run in the order given
    #[arg(required = true)]
    pub scripts: Vec<PathBuf>,

    /// Entry section to run
    #[arg(short, long)]
    pub section: Option<String>,

    /// Host variable, as Key=Value (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Compatibility flag override, as Key=Value (repeatable)
    #[arg(long, value_name = "KEY=VALUE")]
    pub compat: Vec<String>,

    /// Disable batching of adjacent file commands
    #[arg(long)]
    pub no_optimize: bool,

    /// Log runtime errors and keep going
    #[arg(long)]
    pub continue_on_error: bool,

    /// Cancel the build after this many seconds
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

// ── Config resolution ─────────────────────────────────────────────────────────

/// Load the settings file: `explicit` must exist; the default location is
/// optional.  Problems on individual lines are logged and skipped.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, String> {
    let path = match explicit {
        Some(p) => p.to_owned(),
        None => match default_config_path() {
            Some(p) if p.is_file() => p,
            _ => return Ok(Config::new()),
        },
    };
    let (config, errors) =
        Config::load_file(&path).map_err(|e| format!("cannot read settings [{}]: {e}", path.display()))?;
    for e in errors {
        warn!(path = %path.display(), line = e.line, "{}", e.message);
    }
    Ok(config)
}

impl RunArgs {
    /// Apply the run options on top of `config`.
    pub fn apply(&self, config: &mut Config) -> Result<(), String> {
        if let Some(section) = &self.section {
            config.entry_section = section.clone();
        }
        if self.no_optimize {
            config.optimize_code = false;
        }
        if self.continue_on_error {
            config.stop_build_on_error = false;
        }
        for spec in &self.compat {
            config.apply_compat_override(spec)?;
        }
        Ok(())
    }

    /// `--var` values as `(key, value)` pairs.
    pub fn host_vars(&self) -> Result<Vec<(String, String)>, String> {
        self.vars.iter().map(|s| parse_define(s)).collect()
    }
}

/// Split `Key=Value`, trimming `%` around the key.
pub fn parse_define(spec: &str) -> Result<(String, String), String> {
    let (key, value) = spec.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got [{spec}]"))?;
    let key = key.trim();
    let key = key.strip_prefix('%').and_then(|k| k.strip_suffix('%')).unwrap_or(key);
    if key.is_empty() {
        return Err(format!("empty variable name in [{spec}]"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
