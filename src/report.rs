//! Run-scoped diagnostics: error/warning counters and reporting discipline
//!
//! A `Report` is created per verification run and threaded through every
//! check, so nothing about the diagnostic state is process-global.

use anyhow::Result;
use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::Cell;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Sentinel raised by the first error when bail-on-error is set; it unwinds
/// through `anyhow::Result` to the verification entry point.
#[derive(Debug, Error)]
#[error("verification bailed out on first error")]
pub struct Bailout;

/// Test case and group basenames must match this.
static BASENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-zA-Z0-9][a-zA-Z0-9_.-]*[a-zA-Z0-9]$").unwrap());

/// Problem shortnames must match this.
static SHORTNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new("^[a-z0-9]+$").unwrap());

pub fn basename_ok(name: &str) -> bool {
    BASENAME_RE.is_match(name)
}

pub fn basename_pattern() -> &'static str {
    BASENAME_RE.as_str()
}

pub fn shortname_ok(name: &str) -> bool {
    SHORTNAME_RE.is_match(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" | "critical" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Diagnostic context for one verification run.
pub struct Report {
    errors: Cell<u32>,
    warnings: Cell<u32>,
    bail_on_error: bool,
    werror: bool,
    max_additional_info: usize,
    level: LogLevel,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Report {
            errors: Cell::new(0),
            warnings: Cell::new(0),
            bail_on_error: false,
            werror: false,
            max_additional_info: 15,
            level: LogLevel::Warning,
        }
    }

    pub fn bail_on_error(mut self, bail: bool) -> Self {
        self.bail_on_error = bail;
        self
    }

    pub fn werror(mut self, werror: bool) -> Self {
        self.werror = werror;
        self
    }

    pub fn max_additional_info(mut self, lines: usize) -> Self {
        self.max_additional_info = lines;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn errors(&self) -> u32 {
        self.errors.get()
    }

    pub fn warnings(&self) -> u32 {
        self.warnings.get()
    }

    /// Report an error attributed to `who`. Returns `Err(Bailout)` when
    /// bail-on-error is active, so callers propagate it with `?`.
    pub fn error(&self, who: &str, msg: &str, additional_info: Option<&str>) -> Result<()> {
        self.errors.set(self.errors.get() + 1);
        eprintln!(
            "{} in {}: {}",
            "ERROR".red().bold(),
            who,
            self.append_additional_info(msg, additional_info)
        );
        if self.bail_on_error {
            return Err(Bailout.into());
        }
        Ok(())
    }

    /// Report a warning; promoted to an error in werror mode.
    pub fn warning(&self, who: &str, msg: &str, additional_info: Option<&str>) -> Result<()> {
        if self.werror {
            return self.error(who, msg, additional_info);
        }
        self.warnings.set(self.warnings.get() + 1);
        if self.level <= LogLevel::Warning {
            eprintln!(
                "{} in {}: {}",
                "WARNING".yellow().bold(),
                who,
                self.append_additional_info(msg, additional_info)
            );
        }
        Ok(())
    }

    /// Unconditional progress message.
    pub fn msg(&self, msg: &str) {
        println!("{}", msg);
    }

    pub fn info(&self, msg: &str) {
        if self.level <= LogLevel::Info {
            println!("{}: {}", "INFO".blue(), msg);
        }
    }

    pub fn debug(&self, msg: &str) {
        if self.level <= LogLevel::Debug {
            println!("{}: {}", "DEBUG".dimmed(), msg);
        }
    }

    /// Check the basename of `path` against the identifier naming rule.
    pub fn check_basename(&self, who: &str, path: &Path) -> Result<()> {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !basename_ok(&basename) {
            self.error(
                who,
                &format!(
                    "Invalid name '{}' (should match '{}')",
                    basename,
                    basename_pattern()
                ),
                None,
            )?;
        }
        Ok(())
    }

    fn append_additional_info(&self, msg: &str, additional_info: Option<&str>) -> String {
        let info = match additional_info {
            Some(info) if self.max_additional_info > 0 => info.trim_end(),
            _ => return msg.to_string(),
        };
        if info.is_empty() {
            return msg.to_string();
        }
        let mut lines: Vec<&str> = info.split('\n').collect();
        if lines.len() == 1 {
            return format!("{} ({})", msg, lines[0]);
        }
        let truncated = lines.len() > self.max_additional_info;
        let marker;
        if truncated {
            lines.truncate(self.max_additional_info);
            marker = format!(
                "[.....truncated to {} lines.....]",
                self.max_additional_info
            );
            lines.push(&marker);
        }
        let body: Vec<String> = lines.iter().map(|line| format!("        {}", line)).collect();
        format!("{}:\n{}", msg, body.join("\n"))
    }
}
