//! Gavel: problem package verifier CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use gavel::problem::{Part, Problem, VerifyOptions};
use gavel::report::{Bailout, LogLevel, Report};
use gavel::validators::default_validator;
use regex::Regex;
use std::path::PathBuf;
use std::process::ExitCode;

/// Validate a problem package in the common problem package format
#[derive(Parser, Debug)]
#[command(name = "gavel")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Run only submissions whose name matches this regex. The name
    /// includes the category, e.g. "accepted/hello.py"
    #[arg(short = 's', long, default_value = ".*", value_parser = parse_regex)]
    submission_filter: Regex,

    /// Use only data files whose name matches this regex. The name is
    /// relative to the data directory without extension, e.g. "sample/hello"
    #[arg(short = 'd', long, default_value = ".*", value_parser = parse_regex)]
    data_filter: Regex,

    /// Use this fixed time limit (seconds) instead of inferring one from
    /// the accepted submissions
    #[arg(short = 't', long)]
    fixed_timelim: Option<u64>,

    /// Check only the indicated parts of the problem
    #[arg(short = 'p', long, num_args = 1.., value_name = "PROBLEM_PART", value_parser = parse_part)]
    parts: Option<Vec<Part>>,

    /// Bail verification on first error
    #[arg(short = 'b', long)]
    bail_on_error: bool,

    /// Consider warnings as errors
    #[arg(short = 'e', long)]
    werror: bool,

    /// Set log level (debug, info, warning, error)
    #[arg(short = 'l', long, default_value = "warning", value_parser = parse_level)]
    log_level: LogLevel,

    /// Maximum number of lines of additional info (e.g. compiler output or
    /// validator feedback) to display about an error (0 to disable)
    #[arg(long = "max_additional_info", default_value_t = 15)]
    max_additional_info: usize,

    /// Problem package directories to verify
    #[arg(required_unless_present = "command")]
    problemdir: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Judge output on stdin against a judge answer (used internally as
    /// the bundled default output validator)
    #[command(name = "default-validator", hide = true)]
    DefaultValidator {
        infile: PathBuf,
        ansfile: PathBuf,
        feedbackdir: PathBuf,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        flags: Vec<String>,
    },
}

fn parse_regex(s: &str) -> Result<Regex, String> {
    Regex::new(s).map_err(|_| format!("{} is not a valid regex", s))
}

fn parse_part(s: &str) -> Result<Part, String> {
    s.parse()
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = Args::parse();

    if let Some(Commands::DefaultValidator {
        infile,
        ansfile,
        feedbackdir,
        flags,
    }) = args.command
    {
        return match default_validator::run(&infile, &ansfile, &feedbackdir, &flags) {
            Ok(code) => Ok(ExitCode::from(code)),
            Err(e) => {
                // Anything that keeps the comparison from happening is a
                // judge error, signaled by an exit code outside {42, 43}.
                eprintln!("default validator: {}", e);
                Ok(ExitCode::from(1))
            }
        };
    }

    let opts = VerifyOptions {
        parts: args.parts.unwrap_or_else(|| Part::ALL.to_vec()),
        data_filter: args.data_filter,
        submission_filter: args.submission_filter,
        fixed_timelim: args.fixed_timelim,
    };

    let mut total_errors = 0u32;
    for problemdir in &args.problemdir {
        let report = Report::new()
            .bail_on_error(args.bail_on_error)
            .werror(args.werror)
            .max_additional_info(args.max_additional_info)
            .log_level(args.log_level);

        let display_name = problemdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| problemdir.display().to_string());
        println!("Loading problem {}", display_name);

        if !problemdir.is_dir() {
            let _ = report.error(
                &display_name,
                &format!("Problem directory '{}' not found", problemdir.display()),
                None,
            );
        } else {
            let outcome =
                Problem::load(problemdir, &report).and_then(|problem| {
                    problem.check(&report, &opts).map(|_| ())
                });
            match outcome {
                Ok(()) => {}
                Err(e) if e.is::<Bailout>() => {}
                Err(e) => return Err(e),
            }
        }

        let (errors, warnings) = (report.errors(), report.warnings());
        let plural = |n: u32| if n == 1 { "" } else { "s" };
        println!(
            "{} tested: {} error{}, {} warning{}",
            display_name,
            errors,
            plural(errors),
            warnings,
            plural(warnings)
        );
        total_errors += errors;
    }

    Ok(if total_errors > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
