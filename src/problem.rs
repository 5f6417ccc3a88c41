//! The problem environment: owns the temp workspace and every aspect of
//! one package for the duration of a verification run

use crate::attachments::Attachments;
use crate::config::ProblemConfig;
use crate::generators::Generators;
use crate::report::{shortname_ok, Bailout, Report};
use crate::statement::ProblemStatement;
use crate::submissions::Submissions;
use crate::testdata::TestData;
use crate::validators::{InputValidators, OutputValidators};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::TempDir;

/// The parts of a package that can be checked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    Config,
    Statement,
    Validators,
    Generators,
    Data,
    Submissions,
}

impl Part {
    pub const ALL: [Part; 6] = [
        Part::Config,
        Part::Statement,
        Part::Validators,
        Part::Generators,
        Part::Data,
        Part::Submissions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Part::Config => "config",
            Part::Statement => "statement",
            Part::Validators => "validators",
            Part::Generators => "generators",
            Part::Data => "data",
            Part::Submissions => "submissions",
        }
    }
}

impl FromStr for Part {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config" => Ok(Part::Config),
            "statement" => Ok(Part::Statement),
            "validators" => Ok(Part::Validators),
            "generators" => Ok(Part::Generators),
            "data" => Ok(Part::Data),
            "submissions" => Ok(Part::Submissions),
            other => Err(format!("Invalid problem part specified: {}", other)),
        }
    }
}

/// Options for one verification run.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub parts: Vec<Part>,
    /// Matched against data-relative case names like "sample/hello".
    pub data_filter: Regex,
    /// Matched against "category/name" like "accepted/hello.py".
    pub submission_filter: Regex,
    /// Overrides the inferred time limit.
    pub fixed_timelim: Option<u64>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        VerifyOptions {
            parts: Part::ALL.to_vec(),
            data_filter: Regex::new(".*").unwrap(),
            submission_filter: Regex::new(".*").unwrap(),
            fixed_timelim: None,
        }
    }
}

/// One loaded problem package. The temp workspace lives as long as this
/// value and is deleted on drop.
pub struct Problem {
    pub probdir: PathBuf,
    pub shortname: String,
    tmpdir: TempDir,
    pub config: ProblemConfig,
    pub statement: ProblemStatement,
    pub attachments: Attachments,
    pub input_validators: InputValidators,
    pub output_validators: OutputValidators,
    pub testdata: TestData,
    pub submissions: Submissions,
    pub generators: Generators,
    pub is_interactive: bool,
    pub is_scoring: bool,
}

impl Problem {
    /// Load every aspect of the package at `probdir`. Structural problems
    /// found during loading are reported immediately.
    pub fn load(probdir: &Path, report: &Report) -> Result<Problem> {
        let probdir = std::fs::canonicalize(probdir)
            .with_context(|| format!("resolving {}", probdir.display()))?;
        let shortname = probdir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmpdir = tempfile::Builder::new()
            .prefix(&format!("verify-{}-", shortname))
            .tempdir()
            .context("creating temp workspace")?;

        let statement = ProblemStatement::load(&probdir, report);
        let attachments = Attachments::load(&probdir, report);
        let config = ProblemConfig::load(&probdir, &statement.get_config(), report)?;
        let compile_timelim = config.limits.compilation_time;

        let input_validators = InputValidators::load(&probdir, tmpdir.path(), compile_timelim);
        let output_validators = OutputValidators::load(&probdir, tmpdir.path(), compile_timelim);
        let testdata = TestData::load(&probdir, &config, report)?;
        let submissions = Submissions::load(&probdir, tmpdir.path(), compile_timelim);
        let generators = Generators::load(&probdir, report)?;

        let is_interactive = config.is_interactive();
        let is_scoring = config.is_scoring();
        Ok(Problem {
            probdir,
            shortname,
            tmpdir,
            config,
            statement,
            attachments,
            input_validators,
            output_validators,
            testdata,
            submissions,
            generators,
            is_interactive,
            is_scoring,
        })
    }

    pub fn tmpdir(&self) -> &Path {
        self.tmpdir.path()
    }

    /// Check the requested parts. A `Bailout` from bail-on-error mode
    /// stops here; the counters already reflect the first error.
    pub fn check(&self, report: &Report, opts: &VerifyOptions) -> Result<(u32, u32)> {
        let outcome = self.check_parts(report, opts);
        match outcome {
            Ok(()) => {}
            Err(e) if e.is::<Bailout>() => {}
            Err(e) => return Err(e),
        }
        Ok((report.errors(), report.warnings()))
    }

    fn check_parts(&self, report: &Report, opts: &VerifyOptions) -> Result<()> {
        if !shortname_ok(&self.shortname) {
            report.error(
                &self.shortname,
                &format!("Invalid shortname '{}' (must be [a-z0-9]+)", self.shortname),
                None,
            )?;
        }

        for part in &opts.parts {
            report.msg(&format!("Checking {}", part.name()));
            match part {
                Part::Config => {
                    self.config
                        .check(report, self.testdata.has_custom_groups())?;
                }
                Part::Statement => {
                    self.statement.check(report)?;
                    self.attachments.check(report)?;
                }
                Part::Validators => {
                    self.input_validators.check(self, report)?;
                    self.output_validators.check(self, report)?;
                }
                Part::Generators => {
                    self.generators.check(report)?;
                }
                Part::Data => {
                    self.testdata
                        .check_group(self, report, opts, self.testdata.root)?;
                }
                Part::Submissions => {
                    self.submissions.check(self, report, opts)?;
                }
            }
        }
        Ok(())
    }
}
