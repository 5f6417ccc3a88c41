//! Output validator driver: exit-code protocol, feedback directories, and
//! the interactive session coordinator
//!
//! Protocol: an output validator is invoked with `[infile, ansfile,
//! feedbackdir, flags...]` and the submission's output on stdin. Exit 42
//! is AC, exit 43 is WA, anything else is a judge error. A `score.txt` in
//! the feedback directory is only meaningful in custom-scoring mode.

use super::input::tokenize;
use crate::problem::Problem;
use crate::report::Report;
use crate::runner::{get_tool, Program, RunOptions, WaitStatus};
use crate::testdata::CaseId;
use crate::verdict::{SubmissionResult, Verdict};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::Cell;
use std::env;
use std::fs;
use std::path::Path;

const ASPECT: &str = "output validators";

static INTERACTIVE_OUTPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+ \d+\.\d+ \d+ \d+\.\d+ (validator|submission)").unwrap());

/// Driver for the programs in `output_validators/`, or the bundled default
/// validator when the problem uses default validation.
pub struct OutputValidators {
    validators: Vec<Program>,
    default_validator: Option<Program>,
    checked: Cell<Option<bool>>,
}

impl OutputValidators {
    pub fn load(probdir: &Path, work_dir: &Path, compile_timelim: u64) -> OutputValidators {
        let default_validator = env::current_exe().ok().map(|exe| {
            Program::tool(
                "default_validator",
                vec![
                    exe.to_string_lossy().into_owned(),
                    "default-validator".to_string(),
                ],
                work_dir.to_path_buf(),
            )
        });
        OutputValidators {
            validators: crate::runner::find_programs(
                &probdir.join("output_validators"),
                None,
                work_dir,
                compile_timelim,
            ),
            default_validator,
            checked: Cell::new(None),
        }
    }

    fn actual_validators(&self, problem: &Problem) -> Vec<&Program> {
        if problem.config.uses_default_validation() {
            self.default_validator.iter().collect()
        } else {
            self.validators.iter().collect()
        }
    }

    pub fn check(&self, problem: &Problem, report: &Report) -> Result<bool> {
        if let Some(res) = self.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();

        for val in &self.validators {
            if let Some(language) = val.language() {
                if !crate::runner::language::RECOMMENDED_VALIDATOR_LANGUAGES
                    .contains(&language.id())
                {
                    report.warning(
                        ASPECT,
                        &format!("output validator language {} is not recommended", language.name()),
                        None,
                    )?;
                }
            }
        }

        if problem.config.uses_default_validation() && !self.validators.is_empty() {
            report.error(
                ASPECT,
                "There are validator programs but problem.yaml has validation = \"default\"",
                None,
            )?;
        } else if !problem.config.uses_default_validation() && self.validators.is_empty() {
            report.error(
                ASPECT,
                "problem.yaml specifies custom validator but no validator programs found",
                None,
            )?;
        }

        if problem.config.uses_default_validation() && self.default_validator.is_none() {
            report.error(ASPECT, "Unable to locate default validator", None)?;
        }

        for val in &self.validators {
            let (ok, msg) = val.compile()?;
            if !ok {
                report.error(
                    ASPECT,
                    &format!("Compile error for output validator {}", val),
                    Some(&msg),
                )?;
            }
        }

        // Only junk-check the validators when everything compiled.
        if report.errors() == errors_before {
            self.junk_check(problem, report)?;
        }

        let res = report.errors() == errors_before;
        self.checked.set(Some(res));
        Ok(res)
    }

    /// Feed each junk blob to every test case as if it were submission
    /// output; warn if nothing rejects, error if a validator judges-errors.
    fn junk_check(&self, problem: &Problem, report: &Report) -> Result<()> {
        let flags = &problem.config.validator_flags;
        let junk_file = problem.tmpdir().join("junkoutput");
        let mut rng = rand::thread_rng();
        for (desc, junk) in super::input::junk_cases(&mut rng) {
            fs::write(&junk_file, &junk)?;
            let mut rejected = false;
            for case_id in problem.testdata.all_cases(problem.testdata.root) {
                let result = self.validate(problem, case_id, &junk_file)?;
                if result.verdict != Verdict::Ac {
                    rejected = true;
                }
                if result.verdict == Verdict::Je {
                    report.error(
                        ASPECT,
                        &format!(
                            "{} as output, and output validator flags \"{}\" gave {}",
                            desc, flags, result
                        ),
                        None,
                    )?;
                    break;
                }
            }
            if !rejected {
                report.warning(ASPECT, &format!("{} gets AC", desc), None)?;
            }
        }
        Ok(())
    }

    /// Validate `submission_output` for `case`. Stops at the first
    /// validator that does not accept.
    pub fn validate(
        &self,
        problem: &Problem,
        case_id: CaseId,
        submission_output: &Path,
    ) -> Result<SubmissionResult> {
        let case = problem.testdata.case(case_id);
        let mut flags = tokenize(&problem.config.validator_flags);
        flags.extend(tokenize(
            &problem
                .testdata
                .group(case.group)
                .config
                .output_validator_flags,
        ));

        let mut res = SubmissionResult::new(Verdict::Je);
        for val in self.actual_validators(problem) {
            if !val.compile()?.0 {
                continue;
            }
            let feedbackdir = tempfile::Builder::new()
                .prefix("feedback")
                .tempdir_in(problem.tmpdir())?;
            let mut args = vec![
                case.infile.to_string_lossy().into_owned(),
                case.ansfile.to_string_lossy().into_owned(),
                feedbackdir.path().to_string_lossy().into_owned(),
            ];
            args.extend(flags.iter().cloned());
            let opts = RunOptions {
                stdin: Some(submission_output),
                args,
                timelim: Some(problem.config.limits.validation_time as f64),
                memlim: Some(problem.config.limits.validation_memory),
                ..Default::default()
            };
            let (status, _) = val.run(&opts)?;
            res = parse_validator_result(
                val.name(),
                status,
                feedbackdir.path(),
                problem.config.custom_scoring,
            );
            if res.verdict != Verdict::Ac {
                return Ok(res);
            }
        }
        Ok(res)
    }

    /// Run an interactive session through the arbiter and apply the
    /// verdict precedence rules to its status line.
    pub fn validate_interactive(
        &self,
        problem: &Problem,
        report: &Report,
        case_id: CaseId,
        sub: &Program,
        timelim: u64,
    ) -> Result<SubmissionResult> {
        let mut res = SubmissionResult::new(Verdict::Je);
        let Some(interactive) = get_tool("interactive", problem.tmpdir()) else {
            report.error("submissions", "Could not locate interactive runner", None)?;
            return Ok(res);
        };

        let case = problem.testdata.case(case_id);
        // Arbiter argument layout: file descriptor count, wall limit,
        // validator command, ";", submission command.
        let initargs = vec!["1".to_string(), (2 * timelim).to_string()];
        let submission_args = sub.runcmd(Some(problem.config.limits.memory));
        let val_memlim = problem.config.limits.validation_memory;

        for val in self.actual_validators(problem) {
            if !val.compile()?.0 {
                continue;
            }
            let feedbackdir = tempfile::Builder::new()
                .prefix("feedback")
                .tempdir_in(problem.tmpdir())?;
            let interactive_out = tempfile::NamedTempFile::new_in(problem.tmpdir())?;

            let mut args = initargs.clone();
            args.extend(val.runcmd(Some(val_memlim)));
            args.push(case.infile.to_string_lossy().into_owned());
            args.push(case.ansfile.to_string_lossy().into_owned());
            args.push(format!("{}/", feedbackdir.path().display()));
            args.push(";".to_string());
            args.extend(submission_args.iter().cloned());

            let opts = RunOptions {
                stdout: Some(interactive_out.path()),
                args,
                ..Default::default()
            };
            let (i_status, _) = interactive.run(&opts)?;

            if i_status.is_rte() {
                report.error(
                    "submissions",
                    &format!("Interactive crashed, status {}", i_status.0),
                    None,
                )?;
            } else {
                let output = fs::read_to_string(interactive_out.path()).unwrap_or_default();
                report.debug(&format!("Interactive output: \"{}\"", output));
                if !INTERACTIVE_OUTPUT_RE.is_match(&output) {
                    report.error(
                        "submissions",
                        &format!(
                            "Output from interactive does not follow expected format, \
                             got output \"{}\"",
                            output
                        ),
                        None,
                    )?;
                } else {
                    let fields: Vec<&str> = output.split_whitespace().collect();
                    let val_status = WaitStatus(fields[0].parse().unwrap_or(0));
                    let sub_status = WaitStatus(fields[2].parse().unwrap_or(0));
                    let mut sub_runtime: f64 = fields[3].parse().unwrap_or(0.0);
                    let first = fields[4];

                    let val_je =
                        !val_status.exited() || ![42, 43].contains(&val_status.exit_code());
                    let val_wa = val_status.exited() && val_status.exit_code() == 43;

                    if val_je || (val_wa && first == "validator") {
                        // The validator crashed, or exited first with WA:
                        // its verdict wins even if the early exit made the
                        // submission spin until the wall limit.
                        if sub_runtime > timelim as f64 {
                            sub_runtime = timelim as f64;
                        }
                        res = parse_validator_result(
                            val.name(),
                            val_status,
                            feedbackdir.path(),
                            problem.config.custom_scoring,
                        );
                    } else if sub_status.is_tle(true) {
                        res = SubmissionResult::new(Verdict::Tle);
                    } else if sub_status.is_rte() {
                        res = SubmissionResult::new(Verdict::Rte);
                    } else {
                        res = parse_validator_result(
                            val.name(),
                            val_status,
                            feedbackdir.path(),
                            problem.config.custom_scoring,
                        );
                    }
                    res.runtime = sub_runtime;
                    res.validator_first = first == "validator";
                }
            }

            if res.verdict != Verdict::Ac {
                return Ok(res);
            }
        }
        Ok(res)
    }
}

/// Decode one validator invocation per the exit-code protocol.
pub(crate) fn parse_validator_result(
    val: &str,
    status: WaitStatus,
    feedbackdir: &Path,
    custom_scoring: bool,
) -> SubmissionResult {
    let score_file = feedbackdir.join("score.txt");
    if !custom_scoring && score_file.is_file() {
        return SubmissionResult::with_reason(
            Verdict::Je,
            "validator produced \"score.txt\" but problem does not have \
             custom scoring activated",
        );
    }

    if !status.exited() {
        let mut res = SubmissionResult::with_reason(
            Verdict::Je,
            format!("output validator {} crashed, status {}", val, status.0),
        );
        res.additional_info = collect_feedback(feedbackdir);
        return res;
    }
    let code = status.exit_code();
    if code != 42 && code != 43 {
        let mut res = SubmissionResult::with_reason(
            Verdict::Je,
            format!("output validator {} exited with status {}", val, code),
        );
        res.additional_info = collect_feedback(feedbackdir);
        return res;
    }

    if code == 43 {
        let mut res = SubmissionResult::new(Verdict::Wa);
        res.additional_info = collect_feedback(feedbackdir);
        return res;
    }

    let mut score = None;
    if custom_scoring {
        if score_file.is_file() {
            let text = fs::read_to_string(&score_file).unwrap_or_default();
            match text.trim().parse::<f64>() {
                Ok(parsed) => score = Some(parsed),
                Err(e) => {
                    return SubmissionResult::with_reason(
                        Verdict::Je,
                        format!("failed to parse validator score: {}", e),
                    );
                }
            }
        } else {
            return SubmissionResult::with_reason(
                Verdict::Je,
                "problem has custom scoring but validator did not produce \"score.txt\"",
            );
        }
    }

    let mut res = SubmissionResult::new(Verdict::Ac);
    res.score = score;
    res
}

/// Gather whatever the validator wrote into its feedback directory. Each
/// file is capped so a runaway validator cannot flood the diagnostics.
fn collect_feedback(feedbackdir: &Path) -> Option<String> {
    const PER_FILE_CAP: usize = 128 * 1024;
    let mut entries: Vec<_> = fs::read_dir(feedbackdir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();
    let mut all_feedback = Vec::new();
    for path in entries {
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if metadata.len() == 0 {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = fs::read(&path).unwrap_or_default();
        let mut text = String::from_utf8_lossy(&content).into_owned();
        if text.len() > PER_FILE_CAP {
            let mut cut = PER_FILE_CAP;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        all_feedback.push(format!("=== {}: ===", name));
        all_feedback.push(text);
    }
    if all_feedback.is_empty() {
        None
    } else {
        Some(all_feedback.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn exit_42_is_ac() {
        let dir = TempDir::new().unwrap();
        let res =
            parse_validator_result("val", WaitStatus::from_exit_code(42), dir.path(), false);
        assert_eq!(res.verdict, Verdict::Ac);
        assert_eq!(res.score, None);
    }

    #[test]
    fn exit_43_is_wa_with_feedback() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("judgemessage.txt"), "expected 4, got 5\n").unwrap();
        let res =
            parse_validator_result("val", WaitStatus::from_exit_code(43), dir.path(), false);
        assert_eq!(res.verdict, Verdict::Wa);
        let info = res.additional_info.unwrap();
        assert!(info.contains("=== judgemessage.txt: ==="));
        assert!(info.contains("expected 4, got 5"));
    }

    #[test]
    fn other_exit_codes_are_judge_errors() {
        let dir = TempDir::new().unwrap();
        let res = parse_validator_result("val", WaitStatus::from_exit_code(1), dir.path(), false);
        assert_eq!(res.verdict, Verdict::Je);
        assert!(res.reason.unwrap().contains("exited with status 1"));
    }

    #[test]
    fn signals_are_crashes() {
        let dir = TempDir::new().unwrap();
        let res = parse_validator_result("val", WaitStatus(11), dir.path(), false);
        assert_eq!(res.verdict, Verdict::Je);
        assert!(res.reason.unwrap().contains("crashed"));
    }

    #[test]
    fn score_file_without_custom_scoring_is_judge_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("score.txt"), "5\n").unwrap();
        let res =
            parse_validator_result("val", WaitStatus::from_exit_code(42), dir.path(), false);
        assert_eq!(res.verdict, Verdict::Je);
        assert!(res.reason.unwrap().contains("custom scoring"));
    }

    #[test]
    fn custom_scoring_requires_score_file() {
        let dir = TempDir::new().unwrap();
        let res = parse_validator_result("val", WaitStatus::from_exit_code(42), dir.path(), true);
        assert_eq!(res.verdict, Verdict::Je);
        assert!(res.reason.unwrap().contains("did not produce"));
    }

    #[test]
    fn custom_scoring_parses_score() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("score.txt"), " 7.5 \n").unwrap();
        let res = parse_validator_result("val", WaitStatus::from_exit_code(42), dir.path(), true);
        assert_eq!(res.verdict, Verdict::Ac);
        assert_eq!(res.score, Some(7.5));
    }

    #[test]
    fn unparsable_score_is_judge_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("score.txt"), "lots\n").unwrap();
        let res = parse_validator_result("val", WaitStatus::from_exit_code(42), dir.path(), true);
        assert_eq!(res.verdict, Verdict::Je);
        assert!(res.reason.unwrap().contains("failed to parse"));
    }

    #[test]
    fn interactive_status_line_format() {
        assert!(INTERACTIVE_OUTPUT_RE.is_match("10752 0.01 0 1.23 validator"));
        assert!(INTERACTIVE_OUTPUT_RE.is_match("10752 0.01 0 1.23 submission"));
        assert!(!INTERACTIVE_OUTPUT_RE.is_match("10752 0.01 0 1.23 neither"));
        assert!(!INTERACTIVE_OUTPUT_RE.is_match("nonsense"));
        assert!(!INTERACTIVE_OUTPUT_RE.is_match("10752 1 0 1.23 validator"));
    }
}
