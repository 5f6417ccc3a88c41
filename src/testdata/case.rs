//! A single test case: hygiene checks, execution, caching, and the
//! three-limit classification

use super::{CaseId, GroupId, TestData};
use crate::problem::{Problem, VerifyOptions};
use crate::report::Report;
use crate::runner::{Program, RunOptions};
use crate::verdict::{SubmissionResult, Verdict};
use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::PathBuf;

pub type ResultTriple = (SubmissionResult, SubmissionResult, SubmissionResult);

/// Key for a cached run: same submission, same filter, same three limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub submission: String,
    pub data_filter: String,
    pub timelim: u64,
    pub timelim_low: u64,
    pub timelim_high: u64,
}

/// One (input, answer) pair. If `reuse_result_from` is set, this case is a
/// symlink alias: it never runs anything itself and borrows the target's
/// cached results.
pub struct TestCase {
    pub base: PathBuf,
    pub infile: PathBuf,
    pub ansfile: PathBuf,
    /// Data-relative base path without extension, e.g. "secret/g1/01".
    pub rel_base: String,
    pub group: GroupId,
    pub reuse_result_from: Option<CaseId>,
    pub(crate) cache: RefCell<Option<(CacheKey, ResultTriple)>>,
    pub(crate) checked: Cell<Option<bool>>,
}

impl TestCase {
    pub fn display(&self) -> String {
        format!("test case {}", self.rel_base)
    }

    pub fn is_sample(&self) -> bool {
        self.rel_base.starts_with("sample")
    }

    pub fn matches_filter(&self, filter: &regex::Regex) -> bool {
        filter.is_match(&self.rel_base)
    }
}

/// The three-limit classification. `res_hi` comes from a run under the
/// high margin; the verdicts at `timelim` and `timelim_low` are derived
/// from its runtime. An interactive WA where the validator exited first
/// stays WA even past the time limit, and the high result's runtime is
/// rewritten to the low limit so later aggregation cannot claim this case
/// as a TLE witness.
pub(crate) fn classify_with_limits(
    mut res_hi: SubmissionResult,
    timelim: u64,
    timelim_low: u64,
) -> ResultTriple {
    let mut res;
    let mut res_lo;
    if res_hi.runtime <= timelim_low as f64 {
        res = res_hi.clone();
        res_lo = res_hi.clone();
    } else if res_hi.runtime <= timelim as f64 {
        res = res_hi.clone();
        res_lo = SubmissionResult::new(Verdict::Tle);
    } else if res_hi.validator_first && res_hi.verdict == Verdict::Wa {
        res = SubmissionResult::new(Verdict::Wa);
        res.validator_first = true;
        res_lo = res.clone();
        res_hi.runtime = timelim_low as f64;
    } else {
        res_lo = SubmissionResult::new(Verdict::Tle);
        res = res_lo.clone();
    }
    res.runtime = res_hi.runtime;
    res_lo.runtime = res_hi.runtime;
    res.set_ac_runtime();
    res_lo.set_ac_runtime();
    res_hi.set_ac_runtime();
    (res, res_lo, res_hi)
}

impl TestData {
    pub(crate) fn check_case(
        &self,
        problem: &Problem,
        report: &Report,
        id: CaseId,
    ) -> Result<bool> {
        let case = self.case(id);
        if let Some(res) = case.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();
        let who = case.display();

        report.check_basename(&who, &case.infile)?;
        report.check_basename(&who, &case.ansfile)?;
        self.check_newlines(report, &who, &case.infile)?;
        self.check_newlines(report, &who, &case.ansfile)?;

        problem.input_validators.validate(problem, report, id)?;

        let anssize = fs::metadata(&case.ansfile).map(|m| m.len()).unwrap_or(0) as f64
            / 1024.0
            / 1024.0;
        let outputlim = problem.config.limits.output;
        if anssize > outputlim {
            report.error(
                &who,
                &format!(
                    "Answer file ({:.1} Mb) is larger than output limit ({} Mb), \
                     you need to increase output limit",
                    anssize, outputlim
                ),
                None,
            )?;
        } else if 2.0 * anssize > outputlim {
            report.warning(
                &who,
                &format!(
                    "Answer file ({:.1} Mb) is within 50% of output limit ({} Mb), \
                     you might want to increase output limit",
                    anssize, outputlim
                ),
                None,
            )?;
        }

        if !problem.is_interactive {
            let val_res = problem
                .output_validators
                .validate(problem, id, &case.ansfile)?;
            if val_res.verdict != Verdict::Ac {
                let msg = format!("judge answer file got {}", val_res);
                if case.is_sample() {
                    report.error(&who, &msg, None)?;
                } else {
                    report.warning(&who, &msg, None)?;
                }
            }
        }

        self.check_symlinks(problem, report, id)?;

        let res = report.errors() == errors_before;
        case.checked.set(Some(res));
        Ok(res)
    }

    fn check_newlines(&self, report: &Report, who: &str, path: &PathBuf) -> Result<()> {
        let Ok(data) = fs::read(path) else {
            return Ok(());
        };
        if data.contains(&b'\r') {
            report.warning(
                who,
                &format!("The file {} contains non-standard line breaks.", path.display()),
                None,
            )?;
        }
        if !data.is_empty() && data.last() != Some(&b'\n') {
            report.warning(
                who,
                &format!("The file {} does not end with '\\n'.", path.display()),
                None,
            )?;
        }
        Ok(())
    }

    fn check_symlinks(&self, problem: &Problem, report: &Report, id: CaseId) -> Result<bool> {
        let case = self.case(id);
        if !case.infile.is_symlink() {
            return Ok(true);
        }
        let who = case.display();
        let nicepath = super::relpath(&case.infile, &problem.probdir);

        let Ok(in_target) = fs::canonicalize(&case.infile) else {
            report.error(
                &who,
                &format!(
                    "Symbolic link does not point to a .in file for input '{}'",
                    nicepath
                ),
                None,
            )?;
            return Ok(false);
        };
        if in_target.extension().and_then(|e| e.to_str()) != Some("in") {
            report.error(
                &who,
                &format!(
                    "Symbolic link does not point to a .in file for input '{}'",
                    nicepath
                ),
                None,
            )?;
            return Ok(false);
        }
        let ans_target = fs::canonicalize(&case.ansfile).unwrap_or_default();
        if ans_target != in_target.with_extension("ans") {
            report.error(
                &who,
                &format!(
                    "Symbolic link '{}' must have a corresponding link for answer file",
                    nicepath
                ),
                None,
            )?;
            return Ok(false);
        }
        let Some(target) = case.reuse_result_from else {
            report.error(
                &who,
                &format!(
                    "Symbolic link points outside data/ directory for file '{}'",
                    nicepath
                ),
                None,
            )?;
            return Ok(false);
        };
        let own_flags = &self.group(case.group).config.output_validator_flags;
        let target_flags = &self
            .group(self.case(target).group)
            .config
            .output_validator_flags;
        if own_flags != target_flags {
            report.error(
                &who,
                &format!(
                    "Symbolic link '{}' points to test case with different output validator flags",
                    nicepath
                ),
                None,
            )?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Run `sub` on this case under the three limits. Returns fresh result
    /// values stamped with this case's name, even for reuse aliases.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_case(
        &self,
        problem: &Problem,
        report: &Report,
        opts: &VerifyOptions,
        id: CaseId,
        sub: &Program,
        timelim: u64,
        timelim_low: u64,
        timelim_high: u64,
    ) -> Result<ResultTriple> {
        let (res, res_lo, res_hi, reused) = self.run_case_real(
            problem,
            report,
            opts,
            id,
            sub,
            timelim,
            timelim_low,
            timelim_high,
        )?;
        let mut res = self.init_result_for_case(problem, id, res);
        let res_lo = self.init_result_for_case(problem, id, res_lo);
        let res_hi = self.init_result_for_case(problem, id, res_hi);

        let what = if reused {
            "Reused test file result"
        } else {
            "Test file result"
        };
        report.info(&format!("{}: {}", what, res));

        if res.verdict != Verdict::Ac && self.case(id).is_sample() {
            let mut failure = res.clone();
            failure.sample_failures.clear();
            res.sample_failures.push(failure);
        }
        Ok((res, res_lo, res_hi))
    }

    #[allow(clippy::too_many_arguments)]
    fn run_case_real(
        &self,
        problem: &Problem,
        report: &Report,
        opts: &VerifyOptions,
        id: CaseId,
        sub: &Program,
        timelim: u64,
        timelim_low: u64,
        timelim_high: u64,
    ) -> Result<(SubmissionResult, SubmissionResult, SubmissionResult, bool)> {
        let case = self.case(id);
        if let Some(target) = case.reuse_result_from {
            return self.run_case_real(
                problem,
                report,
                opts,
                target,
                sub,
                timelim,
                timelim_low,
                timelim_high,
            );
        }

        let key = CacheKey {
            submission: sub.name().to_string(),
            data_filter: opts.data_filter.as_str().to_string(),
            timelim,
            timelim_low,
            timelim_high,
        };
        if let Some((cached_key, triple)) = &*case.cache.borrow() {
            if *cached_key == key {
                return Ok((triple.0.clone(), triple.1.clone(), triple.2.clone(), true));
            }
        }

        let res_hi = if problem.is_interactive {
            problem
                .output_validators
                .validate_interactive(problem, report, id, sub, timelim_high)?
        } else {
            let outfile = problem.tmpdir().join("output");
            let run_opts = RunOptions {
                stdin: Some(&case.infile),
                stdout: Some(&outfile),
                stderr: None,
                args: Vec::new(),
                timelim: Some((timelim_high + 1) as f64),
                memlim: Some(problem.config.limits.memory),
            };
            let (status, runtime) = sub.run(&run_opts)?;
            let mut res_hi = if status.is_tle(false) || runtime > timelim_high as f64 {
                SubmissionResult::new(Verdict::Tle)
            } else if status.is_rte() {
                SubmissionResult::new(Verdict::Rte)
            } else {
                problem
                    .output_validators
                    .validate(problem, id, &outfile)?
            };
            res_hi.runtime = runtime;
            res_hi
        };

        let (res, res_lo, res_hi) = classify_with_limits(res_hi, timelim, timelim_low);
        *case.cache.borrow_mut() = Some((key, (res.clone(), res_lo.clone(), res_hi.clone())));
        Ok((res, res_lo, res_hi, false))
    }

    fn init_result_for_case(
        &self,
        problem: &Problem,
        id: CaseId,
        mut res: SubmissionResult,
    ) -> SubmissionResult {
        let case = self.case(id);
        res.testcase = Some(case.rel_base.clone());
        res.runtime_testcase = Some(case.rel_base.clone());
        if res.ac_runtime != -1.0 {
            res.ac_runtime_testcase = Some(case.rel_base.clone());
        }
        if res.score.is_none() && problem.is_scoring {
            let case_score = self
                .group(case.group)
                .config
                .grading
                .as_ref()
                .map(|g| g.score)
                .unwrap_or(0.0);
            res.score = Some(if res.verdict == Verdict::Ac {
                case_score
            } else {
                0.0
            });
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hi_result(verdict: Verdict, runtime: f64) -> SubmissionResult {
        let mut res = SubmissionResult::new(verdict);
        res.runtime = runtime;
        res
    }

    #[test]
    fn fast_run_is_identical_across_limits() {
        let (res, res_lo, res_hi) = classify_with_limits(hi_result(Verdict::Ac, 2.0), 5, 3);
        assert_eq!(res, res_lo);
        assert_eq!(res, res_hi);
        assert_eq!(res.verdict, Verdict::Ac);
        assert_eq!(res.ac_runtime, 2.0);
    }

    #[test]
    fn run_between_low_and_timelim_fails_low_only() {
        let (res, res_lo, res_hi) = classify_with_limits(hi_result(Verdict::Ac, 4.0), 5, 3);
        assert_eq!(res.verdict, Verdict::Ac);
        assert_eq!(res_lo.verdict, Verdict::Tle);
        assert_eq!(res_lo.runtime, 4.0);
        assert_eq!(res_hi.verdict, Verdict::Ac);
    }

    #[test]
    fn runtime_exactly_at_timelim_is_low_tle() {
        let (res, res_lo, _) = classify_with_limits(hi_result(Verdict::Ac, 5.0), 5, 3);
        assert_eq!(res.verdict, Verdict::Ac);
        assert_eq!(res_lo.verdict, Verdict::Tle);
    }

    #[test]
    fn slow_run_is_tle_everywhere() {
        let (res, res_lo, res_hi) = classify_with_limits(hi_result(Verdict::Ac, 7.0), 5, 3);
        assert_eq!(res.verdict, Verdict::Tle);
        assert_eq!(res_lo.verdict, Verdict::Tle);
        // The high-limit run itself was fine
        assert_eq!(res_hi.verdict, Verdict::Ac);
        assert_eq!(res.runtime, 7.0);
    }

    #[test]
    fn interactive_wa_with_validator_first_beats_tle() {
        let mut hi = hi_result(Verdict::Wa, 11.0);
        hi.validator_first = true;
        let (res, res_lo, res_hi) = classify_with_limits(hi, 5, 3);
        assert_eq!(res.verdict, Verdict::Wa);
        assert!(res.validator_first);
        assert_eq!(res_lo.verdict, Verdict::Wa);
        // Runtime is rewritten so this case is not a TLE witness
        assert_eq!(res_hi.runtime, 3.0);
        assert_eq!(res.runtime, 3.0);
    }

    #[test]
    fn wa_without_validator_first_does_not_override_tle() {
        let (res, res_lo, _) = classify_with_limits(hi_result(Verdict::Wa, 11.0), 5, 3);
        assert_eq!(res.verdict, Verdict::Tle);
        assert_eq!(res_lo.verdict, Verdict::Tle);
    }
}
