//! Reference submissions: expected-verdict checking and two-sided
//! time-limit inference

use crate::problem::{Problem, VerifyOptions};
use crate::report::Report;
use crate::runner::{find_programs, Program};
use crate::verdict::{SubmissionResult, Verdict};
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::Cell;
use std::path::Path;

const ASPECT: &str = "submissions";

/// (expected verdict, directory, required)
const VERDICT_DIRS: [(Verdict, &str, bool); 5] = [
    (Verdict::Ac, "accepted", true),
    (Verdict::Pac, "partially_accepted", false),
    (Verdict::Wa, "wrong_answer", false),
    (Verdict::Rte, "run_time_error", false),
    (Verdict::Tle, "time_limit_exceeded", false),
];

static SUB_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*[a-zA-Z0-9](\.c\+\+)?$").unwrap());

struct Category {
    verdict: Verdict,
    dirname: &'static str,
    required: bool,
    programs: Vec<Program>,
}

/// The reference submissions, grouped by their labeled verdict directory.
pub struct Submissions {
    categories: Vec<Category>,
    checked: Cell<Option<bool>>,
}

/// Round to whole seconds the way limits are derived: half up.
fn round_secs(x: f64) -> u64 {
    (x + 0.5) as u64
}

/// Derive (timelim, low margin, high margin) from the slowest AC runtime.
pub(crate) fn infer_limits(max_runtime: f64, time_multiplier: f64, safety_margin: f64) -> (u64, u64, u64) {
    let exact = max_runtime * time_multiplier;
    let timelim = round_secs(exact).max(1);
    let timelim_low = round_secs(exact / safety_margin)
        .min(timelim.saturating_sub(1))
        .max(1);
    let timelim_margin = round_secs(exact * safety_margin).max(timelim + 1);
    (timelim, timelim_low, timelim_margin)
}

impl Submissions {
    pub fn load(probdir: &Path, work_dir: &Path, compile_timelim: u64) -> Submissions {
        let srcdir = probdir.join("submissions");
        let categories = VERDICT_DIRS
            .iter()
            .map(|&(verdict, dirname, required)| Category {
                verdict,
                dirname,
                required,
                programs: find_programs(
                    &srcdir.join(dirname),
                    Some(&SUB_NAME_RE),
                    work_dir,
                    compile_timelim,
                ),
            })
            .collect();
        Submissions {
            categories,
            checked: Cell::new(None),
        }
    }

    pub fn check(&self, problem: &Problem, report: &Report, opts: &VerifyOptions) -> Result<bool> {
        if let Some(res) = self.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();

        let limits = &problem.config.limits;
        let time_multiplier = limits.time_multiplier;
        let safety_margin = limits.time_safety_margin;

        // Seed wide open; the AC batch narrows these down.
        let mut timelim: u64 = 300;
        let mut timelim_margin: u64 = 300;
        let mut timelim_margin_lo: u64 = 300;

        if let Some(t) = limits.time_for_ac_submissions {
            timelim = t;
            timelim_margin = t;
        }
        if let Some(fixed) = opts.fixed_timelim {
            timelim = fixed;
            timelim_margin = round_secs(fixed as f64 * safety_margin);
        }

        for category in &self.categories {
            if category.required && category.programs.is_empty() {
                report.error(
                    ASPECT,
                    &format!("Require at least one \"{}\" submission", category.dirname),
                    None,
                )?;
            }

            let mut runtimes = Vec::new();
            for sub in &category.programs {
                if !opts
                    .submission_filter
                    .is_match(&format!("{}/{}", category.dirname, sub.name()))
                {
                    continue;
                }
                report.info(&format!("Check {} submission {}", category.verdict, sub));

                let code_size = sub.code_size();
                if code_size > 1024 * limits.code {
                    report.error(
                        ASPECT,
                        &format!(
                            "{} submission {} has size {:.1} kiB, \
                             exceeds code size limit of {} kiB",
                            category.verdict,
                            sub,
                            code_size as f64 / 1024.0,
                            limits.code
                        ),
                        None,
                    )?;
                    continue;
                }

                let (ok, msg) = sub.compile()?;
                if !ok {
                    report.error(
                        ASPECT,
                        &format!("Compile error for {} submission {}", category.verdict, sub),
                        Some(&msg),
                    )?;
                    continue;
                }

                let res = self.check_submission(
                    problem,
                    report,
                    opts,
                    sub,
                    category.verdict,
                    timelim,
                    timelim_margin_lo,
                    timelim_margin,
                )?;
                runtimes.push(res.runtime);
            }

            if category.verdict == Verdict::Ac {
                let max_runtime_str = if runtimes.is_empty() {
                    "n/a".to_string()
                } else {
                    let max_runtime = runtimes.iter().cloned().fold(f64::MIN, f64::max);
                    let (t, lo, hi) = infer_limits(max_runtime, time_multiplier, safety_margin);
                    timelim = t;
                    timelim_margin_lo = lo;
                    timelim_margin = hi;
                    format!("{:.3}", max_runtime)
                };
                if let Some(fixed) = opts.fixed_timelim {
                    if fixed != timelim {
                        report.msg(&format!(
                            "   Solutions give timelim of {} seconds, \
                             but will use provided fixed limit of {} seconds instead",
                            timelim, fixed
                        ));
                        timelim = fixed;
                        timelim_margin = round_secs(fixed as f64 * safety_margin);
                    }
                }
                report.msg(&format!(
                    "   Slowest AC runtime: {}, setting timelim to {} secs, \
                     safety margin to {} secs",
                    max_runtime_str, timelim, timelim_margin
                ));
            }
        }

        let res = report.errors() == errors_before;
        self.checked.set(Some(res));
        Ok(res)
    }

    /// Run one submission over the data tree and compare against its label.
    #[allow(clippy::too_many_arguments)]
    fn check_submission(
        &self,
        problem: &Problem,
        report: &Report,
        opts: &VerifyOptions,
        sub: &Program,
        expected: Verdict,
        timelim: u64,
        timelim_low: u64,
        timelim_high: u64,
    ) -> Result<SubmissionResult> {
        let desc = format!("{} submission {}", expected, sub);
        let mut expected = expected;
        let mut timelim_low = timelim_low;
        let partial = expected == Verdict::Pac;
        if partial {
            // Partial solutions are checked against the low limit instead
            // of the real one, so they keep margin in both directions.
            expected = Verdict::Ac;
        } else {
            timelim_low = timelim;
        }

        let (result, result_low, result_high) = problem.testdata.run_group(
            problem,
            report,
            opts,
            problem.testdata.root,
            sub,
            timelim,
            timelim_low,
            timelim_high,
        )?;

        if result.verdict == Verdict::Ac
            && expected == Verdict::Ac
            && !partial
            && !result.sample_failures.is_empty()
        {
            let failure = &result.sample_failures[0];
            report.warning(
                ASPECT,
                &format!("{} got {} on sample: {}", desc, failure.verdict, failure),
                None,
            )?;
        }

        if result_low.verdict != result_high.verdict || result_low.score != result_high.score {
            let (r1, r2) = if result_low.verdict == result_high.verdict {
                (result_low.to_string(), result_high.to_string())
            } else {
                (result_low.verdict.to_string(), result_high.verdict.to_string())
            };
            report.warning(
                ASPECT,
                &format!(
                    "{} sensitive to time limit: limit of {} secs -> {}, \
                     limit of {} secs -> {}",
                    desc, timelim_low, r1, timelim_high, r2
                ),
                None,
            )?;
        }

        if partial && self.fully_accepted(problem, &result) {
            report.warning(
                ASPECT,
                &format!(
                    "{} got {}, consider moving it out of partially_accepted",
                    desc, result
                ),
                None,
            )?;
        } else if result.verdict == expected {
            report.msg(&format!("   {} OK: {}", desc, result));
            if expected == Verdict::Ac
                && !partial
                && !self.fully_accepted(problem, &result)
                && self.full_score_finite(problem)
            {
                // Expected for some heuristic problems, so only a warning.
                report.warning(
                    ASPECT,
                    &format!(
                        "{} did not attain full score \
                         (consider moving it to partially_accepted)",
                        desc
                    ),
                    None,
                )?;
            }
        } else if result_high.verdict == expected
            && !(partial && self.fully_accepted(problem, &result_high))
        {
            report.msg(&format!("   {} OK with extra time: {}", desc, result_high));
        } else {
            report.error(
                ASPECT,
                &format!("{} got {}", desc, result),
                result_high.additional_info.as_deref(),
            )?;
        }

        Ok(result)
    }

    fn full_score_finite(&self, problem: &Problem) -> bool {
        problem.testdata.max_score().is_finite()
    }

    fn fully_accepted(&self, problem: &Problem, result: &SubmissionResult) -> bool {
        result.verdict == Verdict::Ac
            && (!problem.is_scoring || result.score == Some(problem.testdata.max_score()))
    }
}
