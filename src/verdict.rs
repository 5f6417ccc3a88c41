//! Verdicts and per-run submission results

use std::fmt;

/// Outcome of judging a submission on one test case or one test group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Accepted
    Ac,
    /// Partially accepted (scoring problems only)
    Pac,
    /// Wrong answer
    Wa,
    /// Time limit exceeded
    Tle,
    /// Run-time error
    Rte,
    /// Output limit exceeded
    Ole,
    /// Memory limit exceeded
    Mle,
    /// Judge error: the validator crashed or misbehaved
    Je,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ac => "AC",
            Verdict::Pac => "PAC",
            Verdict::Wa => "WA",
            Verdict::Tle => "TLE",
            Verdict::Rte => "RTE",
            Verdict::Ole => "OLE",
            Verdict::Mle => "MLE",
            Verdict::Je => "JE",
        }
    }

    /// AC or PAC, the verdicts that carry credit in a scoring problem.
    pub fn carries_credit(self) -> bool {
        matches!(self, Verdict::Ac | Verdict::Pac)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of running a submission on a test case, or the aggregate
/// outcome over a test group.
///
/// Results are plain values: test cases hand out fresh copies so that
/// stamping the test case name on a returned result never mutates a cache
/// entry, and aggregation never aliases child results.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub verdict: Verdict,
    /// Populated only in scoring mode.
    pub score: Option<f64>,
    pub reason: Option<String>,
    /// Validator feedback or other context, attached to diagnostics.
    pub additional_info: Option<String>,
    /// Data-relative name of the leaf that produced this outcome; for
    /// aggregates, the last child considered.
    pub testcase: Option<String>,
    /// Worst runtime seen, in seconds; -1.0 when no run contributed.
    pub runtime: f64,
    pub runtime_testcase: Option<String>,
    /// Worst runtime among AC outcomes only; -1.0 when none.
    pub ac_runtime: f64,
    pub ac_runtime_testcase: Option<String>,
    /// In an interactive run, true iff the output validator exited before
    /// the submission.
    pub validator_first: bool,
    /// Leaf results that failed under the `sample` group, propagated upward
    /// unmodified.
    pub sample_failures: Vec<SubmissionResult>,
}

impl SubmissionResult {
    pub fn new(verdict: Verdict) -> Self {
        SubmissionResult {
            verdict,
            score: None,
            reason: None,
            additional_info: None,
            testcase: None,
            runtime: -1.0,
            runtime_testcase: None,
            ac_runtime: -1.0,
            ac_runtime_testcase: None,
            validator_first: false,
            sample_failures: Vec::new(),
        }
    }

    pub fn with_reason(verdict: Verdict, reason: impl Into<String>) -> Self {
        let mut res = SubmissionResult::new(verdict);
        res.reason = Some(reason.into());
        res
    }

    /// Copy `runtime` into `ac_runtime` when this result is AC.
    pub fn set_ac_runtime(&mut self) {
        if self.verdict == Verdict::Ac {
            self.ac_runtime = self.runtime;
            self.ac_runtime_testcase = self.runtime_testcase.clone();
        }
    }
}

impl fmt::Display for SubmissionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut verdict = self.verdict.to_string();
        if self.verdict.carries_credit() {
            if let Some(score) = self.score {
                verdict = format!("{} ({:.0})", verdict, score);
            }
        }

        let mut details = Vec::new();
        if let Some(ref reason) = self.reason {
            details.push(reason.clone());
        }
        if let Some(ref testcase) = self.testcase {
            details.push(format!("test case: {}", testcase));
        }
        if self.runtime != -1.0 {
            let at = self.runtime_testcase.as_deref().unwrap_or("?");
            details.push(format!("CPU: {:.2}s @ {}", self.runtime, at));
        }

        if details.is_empty() {
            f.write_str(&verdict)
        } else {
            write!(f, "{} [{}]", verdict, details.join(", "))
        }
    }
}
