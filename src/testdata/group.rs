//! Test groups: recursive checks and verdict/score aggregation

use super::natsort::natural_sort_le;
use super::{GroupId, TestData, TestItem};
use crate::config::{Aggregation, GroupConfig, RawGroupYaml};
use crate::problem::{Problem, VerifyOptions};
use crate::report::Report;
use crate::runner::Program;
use crate::testdata::ResultTriple;
use crate::verdict::{SubmissionResult, Verdict};
use anyhow::Result;
use sha2::{Digest, Sha256};
use std::cell::Cell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// A directory of test cases and subgroups, with its resolved config.
pub struct TestGroup {
    pub datadir: PathBuf,
    /// Path relative to the problem directory, e.g. "data/secret/g1".
    pub rel_name: String,
    pub parent: Option<GroupId>,
    pub children: Vec<TestItem>,
    /// Explicit config after parent inheritance, before defaults.
    pub raw: RawGroupYaml,
    pub config: GroupConfig,
    /// Max score derived from children, regardless of an explicit override.
    pub computed_max_score: Option<f64>,
    pub seen_oob_scores: Cell<bool>,
    pub(crate) checked: Cell<Option<bool>>,
}

impl TestGroup {
    pub(crate) fn placeholder(
        datadir: PathBuf,
        rel_name: String,
        parent: Option<GroupId>,
        raw: RawGroupYaml,
    ) -> TestGroup {
        TestGroup {
            datadir,
            rel_name,
            parent,
            children: Vec::new(),
            raw,
            config: GroupConfig {
                input_validator_flags: String::new(),
                output_validator_flags: String::new(),
                grading: None,
            },
            computed_max_score: None,
            seen_oob_scores: Cell::new(false),
            checked: Cell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.datadir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
    }

    pub fn display(&self) -> String {
        format!("test case group {}", self.rel_name)
    }
}

/// Reduce child results to a group result. Runtime maxima and sample
/// failures accumulate first; a judge error short-circuits the verdict; a
/// scoring group then folds scores under its aggregation.
///
/// In sum aggregation, a mix of accepted and rejected children still
/// aggregates to AC (partial credit). That the specific rejected verdict is
/// discarded in the mixed case is inherited behavior, kept as is.
pub(crate) fn aggregate(
    sub_results: &[SubmissionResult],
    scoring: Option<Aggregation>,
) -> SubmissionResult {
    let mut res = SubmissionResult::new(Verdict::Ac);

    for r in sub_results {
        if r.runtime > res.runtime {
            res.runtime = r.runtime;
            res.runtime_testcase = r.runtime_testcase.clone();
        }
        if r.ac_runtime > res.ac_runtime {
            res.ac_runtime = r.ac_runtime;
            res.ac_runtime_testcase = r.ac_runtime_testcase.clone();
        }
        res.sample_failures.extend(r.sample_failures.iter().cloned());
    }

    if let Some(judge_error) = sub_results.iter().find(|r| r.verdict == Verdict::Je) {
        res.verdict = Verdict::Je;
        res.reason = judge_error.reason.clone();
        res.additional_info = judge_error.additional_info.clone();
        res.testcase = judge_error.testcase.clone();
        return res;
    }

    if let Some(last) = sub_results.last() {
        res.testcase = last.testcase.clone();
        res.additional_info = last.additional_info.clone();
    }

    let first_rejection = sub_results
        .iter()
        .map(|r| r.verdict)
        .find(|v| *v != Verdict::Ac);

    match scoring {
        None => {
            res.verdict = first_rejection.unwrap_or(Verdict::Ac);
        }
        Some(Aggregation::Min) => {
            res.verdict = first_rejection.unwrap_or(Verdict::Ac);
            res.score = Some(
                sub_results
                    .iter()
                    .filter_map(|r| r.score)
                    .fold(f64::INFINITY, f64::min),
            );
        }
        Some(Aggregation::Sum) => {
            res.verdict = if sub_results.iter().all(|r| r.verdict == Verdict::Ac) {
                Verdict::Ac
            } else if sub_results.iter().all(|r| !r.verdict.carries_credit()) {
                sub_results[0].verdict
            } else {
                Verdict::Ac
            };
            res.score = Some(sub_results.iter().filter_map(|r| r.score).sum());
        }
    }
    res
}

impl TestData {
    pub(crate) fn check_group(
        &self,
        problem: &Problem,
        report: &Report,
        opts: &VerifyOptions,
        id: GroupId,
    ) -> Result<bool> {
        let group = self.group(id);
        if let Some(res) = group.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();
        let who = group.display();

        report.check_basename(&who, &group.datadir)?;

        for key in group.raw.extra.keys() {
            report.warning(
                &who,
                &format!(
                    "Unknown key '{}' in '{}'",
                    key,
                    group.datadir.join("testdata.yaml").display()
                ),
                None,
            )?;
        }

        if !problem.is_scoring && group.raw.grading.is_some() {
            report.error(
                &who,
                "Key 'grading' is only applicable for scoring problems, \
                 this is a pass-fail problem",
                None,
            )?;
        }

        if let Some(grading) = &group.config.grading {
            if Aggregation::parse(&grading.aggregation_raw).is_none() {
                report.error(
                    &who,
                    &format!("Invalid aggregation type '{}'", grading.aggregation_raw),
                    None,
                )?;
            }
            if let Some(computed) = group.computed_max_score {
                if computed > grading.max_score {
                    report.warning(&who, "Score can be higher than max score", None)?;
                }
                if computed < grading.max_score {
                    report.warning(&who, "Max score is not achievable", None)?;
                }
            }
        }

        if group.parent.is_none() {
            self.check_root_layout(report, &who, id)?;
            self.check_duplicate_inputs(problem, report, &who, id)?;
        }

        self.check_orphans(report, &who, id)?;

        if self.subgroups(id).is_empty()
            && !group.children.iter().any(|c| matches!(c, TestItem::Case(_)))
        {
            report.error(&who, "Test case group is empty", None)?;
        }

        let mut last_name = String::new();
        for sub in self.subgroups(id) {
            let name = self.group(sub).rel_name.clone();
            if natural_sort_le(&name, &last_name) {
                report.warning(
                    &who,
                    &format!(
                        "Test data group '{}' will be ordered before '{}'; consider zero-padding",
                        last_name, name
                    ),
                    None,
                )?;
            }
            last_name = name;
        }

        for child in &group.children {
            match child {
                TestItem::Case(case_id) => {
                    if self.case(*case_id).matches_filter(&opts.data_filter) {
                        self.check_case(problem, report, *case_id)?;
                    }
                }
                TestItem::Group(group_id) => {
                    self.check_group(problem, report, opts, *group_id)?;
                }
            }
        }

        let res = report.errors() == errors_before;
        self.group(id).checked.set(Some(res));
        Ok(res)
    }

    fn check_root_layout(&self, report: &Report, who: &str, id: GroupId) -> Result<()> {
        let mut seen_secret = false;
        let mut seen_sample = false;
        for child in &self.group(id).children {
            match child {
                TestItem::Case(_) => {
                    report.error(who, "Can't have individual test data files at top level", None)?;
                }
                TestItem::Group(gid) => match self.group(*gid).name() {
                    "secret" => seen_secret = true,
                    "sample" => seen_sample = true,
                    _ => {
                        report.error(
                            who,
                            "Test data at top level can only have the groups sample and secret",
                            None,
                        )?;
                    }
                },
            }
        }
        if !seen_secret {
            report.error(who, "No secret data provided", None)?;
        }
        if !seen_sample {
            report.warning(who, "No sample data provided", None)?;
        }
        Ok(())
    }

    /// Byte-identical non-symlink inputs anywhere in the tree are almost
    /// always a copy-paste mistake; a deliberate duplicate should be a
    /// symlink alias instead.
    fn check_duplicate_inputs(
        &self,
        problem: &Problem,
        report: &Report,
        who: &str,
        id: GroupId,
    ) -> Result<()> {
        let mut hashes: HashMap<String, Vec<String>> = HashMap::new();
        for entry in walkdir::WalkDir::new(&self.group(id).datadir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if entry.file_type().is_file()
                && !entry.path_is_symlink()
                && path.extension().and_then(|e| e.to_str()) == Some("in")
            {
                let Ok(content) = fs::read(path) else { continue };
                let digest = hex::encode(Sha256::digest(&content));
                hashes
                    .entry(digest)
                    .or_default()
                    .push(super::relpath(path, &problem.probdir));
            }
        }
        let mut groups: Vec<&Vec<String>> = hashes.values().filter(|v| v.len() > 1).collect();
        groups.sort();
        for files in groups {
            report.warning(who, &format!("Identical input files: '{:?}'", files), None)?;
        }
        Ok(())
    }

    fn check_orphans(&self, report: &Report, who: &str, id: GroupId) -> Result<()> {
        let datadir = &self.group(id).datadir;
        let list = |ext: &str| -> Vec<PathBuf> {
            let pattern = format!("{}/*.{}", datadir.display(), ext);
            glob::glob(&pattern)
                .map(|paths| paths.filter_map(|p| p.ok()).filter(|p| !p.is_dir()).collect())
                .unwrap_or_default()
        };
        let infiles = list("in");
        let ansfiles = list("ans");
        for infile in &infiles {
            if !ansfiles.contains(&infile.with_extension("ans")) {
                report.error(
                    who,
                    &format!("No matching answer file for input '{}'", infile.display()),
                    None,
                )?;
            }
        }
        for ansfile in &ansfiles {
            if !infiles.contains(&ansfile.with_extension("in")) {
                report.error(
                    who,
                    &format!("No matching input file for answer '{}'", ansfile.display()),
                    None,
                )?;
            }
        }
        Ok(())
    }

    /// Run `sub` over the group's children and aggregate, producing the
    /// (primary, low, high) triple.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_group(
        &self,
        problem: &Problem,
        report: &Report,
        opts: &VerifyOptions,
        id: GroupId,
        sub: &Program,
        timelim: u64,
        timelim_low: u64,
        timelim_high: u64,
    ) -> Result<ResultTriple> {
        report.info(&format!("Running on {}", self.group(id).display()));

        let mut subres = Vec::new();
        let mut subres_low = Vec::new();
        let mut subres_high = Vec::new();
        // Short-circuit latches, reserved for grading policies that can
        // stop early; every child runs today.
        let (active, active_low) = (true, true);

        for child in &self.group(id).children {
            let triple = match child {
                TestItem::Case(case_id) => {
                    if !self.case(*case_id).matches_filter(&opts.data_filter) {
                        continue;
                    }
                    self.run_case(
                        problem, report, opts, *case_id, sub, timelim, timelim_low, timelim_high,
                    )?
                }
                TestItem::Group(group_id) => self.run_group(
                    problem, report, opts, *group_id, sub, timelim, timelim_low, timelim_high,
                )?,
            };
            let (res, res_low, res_high) = triple;
            subres_high.push(res_high);
            if active {
                subres.push(res);
            }
            if active_low {
                subres_low.push(res_low);
            }
        }

        let res = self.aggregate_results(problem, report, id, sub, &subres, false)?;
        report.info(&format!("Test group result: {}", res));

        Ok((
            res,
            self.aggregate_results(problem, report, id, sub, &subres_low, true)?,
            self.aggregate_results(problem, report, id, sub, &subres_high, true)?,
        ))
    }

    fn aggregate_results(
        &self,
        problem: &Problem,
        report: &Report,
        id: GroupId,
        sub: &Program,
        sub_results: &[SubmissionResult],
        shadow_result: bool,
    ) -> Result<SubmissionResult> {
        let _ = shadow_result;
        let group = self.group(id);
        let scoring = group.config.grading.as_ref().map(|g| g.aggregation);
        let res = aggregate(sub_results, scoring);

        if let (Some(score), Some(grading)) = (res.score, group.config.grading.as_ref()) {
            // Don't report twice on the same group; every submission is
            // likely to trip the same misconfiguration.
            if !(score <= grading.max_score) && !group.seen_oob_scores.get() {
                group.seen_oob_scores.set(true);
                report.error(
                    &group.display(),
                    &format!(
                        "submission {} got {} on group {}, which is more than the maximum score {}",
                        sub, res, group.rel_name, grading.max_score
                    ),
                    None,
                )?;
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(verdict: Verdict, score: f64, runtime: f64, name: &str) -> SubmissionResult {
        let mut res = SubmissionResult::new(verdict);
        res.score = Some(score);
        res.runtime = runtime;
        res.testcase = Some(name.to_string());
        res.runtime_testcase = Some(name.to_string());
        res.set_ac_runtime();
        res
    }

    #[test]
    fn min_group_with_one_wa_scores_zero() {
        let results = vec![
            leaf(Verdict::Ac, 5.0, 0.1, "a"),
            leaf(Verdict::Ac, 5.0, 0.2, "b"),
            leaf(Verdict::Wa, 0.0, 0.3, "c"),
        ];
        let res = aggregate(&results, Some(Aggregation::Min));
        assert_eq!(res.verdict, Verdict::Wa);
        assert_eq!(res.score, Some(0.0));
    }

    #[test]
    fn sum_group_grants_partial_credit() {
        let results = vec![
            leaf(Verdict::Ac, 5.0, 0.1, "a"),
            leaf(Verdict::Wa, 0.0, 0.2, "b"),
            leaf(Verdict::Ac, 5.0, 0.3, "c"),
        ];
        let res = aggregate(&results, Some(Aggregation::Sum));
        assert_eq!(res.verdict, Verdict::Ac);
        assert_eq!(res.score, Some(10.0));
    }

    #[test]
    fn sum_group_with_no_credit_inherits_first_verdict() {
        let results = vec![
            leaf(Verdict::Rte, 0.0, 0.1, "a"),
            leaf(Verdict::Wa, 0.0, 0.2, "b"),
        ];
        let res = aggregate(&results, Some(Aggregation::Sum));
        assert_eq!(res.verdict, Verdict::Rte);
        assert_eq!(res.score, Some(0.0));
    }

    #[test]
    fn pass_fail_takes_first_rejection() {
        let results = vec![
            leaf(Verdict::Ac, 0.0, 0.1, "a"),
            leaf(Verdict::Tle, 0.0, 0.2, "b"),
            leaf(Verdict::Wa, 0.0, 0.3, "c"),
        ];
        let res = aggregate(&results, None);
        assert_eq!(res.verdict, Verdict::Tle);
        assert_eq!(res.score, None);
    }

    #[test]
    fn empty_results_aggregate_to_ac() {
        let res = aggregate(&[], None);
        assert_eq!(res.verdict, Verdict::Ac);
        assert_eq!(res.runtime, -1.0);
    }

    #[test]
    fn judge_error_short_circuits_even_with_later_ac() {
        let mut je = leaf(Verdict::Je, 0.0, 0.2, "bad");
        je.reason = Some("validator crashed".to_string());
        let results = vec![je, leaf(Verdict::Ac, 5.0, 0.1, "good")];
        let res = aggregate(&results, Some(Aggregation::Sum));
        assert_eq!(res.verdict, Verdict::Je);
        assert_eq!(res.reason.as_deref(), Some("validator crashed"));
        assert_eq!(res.testcase.as_deref(), Some("bad"));
        // Runtime maxima still accumulated across all children
        assert_eq!(res.runtime, 0.2);
    }

    #[test]
    fn runtime_tiebreak_keeps_earlier_case() {
        let results = vec![
            leaf(Verdict::Ac, 1.0, 0.5, "first"),
            leaf(Verdict::Ac, 1.0, 0.5, "second"),
        ];
        let res = aggregate(&results, None);
        assert_eq!(res.runtime_testcase.as_deref(), Some("first"));
        assert_eq!(res.ac_runtime, 0.5);
    }

    #[test]
    fn sample_failures_concatenate() {
        let mut a = leaf(Verdict::Wa, 0.0, 0.1, "sample/1");
        a.sample_failures.push(leaf(Verdict::Wa, 0.0, 0.1, "sample/1"));
        let mut b = leaf(Verdict::Wa, 0.0, 0.2, "sample/2");
        b.sample_failures.push(leaf(Verdict::Wa, 0.0, 0.2, "sample/2"));
        let res = aggregate(&[a, b], None);
        assert_eq!(res.sample_failures.len(), 2);
    }
}
