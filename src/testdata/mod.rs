//! The test data tree: groups, cases, and their verification
//!
//! `TestCase`, `TestGroup`, and the problem environment reference each
//! other, so the tree lives in an arena indexed by `CaseId`/`GroupId`,
//! with the `TestData` value as the owner. Mutable per-node state (result
//! caches, diagnostic latches) uses interior mutability; everything else
//! is immutable after load.

pub mod case;
pub mod group;
pub mod natsort;

pub use case::{CacheKey, ResultTriple, TestCase};
pub use group::TestGroup;

use crate::config::{self, Aggregation, Grading, GroupConfig, ProblemConfig, RawGroupYaml};
use crate::report::Report;
use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub usize);

#[derive(Debug, Clone, Copy)]
pub enum TestItem {
    Case(CaseId),
    Group(GroupId),
}

/// Arena owner for the test data tree rooted at `<probdir>/data`.
pub struct TestData {
    groups: Vec<TestGroup>,
    cases: Vec<TestCase>,
    pub root: GroupId,
    /// Index from (unresolved) input path to its case, used to resolve
    /// symlink reuse aliases.
    by_infile: HashMap<PathBuf, CaseId>,
}

struct Loader<'a> {
    probdir: &'a Path,
    config: &'a ProblemConfig,
    report: &'a Report,
    groups: Vec<TestGroup>,
    cases: Vec<TestCase>,
    by_infile: HashMap<PathBuf, CaseId>,
}

impl TestData {
    pub fn load(probdir: &Path, config: &ProblemConfig, report: &Report) -> Result<TestData> {
        let mut loader = Loader {
            probdir,
            config,
            report,
            groups: Vec::new(),
            cases: Vec::new(),
            by_infile: HashMap::new(),
        };
        let root = loader.load_group(probdir.join("data"), None)?;
        let mut data = TestData {
            groups: loader.groups,
            cases: loader.cases,
            root,
            by_infile: loader.by_infile,
        };
        data.resolve_symlinks();
        Ok(data)
    }

    pub fn group(&self, id: GroupId) -> &TestGroup {
        &self.groups[id.0]
    }

    pub fn case(&self, id: CaseId) -> &TestCase {
        &self.cases[id.0]
    }

    pub fn case_ids(&self) -> impl Iterator<Item = CaseId> {
        (0..self.cases.len()).map(CaseId)
    }

    /// All test cases under `group`, in directory-sorted order.
    pub fn all_cases(&self, group: GroupId) -> Vec<CaseId> {
        let mut out = Vec::new();
        self.collect_cases(group, &mut out);
        out
    }

    fn collect_cases(&self, group: GroupId, out: &mut Vec<CaseId>) {
        for child in &self.group(group).children {
            match child {
                TestItem::Case(id) => out.push(*id),
                TestItem::Group(id) => self.collect_cases(*id, out),
            }
        }
    }

    pub fn subgroups(&self, group: GroupId) -> Vec<GroupId> {
        self.group(group)
            .children
            .iter()
            .filter_map(|c| match c {
                TestItem::Group(id) => Some(*id),
                TestItem::Case(_) => None,
            })
            .collect()
    }

    fn direct_cases(&self, group: GroupId) -> usize {
        self.group(group)
            .children
            .iter()
            .filter(|c| matches!(c, TestItem::Case(_)))
            .count()
    }

    /// Whether any group below sample/secret has subgroups of its own.
    pub fn has_custom_groups(&self) -> bool {
        self.subgroups(self.root)
            .iter()
            .any(|g| !self.subgroups(*g).is_empty())
    }

    /// The root group's max score; infinite when it cannot be bounded.
    pub fn max_score(&self) -> f64 {
        self.group(self.root)
            .config
            .grading
            .as_ref()
            .map(|g| g.max_score)
            .unwrap_or(f64::INFINITY)
    }

    /// Every distinct input-validator flag string used by a group that
    /// directly contains test cases.
    pub fn input_validator_flag_sets(&self) -> BTreeSet<String> {
        let mut flags = BTreeSet::new();
        for (idx, group) in self.groups.iter().enumerate() {
            if self.direct_cases(GroupId(idx)) > 0 {
                flags.insert(group.config.input_validator_flags.clone());
            }
        }
        flags
    }

    fn resolve_symlinks(&mut self) {
        let mut targets: Vec<Option<CaseId>> = vec![None; self.cases.len()];
        for (idx, case) in self.cases.iter().enumerate() {
            if !case.infile.is_symlink() {
                continue;
            }
            if let Ok(target) = fs::canonicalize(&case.infile) {
                targets[idx] = self.by_infile.get(&target).copied();
            }
        }
        for (idx, target) in targets.into_iter().enumerate() {
            // Self-aliases would make result lookup recurse forever.
            if target != Some(CaseId(idx)) {
                self.cases[idx].reuse_result_from = target;
            }
        }
    }
}

impl<'a> Loader<'a> {
    fn load_group(&mut self, datadir: PathBuf, parent: Option<GroupId>) -> Result<GroupId> {
        let rel_name = relpath(&datadir, self.probdir);
        self.report
            .debug(&format!("  Loading test data group {}", datadir.display()));

        let mut raw = if datadir.is_dir() {
            config::load_group_yaml(&datadir, self.report, &format!("test case group {}", rel_name))?
        } else {
            RawGroupYaml::default()
        };
        if let Some(parent) = parent {
            let parent_raw = self.groups[parent.0].raw.clone();
            raw.inherit_from(&parent_raw);
        }

        let id = GroupId(self.groups.len());
        self.groups.push(TestGroup::placeholder(
            datadir.clone(),
            rel_name,
            parent,
            raw,
        ));

        let mut children = Vec::new();
        if datadir.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(&datadir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .collect();
            entries.sort();
            for path in entries {
                if path.is_dir() {
                    let child = self.load_group(path, Some(id))?;
                    children.push(TestItem::Group(child));
                } else if path.extension().and_then(|e| e.to_str()) == Some("ans") {
                    let base = path.with_extension("");
                    if base.with_extension("in").is_file() {
                        children.push(TestItem::Case(self.add_case(base, id)));
                    }
                }
            }
        }

        self.groups[id.0].children = children;
        self.resolve_config(id);
        Ok(id)
    }

    fn add_case(&mut self, base: PathBuf, group: GroupId) -> CaseId {
        let id = CaseId(self.cases.len());
        let case = TestCase {
            infile: base.with_extension("in"),
            ansfile: base.with_extension("ans"),
            rel_base: relpath(&base, &self.probdir.join("data")),
            base,
            group,
            reuse_result_from: None,
            cache: RefCell::new(None),
            checked: Cell::new(None),
        };
        self.by_infile.insert(case.infile.clone(), id);
        self.cases.push(case);
        id
    }

    /// Apply position-dependent grading defaults and compute max scores.
    /// Children are fully resolved by the time their parent gets here.
    fn resolve_config(&mut self, id: GroupId) {
        let group = &self.groups[id.0];
        let raw = group.raw.clone();
        let is_root = group.parent.is_none();
        let parent_is_root = group
            .parent
            .map(|p| self.groups[p.0].parent.is_none())
            .unwrap_or(false);
        let name = group.name().to_string();
        let is_sample = parent_is_root && name == "sample";
        let is_secret = parent_is_root && name == "secret";

        let grading = if self.config.is_scoring() {
            let raw_grading = raw.grading.clone().unwrap_or_default();
            let (default_score, default_aggregation) = if is_root || is_secret {
                (1.0, "sum")
            } else if is_sample {
                (0.0, "sum")
            } else {
                (1.0, "min")
            };
            let score = raw_grading.score.unwrap_or(default_score);
            let aggregation_raw = raw_grading
                .aggregation
                .clone()
                .unwrap_or_else(|| default_aggregation.to_string());
            let aggregation = Aggregation::parse(&aggregation_raw).unwrap_or(Aggregation::Sum);

            let direct_cases = self.groups[id.0]
                .children
                .iter()
                .filter(|c| matches!(c, TestItem::Case(_)))
                .count();
            let child_max_scores: Vec<f64> = self.groups[id.0]
                .children
                .iter()
                .filter_map(|c| match c {
                    TestItem::Group(g) => Some(
                        self.groups[g.0]
                            .config
                            .grading
                            .as_ref()
                            .map(|gr| gr.max_score)
                            .unwrap_or(0.0),
                    ),
                    TestItem::Case(_) => None,
                })
                .collect();
            let computed = compute_max_score(score, direct_cases, &child_max_scores, aggregation);
            self.groups[id.0].computed_max_score = Some(computed);

            Some(Grading {
                score,
                aggregation,
                aggregation_raw,
                max_score: raw_grading.max_score.unwrap_or(computed),
                max_score_explicit: raw_grading.max_score.is_some(),
            })
        } else {
            None
        };

        self.groups[id.0].config = GroupConfig {
            input_validator_flags: raw.input_validator_flags.clone().unwrap_or_default(),
            output_validator_flags: raw.output_validator_flags.clone().unwrap_or_default(),
            grading,
        };
    }
}

/// Best score reachable in a group: per-case scores and child group max
/// scores folded under the group's aggregation.
fn compute_max_score(
    score: f64,
    direct_cases: usize,
    child_max_scores: &[f64],
    aggregation: Aggregation,
) -> f64 {
    match aggregation {
        Aggregation::Sum => score * direct_cases as f64 + child_max_scores.iter().sum::<f64>(),
        Aggregation::Min => {
            let mut best = f64::INFINITY;
            if direct_cases > 0 {
                best = best.min(score);
            }
            for child in child_max_scores {
                best = best.min(*child);
            }
            best
        }
    }
}

pub(crate) fn relpath(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
