//! Problem statement discovery and name extraction
//!
//! Rendering to PDF/HTML belongs to external tooling; here we only find
//! the statement sources and pull the problem name out of them.

use crate::report::Report;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const ASPECT: &str = "problem statement";

static PROBLEMNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\problemname\{(.*)\}").unwrap());
static PLAIN_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^%%\s*plainproblemname:(.*)$").unwrap());

/// The statement sources: `problem.tex` (language "") and/or
/// `problem.xx.tex` per translation.
pub struct ProblemStatement {
    statement_dir: PathBuf,
    pub languages: Vec<String>,
    checked: Cell<Option<bool>>,
}

impl ProblemStatement {
    pub fn load(probdir: &Path, report: &Report) -> ProblemStatement {
        report.debug("  Loading problem statement");
        let statement_dir = probdir.join("problem_statement");
        let mut languages = Vec::new();
        if statement_dir.join("problem.tex").is_file() {
            languages.push(String::new());
        }
        let pattern = format!("{}/problem.[a-z][a-z].tex", statement_dir.display());
        if let Ok(paths) = glob::glob(&pattern) {
            for path in paths.filter_map(|p| p.ok()) {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    // problem.<lang>.tex
                    languages.push(name[8..10].to_string());
                }
            }
        }
        languages.sort();
        ProblemStatement {
            statement_dir,
            languages,
            checked: Cell::new(None),
        }
    }

    pub fn check(&self, report: &Report) -> Result<bool> {
        if let Some(res) = self.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();

        if self.languages.is_empty() {
            report.error(
                ASPECT,
                "No problem statements found (expected problem.tex or \
                 problem.[a-z][a-z].tex in problem_statement directory)",
                None,
            )?;
        }
        if self.languages.contains(&String::new()) && self.languages.contains(&"en".to_string()) {
            report.error(ASPECT, "Can't supply both problem.tex and problem.en.tex", None)?;
        }

        let res = report.errors() == errors_before;
        self.checked.set(Some(res));
        Ok(res)
    }

    /// Problem names declared in the statement sources, per language.
    pub fn get_config(&self) -> BTreeMap<String, String> {
        let mut names = BTreeMap::new();
        for lang in &self.languages {
            let filename = if lang.is_empty() {
                "problem.tex".to_string()
            } else {
                format!("problem.{}.tex", lang)
            };
            let Ok(stmt) = fs::read_to_string(self.statement_dir.join(filename)) else {
                continue;
            };
            for re in [&*PROBLEMNAME_RE, &*PLAIN_NAME_RE] {
                if let Some(hit) = re.captures(&stmt) {
                    names.insert(lang.clone(), hit[1].trim().to_string());
                    break;
                }
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn statement_with(files: &[(&str, &str)]) -> (TempDir, ProblemStatement) {
        let dir = TempDir::new().unwrap();
        let stmt_dir = dir.path().join("problem_statement");
        fs::create_dir(&stmt_dir).unwrap();
        for (name, content) in files {
            fs::write(stmt_dir.join(name), content).unwrap();
        }
        let statement = ProblemStatement::load(dir.path(), &Report::new());
        (dir, statement)
    }

    #[test]
    fn finds_default_and_translated_statements() {
        let (_dir, stmt) = statement_with(&[
            ("problem.tex", "\\problemname{Adding}"),
            ("problem.sv.tex", "\\problemname{Addition}"),
        ]);
        assert_eq!(stmt.languages, vec!["".to_string(), "sv".to_string()]);
        let names = stmt.get_config();
        assert_eq!(names.get(""), Some(&"Adding".to_string()));
        assert_eq!(names.get("sv"), Some(&"Addition".to_string()));
    }

    #[test]
    fn plain_name_comment_is_recognized() {
        let (_dir, stmt) = statement_with(&[("problem.tex", "%% plainproblemname: Plain Name\n")]);
        assert_eq!(stmt.get_config().get(""), Some(&"Plain Name".to_string()));
    }

    #[test]
    fn missing_statement_is_an_error() {
        let dir = TempDir::new().unwrap();
        let stmt = ProblemStatement::load(dir.path(), &Report::new());
        let report = Report::new();
        assert!(!stmt.check(&report).unwrap());
        assert_eq!(report.errors(), 1);
    }

    #[test]
    fn default_and_english_conflict() {
        let (_dir, stmt) = statement_with(&[
            ("problem.tex", "\\problemname{X}"),
            ("problem.en.tex", "\\problemname{X}"),
        ]);
        let report = Report::new();
        assert!(!stmt.check(&report).unwrap());
    }
}
