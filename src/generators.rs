//! generators.yaml structure validation
//!
//! Validates the declarative generator manifest: directory/testcase
//! nesting, the data-directory whitelist, and `{seed}`/`{name}`
//! substitutions in commands. Compiling or running generators is the job
//! of external tooling.

use crate::report::Report;
use anyhow::{Context, Result};
use serde_yaml::Value;
use std::cell::Cell;
use std::fs;
use std::path::Path;

const ASPECT: &str = "generators";
const DATA_DIRECTORIES: [&str; 2] = ["sample", "secret"];

pub struct Generators {
    data: Option<Value>,
    checked: Cell<Option<bool>>,
}

/// Check the `{...}` substitutions in a generator command: braces must
/// pair up, and a group must be `name` or start with `seed`.
pub(crate) fn command_substitutions_ok(command: &str) -> bool {
    if command.split_whitespace().next().is_none() {
        return false;
    }
    for part in command.split_whitespace() {
        for (idx, group) in part.split('{').enumerate() {
            let closers = group.matches('}').count();
            if idx == 0 {
                if closers != 0 {
                    return false;
                }
                continue;
            }
            if closers != 1 {
                return false;
            }
            let inner = group.split('}').next().unwrap_or("");
            if inner != "name" && !inner.starts_with("seed") {
                return false;
            }
        }
    }
    true
}

impl Generators {
    pub fn load(probdir: &Path, report: &Report) -> Result<Generators> {
        report.debug("  Loading generators");
        let configfile = probdir.join("generators").join("generators.yaml");
        let mut data = None;
        if configfile.is_file() {
            let content = fs::read_to_string(&configfile)
                .with_context(|| format!("reading {}", configfile.display()))?;
            match serde_yaml::from_str::<Value>(&content) {
                Ok(Value::Null) => data = Some(Value::Mapping(Default::default())),
                Ok(value) => data = Some(value),
                Err(e) => report.error(ASPECT, &e.to_string(), None)?,
            }
        }
        Ok(Generators {
            data,
            checked: Cell::new(None),
        })
    }

    pub fn check(&self, report: &Report) -> Result<bool> {
        if let Some(res) = self.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();

        if let Some(data) = &self.data {
            if data.is_mapping() {
                if let Some(generators) = data.get("generators") {
                    if !generators.is_mapping() && !generators.is_null() {
                        report.error(
                            ASPECT,
                            "Generators key in generators.yaml must specify a dict",
                            None,
                        )?;
                    }
                }
                let data_key = data.get("data");
                if matches!(data_key, Some(Value::Sequence(_))) {
                    report.error(
                        ASPECT,
                        "Top-level data key in generators.yaml must specify a dict",
                        None,
                    )?;
                } else if let Some(Value::Mapping(entries)) = data_key {
                    for (key, value) in entries {
                        let key_str = key.as_str().unwrap_or("");
                        if !DATA_DIRECTORIES.contains(&key_str) {
                            report.warning(
                                ASPECT,
                                &format!(
                                    "Invalid key '{}' in generators.yaml, expected one of {:?}",
                                    key_str, DATA_DIRECTORIES
                                ),
                                None,
                            )?;
                        } else if !value.is_mapping() {
                            report.warning(
                                ASPECT,
                                &format!("Key '{}' in generators.yaml must specify a dict", key_str),
                                None,
                            )?;
                        } else if value.get("type").and_then(Value::as_str) != Some("directory") {
                            report.warning(
                                ASPECT,
                                &format!(
                                    "Type of {} in generators.yaml must be 'directory'",
                                    key_str
                                ),
                                None,
                            )?;
                        } else {
                            self.check_directory(report, value, &format!("data/{}", key_str))?;
                        }
                    }
                }
            } else {
                report.error(ASPECT, "generators.yaml must specify a dict", None)?;
            }
        }

        let res = report.errors() == errors_before;
        self.checked.set(Some(res));
        Ok(res)
    }

    fn check_element(&self, report: &Report, element: &Value, path: &str) -> Result<()> {
        // A null entry is a manually provided testcase; a string is an
        // input-generating command.
        match element {
            Value::Null => Ok(()),
            Value::String(command) => self.check_command(report, command, path, "input"),
            Value::Mapping(_) => {
                let typ = element
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("testcase");
                if typ == "testcase" {
                    if element.get("input").is_none() {
                        report.error(
                            ASPECT,
                            &format!("Path {} in generators.yaml must contain an input key", path),
                            None,
                        )?;
                    }
                    for key in ["input", "solution", "visualizer"] {
                        if let Some(Value::String(command)) = element.get(key) {
                            self.check_command(report, command, path, key)?;
                        }
                    }
                    Ok(())
                } else if typ == "directory" {
                    self.check_directory(report, element, path)
                } else {
                    report.error(
                        ASPECT,
                        &format!("Type of {} in generators.yaml must be 'directory'", path),
                        None,
                    )?;
                    Ok(())
                }
            }
            _ => {
                report.error(
                    ASPECT,
                    &format!("Path {} in generators.yaml must specify a dict", path),
                    None,
                )?;
                Ok(())
            }
        }
    }

    fn check_directory(&self, report: &Report, directory: &Value, path: &str) -> Result<()> {
        let Some(cases) = directory.get("data") else {
            return Ok(());
        };
        match cases {
            // Ordered cases: a list of single-entry dicts, numbered on
            // output; unordered: one dict of named cases.
            Value::Sequence(entries) => {
                for entry in entries {
                    let Some(map) = entry.as_mapping() else {
                        report.error(
                            ASPECT,
                            &format!(
                                "Path {}/data in generators.yaml must contain a dict \
                                 or a list of dicts",
                                path
                            ),
                            None,
                        )?;
                        continue;
                    };
                    for (name, value) in map {
                        let name = name.as_str().unwrap_or("");
                        self.check_element(report, value, &format!("{}/{}", path, name))?;
                    }
                }
                Ok(())
            }
            Value::Mapping(map) => {
                for (name, value) in map {
                    let name = name.as_str().unwrap_or("");
                    self.check_element(report, value, &format!("{}/{}", path, name))?;
                }
                Ok(())
            }
            _ => {
                report.error(
                    ASPECT,
                    &format!(
                        "Path {}/data in generators.yaml must contain a dict or a list of dicts",
                        path
                    ),
                    None,
                )?;
                Ok(())
            }
        }
    }

    fn check_command(&self, report: &Report, command: &str, path: &str, key: &str) -> Result<()> {
        if !command_substitutions_ok(command) {
            report.error(
                ASPECT,
                &format!("Invalid {} key for path {} in generators.yaml", key, path),
                None,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn check_yaml(yaml: &str) -> (u32, u32) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("generators")).unwrap();
        fs::write(dir.path().join("generators/generators.yaml"), yaml).unwrap();
        let report = Report::new();
        let generators = Generators::load(dir.path(), &report).unwrap();
        generators.check(&report).unwrap();
        (report.errors(), report.warnings())
    }

    #[test]
    fn command_substitution_rules() {
        assert!(command_substitutions_ok("gen 10 {seed}"));
        assert!(command_substitutions_ok("gen {seed:2} {name}"));
        assert!(!command_substitutions_ok("gen {bogus}"));
        assert!(!command_substitutions_ok("gen {seed"));
        assert!(!command_substitutions_ok("gen seed}"));
        assert!(!command_substitutions_ok(""));
    }

    #[test]
    fn well_formed_manifest_passes() {
        let (errors, warnings) = check_yaml(
            "generators:\n  gen: gen.py\ndata:\n  secret:\n    type: directory\n    data:\n      - one: gen 1 {seed}\n      - two: gen 2 {seed}\n",
        );
        assert_eq!(errors, 0);
        assert_eq!(warnings, 0);
    }

    #[test]
    fn unknown_data_directory_warns() {
        let (_, warnings) =
            check_yaml("data:\n  bonus:\n    type: directory\n    data: {}\n");
        assert!(warnings >= 1);
    }

    #[test]
    fn testcase_without_input_errors() {
        let (errors, _) = check_yaml(
            "data:\n  secret:\n    type: directory\n    data:\n      one:\n        type: testcase\n        solution: sol.py\n",
        );
        assert!(errors >= 1);
    }

    #[test]
    fn top_level_list_data_errors() {
        let (errors, _) = check_yaml("data:\n  - secret\n");
        assert!(errors >= 1);
    }

    #[test]
    fn missing_manifest_is_fine() {
        let dir = TempDir::new().unwrap();
        let report = Report::new();
        let generators = Generators::load(dir.path(), &report).unwrap();
        assert!(generators.check(&report).unwrap());
        assert_eq!(report.errors(), 0);
    }
}
