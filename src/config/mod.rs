//! Package configuration: problem.yaml with format defaults

mod schema;

pub use schema::{
    Aggregation, Grading, GroupConfig, Limits, RawGrading, RawGroupYaml, RawProblemYaml,
};

use crate::report::Report;
use crate::runner::language;
use anyhow::{Context, Result};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const VALID_LICENSES: [&str; 7] = [
    "unknown",
    "public domain",
    "cc0",
    "cc by",
    "cc by-sa",
    "educational",
    "permission",
];

const ASPECT: &str = "problem configuration";

/// problem.yaml merged with format defaults, plus the derived validation
/// fields the rest of the verifier consumes.
pub struct ProblemConfig {
    configfile: PathBuf,
    found: bool,
    pub name: BTreeMap<String, String>,
    /// Raw `type` value; anything but `pass-fail`/`scoring` is an error.
    pub typ: String,
    pub author: String,
    pub source: String,
    pub source_url: String,
    pub license: String,
    pub rights_owner: String,
    pub validation: String,
    pub validation_type: String,
    pub validation_params: Vec<String>,
    pub custom_scoring: bool,
    pub validator_flags: String,
    pub languages: Vec<String>,
    pub libraries: String,
    pub limits: Limits,
    pub show_test_data_groups: Option<bool>,
    unknown_keys: Vec<String>,
    empty_keys: Vec<String>,
    checked: Cell<Option<bool>>,
}

impl ProblemConfig {
    /// Load and merge problem.yaml. `statement_names` are problem names
    /// extracted from the statement sources; they override the yaml.
    pub fn load(
        probdir: &Path,
        statement_names: &BTreeMap<String, String>,
        report: &Report,
    ) -> Result<ProblemConfig> {
        report.debug("  Loading problem config");
        let configfile = probdir.join("problem.yaml");
        let found = configfile.is_file();

        let mut raw = RawProblemYaml::default();
        let mut empty_keys = Vec::new();
        if found {
            let content = fs::read_to_string(&configfile)
                .with_context(|| format!("reading {}", configfile.display()))?;
            match serde_yaml::from_str::<serde_yaml::Value>(&content) {
                Ok(serde_yaml::Value::Null) => {}
                Ok(value) => {
                    if let Some(mapping) = value.as_mapping() {
                        for (key, val) in mapping {
                            if val.is_null() {
                                if let Some(key) = key.as_str() {
                                    empty_keys.push(key.to_string());
                                }
                            }
                        }
                    }
                    match serde_yaml::from_value::<RawProblemYaml>(value) {
                        Ok(parsed) => raw = parsed,
                        Err(e) => report.error(ASPECT, &e.to_string(), None)?,
                    }
                }
                Err(e) => report.error(ASPECT, &e.to_string(), None)?,
            }
        }

        let mut name = match raw.name {
            Some(serde_yaml::Value::String(s)) => {
                let mut map = BTreeMap::new();
                map.insert(String::new(), s);
                map
            }
            Some(serde_yaml::Value::Mapping(m)) => m
                .into_iter()
                .filter_map(|(k, v)| Some((k.as_str()?.to_string(), v.as_str()?.to_string())))
                .collect(),
            _ => BTreeMap::new(),
        };
        // Names found in the statement win over problem.yaml.
        for (lang, value) in statement_names {
            name.insert(lang.clone(), value.clone());
        }

        let license = raw
            .license
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        let author = raw.author.unwrap_or_default();
        let source = raw.source.unwrap_or_default();
        let rights_owner = match raw.rights_owner {
            Some(owner) => owner,
            // Fall back to author, then source, unless the problem is in
            // the public domain.
            None if license != "public domain" => {
                if !author.is_empty() {
                    author.clone()
                } else {
                    source.clone()
                }
            }
            None => String::new(),
        };

        let validation = raw.validation.unwrap_or_else(|| "default".to_string());
        let mut words = validation.split_whitespace();
        let validation_type = words.next().unwrap_or("").to_string();
        let validation_params: Vec<String> = words.map(str::to_string).collect();
        let custom_scoring = validation_params.iter().any(|p| p == "score");

        let languages = raw
            .languages
            .unwrap_or_else(|| "all".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(ProblemConfig {
            configfile,
            found,
            name,
            typ: raw.typ.unwrap_or_else(|| "pass-fail".to_string()),
            author,
            source,
            source_url: raw.source_url.unwrap_or_default(),
            license,
            rights_owner,
            validation,
            validation_type,
            validation_params,
            custom_scoring,
            validator_flags: raw.validator_flags.unwrap_or_default(),
            languages,
            libraries: raw.libraries.unwrap_or_default(),
            limits: raw.limits.unwrap_or_default(),
            show_test_data_groups: raw.grading.and_then(|g| g.show_test_data_groups),
            unknown_keys: raw.extra.keys().cloned().collect(),
            empty_keys,
            checked: Cell::new(None),
        })
    }

    pub fn is_scoring(&self) -> bool {
        self.typ == "scoring"
    }

    pub fn is_interactive(&self) -> bool {
        self.validation_params.iter().any(|p| p == "interactive")
    }

    pub fn uses_default_validation(&self) -> bool {
        self.validation_type == "default"
    }

    /// Validate the configuration. `has_custom_groups` reflects whether the
    /// test data tree has subgroups below sample/secret.
    pub fn check(&self, report: &Report, has_custom_groups: bool) -> Result<bool> {
        if let Some(res) = self.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();

        if !self.found {
            report.error(
                ASPECT,
                &format!("No config file {} found", self.configfile.display()),
                None,
            )?;
        }

        if self.name.is_empty() {
            report.error(ASPECT, "Mandatory field 'name' not provided", None)?;
        }

        for key in &self.unknown_keys {
            report.warning(
                ASPECT,
                &format!("Unknown field '{}' provided in problem.yaml", key),
                None,
            )?;
        }
        for key in &self.empty_keys {
            report.error(
                ASPECT,
                &format!("Field '{}' provided in problem.yaml but is empty", key),
                None,
            )?;
        }

        if self.typ != "pass-fail" && self.typ != "scoring" {
            report.error(
                ASPECT,
                &format!("Invalid value '{}' for type", self.typ),
                None,
            )?;
        }

        if self.license == "public domain" {
            if !self.rights_owner.trim().is_empty() {
                report.error(
                    ASPECT,
                    "Can not have a rights_owner for a problem in public domain",
                    None,
                )?;
            }
        } else if self.license != "unknown" && self.rights_owner.trim().is_empty() {
            report.error(ASPECT, "No author, source or rights_owner provided", None)?;
        }

        if !self.source_url.trim().is_empty() && self.source.trim().is_empty() {
            report.error(
                ASPECT,
                "Can not provide source_url without also providing source",
                None,
            )?;
        }

        if !VALID_LICENSES.contains(&self.license.as_str()) {
            report.error(
                ASPECT,
                &format!(
                    "Invalid value for license: {}.\n  Valid licenses are {:?}",
                    self.license, VALID_LICENSES
                ),
                None,
            )?;
        } else if self.license == "unknown" {
            report.warning(ASPECT, "License is 'unknown'", None)?;
        }

        if self.is_scoring() && has_custom_groups && self.show_test_data_groups.is_none() {
            report.warning(
                ASPECT,
                "Problem has custom test case groups, but does not specify a value for \
                 grading.show_test_data_groups; defaulting to false",
                None,
            )?;
        }

        if self.validation_type != "default" && self.validation_type != "custom" {
            report.error(
                ASPECT,
                &format!(
                    "Invalid value '{}' for validation, first word must be 'default' or 'custom'",
                    self.validation
                ),
                None,
            )?;
        }
        if self.validation_type == "default" && !self.validation_params.is_empty() {
            report.error(
                ASPECT,
                &format!("Invalid value '{}' for validation", self.validation),
                None,
            )?;
        }
        if self.validation_type == "custom" {
            for param in &self.validation_params {
                if param != "score" && param != "interactive" {
                    report.error(
                        ASPECT,
                        &format!("Invalid parameter '{}' for custom validation", param),
                        None,
                    )?;
                }
            }
        }

        for lang_id in &self.languages {
            if lang_id != "all" && !language::known(lang_id) {
                report.error(
                    ASPECT,
                    &format!("Unrecognized language id '{}'", lang_id),
                    None,
                )?;
            }
        }

        if !self.libraries.is_empty() {
            report.error(ASPECT, "Libraries not yet supported", None)?;
        }

        let res = report.errors() == errors_before;
        self.checked.set(Some(res));
        Ok(res)
    }
}

/// Read a testdata.yaml if present. A missing file is an empty config; a
/// malformed one is reported and treated as empty.
pub fn load_group_yaml(datadir: &Path, report: &Report, who: &str) -> Result<RawGroupYaml> {
    let configfile = datadir.join("testdata.yaml");
    if !configfile.is_file() {
        return Ok(RawGroupYaml::default());
    }
    let content = fs::read_to_string(&configfile)
        .with_context(|| format!("reading {}", configfile.display()))?;
    match serde_yaml::from_str::<RawGroupYaml>(&content) {
        Ok(raw) => Ok(raw),
        Err(e) => {
            report.error(who, &e.to_string(), None)?;
            Ok(RawGroupYaml::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load_from(yaml: &str) -> ProblemConfig {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("problem.yaml"), yaml).unwrap();
        ProblemConfig::load(dir.path(), &BTreeMap::new(), &Report::new()).unwrap()
    }

    #[test]
    fn validation_params_are_split() {
        let config = load_from("name: Test\nvalidation: custom interactive score\n");
        assert_eq!(config.validation_type, "custom");
        assert!(config.is_interactive());
        assert!(config.custom_scoring);
    }

    #[test]
    fn plain_name_becomes_default_language() {
        let config = load_from("name: A Problem\n");
        assert_eq!(config.name.get(""), Some(&"A Problem".to_string()));
    }

    #[test]
    fn rights_owner_falls_back_to_author() {
        let config = load_from("name: X\nauthor: Ada\nlicense: cc0\n");
        assert_eq!(config.rights_owner, "Ada");
    }

    #[test]
    fn public_domain_gets_no_rights_owner_fallback() {
        let config = load_from("name: X\nauthor: Ada\nlicense: public domain\n");
        assert_eq!(config.rights_owner, "");
    }

    #[test]
    fn unknown_and_empty_fields_are_flagged() {
        let report = Report::new();
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("problem.yaml"),
            "name: X\nfrobnicate: 1\nsource:\n",
        )
        .unwrap();
        let config = ProblemConfig::load(dir.path(), &BTreeMap::new(), &report).unwrap();
        config.check(&report, false).unwrap();
        assert!(config.unknown_keys.contains(&"frobnicate".to_string()));
        assert!(config.empty_keys.contains(&"source".to_string()));
        assert!(report.errors() >= 1);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let report = Report::new();
        let dir = TempDir::new().unwrap();
        let config = ProblemConfig::load(dir.path(), &BTreeMap::new(), &report).unwrap();
        assert!(!config.check(&report, false).unwrap());
        assert!(report.errors() >= 1);
    }

    #[test]
    fn check_is_idempotent() {
        let report = Report::new();
        let config = load_from("name: X\nlicense: cc0\nauthor: Ada\n");
        let first = config.check(&report, false).unwrap();
        let errors_after_first = report.errors();
        let second = config.check(&report, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(report.errors(), errors_after_first);
    }
}
