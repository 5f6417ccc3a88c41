//! Serde schemas for problem.yaml and testdata.yaml

use serde::Deserialize;
use std::collections::BTreeMap;

/// Resource and grading limits from the `limits` key of problem.yaml.
/// Missing fields fall back to the package-format defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub time_multiplier: f64,
    pub time_safety_margin: f64,
    /// MiB
    pub memory: u64,
    /// MiB
    pub output: f64,
    /// KiB
    pub code: u64,
    /// Seconds
    pub compilation_time: u64,
    /// Seconds
    pub validation_time: u64,
    /// MiB
    pub validation_memory: u64,
    /// MiB
    pub validation_output: f64,
    /// Seconds; overrides the 300 s seed of the time-limit inference loop.
    #[serde(rename = "time_for_AC_submissions")]
    pub time_for_ac_submissions: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            time_multiplier: 5.0,
            time_safety_margin: 2.0,
            memory: 2048,
            output: 8.0,
            code: 128,
            compilation_time: 600,
            validation_time: 60,
            validation_memory: 2048,
            validation_output: 8.0,
            time_for_ac_submissions: None,
            extra: BTreeMap::new(),
        }
    }
}

/// The `grading` key of problem.yaml (not of testdata.yaml).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProblemGrading {
    pub show_test_data_groups: Option<bool>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// problem.yaml as written by the package author, before defaults are
/// applied. Unknown keys land in `extra` for the unknown-field warning.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawProblemYaml {
    pub name: Option<serde_yaml::Value>,
    #[serde(rename = "type")]
    pub typ: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub license: Option<String>,
    pub rights_owner: Option<String>,
    pub keywords: Option<String>,
    pub uuid: Option<String>,
    pub validation: Option<String>,
    pub validator_flags: Option<String>,
    pub languages: Option<String>,
    pub libraries: Option<String>,
    pub limits: Option<Limits>,
    pub grading: Option<ProblemGrading>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// testdata.yaml as written, before inheritance and defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawGroupYaml {
    pub input_validator_flags: Option<String>,
    pub output_validator_flags: Option<String>,
    pub grading: Option<RawGrading>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RawGroupYaml {
    /// Child-overrides-parent merge: fields the child left out are taken
    /// from the parent's explicit config.
    pub fn inherit_from(&mut self, parent: &RawGroupYaml) {
        if self.input_validator_flags.is_none() {
            self.input_validator_flags = parent.input_validator_flags.clone();
        }
        if self.output_validator_flags.is_none() {
            self.output_validator_flags = parent.output_validator_flags.clone();
        }
        if self.grading.is_none() {
            self.grading = parent.grading.clone();
        }
    }
}

/// The `grading` key of testdata.yaml.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawGrading {
    pub score: Option<f64>,
    pub aggregation: Option<String>,
    pub max_score: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Fully resolved per-group configuration.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    pub input_validator_flags: String,
    pub output_validator_flags: String,
    /// Populated only for scoring problems.
    pub grading: Option<Grading>,
}

#[derive(Debug, Clone)]
pub struct Grading {
    /// Score contributed by each test case directly in this group.
    pub score: f64,
    pub aggregation: Aggregation,
    /// What the author actually wrote, kept for diagnostics.
    pub aggregation_raw: String,
    pub max_score: f64,
    /// True when max_score was written by the author rather than computed.
    pub max_score_explicit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Min,
}

impl Aggregation {
    pub fn parse(s: &str) -> Option<Aggregation> {
        match s {
            "sum" => Some(Aggregation::Sum),
            "min" => Some(Aggregation::Min),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_defaults_fill_missing_fields() {
        let limits: Limits = serde_yaml::from_str("memory: 1024").unwrap();
        assert_eq!(limits.memory, 1024);
        assert_eq!(limits.time_multiplier, 5.0);
        assert_eq!(limits.validation_time, 60);
    }

    #[test]
    fn group_yaml_captures_unknown_keys() {
        let raw: RawGroupYaml =
            serde_yaml::from_str("input_validator_flags: --strict\non_reject: break").unwrap();
        assert_eq!(raw.input_validator_flags.as_deref(), Some("--strict"));
        assert!(raw.extra.contains_key("on_reject"));
    }

    #[test]
    fn group_inheritance_is_child_overrides() {
        let parent: RawGroupYaml =
            serde_yaml::from_str("input_validator_flags: parental\ngrading: {score: 5}").unwrap();
        let mut child: RawGroupYaml = serde_yaml::from_str("input_validator_flags: own").unwrap();
        child.inherit_from(&parent);
        assert_eq!(child.input_validator_flags.as_deref(), Some("own"));
        assert_eq!(child.grading.as_ref().unwrap().score, Some(5.0));
    }

    #[test]
    fn aggregation_parse_rejects_unknown() {
        assert_eq!(Aggregation::parse("sum"), Some(Aggregation::Sum));
        assert_eq!(Aggregation::parse("min"), Some(Aggregation::Min));
        assert_eq!(Aggregation::parse("avg"), None);
    }

    #[test]
    fn time_for_ac_submissions_uses_yaml_spelling() {
        let limits: Limits = serde_yaml::from_str("time_for_AC_submissions: 7").unwrap();
        assert_eq!(limits.time_for_ac_submissions, Some(7));
    }
}
