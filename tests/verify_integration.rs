//! Full-pipeline tests against synthetic packages built on disk

mod common;

use common::{strict_input_validator, verify, verify_with, PackageBuilder, CMP_OUTPUT_VALIDATOR};
use gavel::{Part, VerifyOptions};
use tempfile::TempDir;

const PASS_FAIL_YAML: &str =
    "name: Test\ntype: pass-fail\nvalidation: custom\nlicense: cc0\nauthor: Ada\n";

fn clean_pass_fail(parent: &std::path::Path) -> PackageBuilder {
    let pkg = PackageBuilder::new(parent, "addition");
    pkg.problem_yaml(PASS_FAIL_YAML)
        .statement("Addition")
        .input_validator("validate.sh", &strict_input_validator(&["1\n", "2\n"]))
        .output_validator("compare.sh", CMP_OUTPUT_VALIDATOR)
        .case("sample/1", "1\n", "1\n")
        .case("secret/1", "2\n", "2\n")
        .submission("accepted/echo.sh", "echo.sh", "cat\n");
    pkg
}

#[test]
fn clean_package_verifies_without_diagnostics() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    assert_eq!(verify(pkg.path()), (0, 0));
}

#[test]
fn mislabeled_accepted_submission_is_an_error() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    pkg.submission("accepted/broken.sh", "broken.sh", "echo nope\n");
    let (errors, _) = verify(pkg.path());
    assert!(errors >= 1, "expected an error, got {}", errors);
}

#[test]
fn wrong_answer_label_matches_wrong_output() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    pkg.submission("wrong_answer/bad.sh", "bad.sh", "echo nope\n");
    assert_eq!(verify(pkg.path()), (0, 0));
}

#[test]
fn accept_everything_validator_trips_the_fuzzer() {
    let dir = TempDir::new().unwrap();
    let pkg = PackageBuilder::new(dir.path(), "lax");
    pkg.problem_yaml(PASS_FAIL_YAML)
        .statement("Lax")
        .input_validator("validate.sh", "exit 42\n")
        .output_validator("compare.sh", CMP_OUTPUT_VALIDATOR)
        .case("sample/1", "1\n", "1\n")
        .case("secret/1", "2\n", "2\n")
        .submission("accepted/echo.sh", "echo.sh", "cat\n");
    let (errors, warnings) = verify(pkg.path());
    assert_eq!(errors, 0);
    // Four junk kinds, plus the four applicable mutations (no decimals in
    // the inputs, so trailing zeros never applies).
    assert_eq!(warnings, 8, "unexpected warning count {}", warnings);
}

#[test]
fn symlink_alias_package_is_valid_and_repeatable() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    pkg.alias_case("secret/2", "1");
    let first = verify(pkg.path());
    assert_eq!(first, (0, 0));
    // A fresh load over the unchanged package reproduces the counts.
    assert_eq!(verify(pkg.path()), first);
}

#[test]
fn alias_without_answer_link_is_an_error() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    let base = pkg.path().join("data/secret/2");
    std::os::unix::fs::symlink("1.in", base.with_extension("in")).unwrap();
    std::fs::write(base.with_extension("ans"), "2\n").unwrap();
    let (errors, _) = verify(pkg.path());
    assert!(errors >= 1);
}

#[test]
fn alias_with_mismatched_validator_flags_is_an_error() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    pkg.testdata_yaml("secret/strict", "output_validator_flags: case_sensitive\n")
        .case("secret/strict/3", "2\n", "2\n");
    let base = pkg.path().join("data/secret/strict/4");
    std::os::unix::fs::symlink("../1.in", base.with_extension("in")).unwrap();
    std::os::unix::fs::symlink("../1.ans", base.with_extension("ans")).unwrap();
    let (errors, _) = verify(pkg.path());
    assert!(errors >= 1);
}

#[test]
fn missing_secret_group_is_an_error() {
    let dir = TempDir::new().unwrap();
    let pkg = PackageBuilder::new(dir.path(), "nosecret");
    pkg.problem_yaml(PASS_FAIL_YAML)
        .statement("No Secret")
        .input_validator("validate.sh", &strict_input_validator(&["1\n"]))
        .output_validator("compare.sh", CMP_OUTPUT_VALIDATOR)
        .case("sample/1", "1\n", "1\n");
    let opts = VerifyOptions {
        parts: vec![Part::Data],
        ..Default::default()
    };
    let (errors, _) = verify_with(pkg.path(), &opts);
    assert!(errors >= 1);
}

#[test]
fn natural_sort_regression_warns() {
    let dir = TempDir::new().unwrap();
    let pkg = PackageBuilder::new(dir.path(), "order");
    pkg.problem_yaml(PASS_FAIL_YAML)
        .statement("Order")
        .input_validator("validate.sh", &strict_input_validator(&["1\n"]))
        .output_validator("compare.sh", CMP_OUTPUT_VALIDATOR)
        .case("sample/1", "1\n", "1\n")
        .case("secret/g10/a", "1\n", "1\n")
        .case("secret/g9/a", "1\n", "1\n");
    let opts = VerifyOptions {
        parts: vec![Part::Data],
        ..Default::default()
    };
    let (_, warnings) = verify_with(pkg.path(), &opts);
    assert!(warnings >= 1, "expected the zero-padding warning");
}

#[test]
fn duplicate_inputs_warn() {
    let dir = TempDir::new().unwrap();
    let pkg = PackageBuilder::new(dir.path(), "dup");
    pkg.problem_yaml(PASS_FAIL_YAML)
        .statement("Dup")
        .input_validator("validate.sh", &strict_input_validator(&["1\n"]))
        .output_validator("compare.sh", CMP_OUTPUT_VALIDATOR)
        .case("sample/1", "1\n", "1\n")
        .case("secret/1", "1\n", "1\n");
    let opts = VerifyOptions {
        parts: vec![Part::Data],
        ..Default::default()
    };
    let (_, warnings) = verify_with(pkg.path(), &opts);
    assert!(warnings >= 1, "expected the identical-inputs warning");
}

#[test]
fn scoring_package_with_all_three_labels() {
    let dir = TempDir::new().unwrap();
    let pkg = PackageBuilder::new(dir.path(), "scored");
    pkg.problem_yaml(
        "name: Scored\ntype: scoring\nvalidation: custom\nlicense: cc0\nauthor: Ada\n",
    )
    .statement("Scored")
    .input_validator("validate.sh", &strict_input_validator(&["1\n", "2\n"]))
    .output_validator("compare.sh", CMP_OUTPUT_VALIDATOR)
    .case("sample/s", "1\n", "one\n")
    .case("secret/a", "1\n", "one\n")
    .case("secret/b", "2\n", "two\n")
    .submission(
        "accepted/full.sh",
        "full.sh",
        "input=$(cat)\nif [ \"$input\" = \"1\" ]; then echo one; else echo two; fi\n",
    )
    .submission(
        "partially_accepted/half.sh",
        "half.sh",
        "input=$(cat)\nif [ \"$input\" = \"1\" ]; then echo one; else echo wrong; fi\n",
    )
    .submission("wrong_answer/none.sh", "none.sh", "echo garbage\n");
    assert_eq!(verify(pkg.path()), (0, 0));
}

#[test]
fn partial_submission_with_full_score_warns() {
    let dir = TempDir::new().unwrap();
    let pkg = PackageBuilder::new(dir.path(), "generous");
    pkg.problem_yaml(
        "name: Generous\ntype: scoring\nvalidation: custom\nlicense: cc0\nauthor: Ada\n",
    )
    .statement("Generous")
    .input_validator("validate.sh", &strict_input_validator(&["1\n"]))
    .output_validator("compare.sh", CMP_OUTPUT_VALIDATOR)
    .case("sample/s", "1\n", "one\n")
    .case("secret/a", "1\n", "one\n")
    .submission("accepted/full.sh", "full.sh", "echo one\n")
    .submission("partially_accepted/also.sh", "also.sh", "echo one\n");
    let (errors, warnings) = verify(pkg.path());
    assert_eq!(errors, 0);
    assert!(warnings >= 1, "full-scoring partial submission should warn");
}

#[test]
fn grading_key_on_pass_fail_problem_is_an_error() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    pkg.testdata_yaml("secret", "grading: {score: 5}\n");
    let opts = VerifyOptions {
        parts: vec![Part::Data],
        ..Default::default()
    };
    let (errors, _) = verify_with(pkg.path(), &opts);
    assert!(errors >= 1);
}

#[test]
fn data_filter_limits_the_cases_run() {
    let dir = TempDir::new().unwrap();
    let pkg = clean_pass_fail(dir.path());
    // This submission is wrong only on secret data, which the filter skips.
    pkg.submission("accepted/sampleonly.sh", "sampleonly.sh", "echo 1\n");
    let opts = VerifyOptions {
        data_filter: regex::Regex::new("^sample/").unwrap(),
        ..Default::default()
    };
    let (errors, _) = verify_with(pkg.path(), &opts);
    assert_eq!(errors, 0);
}
