//! Interactive problems driven through a canned arbiter
//!
//! The arbiter is faked with a script that emits prebaked status lines, so
//! the verdict precedence and the WA-before-TLE override are exercised
//! end to end without a real bidirectional session.

mod common;

use common::{strict_input_validator, verify, PackageBuilder, CMP_OUTPUT_VALIDATOR};
use std::fs;
use tempfile::TempDir;

/// Status lines: exit code 42 is wait status 10752, 43 is 11008.
/// The accepted run finishes in 0.5 s; the wrong-answer run sees the
/// validator exit first with WA while the submission burns 4.5 s.
const FAKE_ARBITER: &str = r#"case "$*" in
  *wa.sh*) echo "11008 0.01 0 4.50 validator" ;;
  *) echo "10752 0.01 0 0.50 submission" ;;
esac
"#;

#[test]
fn interactive_wa_from_validator_first_beats_tle() {
    let dir = TempDir::new().unwrap();
    let arbiter = dir.path().join("fake_interactive.sh");
    fs::write(&arbiter, FAKE_ARBITER).unwrap();
    std::env::set_var(
        "GAVEL_TOOL_INTERACTIVE",
        format!("sh {}", arbiter.display()),
    );

    let pkg = PackageBuilder::new(dir.path(), "guessing");
    pkg.problem_yaml(
        "name: Guessing\ntype: pass-fail\nvalidation: custom interactive\n\
         license: cc0\nauthor: Ada\n",
    )
    .statement("Guessing")
    .input_validator("validate.sh", &strict_input_validator(&["1\n"]))
    .output_validator("judge.sh", CMP_OUTPUT_VALIDATOR)
    .case("sample/s", "1\n", "one\n")
    .case("secret/a", "1\n", "one\n")
    .submission("accepted/ok.sh", "ok.sh", "cat\n")
    // Runs 4.5 s against an inferred limit of 3 s, but the validator's
    // early WA must win over TLE reclassification.
    .submission("wrong_answer/wa.sh", "wa.sh", "cat\n");

    let outcome = verify(pkg.path());
    std::env::remove_var("GAVEL_TOOL_INTERACTIVE");
    assert_eq!(outcome, (0, 0));
}
