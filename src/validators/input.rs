//! Input validator driver and the junk/mutation sanity fuzzer
//!
//! Protocol: an input validator reads the candidate input on stdin and
//! exits 42 to accept it. Anything else, including dying on a signal, is a
//! rejection.

use crate::problem::Problem;
use crate::report::Report;
use crate::runner::{find_programs, Program, RunOptions};
use crate::testdata::CaseId;
use anyhow::Result;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::{Captures, Regex};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;

const ASPECT: &str = "input format validators";

/// Python's `string.printable`: the alphabet for random junk streams.
const PRINTABLE: &[u8] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ\
      !\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ \t\n\x0b\x0c\r";

/// The four junk inputs no sane validator should accept wholesale.
pub(crate) fn junk_cases(rng: &mut impl Rng) -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("an empty file", Vec::new()),
        (
            "a binary file with byte values 0 up to 256",
            (0u8..=255).collect(),
        ),
        (
            "a text file with the ASCII characters 32 up to 127",
            (32u8..127).collect(),
        ),
        (
            "a random text file with printable ASCII characters",
            (0..200)
                .map(|_| PRINTABLE[rng.gen_range(0..PRINTABLE.len())])
                .collect(),
        ),
    ]
}

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").unwrap());
static NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n").unwrap());
static LEADING_ZERO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^.]\b)([0-9]+)\b").unwrap());
static TRAILING_ZERO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[0-9]+\b").unwrap());

/// A format-preserving corruption of a real package input. The pattern
/// decides applicability; validators accepting the corrupted input means
/// the format is underconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InputMutation {
    ExtraWhitespace,
    ExtraNewlines,
    LeadingZeros,
    TrailingZeros,
    TrailingJunk,
}

impl InputMutation {
    pub fn all() -> [InputMutation; 5] {
        [
            InputMutation::ExtraWhitespace,
            InputMutation::ExtraNewlines,
            InputMutation::LeadingZeros,
            InputMutation::TrailingZeros,
            InputMutation::TrailingJunk,
        ]
    }

    pub fn description(self) -> &'static str {
        match self {
            InputMutation::ExtraWhitespace => "spaces added where there already is whitespace",
            InputMutation::ExtraNewlines => "newlines added where there already are newlines",
            InputMutation::LeadingZeros => "leading zeros added to integers",
            InputMutation::TrailingZeros => {
                "trailing zeros added to real number decimal portion"
            }
            InputMutation::TrailingJunk => "random junk added to the end of the file",
        }
    }

    pub fn applies(self, text: &str) -> bool {
        match self {
            InputMutation::ExtraWhitespace => WHITESPACE_RE.is_match(text),
            InputMutation::ExtraNewlines => NEWLINE_RE.is_match(text),
            InputMutation::LeadingZeros => LEADING_ZERO_RE.is_match(text),
            InputMutation::TrailingZeros => TRAILING_ZERO_RE.is_match(text),
            InputMutation::TrailingJunk => true,
        }
    }

    pub fn apply(self, text: &str, rng: &mut impl Rng) -> String {
        match self {
            InputMutation::ExtraWhitespace => WHITESPACE_RE
                .replace_all(text, |c: &Captures| {
                    format!("{}{}", &c[0], " ".repeat(rng.gen_range(1..=5)))
                })
                .into_owned(),
            InputMutation::ExtraNewlines => NEWLINE_RE
                .replace_all(text, |_: &Captures| "\n".repeat(rng.gen_range(2..=5)))
                .into_owned(),
            InputMutation::LeadingZeros => LEADING_ZERO_RE
                .replace_all(text, "${1}0000000000${2}")
                .into_owned(),
            InputMutation::TrailingZeros => TRAILING_ZERO_RE
                .replace_all(text, "${0}0000000000")
                .into_owned(),
            InputMutation::TrailingJunk => {
                let junk: String = (0..200)
                    .map(|_| PRINTABLE[rng.gen_range(0..PRINTABLE.len())] as char)
                    .collect();
                format!("{}{}", text, junk)
            }
        }
    }
}

/// Driver for the programs in `input_validators/`.
pub struct InputValidators {
    validators: Vec<Program>,
    uses_old_path: bool,
    /// Indices of validators that compiled; set during check.
    usable: RefCell<Vec<usize>>,
    checked: Cell<Option<bool>>,
}

impl InputValidators {
    pub fn load(probdir: &Path, work_dir: &Path, compile_timelim: u64) -> InputValidators {
        let old_path = probdir.join("input_format_validators");
        let (dir, uses_old_path) = if old_path.is_dir() {
            (old_path, true)
        } else {
            (probdir.join("input_validators"), false)
        };
        InputValidators {
            validators: find_programs(&dir, None, work_dir, compile_timelim),
            uses_old_path,
            usable: RefCell::new(Vec::new()),
            checked: Cell::new(None),
        }
    }

    pub fn check(&self, problem: &Problem, report: &Report) -> Result<bool> {
        if let Some(res) = self.checked.get() {
            return Ok(res);
        }
        if self.uses_old_path {
            report.warning(
                ASPECT,
                "input_format_validators is a deprecated name; \
                 please use input_validators instead",
                None,
            )?;
        }
        let errors_before = report.errors();

        if self.validators.is_empty() {
            report.error(ASPECT, "No input format validators found", None)?;
        }

        let mut usable = Vec::new();
        for (idx, val) in self.validators.iter().enumerate() {
            let (ok, msg) = val.compile()?;
            if ok {
                usable.push(idx);
            } else {
                report.error(ASPECT, &format!("Compile error for {}", val), Some(&msg))?;
            }
        }
        *self.usable.borrow_mut() = usable;

        let res = report.errors() == errors_before;
        // Latch before fuzzing so validate() during the fuzz pass doesn't
        // re-enter; fuzz findings are warnings and don't change the result.
        self.checked.set(Some(res));

        // Only sanity check input validators if they all actually compiled.
        if res {
            self.sanity_check(problem, report)?;
        }
        Ok(res)
    }

    /// Run every compiled validator against `case`'s input with the
    /// group's flags; anything but exit 42 is an error on the case.
    pub fn validate(&self, problem: &Problem, report: &Report, case_id: CaseId) -> Result<()> {
        self.check(problem, report)?;
        let case = problem.testdata.case(case_id);
        let flags = tokenize(
            &problem
                .testdata
                .group(case.group)
                .config
                .input_validator_flags,
        );
        let outfile = problem.tmpdir().join("validator.out");
        let errfile = problem.tmpdir().join("validator.err");
        for &idx in self.usable.borrow().iter() {
            let val = &self.validators[idx];
            let opts = RunOptions {
                stdin: Some(&case.infile),
                stdout: Some(&outfile),
                stderr: Some(&errfile),
                args: flags.clone(),
                timelim: None,
                memlim: None,
            };
            let (status, _) = val.run(&opts)?;
            let emsg = if !status.exited() {
                format!(
                    "Input format validator {} crashed on input {}",
                    val,
                    case.infile.display()
                )
            } else if status.exit_code() != 42 {
                format!(
                    "Input format validator {} did not accept input {}, exit code: {}",
                    val,
                    case.infile.display(),
                    status.exit_code()
                )
            } else {
                continue;
            };
            let stdout = fs::read_to_string(&outfile).unwrap_or_default();
            let stderr = fs::read_to_string(&errfile).unwrap_or_default();
            let output: Vec<&str> = [stdout.as_str(), stderr.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect();
            report.error(&case.display(), &emsg, Some(&output.join("\n")))?;
        }
        Ok(())
    }

    /// Feed junk and mutated real inputs to the validators; warn whenever
    /// nothing rejects.
    fn sanity_check(&self, problem: &Problem, report: &Report) -> Result<()> {
        let all_flag_sets: Vec<Vec<String>> = problem
            .testdata
            .input_validator_flag_sets()
            .into_iter()
            .map(|flags| tokenize(&flags))
            .collect();
        let junk_file = problem.tmpdir().join("junkinput");
        let mut rng = rand::thread_rng();

        for (desc, junk) in junk_cases(&mut rng) {
            fs::write(&junk_file, &junk)?;
            for flags in &all_flag_sets {
                if !self.any_rejects(&junk_file, flags)? {
                    report.warning(
                        ASPECT,
                        &format!(
                            "No validator rejects {} with flags \"{}\"",
                            desc,
                            flags.join(" ")
                        ),
                        None,
                    )?;
                }
            }
        }

        for mutation in InputMutation::all() {
            if self.mutated_input_validates(problem, &junk_file, &all_flag_sets, mutation, &mut rng)?
            {
                report.warning(
                    ASPECT,
                    &format!("No validator rejects {}", mutation.description()),
                    None,
                )?;
            }
        }
        Ok(())
    }

    /// True when the mutation applied to some package input slips past
    /// every validator under every flag set. The first input the mutation
    /// applies to decides.
    fn mutated_input_validates(
        &self,
        problem: &Problem,
        scratch: &Path,
        all_flag_sets: &[Vec<String>],
        mutation: InputMutation,
        rng: &mut impl Rng,
    ) -> Result<bool> {
        for case_id in problem.testdata.all_cases(problem.testdata.root) {
            let case = problem.testdata.case(case_id);
            let Ok(raw) = fs::read(&case.infile) else {
                continue;
            };
            let text = String::from_utf8_lossy(&raw).into_owned();
            if !mutation.applies(&text) {
                continue;
            }
            fs::write(scratch, mutation.apply(&text, rng))?;
            for flags in all_flag_sets {
                if self.any_rejects(scratch, flags)? {
                    // Expected behavior; a validator caught the corruption.
                    return Ok(false);
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn any_rejects(&self, input: &Path, flags: &[String]) -> Result<bool> {
        for &idx in self.usable.borrow().iter() {
            let val = &self.validators[idx];
            let opts = RunOptions {
                stdin: Some(input),
                args: flags.to_vec(),
                ..Default::default()
            };
            let (status, _) = val.run(&opts)?;
            if !status.exited() || status.exit_code() != 42 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub(crate) fn tokenize(flags: &str) -> Vec<String> {
    flags.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn junk_cases_cover_the_four_kinds() {
        let mut rng = StdRng::seed_from_u64(7);
        let cases = junk_cases(&mut rng);
        assert_eq!(cases.len(), 4);
        assert!(cases[0].1.is_empty());
        assert_eq!(cases[1].1.len(), 256);
        assert_eq!(cases[2].1, (32u8..127).collect::<Vec<u8>>());
        assert_eq!(cases[3].1.len(), 200);
        assert!(cases[3].1.iter().all(|b| PRINTABLE.contains(b)));
    }

    #[test]
    fn leading_zeros_mutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = InputMutation::LeadingZeros;
        assert!(m.applies("5 10\n"));
        assert!(!m.applies("abc\n"));
        let mutated = m.apply("5 10\n", &mut rng);
        assert!(mutated.contains("00000000005"));
        assert!(mutated.contains("000000000010"));
    }

    #[test]
    fn leading_zeros_skips_decimal_fractions() {
        let m = InputMutation::LeadingZeros;
        let mutated = m.apply("1.25", &mut StdRng::seed_from_u64(7));
        // The integer part gets zeros; the fraction digits must not.
        assert!(mutated.starts_with("00000000001.25"));
    }

    #[test]
    fn trailing_zeros_mutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = InputMutation::TrailingZeros;
        assert!(m.applies("3.14\n"));
        assert!(!m.applies("314\n"));
        assert_eq!(m.apply("3.14\n", &mut rng), "3.140000000000\n");
    }

    #[test]
    fn whitespace_mutation_only_widens_existing_whitespace() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = InputMutation::ExtraWhitespace;
        assert!(!m.applies("abc"));
        let mutated = m.apply("a b\n", &mut rng);
        assert!(mutated.len() > 4);
        assert!(mutated.starts_with("a "));
    }

    #[test]
    fn newline_mutation_multiplies_newlines() {
        let mut rng = StdRng::seed_from_u64(7);
        let mutated = InputMutation::ExtraNewlines.apply("a\nb\n", &mut rng);
        assert!(mutated.matches('\n').count() >= 4);
    }

    #[test]
    fn trailing_junk_always_applies() {
        let mut rng = StdRng::seed_from_u64(7);
        let m = InputMutation::TrailingJunk;
        assert!(m.applies(""));
        let mutated = m.apply("x\n", &mut rng);
        assert_eq!(mutated.len(), 2 + 200);
        assert!(mutated.starts_with("x\n"));
    }

    #[test]
    fn tokenize_splits_on_whitespace() {
        assert_eq!(tokenize("  -a  b "), vec!["-a", "b"]);
        assert!(tokenize("").is_empty());
    }
}
