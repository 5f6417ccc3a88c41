//! The bundled default output validator
//!
//! Token-by-token comparison of the submission's output against the judge
//! answer, honoring the standard flags: `case_sensitive`,
//! `space_change_sensitive`, `float_tolerance E`,
//! `float_relative_tolerance E`, `float_absolute_tolerance E`. Invoked as
//! a hidden subcommand of the binary so the driver can treat it like any
//! other validator program.

use anyhow::{bail, Result};
use std::fs;
use std::io::Read;
use std::path::Path;

pub const EXIT_AC: u8 = 42;
pub const EXIT_WA: u8 = 43;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompareFlags {
    pub case_sensitive: bool,
    pub space_change_sensitive: bool,
    pub float_absolute_tolerance: Option<f64>,
    pub float_relative_tolerance: Option<f64>,
}

impl CompareFlags {
    pub fn parse(args: &[String]) -> Result<CompareFlags> {
        let mut flags = CompareFlags::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "case_sensitive" => flags.case_sensitive = true,
                "space_change_sensitive" => flags.space_change_sensitive = true,
                "float_tolerance" | "float_absolute_tolerance" | "float_relative_tolerance" => {
                    let Some(value) = iter.next() else {
                        bail!("flag {} requires a value", arg);
                    };
                    let eps: f64 = value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("invalid tolerance '{}'", value))?;
                    match arg.as_str() {
                        "float_absolute_tolerance" => {
                            flags.float_absolute_tolerance = Some(eps)
                        }
                        "float_relative_tolerance" => {
                            flags.float_relative_tolerance = Some(eps)
                        }
                        _ => {
                            flags.float_absolute_tolerance = Some(eps);
                            flags.float_relative_tolerance = Some(eps);
                        }
                    }
                }
                other => bail!("unknown flag '{}'", other),
            }
        }
        Ok(flags)
    }

    fn uses_float_compare(&self) -> bool {
        self.float_absolute_tolerance.is_some() || self.float_relative_tolerance.is_some()
    }
}

/// Outcome of one comparison; `Wa` carries the judge message.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Accepted,
    WrongAnswer(String),
}

/// Split text into (leading whitespace, token) pairs plus trailing
/// whitespace, so space-change-sensitive mode can compare the gaps too.
fn lex(text: &str) -> (Vec<(String, String)>, String) {
    let mut tokens = Vec::new();
    let mut ws = String::new();
    let mut tok = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !tok.is_empty() {
                tokens.push((std::mem::take(&mut ws), std::mem::take(&mut tok)));
            }
            ws.push(ch);
        } else {
            tok.push(ch);
        }
    }
    if !tok.is_empty() {
        tokens.push((std::mem::take(&mut ws), std::mem::take(&mut tok)));
        (tokens, String::new())
    } else {
        (tokens, ws)
    }
}

fn tokens_match(expected: &str, actual: &str, flags: &CompareFlags) -> bool {
    if flags.uses_float_compare() {
        if let Ok(want) = expected.parse::<f64>() {
            let Ok(got) = actual.parse::<f64>() else {
                return false;
            };
            let diff = (want - got).abs();
            if let Some(eps) = flags.float_absolute_tolerance {
                if diff <= eps {
                    return true;
                }
            }
            if let Some(eps) = flags.float_relative_tolerance {
                if diff <= eps * want.abs() {
                    return true;
                }
            }
            return false;
        }
    }
    if flags.case_sensitive {
        expected == actual
    } else {
        expected.eq_ignore_ascii_case(actual)
    }
}

/// Compare submission output against the judge answer.
pub fn compare(answer: &str, output: &str, flags: &CompareFlags) -> Comparison {
    let (ans_tokens, ans_trailing) = lex(answer);
    let (out_tokens, out_trailing) = lex(output);

    for (idx, pair) in ans_tokens.iter().zip(out_tokens.iter()).enumerate() {
        let ((ans_ws, ans_tok), (out_ws, out_tok)) = pair;
        if flags.space_change_sensitive && ans_ws != out_ws {
            return Comparison::WrongAnswer(format!(
                "whitespace mismatch before token {}",
                idx + 1
            ));
        }
        if !tokens_match(ans_tok, out_tok, flags) {
            return Comparison::WrongAnswer(format!(
                "token {} mismatch: expected '{}', got '{}'",
                idx + 1,
                ans_tok,
                out_tok
            ));
        }
    }
    if ans_tokens.len() != out_tokens.len() {
        return Comparison::WrongAnswer(format!(
            "expected {} tokens, got {}",
            ans_tokens.len(),
            out_tokens.len()
        ));
    }
    if flags.space_change_sensitive && ans_trailing != out_trailing {
        return Comparison::WrongAnswer("whitespace mismatch at end of output".to_string());
    }
    Comparison::Accepted
}

/// Entry point for the `default-validator` subcommand: output on stdin,
/// verdict as exit code, judge message into the feedback directory.
pub fn run(infile: &Path, ansfile: &Path, feedbackdir: &Path, raw_flags: &[String]) -> Result<u8> {
    let _ = fs::read(infile); // input is unused by the default comparison
    let flags = CompareFlags::parse(raw_flags)?;
    let answer = String::from_utf8_lossy(&fs::read(ansfile)?).into_owned();
    // The stream under judgment is untrusted and may be arbitrary bytes.
    let mut raw_output = Vec::new();
    std::io::stdin().read_to_end(&mut raw_output)?;
    let output = String::from_utf8_lossy(&raw_output).into_owned();

    match compare(&answer, &output, &flags) {
        Comparison::Accepted => Ok(EXIT_AC),
        Comparison::WrongAnswer(msg) => {
            let _ = fs::write(feedbackdir.join("judgemessage.txt"), format!("{}\n", msg));
            Ok(EXIT_WA)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(args: &[&str]) -> CompareFlags {
        CompareFlags::parse(&args.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn identical_token_streams_accept() {
        let f = flags(&[]);
        assert_eq!(compare("1 2 3\n", "1  2\n3\n", &f), Comparison::Accepted);
    }

    #[test]
    fn default_compare_is_case_insensitive() {
        let f = flags(&[]);
        assert_eq!(compare("Yes\n", "YES\n", &f), Comparison::Accepted);
        let f = flags(&["case_sensitive"]);
        assert!(matches!(
            compare("Yes\n", "YES\n", &f),
            Comparison::WrongAnswer(_)
        ));
    }

    #[test]
    fn token_count_mismatch_rejects() {
        let f = flags(&[]);
        assert!(matches!(
            compare("1 2\n", "1 2 3\n", &f),
            Comparison::WrongAnswer(_)
        ));
        assert!(matches!(compare("1 2\n", "1\n", &f), Comparison::WrongAnswer(_)));
    }

    #[test]
    fn space_change_sensitive_compares_gaps() {
        let f = flags(&["space_change_sensitive"]);
        assert_eq!(compare("1 2\n", "1 2\n", &f), Comparison::Accepted);
        assert!(matches!(
            compare("1 2\n", "1  2\n", &f),
            Comparison::WrongAnswer(_)
        ));
        assert!(matches!(
            compare("1 2\n", "1 2", &f),
            Comparison::WrongAnswer(_)
        ));
    }

    #[test]
    fn float_tolerance_accepts_close_values() {
        let f = flags(&["float_tolerance", "1e-6"]);
        assert_eq!(compare("3.14159265\n", "3.14159312\n", &f), Comparison::Accepted);
        assert!(matches!(
            compare("3.14\n", "3.15\n", &f),
            Comparison::WrongAnswer(_)
        ));
    }

    #[test]
    fn relative_tolerance_scales_with_magnitude() {
        let f = flags(&["float_relative_tolerance", "1e-3"]);
        assert_eq!(compare("1000\n", "1000.5\n", &f), Comparison::Accepted);
        assert!(matches!(
            compare("1\n", "1.5\n", &f),
            Comparison::WrongAnswer(_)
        ));
    }

    #[test]
    fn non_numeric_answer_token_falls_back_to_string_compare() {
        let f = flags(&["float_tolerance", "1e-6"]);
        assert_eq!(compare("impossible\n", "IMPOSSIBLE\n", &f), Comparison::Accepted);
        // Answer is numeric, output is not
        assert!(matches!(
            compare("3.0\n", "three\n", &f),
            Comparison::WrongAnswer(_)
        ));
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(CompareFlags::parse(&["bogus".to_string()]).is_err());
        assert!(CompareFlags::parse(&["float_tolerance".to_string()]).is_err());
    }
}
