//! Helpers for building synthetic problem packages on disk
#![allow(dead_code)]

use gavel::{Problem, Report, VerifyOptions};
use std::fs;
use std::path::{Path, PathBuf};

/// Builds a problem package under a temp directory, one file at a time.
pub struct PackageBuilder {
    root: PathBuf,
}

impl PackageBuilder {
    pub fn new(parent: &Path, shortname: &str) -> PackageBuilder {
        let root = parent.join(shortname);
        fs::create_dir_all(&root).unwrap();
        PackageBuilder { root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn problem_yaml(&self, content: &str) -> &Self {
        fs::write(self.root.join("problem.yaml"), content).unwrap();
        self
    }

    pub fn statement(&self, name: &str) -> &Self {
        let dir = self.root.join("problem_statement");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("problem.tex"),
            format!("\\problemname{{{}}}\n", name),
        )
        .unwrap();
        self
    }

    pub fn input_validator(&self, name: &str, script: &str) -> &Self {
        let dir = self.root.join("input_validators");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), script).unwrap();
        self
    }

    pub fn output_validator(&self, name: &str, script: &str) -> &Self {
        let dir = self.root.join("output_validators");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), script).unwrap();
        self
    }

    pub fn case(&self, rel: &str, input: &str, answer: &str) -> &Self {
        let base = self.root.join("data").join(rel);
        fs::create_dir_all(base.parent().unwrap()).unwrap();
        fs::write(base.with_extension("in"), input).unwrap();
        fs::write(base.with_extension("ans"), answer).unwrap();
        self
    }

    pub fn testdata_yaml(&self, rel: &str, content: &str) -> &Self {
        let dir = self.root.join("data").join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("testdata.yaml"), content).unwrap();
        self
    }

    /// Symlink `data/<from>.{in,ans}` to another case's files.
    pub fn alias_case(&self, from: &str, to: &str) -> &Self {
        let base = self.root.join("data").join(from);
        fs::create_dir_all(base.parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(
            format!("{}.in", to),
            base.with_extension("in"),
        )
        .unwrap();
        std::os::unix::fs::symlink(
            format!("{}.ans", to),
            base.with_extension("ans"),
        )
        .unwrap();
        self
    }

    pub fn submission(&self, category: &str, name: &str, script: &str) -> &Self {
        let dir = self.root.join("submissions").join(category);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), script).unwrap();
        self
    }
}

/// An input validator that accepts exactly the given newline-terminated
/// inputs, byte for byte, and rejects everything else.
pub fn strict_input_validator(accepted: &[&str]) -> String {
    let mut script = String::from("input=$(cat; echo x)\n");
    for ok in accepted {
        script.push_str(&format!("[ \"$input\" = \"{}x\" ] && exit 42\n", ok));
    }
    script.push_str("exit 43\n");
    script
}

/// An output validator comparing the output byte for byte with the judge
/// answer (args: infile ansfile feedbackdir).
pub const CMP_OUTPUT_VALIDATOR: &str = "if cmp -s \"$2\" -; then exit 42; fi\nexit 43\n";

/// Load and fully check a package, returning (errors, warnings).
pub fn verify(probdir: &Path) -> (u32, u32) {
    verify_with(probdir, &VerifyOptions::default())
}

pub fn verify_with(probdir: &Path, opts: &VerifyOptions) -> (u32, u32) {
    let report = Report::new();
    let problem = Problem::load(probdir, &report).unwrap();
    problem.check(&report, opts).unwrap()
}
