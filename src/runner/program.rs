//! Compiling and running programs found in a problem package

use super::language::Language;
use super::WaitStatus;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::cell::RefCell;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
enum ProgramKind {
    /// A single source file, built and run per the language registry.
    Source { language: Language, source: PathBuf },
    /// A directory with a `run` script and an optional `build` script.
    BuildRun { dir: PathBuf },
    /// A preassembled command vector; nothing to compile.
    Tool { cmd: Vec<String> },
}

/// How to run a program once.
#[derive(Debug, Default)]
pub struct RunOptions<'a> {
    pub stdin: Option<&'a Path>,
    pub stdout: Option<&'a Path>,
    pub stderr: Option<&'a Path>,
    pub args: Vec<String>,
    /// Wall-clock limit in seconds; the child is killed past it.
    pub timelim: Option<f64>,
    /// Advisory; consumed by languages with a tunable runtime heap.
    pub memlim: Option<u64>,
}

/// A compilable, runnable program. Compilation happens at most once; the
/// outcome (success flag plus diagnostics) is cached.
pub struct Program {
    name: String,
    kind: ProgramKind,
    work_dir: PathBuf,
    compile_timelim: u64,
    compiled: RefCell<Option<(bool, String)>>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Program {
    pub fn from_source(source: PathBuf, work_dir: PathBuf, compile_timelim: u64) -> Option<Program> {
        let language = Language::from_path(&source)?;
        let name = source.file_name()?.to_string_lossy().into_owned();
        Some(Program {
            name,
            kind: ProgramKind::Source { language, source },
            work_dir,
            compile_timelim,
            compiled: RefCell::new(None),
        })
    }

    pub fn from_script_dir(dir: PathBuf, work_dir: PathBuf, compile_timelim: u64) -> Option<Program> {
        if !dir.join("run").is_file() && !dir.join("build").is_file() {
            return None;
        }
        let name = dir.file_name()?.to_string_lossy().into_owned();
        Some(Program {
            name,
            kind: ProgramKind::BuildRun { dir },
            work_dir,
            compile_timelim,
            compiled: RefCell::new(None),
        })
    }

    pub fn tool(name: impl Into<String>, cmd: Vec<String>, work_dir: PathBuf) -> Program {
        Program {
            name: name.into(),
            kind: ProgramKind::Tool { cmd },
            work_dir,
            compile_timelim: 0,
            compiled: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> Option<Language> {
        match self.kind {
            ProgramKind::Source { language, .. } => Some(language),
            _ => None,
        }
    }

    pub fn is_script_dir(&self) -> bool {
        matches!(self.kind, ProgramKind::BuildRun { .. })
    }

    /// Total size of the program's source files, in bytes.
    pub fn code_size(&self) -> u64 {
        match &self.kind {
            ProgramKind::Source { source, .. } => {
                fs::metadata(source).map(|m| m.len()).unwrap_or(0)
            }
            ProgramKind::BuildRun { dir } => walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum(),
            ProgramKind::Tool { .. } => 0,
        }
    }

    /// Compile if needed. Returns (success, diagnostics); cached after the
    /// first call.
    pub fn compile(&self) -> Result<(bool, String)> {
        if let Some(cached) = self.compiled.borrow().clone() {
            return Ok(cached);
        }
        let outcome = self.compile_uncached()?;
        *self.compiled.borrow_mut() = Some(outcome.clone());
        Ok(outcome)
    }

    fn compile_uncached(&self) -> Result<(bool, String)> {
        let cmd: Vec<String> = match &self.kind {
            ProgramKind::Tool { .. } => return Ok((true, String::new())),
            ProgramKind::Source { language, source } => match language {
                Language::Shell => return Ok((true, String::new())),
                Language::C => vec![
                    "gcc".into(),
                    "-g".into(),
                    "-O2".into(),
                    "-std=gnu11".into(),
                    "-o".into(),
                    self.exe_path().to_string_lossy().into_owned(),
                    source.to_string_lossy().into_owned(),
                    "-lm".into(),
                ],
                Language::Cpp => vec![
                    "g++".into(),
                    "-g".into(),
                    "-O2".into(),
                    "-std=gnu++17".into(),
                    "-o".into(),
                    self.exe_path().to_string_lossy().into_owned(),
                    source.to_string_lossy().into_owned(),
                ],
                Language::Python3 => vec![
                    "python3".into(),
                    "-m".into(),
                    "py_compile".into(),
                    source.to_string_lossy().into_owned(),
                ],
            },
            ProgramKind::BuildRun { dir } => {
                let build = dir.join("build");
                if !build.is_file() {
                    return Ok((true, String::new()));
                }
                vec!["sh".into(), build.to_string_lossy().into_owned()]
            }
        };

        let mut command = Command::new(&cmd[0]);
        command
            .args(&cmd[1..])
            .current_dir(self.cwd())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .with_context(|| format!("spawning compiler for {}", self.name))?;
        let status = match child.wait_timeout(Duration::from_secs(self.compile_timelim.max(1)))? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok((false, "compilation timed out".to_string()));
            }
        };
        let mut diagnostics = String::new();
        if let Some(mut out) = child.stdout.take() {
            use std::io::Read;
            let mut buf = String::new();
            out.read_to_string(&mut buf).ok();
            diagnostics.push_str(&buf);
        }
        if let Some(mut err) = child.stderr.take() {
            use std::io::Read;
            let mut buf = String::new();
            err.read_to_string(&mut buf).ok();
            diagnostics.push_str(&buf);
        }
        Ok((status.success(), diagnostics))
    }

    fn exe_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.exe", self.name))
    }

    /// Script-directory programs build and run in their own directory, so
    /// `run` scripts can refer to sibling files; everything else runs in
    /// the scratch work dir.
    fn cwd(&self) -> &Path {
        match &self.kind {
            ProgramKind::BuildRun { dir } => dir,
            _ => &self.work_dir,
        }
    }

    /// Command vector used to run this program, as handed to the arbiter
    /// for interactive sessions. `memlim` is advisory for the registry's
    /// current languages.
    pub fn runcmd(&self, _memlim: Option<u64>) -> Vec<String> {
        match &self.kind {
            ProgramKind::Source { language, source } => match language {
                Language::C | Language::Cpp => {
                    vec![self.exe_path().to_string_lossy().into_owned()]
                }
                Language::Python3 => vec![
                    "python3".into(),
                    source.to_string_lossy().into_owned(),
                ],
                Language::Shell => vec!["sh".into(), source.to_string_lossy().into_owned()],
            },
            ProgramKind::BuildRun { dir } => {
                vec![
                    "sh".into(),
                    dir.join("run").to_string_lossy().into_owned(),
                ]
            }
            ProgramKind::Tool { cmd } => cmd.clone(),
        }
    }

    /// Run once. Returns the wait status and the wall-clock runtime in
    /// seconds. Past `timelim` the child is killed; the elapsed time then
    /// exceeds the limit, which is what TLE classification keys on.
    pub fn run(&self, opts: &RunOptions) -> Result<(WaitStatus, f64)> {
        let cmd = self.runcmd(opts.memlim);
        if cmd.is_empty() {
            bail!("empty command for {}", self.name);
        }
        let mut command = Command::new(&cmd[0]);
        command.args(&cmd[1..]).args(&opts.args);
        command.current_dir(self.cwd());
        command.stdin(match opts.stdin {
            Some(path) => Stdio::from(
                fs::File::open(path).with_context(|| format!("opening {}", path.display()))?,
            ),
            None => Stdio::null(),
        });
        command.stdout(match opts.stdout {
            Some(path) => Stdio::from(
                fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
            ),
            None => Stdio::null(),
        });
        command.stderr(match opts.stderr {
            Some(path) => Stdio::from(
                fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
            ),
            None => Stdio::null(),
        });

        let start = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", self.name))?;
        let status = match opts.timelim {
            Some(limit) => match child.wait_timeout(Duration::from_secs_f64(limit.max(0.0)))? {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    child.wait()?
                }
            },
            None => child.wait()?,
        };
        let runtime = start.elapsed().as_secs_f64();
        Ok((WaitStatus::from_exit_status(status), runtime))
    }
}

/// Collect the programs in a directory, sorted by name. Entries whose
/// basename fails `pattern`, hidden files, and sources in no registered
/// language are skipped.
pub fn find_programs(
    dir: &Path,
    pattern: Option<&Regex>,
    work_dir: &Path,
    compile_timelim: u64,
) -> Vec<Program> {
    let mut programs = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return programs;
    };
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        if let Some(pattern) = pattern {
            if !pattern.is_match(name) {
                continue;
            }
        }
        let program = if path.is_dir() {
            Program::from_script_dir(path, work_dir.to_path_buf(), compile_timelim)
        } else {
            Program::from_source(path, work_dir.to_path_buf(), compile_timelim)
        };
        if let Some(program) = program {
            programs.push(program);
        }
    }
    programs
}

/// Locate a bundled helper such as the interactive arbiter: an environment
/// override first (`GAVEL_TOOL_<NAME>`), then next to the executable, then
/// on PATH.
pub fn get_tool(name: &str, work_dir: &Path) -> Option<Program> {
    let env_key = format!("GAVEL_TOOL_{}", name.to_uppercase().replace('-', "_"));
    if let Ok(cmd) = env::var(&env_key) {
        let parts: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
        if !parts.is_empty() {
            return Some(Program::tool(name, parts, work_dir.to_path_buf()));
        }
    }
    if let Ok(exe) = env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            for candidate in [exe_dir.join("tools").join(name), exe_dir.join(name)] {
                if candidate.is_file() {
                    return Some(Program::tool(
                        name,
                        vec![candidate.to_string_lossy().into_owned()],
                        work_dir.to_path_buf(),
                    ));
                }
            }
        }
    }
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(Program::tool(
                name,
                vec![candidate.to_string_lossy().into_owned()],
                work_dir.to_path_buf(),
            ));
        }
    }
    None
}
