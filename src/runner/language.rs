//! The language registry: which sources the runner knows how to build and run

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    C,
    Cpp,
    Python3,
    Shell,
}

/// Output validators in other languages tend to be slow or unportable.
pub const RECOMMENDED_VALIDATOR_LANGUAGES: [&str; 3] = ["c", "cpp", "python3"];

impl Language {
    pub fn from_path(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "c" => Some(Language::C),
            "cc" | "cpp" | "cxx" | "c++" => Some(Language::Cpp),
            "py" => Some(Language::Python3),
            "sh" => Some(Language::Shell),
            _ => None,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Python3 => "python3",
            Language::Shell => "sh",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Python3 => "Python 3",
            Language::Shell => "POSIX shell",
        }
    }

    pub fn needs_compile(self) -> bool {
        matches!(self, Language::C | Language::Cpp | Language::Python3)
    }
}

pub fn known(id: &str) -> bool {
    matches!(id, "c" | "cpp" | "python3" | "sh")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_map_to_languages() {
        assert_eq!(Language::from_path(Path::new("a.cc")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("a.c++")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("a.c")), Some(Language::C));
        assert_eq!(
            Language::from_path(Path::new("val.py")),
            Some(Language::Python3)
        );
        assert_eq!(Language::from_path(Path::new("x.sh")), Some(Language::Shell));
        assert_eq!(Language::from_path(Path::new("x.java")), None);
        assert_eq!(Language::from_path(Path::new("noext")), None);
    }

    #[test]
    fn registry_ids() {
        assert!(known("cpp"));
        assert!(known("python3"));
        assert!(!known("java"));
    }
}
