//! Attachments shipped alongside the statement

use crate::report::Report;
use anyhow::Result;
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

const ASPECT: &str = "attachments";

pub struct Attachments {
    pub attachments: Vec<PathBuf>,
    checked: Cell<Option<bool>>,
}

impl Attachments {
    pub fn load(probdir: &Path, report: &Report) -> Attachments {
        let dir = probdir.join("attachments");
        let mut attachments = Vec::new();
        if dir.is_dir() {
            if let Ok(entries) = fs::read_dir(&dir) {
                attachments = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
                attachments.sort();
            }
        }
        report.debug(&format!("Adding attachments {:?}", attachments));
        Attachments {
            attachments,
            checked: Cell::new(None),
        }
    }

    pub fn check(&self, report: &Report) -> Result<bool> {
        if let Some(res) = self.checked.get() {
            return Ok(res);
        }
        let errors_before = report.errors();
        for attachment in &self.attachments {
            if attachment.is_dir() {
                report.error(
                    ASPECT,
                    &format!(
                        "Directories are not allowed as attachments ({} is a directory)",
                        attachment.display()
                    ),
                    None,
                )?;
            }
        }
        let res = report.errors() == errors_before;
        self.checked.set(Some(res));
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn files_are_fine_directories_are_not() {
        let dir = TempDir::new().unwrap();
        let att = dir.path().join("attachments");
        fs::create_dir(&att).unwrap();
        fs::write(att.join("starter.py"), "pass\n").unwrap();
        fs::create_dir(att.join("nested")).unwrap();

        let report = Report::new();
        let attachments = Attachments::load(dir.path(), &report);
        assert_eq!(attachments.attachments.len(), 2);
        assert!(!attachments.check(&report).unwrap());
        assert_eq!(report.errors(), 1);
    }

    #[test]
    fn absent_directory_is_fine() {
        let dir = TempDir::new().unwrap();
        let report = Report::new();
        let attachments = Attachments::load(dir.path(), &report);
        assert!(attachments.check(&report).unwrap());
        assert_eq!(report.errors(), 0);
    }
}
