//! Cross-document back-references.
//!
//! When another document embeds a reference block pointing at this one, it
//! registers its file name here: under the referenced section title, or in
//! `files` when the whole document is referenced. The lists are rebuilt
//! lazily by re-scanning recent files, so they may contain stale entries
//! until the next `prune`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct References {
    /// Section title → files referencing that section.
    #[serde(default)]
    pub sections: BTreeMap<String, Vec<String>>,
    /// Files referencing the whole document.
    #[serde(default)]
    pub files: Vec<String>,
}

impl References {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.files.is_empty()
    }

    /// Record that `file` references `section`. Duplicate registrations are
    /// ignored.
    pub fn register_section(&mut self, section: &str, file: &str) {
        let files = self.sections.entry(section.to_string()).or_default();
        if !files.iter().any(|f| f == file) {
            files.push(file.to_string());
        }
    }

    pub fn register_file(&mut self, file: &str) {
        if !self.files.iter().any(|f| f == file) {
            self.files.push(file.to_string());
        }
    }

    pub fn unregister_section(&mut self, section: &str, file: &str) {
        if let Some(files) = self.sections.get_mut(section) {
            files.retain(|f| f != file);
            if files.is_empty() {
                self.sections.remove(section);
            }
        }
    }

    /// Files referencing `section`, empty when none.
    pub fn files_for_section(&self, section: &str) -> &[String] {
        self.sections.get(section).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every reference whose file no longer exists. Returns how many
    /// entries were removed.
    pub fn prune(&mut self, exists: impl Fn(&str) -> bool) -> usize {
        let mut removed = 0;
        self.files.retain(|f| {
            let keep = exists(f);
            if !keep {
                log::debug!("pruning stale file reference {f}");
                removed += 1;
            }
            keep
        });
        self.sections.retain(|section, files| {
            files.retain(|f| {
                let keep = exists(f);
                if !keep {
                    log::debug!("pruning stale reference {f} -> {section}");
                    removed += 1;
                }
                keep
            });
            !files.is_empty()
        });
        removed
    }
}
