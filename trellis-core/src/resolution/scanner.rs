//! Directory-based addin discovery

use std::path::PathBuf;

use super::{AddinScanner, ScannedAddin};
use crate::error::EngineError;

/// Treats every sub-directory of each root as one addin location.
///
/// Roots are scanned in order; missing roots are skipped.
pub struct DirectoryScanner {
    roots: Vec<PathBuf>,
}

impl DirectoryScanner {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl AddinScanner for DirectoryScanner {
    fn scan(&self) -> Result<Vec<ScannedAddin>, EngineError> {
        let mut found = Vec::new();

        for root in &self.roots {
            if !root.exists() {
                tracing::debug!(dir = %root.display(), "Addin directory does not exist");
                continue;
            }

            let mut locations: Vec<PathBuf> = std::fs::read_dir(root)?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect();
            locations.sort();

            for location in locations {
                let mut artifacts: Vec<PathBuf> = std::fs::read_dir(&location)?
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| path.is_file())
                    .collect();
                artifacts.sort();
                found.push(ScannedAddin {
                    location,
                    artifacts,
                });
            }
        }

        tracing::debug!(count = found.len(), "Addin scan complete");
        Ok(found)
    }
}
