use std::collections::HashSet;
use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use appx_schema::{APPX_BLOCK_MAP_FILE, APPX_MANIFEST_FILE, APPX_SIGNATURE_FILE};
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::SdkError;
use crate::pattern::wildcard_regex;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceDirectory {
    source: PathBuf,
    /// Package-relative directory the files land in; empty for the root.
    target: String,
    wildcard: String,
    recursive: bool,
}

/// Mapping of source files to package paths, in the `[Files]` format the
/// packaging tool reads with `/f`.
///
/// Explicit files win over files found by directory sweeps with the same
/// target. Targets are compared ignoring case, and the block map and
/// signature are never mapped since the tools generate them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFileList {
    files: Vec<(String, PathBuf)>,
    directories: Vec<SourceDirectory>,
}

fn normalize_target(target: &str) -> String {
    target.replace('/', "\\").trim_matches('\\').to_string()
}

fn join_target(dir: &str, relative: &str) -> String {
    if dir.is_empty() {
        relative.to_string()
    } else {
        format!("{dir}\\{relative}")
    }
}

impl PackageFileList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one file. A later mapping to the same target replaces it.
    pub fn add_file(&mut self, source: impl Into<PathBuf>, target: &str) -> &mut Self {
        let target = normalize_target(target);
        let source = source.into();
        match self
            .files
            .iter_mut()
            .find(|(t, _)| t.eq_ignore_ascii_case(&target))
        {
            Some(existing) => existing.1 = source,
            None => self.files.push((target, source)),
        }
        self
    }

    /// Map the package manifest.
    pub fn add_manifest(&mut self, source: impl Into<PathBuf>) -> &mut Self {
        self.add_file(source, APPX_MANIFEST_FILE)
    }

    /// Map every file in `source` whose name matches `wildcard` under the
    /// package directory `target` (empty for the package root).
    pub fn add_directory(
        &mut self,
        source: impl Into<PathBuf>,
        wildcard: &str,
        recursive: bool,
        target: &str,
    ) -> &mut Self {
        self.directories.push(SourceDirectory {
            source: source.into(),
            target: normalize_target(target),
            wildcard: wildcard.to_string(),
            recursive,
        });
        self
    }

    /// Where the manifest comes from: an explicit mapping, or the top level
    /// of a directory swept into the package root.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Io`] if a swept directory cannot be read.
    pub fn manifest_source_path(&self) -> Result<Option<PathBuf>, SdkError> {
        if let Some((_, source)) = self
            .files
            .iter()
            .find(|(t, _)| t.eq_ignore_ascii_case(APPX_MANIFEST_FILE))
        {
            return Ok(Some(source.clone()));
        }

        for dir in self.directories.iter().filter(|d| d.target.is_empty()) {
            for entry in WalkDir::new(&dir.source).min_depth(1).max_depth(1).sort_by_file_name() {
                let entry = entry.map_err(io::Error::from)?;
                if entry.file_type().is_file()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|n| n.eq_ignore_ascii_case(APPX_MANIFEST_FILE))
                {
                    return Ok(Some(entry.into_path()));
                }
            }
        }
        Ok(None)
    }

    fn swept(&self, dir: &SourceDirectory) -> Result<Vec<(String, PathBuf)>, SdkError> {
        let pattern = wildcard_regex(&dir.wildcard)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let max_depth = if dir.recursive { usize::MAX } else { 1 };

        let mut found = Vec::new();
        for entry in WalkDir::new(&dir.source)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !pattern.is_match(&name) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir.source) else {
                continue;
            };
            let relative: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            let target = join_target(&dir.target, &relative.join("\\"));
            trace!("Swept {} -> {target}", entry.path().display());
            found.push((target, entry.into_path()));
        }
        Ok(found)
    }

    /// The resolved `(source, target)` pairs, swept files first.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Io`] if a directory cannot be walked or its
    /// wildcard is invalid.
    pub fn entries(&self) -> Result<Vec<(PathBuf, String)>, SdkError> {
        let explicit: HashSet<String> = self.files.iter().map(|(t, _)| t.to_lowercase()).collect();

        let mut candidates = Vec::new();
        for dir in &self.directories {
            candidates.extend(
                self.swept(dir)?
                    .into_iter()
                    .filter(|(t, _)| !explicit.contains(&t.to_lowercase())),
            );
        }
        candidates.extend(self.files.iter().cloned());

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(candidates.len());
        for (target, source) in candidates {
            let key = target.to_lowercase();
            if key == APPX_BLOCK_MAP_FILE.to_lowercase() || key == APPX_SIGNATURE_FILE.to_lowercase() {
                continue;
            }
            if seen.insert(key) {
                entries.push((source, target));
            }
        }
        Ok(entries)
    }

    /// Render the list in the tool's mapping file format.
    ///
    /// # Errors
    ///
    /// See [`PackageFileList::entries`].
    pub fn render(&self) -> Result<String, SdkError> {
        let entries = self.entries()?;
        debug!("Rendering file list with {} entries", entries.len());

        let mut out = String::from("[Files]\n");
        for (source, target) in entries {
            let _ = writeln!(out, "\"{}\"\t\"{target}\"", source.display());
        }
        Ok(out)
    }

    /// Render the list into a file.
    ///
    /// # Errors
    ///
    /// See [`PackageFileList::render`]; also fails if the file cannot be
    /// written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SdkError> {
        std::fs::write(path, self.render()?)?;
        Ok(())
    }
}
