//! Read access to the files inside a package archive.
//!
//! Paths are archive-relative, use `/` and are matched ignoring case.
//! An archive built from a path is opened on first use.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek};
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::pattern::wildcard_regex;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("{path} is not a ZIP archive: {reason}")]
    NotAnArchive { path: String, reason: String },

    #[error(transparent)]
    Zip(#[from] ZipError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Invalid wildcard pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Archive access was cancelled")]
    Cancelled,

    #[error("The archive has been closed")]
    Closed,
}

/// An archive entry seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppxFileInfo {
    /// Archive-relative path.
    pub path: String,
    /// Uncompressed size in bytes.
    pub size: u64,
}

trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

type Archive<'a> = ZipArchive<Box<dyn ReadSeek + 'a>>;

struct Entry {
    name: String,
    key: String,
    index: usize,
    size: u64,
    is_dir: bool,
}

struct Opened<'a> {
    archive: Archive<'a>,
    entries: Vec<Entry>,
}

enum State<'a> {
    Pending(PathBuf),
    Open(Opened<'a>),
    Closed,
}

/// A package archive opened for reading.
///
/// The archive handle, and the file behind it when the filesystem opened
/// the file itself, are released by [`PackageFileSystem::close`] or on drop.
pub struct PackageFileSystem<'a> {
    label: String,
    state: State<'a>,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for PackageFileSystem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Pending(_) => "pending",
            State::Open(_) => "open",
            State::Closed => "closed",
        };
        f.debug_struct("PackageFileSystem")
            .field("source", &self.label)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl PackageFileSystem<'static> {
    /// Archive at `path`, opened on first access.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            state: State::Pending(path),
            cancel: None,
        }
    }
}

impl<'a> PackageFileSystem<'a> {
    /// Wrap an already open stream, reading the archive directory now.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotAnArchive`] if the stream is not a ZIP file.
    pub fn from_reader<R: Read + Seek + 'a>(reader: R) -> Result<Self, VfsError> {
        let label = "<stream>".to_string();
        let opened = open_archive(&label, Box::new(reader))?;
        Ok(Self {
            label,
            state: State::Open(opened),
            cancel: None,
        })
    }

    /// Stop enumeration and lookups at the next entry once `token` fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Where the archive came from, for messages.
    pub fn source(&self) -> &str {
        &self.label
    }

    fn opened(&mut self) -> Result<&mut Opened<'a>, VfsError> {
        if let State::Pending(path) = &self.state {
            let file = File::open(path).map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => VfsError::FileNotFound(path.display().to_string()),
                _ => VfsError::Io(e),
            })?;
            let opened = open_archive(&self.label, Box::new(BufReader::new(file)))?;
            self.state = State::Open(opened);
        }
        match &mut self.state {
            State::Open(opened) => Ok(opened),
            State::Pending(_) | State::Closed => Err(VfsError::Closed),
        }
    }

    /// Whether a file exists. An empty path never exists.
    ///
    /// # Errors
    ///
    /// Fails only if the archive cannot be opened.
    pub fn file_exists(&mut self, path: &str) -> Result<bool, VfsError> {
        let key = normalize_key(path);
        if key.is_empty() {
            return Ok(false);
        }
        let opened = self.opened()?;
        Ok(opened.entries.iter().any(|e| !e.is_dir && e.key == key))
    }

    /// Whether any entry lives under `path/`. An empty path never exists.
    ///
    /// # Errors
    ///
    /// Fails only if the archive cannot be opened.
    pub fn directory_exists(&mut self, path: &str) -> Result<bool, VfsError> {
        let key = normalize_key(path);
        let key = key.trim_end_matches('/');
        if key.is_empty() {
            return Ok(false);
        }
        let prefix = format!("{key}/");
        let opened = self.opened()?;
        Ok(opened.entries.iter().any(|e| e.key.starts_with(&prefix)))
    }

    /// Read a whole file.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::FileNotFound`] if there is no such file.
    pub fn get_file(&mut self, path: &str) -> Result<Cursor<Vec<u8>>, VfsError> {
        let key = normalize_key(path);
        let opened = self.opened()?;
        let index = opened
            .entries
            .iter()
            .find(|e| !e.is_dir && e.key == key)
            .map(|e| e.index)
            .ok_or_else(|| VfsError::FileNotFound(path.to_string()))?;
        read_entry(&mut opened.archive, index)
    }

    /// Immediate subdirectories of `root` (or of the archive root), as
    /// archive-relative paths.
    ///
    /// # Errors
    ///
    /// Fails if the archive cannot be opened or the walk is cancelled.
    pub fn enumerate_directories(&mut self, root: Option<&str>) -> Result<Vec<String>, VfsError> {
        let prefix = directory_prefix(root);
        let cancel = self.cancel.clone();
        let opened = self.opened()?;

        let mut seen = Vec::<String>::new();
        let mut directories = Vec::new();
        for entry in &opened.entries {
            check_cancelled(cancel.as_ref())?;
            let Some(rest) = entry.key.strip_prefix(&prefix) else {
                continue;
            };
            let Some(slash) = rest.find('/') else {
                continue;
            };
            let end = prefix.len() + slash;
            if seen.iter().any(|s| *s == entry.key[..end]) {
                continue;
            }
            seen.push(entry.key[..end].to_string());
            let name = entry.name.get(..end).unwrap_or(&entry.key[..end]);
            directories.push(name.to_string());
        }
        Ok(directories)
    }

    /// Files under `root` whose base name matches `wildcard` (`*`, `?`).
    /// Without `recursive`, only files directly in `root` are listed.
    ///
    /// # Errors
    ///
    /// Fails if the archive cannot be opened, the wildcard does not compile,
    /// or the walk is cancelled.
    pub fn enumerate_files(
        &mut self,
        root: Option<&str>,
        wildcard: &str,
        recursive: bool,
    ) -> Result<Vec<AppxFileInfo>, VfsError> {
        let pattern = wildcard_regex(wildcard)?;
        let prefix = directory_prefix(root);
        let cancel = self.cancel.clone();
        let opened = self.opened()?;

        let mut files = Vec::new();
        for entry in opened.entries.iter().filter(|e| !e.is_dir) {
            check_cancelled(cancel.as_ref())?;
            let Some(rest) = entry.key.strip_prefix(&prefix) else {
                continue;
            };
            if !recursive && rest.contains('/') {
                trace!("Skipping nested entry {}", entry.name);
                continue;
            }
            let file_name = entry.name.rsplit('/').next().unwrap_or(&entry.name);
            if !pattern.is_match(file_name) {
                continue;
            }
            trace!("Matched {}", entry.name);
            files.push(AppxFileInfo {
                path: entry.name.clone(),
                size: entry.size,
            });
        }
        Ok(files)
    }

    /// Look up a resource, falling back to a variant that differs only in
    /// `name-value` qualifiers (`scale-200`, `en-us`, ...) on directories
    /// or the file name. Returns `None` if there is no such resource.
    ///
    /// # Errors
    ///
    /// Fails if the archive cannot be read or the lookup is cancelled.
    pub fn get_resource(&mut self, path: &str) -> Result<Option<Cursor<Vec<u8>>>, VfsError> {
        let key = normalize_key(path);
        if key.is_empty() {
            return Ok(None);
        }
        let cancel = self.cancel.clone();
        let opened = self.opened()?;

        if let Some(entry) = opened.entries.iter().find(|e| !e.is_dir && e.key == key) {
            return read_entry(&mut opened.archive, entry.index).map(Some);
        }

        let wanted = strip_qualifiers(&key);
        let mut found = None;
        for entry in opened.entries.iter().filter(|e| !e.is_dir) {
            check_cancelled(cancel.as_ref())?;
            if strip_qualifiers(&entry.key) == wanted {
                debug!("Resolved resource {path} to {}", entry.name);
                found = Some(entry.index);
                break;
            }
        }

        match found {
            Some(index) => read_entry(&mut opened.archive, index).map(Some),
            None => {
                debug!("No resource matches {path}");
                Ok(None)
            }
        }
    }

    /// Release the archive. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if !matches!(self.state, State::Closed) {
            debug!("Closing archive {}", self.label);
        }
        self.state = State::Closed;
    }
}

fn open_archive<'a>(label: &str, source: Box<dyn ReadSeek + 'a>) -> Result<Opened<'a>, VfsError> {
    let mut archive = ZipArchive::new(source).map_err(|e| VfsError::NotAnArchive {
        path: label.to_string(),
        reason: e.to_string(),
    })?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;
        let name = file.name().replace('\\', "/");
        entries.push(Entry {
            key: name.to_lowercase(),
            name,
            index,
            size: file.size(),
            is_dir: file.is_dir(),
        });
    }
    debug!("Opened archive {label} with {} entries", entries.len());

    Ok(Opened { archive, entries })
}

fn read_entry(archive: &mut Archive<'_>, index: usize) -> Result<Cursor<Vec<u8>>, VfsError> {
    let mut file = archive.by_index(index)?;
    let mut buf = Vec::with_capacity(usize::try_from(file.size()).unwrap_or_default());
    file.read_to_end(&mut buf)?;
    Ok(Cursor::new(buf))
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<(), VfsError> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(VfsError::Cancelled);
    }
    Ok(())
}

fn normalize_key(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_lowercase()
}

fn directory_prefix(root: Option<&str>) -> String {
    let key = normalize_key(root.unwrap_or_default());
    let key = key.trim_end_matches('/');
    if key.is_empty() {
        String::new()
    } else {
        format!("{key}/")
    }
}

static DIRECTORY_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^.\-/]+-[^.\-/]+$").expect("valid regex"));
static FILE_QUALIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[^.\-/]+-[^.\-/]+").expect("valid regex"));

/// `assets/scale-200/logo.targetsize-16.png` -> `assets/logo.png`.
fn strip_qualifiers(key: &str) -> String {
    let (dirs, file) = key.rsplit_once('/').unwrap_or(("", key));
    let mut out: Vec<&str> = dirs
        .split('/')
        .filter(|d| !d.is_empty() && !DIRECTORY_QUALIFIER.is_match(d))
        .collect();
    let file = FILE_QUALIFIER.replace_all(file, "");
    out.push(&file);
    out.join("/")
}
