use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{SdkError, ToolOutput, ToolRunner};
use crate::config::SdkConfig;

/// File name of the packaging tool.
pub const MAKE_APPX_TOOL: &str = "MakeAppx.exe";

static PACKING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Packing (\d+) files?").expect("valid regex"));
static PROCESSING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)^Processing "([^"]+)""#).expect("valid regex"));
static EXTRACTING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Extracting file ([^ ]+)").expect("valid regex"));

/// What to pack from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackSource {
    /// A mapping file, see [`PackageFileList`](super::PackageFileList).
    FileList(PathBuf),
    /// Every file under a directory.
    Directory(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackOptions {
    pub source: PackSource,
    pub target: PathBuf,
    pub verbose: bool,
    pub overwrite: bool,
    pub compress: bool,
    pub validate: bool,
    /// Publisher of the desktop bridge package this one replaces.
    pub publisher_bridge: Option<String>,
}

impl PackOptions {
    pub fn new(source: PackSource, target: impl Into<PathBuf>) -> Self {
        Self {
            source,
            target: target.into(),
            verbose: false,
            overwrite: false,
            compress: true,
            validate: true,
            publisher_bridge: None,
        }
    }

    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    #[must_use]
    pub fn with_publisher_bridge(mut self, publisher: impl Into<String>) -> Self {
        self.publisher_bridge = Some(publisher.into());
        self
    }

    /// Command line for `MakeAppx.exe pack`.
    pub fn arguments(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["pack".into()];
        match &self.source {
            PackSource::FileList(path) => args.extend(["/f".into(), path.into()]),
            PackSource::Directory(path) => args.extend(["/d".into(), path.into()]),
        }
        args.extend(["/p".into(), self.target.as_os_str().to_owned()]);
        if self.verbose {
            args.push("/v".into());
        }
        if self.overwrite {
            args.push("/o".into());
        }
        if !self.compress {
            args.push("/nc".into());
        }
        if !self.validate {
            args.push("/nv".into());
        }
        if let Some(publisher) = &self.publisher_bridge {
            args.extend(["/pb".into(), publisher.into()]);
        }
        args
    }
}

/// A progress report derived from tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// 0 until the total file count is known.
    pub percent: u8,
    pub message: String,
}

/// Tracks progress through the verbose output of a pack run.
#[derive(Debug, Clone, Default)]
pub struct PackProgress {
    total: Option<u64>,
    processed: u64,
}

fn base_name(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

impl PackProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one output line. Returns a report for lines that advance the
    /// run, `None` for everything else.
    pub fn parse_line(&mut self, line: &str) -> Option<Progress> {
        let line = line.trim();

        if let Some(caps) = PACKING_LINE.captures(line) {
            if self.total.is_none() {
                self.total = caps[1].parse().ok();
                debug!("Packing {:?} files", self.total);
            }
            return None;
        }

        let message = if let Some(caps) = PROCESSING_LINE.captures(line) {
            format!("Compressing {}…", base_name(&caps[1]))
        } else if let Some(caps) = EXTRACTING_LINE.captures(line) {
            format!("Extracting file {}…", base_name(&caps[1]))
        } else {
            return None;
        };

        self.processed += 1;
        Some(Progress {
            percent: self.percent(),
            message,
        })
    }

    fn percent(&self) -> u8 {
        match self.total {
            Some(total) if total > 0 => {
                let percent = (self.processed * 100 / total).min(100);
                u8::try_from(percent).unwrap_or(100)
            }
            _ => 0,
        }
    }
}

/// Wrapper around `MakeAppx.exe`.
#[derive(Debug, Clone, Default)]
pub struct MakeAppx {
    config: SdkConfig,
    cancel: Option<CancellationToken>,
}

impl MakeAppx {
    pub fn new(config: SdkConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn runner(&self, working_dir: Option<&Path>) -> Result<ToolRunner, SdkError> {
        let mut runner = ToolRunner::new(self.config.locate_tool(MAKE_APPX_TOOL)?);
        if let Some(dir) = working_dir {
            runner = runner.with_working_dir(dir);
        }
        if let Some(token) = &self.cancel {
            runner = runner.with_cancellation(token.clone());
        }
        Ok(runner)
    }

    /// Build a package, reporting progress as files are processed.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::ToolNotFound`] if the tool cannot be located,
    /// [`SdkError::Cancelled`] on cancellation, and the classified tool
    /// error if packing fails.
    pub fn pack<F>(&self, options: &PackOptions, mut on_progress: F) -> Result<ToolOutput, SdkError>
    where
        F: FnMut(Progress),
    {
        let mut options = options.clone();
        options.verbose |= self.config.verbose;

        let working_dir = match &options.source {
            PackSource::FileList(path) => path.parent(),
            PackSource::Directory(path) => Some(path.as_path()),
        }
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf);
        let runner = self.runner(working_dir.as_deref())?;

        info!("Packing {}", options.target.display());
        let mut progress = PackProgress::new();
        let output = runner.run_checked(options.arguments(), |line| {
            if let Some(report) = progress.parse_line(line) {
                on_progress(report);
            }
        })?;
        info!("Created {}", options.target.display());
        Ok(output)
    }
}
