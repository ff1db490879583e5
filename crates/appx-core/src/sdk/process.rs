use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{SdkError, classify_tool_error};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Everything a finished tool run printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an external tool with captured output.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: PathBuf,
    working_dir: Option<PathBuf>,
    cancel: Option<CancellationToken>,
}

impl ToolRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
            cancel: None,
        }
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Kill the tool once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Run the tool to completion, passing each line of standard output to
    /// `on_line` as it arrives. The exit code is not checked.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::ToolNotFound`] if the program does not exist,
    /// [`SdkError::Cancelled`] if the token fires (the process is killed),
    /// and [`SdkError::Io`] for other spawn or pipe failures.
    pub fn run<I, S, F>(&self, args: I, mut on_line: F) -> Result<ToolOutput, SdkError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        F: FnMut(&str),
    {
        if self.is_cancelled() {
            return Err(SdkError::Cancelled);
        }

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        info!("Executing {command:?}");
        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SdkError::ToolNotFound(self.program.display().to_string()),
            _ => SdkError::Io(e),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr was not captured"))?;

        let stderr_reader = thread::spawn(move || read_lines(stderr));
        let (tx, rx) = mpsc::channel();
        let stdout_reader = thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut output = ToolOutput::default();
        loop {
            match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
                Ok(line) => {
                    trace!("stdout: {line}");
                    on_line(&line);
                    output.stdout.push(line);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.is_cancelled() {
                info!("Killing {} (pid {})", self.tool_name(), child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(SdkError::Cancelled);
            }
        }

        let status = child.wait()?;
        let _ = stdout_reader.join();
        output.stderr = stderr_reader.join().unwrap_or_default();
        for line in &output.stderr {
            trace!("stderr: {line}");
        }
        output.exit_code = status.code();

        debug!(
            "{} exited with {:?} ({} stdout lines, {} stderr lines)",
            self.tool_name(),
            output.exit_code,
            output.stdout.len(),
            output.stderr.len()
        );
        Ok(output)
    }

    /// [`ToolRunner::run`], failing on a non-zero exit code.
    ///
    /// # Errors
    ///
    /// Any error of [`ToolRunner::run`], or the classified failure (see
    /// [`classify_tool_error`](super::classify_tool_error)).
    pub fn run_checked<I, S, F>(&self, args: I, on_line: F) -> Result<ToolOutput, SdkError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
        F: FnMut(&str),
    {
        let output = self.run(args, on_line)?;
        if output.success() {
            Ok(output)
        } else {
            Err(classify_tool_error(&self.tool_name(), output))
        }
    }
}

fn read_lines(stream: impl Read) -> Vec<String> {
    BufReader::new(stream).lines().map_while(Result::ok).collect()
}
