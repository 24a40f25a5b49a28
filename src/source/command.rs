//! External detector program
//!
//! Runs a detector once per tick and reads the face count it prints on
//! stdout. This is how an OpenCV Haar-cascade script (or any other
//! classifier) plugs in without being reimplemented here.
//!
//! A run can be cancelled, or bounded with an optional timeout; either way
//! the child is killed.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::Handle;

use super::{CancelToken, FaceSource, parse_face_count};
use crate::{Error, Result};

/// Source backed by an external detector command
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    cancel: CancelToken,
    resolved: Option<PathBuf>,
    runtime: Option<Handle>,
}

impl CommandSource {
    /// Create a source that runs `program` with `args` each tick
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
            cancel: CancelToken::default(),
            resolved: None,
            runtime: None,
        }
    }

    /// Build from a single shell-style command line split on whitespace
    ///
    /// # Errors
    ///
    /// Returns error if the command line is empty
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(ToString::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("detector command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Kill a detector run after `timeout`
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run the detector to completion, unless it times out or is cancelled
    async fn run(&self, path: &Path) -> Result<Output> {
        let child = Command::new(path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("failed to run detector: {e}")))?;

        let finished = async {
            let output = match self.timeout {
                Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                    .await
                    .map_err(|_| {
                        Error::Capture(format!("detector timed out after {timeout:?}"))
                    })?,
                None => child.wait_with_output().await,
            };
            output.map_err(|e| Error::Capture(format!("detector failed: {e}")))
        };

        // Dropping the child on either early exit kills it
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Error::Capture("detector cancelled".to_string())),
            output = finished => output,
        }
    }
}

impl FaceSource for CommandSource {
    fn name(&self) -> String {
        if self.args.is_empty() {
            format!("command: {}", self.program)
        } else {
            format!("command: {} {}", self.program, self.args.join(" "))
        }
    }

    fn acquire(&mut self) -> Result<()> {
        let path = which::which(&self.program).map_err(|e| {
            Error::SourceUnavailable(format!("detector {:?} not found: {e}", self.program))
        })?;

        // Captures run on the blocking pool and drive the child through this handle
        let runtime = Handle::try_current().map_err(|e| {
            Error::SourceUnavailable(format!("detector needs a tokio runtime: {e}"))
        })?;

        tracing::debug!(path = %path.display(), "resolved detector command");
        self.resolved = Some(path);
        self.runtime = Some(runtime);
        self.cancel.reset();
        Ok(())
    }

    fn capture_and_count(&mut self) -> Result<usize> {
        let (Some(path), Some(runtime)) = (&self.resolved, &self.runtime) else {
            return Err(Error::Capture("detector not acquired".to_string()));
        };

        let output = runtime.block_on(self.run(path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(Error::Capture(if stderr.is_empty() {
                format!("detector exited with {}", output.status)
            } else {
                format!("detector exited with {}: {stderr}", output.status)
            }));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_face_count(&stdout).ok_or_else(|| {
            Error::Capture(format!("unparsable detector output: {:?}", stdout.trim()))
        })
    }

    fn release(&mut self) {
        self.resolved = None;
        self.runtime = None;
    }

    fn cancel_token(&self) -> Option<CancelToken> {
        Some(self.cancel.clone())
    }
}
