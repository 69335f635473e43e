//! Media analysis through the `ffprobe` command-line tool.
//!
//! The analyzer is treated as a black box: it is run once per file with
//! fixed arguments and its JSON standard output is relayed unmodified.
//! Nothing here interprets the `format` or `streams` sections.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::process::{Child, Command};

/// Program name looked up on `PATH` when none is configured.
pub const DEFAULT_ANALYZER_PROGRAM: &str = "ffprobe";

/// Default upper bound on a single analyzer run.
pub const DEFAULT_ANALYZER_TIMEOUT_SECS: u64 = 60;

/// Arguments placed before the file path on every invocation.
pub const ANALYZER_ARGS: [&str; 6] = [
    "-v",
    "quiet",
    "-print_format",
    "json",
    "-show_format",
    "-show_streams",
];

/// Spawn attempts made while the executable is still held open for writing.
const SPAWN_ATTEMPTS: u32 = 5;

const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Errors that can occur during media analysis.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{program} is not installed on the system")]
    Unavailable { program: String },

    #[error("Failed to analyze media file")]
    ExitFailed { code: Option<i32> },

    #[error("Failed to analyze media file: timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Failed to parse {program} output")]
    MalformedOutput {
        program: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Metadata extractor for local media files.
#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    /// Resolve the executable to run, failing if it is not installed.
    ///
    /// Called before any download so a missing tool never costs a fetch.
    fn locate(&self) -> Result<PathBuf, AnalysisError>;

    /// Analyze `path` with the executable returned by [`locate`](Self::locate).
    async fn analyze(&self, program: &Path, path: &Path) -> Result<Value, AnalysisError>;
}

/// [`MediaAnalyzer`] that shells out to `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfprobeAnalyzer {
    program: String,
    timeout: Duration,
}

impl FfprobeAnalyzer {
    /// Create an analyzer for `program`, either a bare name resolved on
    /// `PATH` or a path to the executable.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(DEFAULT_ANALYZER_TIMEOUT_SECS),
        }
    }

    /// Set the per-run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for FfprobeAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_ANALYZER_PROGRAM)
    }
}

#[async_trait]
impl MediaAnalyzer for FfprobeAnalyzer {
    fn locate(&self) -> Result<PathBuf, AnalysisError> {
        which::which(&self.program).map_err(|_| AnalysisError::Unavailable {
            program: self.program.clone(),
        })
    }

    async fn analyze(&self, program: &Path, path: &Path) -> Result<Value, AnalysisError> {
        let mut cmd = Command::new(program);
        cmd.args(ANALYZER_ARGS)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let run = async {
            let child = spawn(&mut cmd).await?;
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(AnalysisError::Spawn {
                    program: self.program.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(
                    file = %path.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "analyzer timed out"
                );
                return Err(AnalysisError::TimedOut(self.timeout));
            }
        };

        if !output.status.success() {
            // Diagnostics stay in the log; callers only learn that analysis failed.
            tracing::warn!(
                file = %path.display(),
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "analyzer exited with failure"
            );
            return Err(AnalysisError::ExitFailed {
                code: output.status.code(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|source| AnalysisError::MalformedOutput {
            program: self.program.clone(),
            source,
        })
    }
}

/// Spawn `cmd`, retrying while the executable is busy (`ETXTBSY`), which
/// happens when it was just replaced and a writer has not closed it yet.
async fn spawn(cmd: &mut Command) -> io::Result<Child> {
    let mut attempt = 1;
    loop {
        match cmd.spawn() {
            Err(err)
                if err.kind() == io::ErrorKind::ExecutableFileBusy && attempt < SPAWN_ATTEMPTS =>
            {
                tracing::debug!(attempt, "analyzer executable busy, retrying spawn");
                tokio::time::sleep(SPAWN_RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
