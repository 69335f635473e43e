//! One probe request, end to end.
//!
//! ```text
//! analyzer check -> acquire scratch -> fetch -> analyze -> release -> respond
//! ```
//!
//! The analyzer is located before any network I/O. Once a scratch file has
//! been acquired it is released on every path out of [`ProbePipeline::run`].

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use super::analysis::{AnalysisError, FfprobeAnalyzer, MediaAnalyzer};
use super::fetch::{FetchError, Fetcher, HttpFetcher};
use super::scratch::{ScratchFile, ScratchSpace};
use crate::config::Config;

/// Everything that can fail a probe, classified for the HTTP boundary.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("failed to allocate scratch file: {0}")]
    Scratch(#[source] std::io::Error),
}

/// Coarse failure class used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The remote resource or its content is at fault (400).
    BadInput,
    /// The analyzer is not installed (500).
    AnalyzerUnavailable,
    /// The analyzer succeeded but its output was not JSON (500).
    OutputParse,
    /// Anything else on this host (500).
    Unexpected,
}

impl ProbeError {
    pub fn failure(&self) -> ProbeFailure {
        match self {
            ProbeError::Fetch(err) if err.is_remote() => ProbeFailure::BadInput,
            ProbeError::Fetch(_) => ProbeFailure::Unexpected,
            ProbeError::Analysis(AnalysisError::Unavailable { .. }) => {
                ProbeFailure::AnalyzerUnavailable
            }
            ProbeError::Analysis(AnalysisError::ExitFailed { .. })
            | ProbeError::Analysis(AnalysisError::TimedOut(_)) => ProbeFailure::BadInput,
            ProbeError::Analysis(AnalysisError::MalformedOutput { .. }) => {
                ProbeFailure::OutputParse
            }
            ProbeError::Analysis(AnalysisError::Spawn { .. }) | ProbeError::Scratch(_) => {
                ProbeFailure::Unexpected
            }
        }
    }
}

/// Fetch, analyze and clean up. Holds no per-request state.
#[derive(Clone)]
pub struct ProbePipeline {
    fetcher: Arc<dyn Fetcher>,
    analyzer: Arc<dyn MediaAnalyzer>,
    scratch: ScratchSpace,
}

impl ProbePipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        analyzer: Arc<dyn MediaAnalyzer>,
        scratch: ScratchSpace,
    ) -> Self {
        Self {
            fetcher,
            analyzer,
            scratch,
        }
    }

    /// Wire the HTTP fetcher, `ffprobe` analyzer and scratch space from
    /// configuration.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&config.fetch.to_fetch_config())?;
        let analyzer = FfprobeAnalyzer::new(config.analyzer.program.clone())
            .with_timeout(config.analyzer_timeout());
        let scratch = config
            .scratch_dir
            .as_ref()
            .map(ScratchSpace::new)
            .unwrap_or_default();
        if let Err(err) = analyzer.locate() {
            tracing::warn!(error = %err, "analyzer not found; probes will fail until it is installed");
        }
        Ok(Self::new(Arc::new(fetcher), Arc::new(analyzer), scratch))
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// Probe the media at `url` and return the analyzer's JSON unmodified.
    pub async fn run(&self, url: &Url) -> Result<Value, ProbeError> {
        let program = self.analyzer.locate()?;

        let mut artifact = self.scratch.acquire().await.map_err(ProbeError::Scratch)?;
        let outcome = self.fetch_and_analyze(&program, url, &mut artifact).await;
        artifact.release().await;

        outcome
    }

    async fn fetch_and_analyze(
        &self,
        program: &std::path::Path,
        url: &Url,
        artifact: &mut ScratchFile,
    ) -> Result<Value, ProbeError> {
        let bytes = self.fetcher.fetch(url, artifact).await?;
        tracing::info!(bytes, "media downloaded");

        let result = self.analyzer.analyze(program, artifact.path()).await?;
        Ok(result)
    }
}

impl std::fmt::Debug for ProbePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbePipeline")
            .field("scratch", &self.scratch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators for pipeline and router tests.

    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;
    use url::Url;

    use crate::media::analysis::{AnalysisError, MediaAnalyzer};
    use crate::media::fetch::{FetchError, Fetcher};
    use crate::media::scratch::ScratchFile;

    pub enum FetchBehavior {
        Body(Vec<u8>),
        Status(u16),
        Transport(&'static str),
        /// Writes part of the body, then never completes.
        Stall,
    }

    /// Fetcher that records calls and serves a canned response.
    pub struct MockFetcher {
        behavior: FetchBehavior,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        pub fn new(behavior: FetchBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, _url: &Url, dest: &mut ScratchFile) -> Result<u64, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                FetchBehavior::Body(body) => {
                    dest.append(body).await.map_err(FetchError::Write)?;
                    dest.finish().await.map_err(FetchError::Write)?;
                    Ok(body.len() as u64)
                }
                FetchBehavior::Status(status) => {
                    // A real download may have written before failing.
                    dest.append(b"partial").await.map_err(FetchError::Write)?;
                    Err(FetchError::Status { status: *status })
                }
                FetchBehavior::Transport(message) => Err(FetchError::Transport {
                    message: message.to_string(),
                }),
                FetchBehavior::Stall => {
                    dest.append(b"partial").await.map_err(FetchError::Write)?;
                    std::future::pending().await
                }
            }
        }
    }

    pub enum AnalyzeBehavior {
        Missing,
        Output(Value),
        ExitFailed,
        Malformed,
    }

    /// Analyzer that records the files it was asked to inspect.
    pub struct MockAnalyzer {
        behavior: AnalyzeBehavior,
        seen: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl MockAnalyzer {
        pub fn new(behavior: AnalyzeBehavior) -> Self {
            Self {
                behavior,
                seen: Mutex::new(Vec::new()),
            }
        }

        /// Paths analyzed, with whether each existed at analysis time.
        pub fn seen(&self) -> Vec<(PathBuf, bool)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaAnalyzer for MockAnalyzer {
        fn locate(&self) -> Result<PathBuf, AnalysisError> {
            match self.behavior {
                AnalyzeBehavior::Missing => Err(AnalysisError::Unavailable {
                    program: "ffprobe".to_string(),
                }),
                _ => Ok(PathBuf::from("/usr/bin/ffprobe")),
            }
        }

        async fn analyze(&self, _program: &Path, path: &Path) -> Result<Value, AnalysisError> {
            self.seen
                .lock()
                .unwrap()
                .push((path.to_path_buf(), path.exists()));
            match &self.behavior {
                AnalyzeBehavior::Missing => unreachable!("locate fails first"),
                AnalyzeBehavior::Output(value) => Ok(value.clone()),
                AnalyzeBehavior::ExitFailed => Err(AnalysisError::ExitFailed { code: Some(1) }),
                AnalyzeBehavior::Malformed => Err(AnalysisError::MalformedOutput {
                    program: "ffprobe".to_string(),
                    source: serde_json::from_str::<Value>("{").unwrap_err(),
                }),
            }
        }
    }
}
