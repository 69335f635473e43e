//! Media probe pipeline
//!
//! Downloads remote media to a scratch file and reports its container and
//! stream metadata through `ffprobe`:
//!
//! - **url**: path canonicalization applied before every download
//! - **scratch**: one uniquely named file per request, removed on every path
//! - **fetch**: streaming HTTP download in 8 KiB chunks
//! - **analysis**: `ffprobe` invocation with a timeout
//! - **pipeline**: the request lifecycle tying the above together
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mediaprobe::media::{FetchConfig, FfprobeAnalyzer, HttpFetcher, ProbePipeline, ScratchSpace};
//!
//! let pipeline = ProbePipeline::new(
//!     Arc::new(HttpFetcher::new(&FetchConfig::default())?),
//!     Arc::new(FfprobeAnalyzer::default()),
//!     ScratchSpace::system(),
//! );
//! let info = pipeline.run(&"https://example.com/clip.mp4".parse()?).await?;
//! println!("{}", info["format"]["duration"]);
//! ```

pub mod analysis;
pub mod fetch;
pub mod pipeline;
pub mod scratch;
pub mod url;

pub use analysis::{
    AnalysisError, FfprobeAnalyzer, MediaAnalyzer, ANALYZER_ARGS, DEFAULT_ANALYZER_PROGRAM,
    DEFAULT_ANALYZER_TIMEOUT_SECS,
};
pub use fetch::{
    FetchConfig, FetchError, Fetcher, HttpFetcher, CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS,
    DEFAULT_FETCH_TIMEOUT_SECS,
};
pub use pipeline::{ProbeError, ProbeFailure, ProbePipeline};
pub use scratch::{ScratchFile, ScratchSpace, SCRATCH_PREFIX};
pub use self::url::{normalize, normalize_url};
