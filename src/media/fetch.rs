//! Remote media download.
//!
//! [`HttpFetcher`] streams a response body straight into a [`ScratchFile`]
//! in fixed 8 KiB chunks so memory use stays flat regardless of media size.
//! The fetcher never removes its output on failure; the caller owns the
//! scratch file and releases it on every path.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use url::Url;

use super::scratch::ScratchFile;
use super::url::normalize;

/// Size of each read from the response body.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Default whole-request timeout (5 minutes).
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur while downloading media.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Could not download file. Status code: {status}")]
    Status { status: u16 },

    #[error("Failed to download file: {message}")]
    Transport { message: String },

    #[error("Failed to download file: response exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("failed to write downloaded media: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether the failure lies with the remote resource rather than this host.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            FetchError::Status { .. } | FetchError::Transport { .. } | FetchError::TooLarge { .. }
        )
    }
}

/// Download behavior.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Upper bound on body size; `None` disables the check.
    pub max_bytes: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_bytes: None,
        }
    }
}

/// Source of media bytes for the probe pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` into `dest`, returning the number of bytes written.
    async fn fetch(&self, url: &Url, dest: &mut ScratchFile) -> Result<u64, FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: Option<u64>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(concat!("mediaprobe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, dest: &mut ScratchFile) -> Result<u64, FetchError> {
        let target = normalize(url);
        tracing::debug!(url = %target, "downloading media");

        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        if let (Some(limit), Some(declared)) = (self.max_bytes, response.content_length()) {
            if declared > limit {
                return Err(FetchError::TooLarge { limit });
            }
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = Box::pin(StreamReader::new(body));
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await.map_err(|e| FetchError::Transport {
                message: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if let Some(limit) = self.max_bytes {
                if written > limit {
                    return Err(FetchError::TooLarge { limit });
                }
            }
            dest.append(&buf[..n]).await.map_err(FetchError::Write)?;
        }

        dest.finish().await.map_err(FetchError::Write)?;
        tracing::debug!(url = %target, bytes = written, "download complete");
        Ok(written)
    }
}

fn transport(err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::scratch::ScratchSpace;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    async fn spawn_upstream(router: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    /// Upstream that answers every connection with `head` followed by
    /// `body`, then keeps the socket open for `linger` before closing it.
    async fn spawn_raw_upstream(
        head: &'static str,
        body: Vec<u8>,
        linger: std::time::Duration,
    ) -> std::net::SocketAddr {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = socket.read(&mut request).await;
                    socket.write_all(head.as_bytes()).await.unwrap();
                    socket.write_all(&body).await.unwrap();
                    socket.flush().await.unwrap();
                    tokio::time::sleep(linger).await;
                });
            }
        });
        addr
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_status_error_message_mentions_code() {
        let err = FetchError::Status { status: 404 };
        assert_eq!(
            err.to_string(),
            "Could not download file. Status code: 404"
        );
        assert!(err.is_remote());
    }

    #[test]
    fn test_write_error_is_not_remote() {
        let err = FetchError::Write(std::io::Error::other("disk full"));
        assert!(!err.is_remote());
    }

    #[tokio::test]
    async fn test_fetch_streams_body_to_file() {
        let body = payload(3 * CHUNK_SIZE + 17);
        let served = body.clone();
        let addr = spawn_upstream(Router::new().route(
            "/media/clip.bin",
            get(move || {
                let served = served.clone();
                async move { served }
            }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}//media//clip.bin")).unwrap();

        let written = fetcher.fetch(&url, &mut scratch).await.unwrap();

        assert_eq!(written, body.len() as u64);
        assert_eq!(std::fs::read(scratch.path()).unwrap(), body);
        scratch.release().await;
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_ok_status() {
        let addr = spawn_upstream(Router::new()).await;

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/missing.mp4")).unwrap();

        let err = fetcher.fetch(&url, &mut scratch).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404 }));
        scratch.release().await;
    }

    #[tokio::test]
    async fn test_fetch_rejects_other_success_codes() {
        let addr = spawn_upstream(Router::new().route(
            "/partial",
            get(|| async { (StatusCode::PARTIAL_CONTENT, "abc") }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/partial")).unwrap();

        let err = fetcher.fetch(&url, &mut scratch).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 206 }));
        scratch.release().await;
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_transport_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/clip.mp4")).unwrap();

        let err = fetcher.fetch(&url, &mut scratch).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
        assert!(err.to_string().starts_with("Failed to download file: "));
        scratch.release().await;
    }

    #[tokio::test]
    async fn test_fetch_enforces_size_limit() {
        let addr = spawn_upstream(Router::new().route(
            "/big",
            get(|| async { payload(4 * CHUNK_SIZE) }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let config = FetchConfig {
            max_bytes: Some(CHUNK_SIZE as u64),
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let url = Url::parse(&format!("http://{addr}/big")).unwrap();

        let err = fetcher.fetch(&url, &mut scratch).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { .. }));
        scratch.release().await;
    }

    #[tokio::test]
    async fn test_fetch_truncated_body_is_transport_error() {
        let addr = spawn_raw_upstream(
            "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n",
            payload(100),
            Duration::ZERO,
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/clip.mp4")).unwrap();

        let err = fetcher.fetch(&url, &mut scratch).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
        scratch.release().await;
    }

    #[tokio::test]
    async fn test_fetch_stalled_body_times_out() {
        let addr = spawn_raw_upstream(
            "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n",
            payload(100),
            Duration::from_secs(30),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let config = FetchConfig {
            timeout: Duration::from_millis(300),
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let url = Url::parse(&format!("http://{addr}/clip.mp4")).unwrap();

        let started = std::time::Instant::now();
        let err = fetcher.fetch(&url, &mut scratch).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        scratch.release().await;
    }

    #[tokio::test]
    async fn test_fetch_enforces_size_limit_without_content_length() {
        let mut chunked = b"20\r\n".to_vec();
        chunked.extend(payload(32));
        chunked.extend_from_slice(b"\r\n0\r\n\r\n");
        let addr = spawn_raw_upstream(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n",
            chunked,
            Duration::ZERO,
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::new(dir.path()).acquire().await.unwrap();
        let config = FetchConfig {
            max_bytes: Some(20),
            ..FetchConfig::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let url = Url::parse(&format!("http://{addr}/stream")).unwrap();

        let err = fetcher.fetch(&url, &mut scratch).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 20 }), "{err:?}");
        assert!(std::fs::metadata(scratch.path()).unwrap().len() <= 20);
        scratch.release().await;
    }
}
