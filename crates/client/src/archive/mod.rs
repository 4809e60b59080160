//! Archive index and replay client.
//!
//! ### Capture listing
//! - One timemap request per `(url, year)`: only HTTP 200 captures, adjacent
//!   timestamps collapsed to 9 digits, fields limited to timestamp and digest.
//! - A failed or non-200 listing is fatal to the job; an empty one is `NoCaptures`.
//!
//! ### Capture download
//! - Byte-identical replay at `{replay_url}/{timestamp}id_/{url}`.
//! - Transport failures are retried with exponential backoff plus jitter.
//!   Any HTTP response, whatever its status, ends the retry loop.
//! - gzip/deflate bodies are decoded by the HTTP client; reads stop at the
//!   configured byte ceiling and the rest is discarded.
//! - Only textual content types produce a body; others are dropped before
//!   the body is read.

pub mod url;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use wbdiff_core::{AppConfig, Error};

pub use url::{UrlError, canonicalize, validate_target, validate_year};

/// Configuration for the archive client.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// User agent string (default: "wayback-discover-diff")
    pub user_agent: String,

    /// Sent as a `cdx_auth_token` cookie when set
    pub cdx_auth_token: Option<String>,

    /// Timemap endpoint
    pub index_url: String,

    /// Replay endpoint prefix
    pub replay_url: String,

    /// Request timeout (default: 35s)
    pub timeout: Duration,

    /// Maximum bytes read per capture (default: 1,000,000)
    pub max_download_bytes: usize,

    /// Additional download attempts after a transport failure (default: 2)
    pub max_retries: u32,

    /// Optional `limit` for the timemap query
    pub snapshots_limit: Option<u32>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ArchiveConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            cdx_auth_token: config.cdx_auth_token.clone(),
            index_url: config.index_url.clone(),
            replay_url: config.replay_url.clone(),
            timeout: config.timeout(),
            max_download_bytes: config.max_download_bytes,
            max_retries: config.max_retries,
            snapshots_limit: config.snapshots_limit,
        }
    }
}

/// One line of a timemap listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    pub timestamp: String,
    pub digest: String,
}

/// Parse a newline-delimited `timestamp digest` listing.
///
/// Lines with fewer than two fields are skipped.
pub fn parse_captures(body: &str) -> Vec<Capture> {
    body.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let timestamp = fields.next()?;
            let digest = fields.next()?;
            Some(Capture { timestamp: timestamp.to_string(), digest: digest.to_string() })
        })
        .collect()
}

/// Delay before retry `attempt` (1-based): `1ms * 2^attempt` plus up to 2ms of jitter.
pub fn backoff(attempt: u32) -> Duration {
    let base = Duration::from_millis(1u64 << attempt.min(16));
    let jitter = Duration::from_micros(rand::thread_rng().gen_range(0..2000));
    base + jitter
}

/// Whether a `Content-Type` value denotes text or markup.
pub fn is_textual(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("text") || ct.contains("html")
    })
}

/// Where captures come from.
///
/// The job orchestrator only talks to this trait, so tests can script it.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Captures of `url` archived during `year`.
    async fn list_captures(&self, url: &str, year: &str) -> Result<Vec<Capture>, Error>;

    /// Body of one capture, or `None` when it is unavailable or not text.
    async fn download_capture(&self, timestamp: &str, url: &str) -> Option<String>;
}

/// HTTP client for the Wayback Machine.
pub struct ArchiveClient {
    http: Client,
    config: ArchiveConfig,
}

impl ArchiveClient {
    /// Create a new archive client with the given configuration.
    pub fn new(config: ArchiveConfig) -> Result<Self, Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONNECTION, header::HeaderValue::from_static("keep-alive"));
        if let Some(token) = config.cdx_auth_token.as_deref().filter(|t| !t.is_empty()) {
            let cookie = header::HeaderValue::from_str(&format!("cdx_auth_token={token}"))
                .map_err(|e| Error::InvalidInput(format!("invalid cdx auth token: {e}")))?;
            headers.insert(header::COOKIE, cookie);
        }

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .default_headers(headers)
            .use_rustls_tls()
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Timemap request URL for `(url, year)`.
    pub fn index_request_url(&self, url: &str, year: &str) -> Result<reqwest::Url, Error> {
        let limit = self.config.snapshots_limit.map(|l| l.to_string());
        let mut params = vec![
            ("url", url),
            ("from", year),
            ("to", year),
            ("statuscode", "200"),
            ("fl", "timestamp,digest"),
            ("collapse", "timestamp:9"),
        ];
        if let Some(limit) = limit.as_deref() {
            params.push(("limit", limit));
        }

        reqwest::Url::parse_with_params(&self.config.index_url, &params)
            .map_err(|e| Error::InvalidInput(format!("invalid index url: {e}")))
    }

    /// Replay URL of one capture.
    pub fn replay_request_url(&self, timestamp: &str, url: &str) -> String {
        format!("{}/{timestamp}id_/{url}", self.config.replay_url.trim_end_matches('/'))
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Send a GET, retrying only on transport failure.
    async fn get_with_retry(&self, target: &str) -> Option<Response> {
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff(attempt)).await;
            }
            match self.http.get(target).send().await {
                Ok(response) => return Some(response),
                Err(e) => tracing::warn!(request_url = target, attempt, error = %e, "capture request failed"),
            }
        }
        None
    }
}

/// Read at most `limit` bytes of a response body.
async fn read_capped(mut response: Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[async_trait]
impl ArchiveSource for ArchiveClient {
    async fn list_captures(&self, url: &str, year: &str) -> Result<Vec<Capture>, Error> {
        let request_url = self.index_request_url(url, year)?;
        tracing::info!(url, year, "fetching capture index");

        let response = self
            .http
            .get(request_url.clone())
            .send()
            .await
            .map_err(|e| Error::NoCaptures(format!("no captures of {url} for year {year}, {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::HttpError(format!(
                "failed request to {request_url}, status: {}, response: {body}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Transport(format!("failed to read capture index: {e}")))?;

        let captures = parse_captures(&body);
        if captures.is_empty() {
            return Err(Error::NoCaptures(format!("no captures of {url} for year {year}")));
        }

        tracing::info!(url, year, count = captures.len(), "listed captures");
        Ok(captures)
    }

    async fn download_capture(&self, timestamp: &str, url: &str) -> Option<String> {
        let target = self.replay_request_url(timestamp, url);
        tracing::debug!(timestamp, url, "fetching capture");

        let response = self.get_with_retry(&target).await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        if !is_textual(content_type) {
            tracing::debug!(timestamp, url, content_type = ?content_type, "skipping non-text capture");
            return None;
        }

        let body = match read_capped(response, self.config.max_download_bytes).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(timestamp, url, error = %e, "cannot read capture body");
                return None;
            }
        };

        Some(String::from_utf8_lossy(&body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve the same raw HTTP response to every connection.
    async fn serve(response: Vec<u8>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (addr, hits)
    }

    fn http_response(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut raw = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);
        raw
    }

    fn local_client(addr: SocketAddr, max_download_bytes: usize) -> ArchiveClient {
        ArchiveClient::new(ArchiveConfig {
            index_url: format!("http://{addr}/web/timemap"),
            replay_url: format!("http://{addr}/web"),
            timeout: Duration::from_secs(5),
            max_download_bytes,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_archive_config_default() {
        let config = ArchiveConfig::default();
        assert_eq!(config.user_agent, "wayback-discover-diff");
        assert_eq!(config.timeout, Duration::from_millis(35000));
        assert_eq!(config.max_download_bytes, 1_000_000);
        assert_eq!(config.max_retries, 2);
        assert!(config.snapshots_limit.is_none());
    }

    #[test]
    fn test_parse_captures() {
        let body = "20230101000000 ABCDEF\n\nbroken\n20230102000000 GHIJKL extra\n";
        let captures = parse_captures(body);
        assert_eq!(
            captures,
            vec![
                Capture { timestamp: "20230101000000".into(), digest: "ABCDEF".into() },
                Capture { timestamp: "20230102000000".into(), digest: "GHIJKL".into() },
            ]
        );
        assert!(parse_captures("").is_empty());
    }

    #[test]
    fn test_index_request_url() {
        let client = ArchiveClient::new(ArchiveConfig { snapshots_limit: Some(50), ..Default::default() }).unwrap();
        let url = client.index_request_url("example.com", "2023").unwrap();
        assert_eq!(url.host_str(), Some("web.archive.org"));
        assert_eq!(url.path(), "/web/timemap");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("url"), Some("example.com"));
        assert_eq!(get("from"), Some("2023"));
        assert_eq!(get("to"), Some("2023"));
        assert_eq!(get("statuscode"), Some("200"));
        assert_eq!(get("fl"), Some("timestamp,digest"));
        assert_eq!(get("collapse"), Some("timestamp:9"));
        assert_eq!(get("limit"), Some("50"));
    }

    #[test]
    fn test_index_request_url_without_limit() {
        let client = ArchiveClient::new(ArchiveConfig::default()).unwrap();
        let url = client.index_request_url("example.com", "2023").unwrap();
        assert!(!url.query_pairs().any(|(k, _)| k == "limit"));
    }

    #[test]
    fn test_replay_request_url() {
        let client = ArchiveClient::new(ArchiveConfig::default()).unwrap();
        assert_eq!(
            client.replay_request_url("20230101000000", "example.com/page"),
            "https://web.archive.org/web/20230101000000id_/example.com/page"
        );
    }

    #[test]
    fn test_backoff_bounds() {
        for attempt in 1..=4 {
            let delay = backoff(attempt);
            let base = Duration::from_millis(1 << attempt);
            assert!(delay >= base);
            assert!(delay < base + Duration::from_millis(2));
        }
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual(Some("text/html; charset=utf-8")));
        assert!(is_textual(Some("TEXT/PLAIN")));
        assert!(is_textual(Some("application/xhtml+xml")));
        assert!(!is_textual(Some("image/png")));
        assert!(!is_textual(None));
    }

    #[test]
    fn test_client_rejects_bad_auth_token() {
        let config = ArchiveConfig { cdx_auth_token: Some("bad\ntoken".into()), ..Default::default() };
        assert!(matches!(ArchiveClient::new(config), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_captures_from_local_index() {
        let body = b"20230101000000 AAA\n20230601000000 BBB\n";
        let (addr, _) = serve(http_response("200 OK", "text/plain", body)).await;
        let client = local_client(addr, 1_000_000);

        let captures = client.list_captures("example.com", "2023").await.unwrap();
        assert_eq!(captures.len(), 2);
        assert_eq!(captures[1].digest, "BBB");
    }

    #[tokio::test]
    async fn test_list_captures_empty_is_no_captures() {
        let (addr, _) = serve(http_response("200 OK", "text/plain", b"")).await;
        let client = local_client(addr, 1_000_000);
        assert!(matches!(
            client.list_captures("example.com", "2023").await,
            Err(Error::NoCaptures(_))
        ));
    }

    #[tokio::test]
    async fn test_list_captures_non_ok_is_http_error() {
        let (addr, _) = serve(http_response("503 Service Unavailable", "text/plain", b"busy")).await;
        let client = local_client(addr, 1_000_000);
        match client.list_captures("example.com", "2023").await {
            Err(Error::HttpError(msg)) => assert!(msg.contains("503")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_download_text_capture() {
        let (addr, _) = serve(http_response("200 OK", "text/html", b"<p>hello</p>")).await;
        let client = local_client(addr, 1_000_000);
        let body = client.download_capture("20230101000000", "example.com").await;
        assert_eq!(body.as_deref(), Some("<p>hello</p>"));
    }

    #[tokio::test]
    async fn test_download_skips_binary_capture() {
        let (addr, _) = serve(http_response("200 OK", "image/png", &[0x89, 0x50, 0x4e, 0x47])).await;
        let client = local_client(addr, 1_000_000);
        assert!(client.download_capture("20230101000000", "example.com/logo.png").await.is_none());
    }

    #[tokio::test]
    async fn test_download_truncates_at_ceiling() {
        let body = vec![b'a'; 5000];
        let (addr, _) = serve(http_response("200 OK", "text/plain", &body)).await;
        let client = local_client(addr, 1000);
        let text = client.download_capture("20230101000000", "example.com").await.unwrap();
        assert_eq!(text.len(), 1000);
    }

    #[tokio::test]
    async fn test_download_does_not_retry_http_errors() {
        let (addr, hits) = serve(http_response("404 Not Found", "text/html", b"missing")).await;
        let client = local_client(addr, 1_000_000);
        let body = client.download_capture("20230101000000", "example.com").await;
        assert_eq!(body.as_deref(), Some("missing"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_download_skips_binary_before_reading_body() {
        // Declares a large body but never sends it; reading it would time out.
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 5000000\r\n\r\n".to_vec();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let raw = raw.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(&raw).await;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                });
            }
        });

        let client = local_client(addr, 1_000_000);
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            client.download_capture("20230101000000", "example.com/big.png"),
        )
        .await;
        assert!(matches!(outcome, Ok(None)));
    }

    /// Drop the first `drops` connections unanswered, then serve `response`.
    async fn serve_after_drops(drops: usize, response: Vec<u8>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                if seen < drops {
                    drop(socket);
                    continue;
                }
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (addr, hits)
    }

    #[tokio::test]
    async fn test_download_recovers_after_transient_failures() {
        let (addr, hits) = serve_after_drops(2, http_response("200 OK", "text/plain", b"ok")).await;
        let client = local_client(addr, 1_000_000);

        let body = client.download_capture("20230101000000", "example.com").await;
        assert_eq!(body.as_deref(), Some("ok"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_download_gives_up_after_max_retries() {
        let (addr, hits) = serve_after_drops(usize::MAX, Vec::new()).await;
        let client = local_client(addr, 1_000_000);

        assert!(client.download_capture("20230101000000", "example.com").await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1 + client.config().max_retries as usize);
    }

    #[tokio::test]
    async fn test_download_gives_up_when_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = local_client(addr, 1_000_000);
        assert!(client.download_capture("20230101000000", "example.com").await.is_none());
    }

    fn encoded_response(encoding: &str, body: &[u8]) -> Vec<u8> {
        let mut raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Encoding: {encoding}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);
        raw
    }

    /// gzip of `<p>compressed capture</p>`.
    const GZIP_BODY: [u8; 45] = [
        0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xb3, 0x29, 0xb0, 0x4b, 0xce, 0xcf, 0x2d, 0x28,
        0x4a, 0x2d, 0x2e, 0x4e, 0x4d, 0x51, 0x48, 0x4e, 0x2c, 0x28, 0x29, 0x2d, 0x4a, 0xb5, 0xd1, 0x2f, 0xb0, 0x03,
        0x00, 0xe7, 0xe1, 0xc6, 0xbf, 0x19, 0x00, 0x00, 0x00,
    ];

    /// zlib-wrapped deflate of `<p>compressed capture</p>`.
    const DEFLATE_BODY: [u8; 33] = [
        0x78, 0x9c, 0xb3, 0x29, 0xb0, 0x4b, 0xce, 0xcf, 0x2d, 0x28, 0x4a, 0x2d, 0x2e, 0x4e, 0x4d, 0x51, 0x48, 0x4e,
        0x2c, 0x28, 0x29, 0x2d, 0x4a, 0xb5, 0xd1, 0x2f, 0xb0, 0x03, 0x00, 0x7b, 0x46, 0x09, 0x4d,
    ];

    #[tokio::test]
    async fn test_download_decodes_gzip() {
        let (addr, _) = serve(encoded_response("gzip", &GZIP_BODY)).await;
        let client = local_client(addr, 1_000_000);
        let body = client.download_capture("20230101000000", "example.com").await;
        assert_eq!(body.as_deref(), Some("<p>compressed capture</p>"));
    }

    #[tokio::test]
    async fn test_download_decodes_deflate() {
        let (addr, _) = serve(encoded_response("deflate", &DEFLATE_BODY)).await;
        let client = local_client(addr, 1_000_000);
        let body = client.download_capture("20230101000000", "example.com").await;
        assert_eq!(body.as_deref(), Some("<p>compressed capture</p>"));
    }
}
