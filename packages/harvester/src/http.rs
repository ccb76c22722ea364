//! HTTP plumbing shared by all connectors.
//!
//! Every connector owns one [`ApiClient`]. The client carries the
//! connector's throttle, so rate limits are tracked per instance rather
//! than process-wide.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_DISPOSITION;
use serde::de::DeserializeOwned;

use crate::config::{
    CHUNK_SIZE, DOWNLOAD_MAX_ATTEMPTS, DOWNLOAD_RETRY_BASE_DELAY, DOWNLOAD_TIMEOUT_SECS,
    HTTP_TIMEOUT_SECS,
};
use crate::error::{HarvesterError, Result};
use crate::storage::numbered_file_name;

/// User agent string identifying this harvester.
const USER_AGENT: &str = concat!("qdarchive-harvester/", env!("CARGO_PKG_VERSION"));

/// Maximum number of attempts for API calls hitting transient failures.
const API_MAX_ATTEMPTS: u32 = 3;

/// Base delay for API call backoff.
const API_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Create a configured HTTP client.
pub fn create_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Enforces a minimum gap between consecutive requests.
///
/// The gap is measured from the end of the previous request, so slow
/// responses do not eat into the pause the source asked for.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Sleep until the minimum interval since the last request has passed.
    pub fn wait(&self) {
        let last = *self.lock();
        if let Some(last) = last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let pause = self.min_interval - elapsed;
                tracing::trace!(pause_ms = pause.as_millis() as u64, "Throttling request");
                thread::sleep(pause);
            }
        }
    }

    /// Record that a request just finished.
    pub fn mark(&self) {
        *self.lock() = Some(Instant::now());
    }

    fn lock(&self) -> MutexGuard<'_, Option<Instant>> {
        // A poisoned timestamp is still a usable timestamp.
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy for API calls: 3 attempts, 500ms then 1s.
    pub const fn api() -> Self {
        Self {
            max_attempts: API_MAX_ATTEMPTS,
            base_delay: API_RETRY_BASE_DELAY,
        }
    }

    /// Policy for file downloads: 3 attempts, 2s then 4s.
    pub const fn download() -> Self {
        Self {
            max_attempts: DOWNLOAD_MAX_ATTEMPTS,
            base_delay: DOWNLOAD_RETRY_BASE_DELAY,
        }
    }

    /// Delay before the given attempt (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_delay * (1u32 << (attempt - 2).min(16))
    }
}

/// Tunables for one connector's HTTP traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub min_interval: Duration,
    pub timeout: Duration,
    pub download_timeout: Duration,
    pub api_retry: RetryPolicy,
    pub download_retry: RetryPolicy,
}

impl HttpSettings {
    /// Production settings with the given minimum request interval.
    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DOWNLOAD_TIMEOUT_SECS),
            api_retry: RetryPolicy::api(),
            download_retry: RetryPolicy::download(),
        }
    }

    /// No throttling and no backoff pauses. Used against local mock servers.
    pub fn immediate() -> Self {
        let no_wait = |max_attempts| RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
        };
        Self {
            min_interval: Duration::ZERO,
            timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(10),
            api_retry: no_wait(API_MAX_ATTEMPTS),
            download_retry: no_wait(DOWNLOAD_MAX_ATTEMPTS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client bundled with one connector's throttle and retry policies.
#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    throttle: Throttle,
    settings: HttpSettings,
}

impl ApiClient {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings.timeout)?,
            throttle: Throttle::new(settings.min_interval),
            settings,
        })
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// GET a JSON document with query parameters.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let body = self.send_with_retry(url, || self.client.get(url).query(query))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST a JSON body and decode the JSON answer.
    pub fn post_json<T: DeserializeOwned>(&self, url: &str, body: &serde_json::Value) -> Result<T> {
        let payload = serde_json::to_vec(body)?;
        let body = self.send_with_retry(url, || {
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.clone())
        })?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send a request and read its body, retrying server errors and
    /// connection failures.
    ///
    /// The throttle is marked once the body has been read. Client errors
    /// (4xx) are returned immediately as [`HarvesterError::HttpStatus`].
    fn send_with_retry(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<String> {
        let policy = self.settings.api_retry;
        let mut last_error: Option<String> = None;

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after delay");
                thread::sleep(delay);
            }

            self.throttle.wait();
            let outcome = build().send().and_then(|response| {
                let status = response.status();
                if status.is_success() {
                    response.text().map(|body| (status, Some(body)))
                } else {
                    Ok((status, None))
                }
            });
            self.throttle.mark();

            match outcome {
                Ok((status, body)) => {
                    if status.is_server_error() {
                        tracing::warn!(
                            %url,
                            status = %status,
                            attempt,
                            max_attempts = policy.max_attempts,
                            "Server error, will retry"
                        );
                        last_error = Some(format!("HTTP {status} for {url}"));
                        continue;
                    }

                    return body.ok_or_else(|| HarvesterError::HttpStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!(
                            %url,
                            error = %e,
                            attempt,
                            max_attempts = policy.max_attempts,
                            "Connection error, will retry"
                        );
                        last_error = Some(e.to_string());
                        continue;
                    }
                    return Err(HarvesterError::Http(e));
                }
            }
        }

        Err(HarvesterError::RetriesExhausted {
            attempts: policy.max_attempts,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// Stream `url` into `dest_dir`, returning the local path.
    ///
    /// The file name is `filename` when given, else the `Content-Disposition`
    /// header, else the last URL segment. Connection-level failures are
    /// retried with exponential backoff; HTTP error statuses are not.
    pub fn download(&self, url: &str, dest_dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
        let policy = self.settings.download_retry;
        let mut last_error: Option<String> = None;

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                tracing::warn!(
                    %url,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_secs = delay.as_secs_f64(),
                    "Retrying download"
                );
                thread::sleep(delay);
            }

            self.throttle.wait();
            let outcome = self.try_download(url, dest_dir, filename);
            self.throttle.mark();

            match outcome {
                Ok(path) => {
                    tracing::info!(%url, path = %path.display(), "Downloaded");
                    return Ok(path);
                }
                Err(DownloadFailure::Transient(message)) => {
                    tracing::warn!(%url, attempt, error = %message, "Download attempt failed");
                    last_error = Some(message);
                }
                Err(DownloadFailure::Fatal(e)) => return Err(e),
            }
        }

        Err(HarvesterError::RetriesExhausted {
            attempts: policy.max_attempts,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    fn try_download(
        &self,
        url: &str,
        dest_dir: &Path,
        filename: Option<&str>,
    ) -> std::result::Result<PathBuf, DownloadFailure> {
        let mut response = match self
            .client
            .get(url)
            .timeout(self.settings.download_timeout)
            .send()
        {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Err(DownloadFailure::Transient(e.to_string()))
            }
            Err(e) => return Err(DownloadFailure::Fatal(e.into())),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadFailure::Fatal(HarvesterError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }));
        }

        let name = filename
            .and_then(sanitize_filename)
            .or_else(|| {
                response
                    .headers()
                    .get(CONTENT_DISPOSITION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(filename_from_content_disposition)
            })
            .or_else(|| filename_from_url(url))
            .unwrap_or_else(|| "download".to_string());

        fs::create_dir_all(dest_dir).map_err(|e| DownloadFailure::Fatal(e.into()))?;
        let final_path = free_path(dest_dir, &name);
        let part_path = dest_dir.join(format!("{name}.part"));

        let result = stream_to_file(&mut response, &part_path);
        if result.is_err() {
            let _ = fs::remove_file(&part_path);
        }
        result?;

        promote_part(&part_path, &final_path)?;
        Ok(final_path)
    }
}

/// Move a finished `.part` file into place, removing it if the move fails.
fn promote_part(part_path: &Path, final_path: &Path) -> std::result::Result<(), DownloadFailure> {
    fs::rename(part_path, final_path).map_err(|e| {
        let _ = fs::remove_file(part_path);
        DownloadFailure::Fatal(e.into())
    })
}

/// `dir/name`, or the first numbered variant of `name` not yet on disk.
fn free_path(dir: &Path, name: &str) -> PathBuf {
    let mut path = dir.join(name);
    let mut n = 1;
    while path.exists() {
        n += 1;
        path = dir.join(numbered_file_name(name, n));
    }
    path
}

enum DownloadFailure {
    /// Worth another attempt (connect, timeout, body read errors).
    Transient(String),
    Fatal(HarvesterError),
}

fn stream_to_file(response: &mut Response, path: &Path) -> std::result::Result<(), DownloadFailure> {
    let mut file = File::create(path).map_err(|e| DownloadFailure::Fatal(e.into()))?;
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = response
            .read(&mut buffer)
            .map_err(|e| DownloadFailure::Transient(format!("read error: {e}")))?;
        if read == 0 {
            break;
        }
        file.write_all(&buffer[..read])
            .map_err(|e| DownloadFailure::Fatal(e.into()))?;
    }

    file.flush().map_err(|e| DownloadFailure::Fatal(e.into()))
}

/// Extract a file name from a `Content-Disposition` header value.
///
/// Handles `filename="name"`, bare `filename=name` and RFC 5987
/// `filename*=UTF-8''name`, preferring the latter.
///
/// # Examples
/// ```
/// use qdarchive_harvester::http::filename_from_content_disposition;
///
/// assert_eq!(
///     filename_from_content_disposition(r#"attachment; filename="data.csv""#),
///     Some("data.csv".to_string())
/// );
/// assert_eq!(filename_from_content_disposition("inline"), None);
/// ```
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.rsplit("''").next().unwrap_or(value);
                extended = urlencoding::decode(encoded.trim_matches('"'))
                    .ok()
                    .map(|s| s.into_owned());
            }
            "filename" => plain = Some(value.trim().trim_matches('"').trim_matches('\'').to_string()),
            _ => {}
        }
    }

    extended.or(plain).and_then(|name| sanitize_filename(&name))
}

/// Derive a file name from the last path segment of a URL.
pub fn filename_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let tail = without_query.trim_end_matches('/').rsplit('/').next()?;
    let decoded = urlencoding::decode(tail).map(|s| s.into_owned()).unwrap_or_else(|_| tail.to_string());
    sanitize_filename(&decoded)
}

/// Make a source-provided name safe to use as a single path component.
///
/// Path separators become underscores; empty names and dot-only names are
/// rejected.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    #[test]
    fn test_create_client() {
        let client = create_client(Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_retry_delays_double() {
        let policy = RetryPolicy::download();
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
    }

    #[test]
    fn test_throttle_spaces_requests() {
        let throttle = Throttle::new(Duration::from_millis(40));
        throttle.wait(); // first request never waits
        throttle.mark();

        let start = Instant::now();
        throttle.wait();
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_throttle_zero_interval() {
        let throttle = Throttle::new(Duration::ZERO);
        throttle.mark();
        let start = Instant::now();
        throttle.wait();
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[test]
    fn test_content_disposition_quoted() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="test_data.qdpx""#),
            Some("test_data.qdpx".to_string())
        );
    }

    #[test]
    fn test_content_disposition_bare_and_extended() {
        assert_eq!(
            filename_from_content_disposition("attachment; filename=notes.txt"),
            Some("notes.txt".to_string())
        );
        assert_eq!(
            filename_from_content_disposition(
                "attachment; filename=\"fallback.txt\"; filename*=UTF-8''Interview%20%C3%A9t%C3%A9.txt"
            ),
            Some("Interview été.txt".to_string())
        );
    }

    #[test]
    fn test_content_disposition_missing() {
        assert_eq!(filename_from_content_disposition("attachment"), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://data.qdr.syr.edu/api/access/datafile/99999"),
            Some("99999".to_string())
        );
        assert_eq!(
            filename_from_url("https://zenodo.org/api/records/1/files/study%20a.qdpx/content?download=1"),
            Some("content".to_string())
        );
        assert_eq!(
            filename_from_url("https://example.org/files/study%20a.qdpx"),
            Some("study a.qdpx".to_string())
        );
    }

    /// Accept `connections` connections, answering each with `head`, then
    /// `body` after `pause`. Joins to the number of connections served.
    fn scripted_server(
        connections: usize,
        head: &'static str,
        body: &'static [u8],
        pause: Duration,
    ) -> (String, thread::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/data", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut served = 0;
            for stream in listener.incoming().take(connections) {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).unwrap() > 2 {
                    line.clear();
                }
                stream.write_all(head.as_bytes()).unwrap();
                stream.flush().unwrap();
                thread::sleep(pause);
                let _ = stream.write_all(body);
                served += 1;
            }
            served
        });
        (url, handle)
    }

    #[test]
    fn test_throttle_interval_starts_after_body() {
        let (url, server) = scripted_server(
            2,
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n",
            b"{}",
            Duration::from_millis(300),
        );
        let settings = HttpSettings {
            min_interval: Duration::from_millis(200),
            ..HttpSettings::immediate()
        };
        let client = ApiClient::new(settings).unwrap();

        let start = Instant::now();
        let _: serde_json::Value = client.get_json(&url, &[]).unwrap();
        let _: serde_json::Value = client.get_json(&url, &[]).unwrap();

        // Two slow bodies plus one full interval between them.
        assert!(start.elapsed() >= Duration::from_millis(750));
        assert_eq!(server.join().unwrap(), 2);
    }

    #[test]
    fn test_download_retries_truncated_body() {
        let (url, server) = scripted_server(
            3,
            "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n",
            b"partial",
            Duration::ZERO,
        );
        let client = ApiClient::new(HttpSettings::immediate()).unwrap();
        let tmp = tempfile::tempdir().unwrap();

        let err = client.download(&url, tmp.path(), Some("data.txt")).unwrap_err();

        assert!(matches!(err, HarvesterError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(server.join().unwrap(), 3);
        assert!(!tmp.path().join("data.txt").exists());
        assert!(!tmp.path().join("data.txt.part").exists());
    }

    #[test]
    fn test_failed_promotion_removes_part_file() {
        let tmp = tempfile::tempdir().unwrap();
        let part = tmp.path().join("a.txt.part");
        fs::write(&part, b"bytes").unwrap();

        let result = promote_part(&part, &tmp.path().join("missing").join("a.txt"));

        assert!(result.is_err());
        assert!(!part.exists());
    }

    #[test]
    fn test_free_path_never_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(free_path(tmp.path(), "a.txt"), tmp.path().join("a.txt"));

        fs::write(tmp.path().join("a.txt"), b"first").unwrap();
        fs::write(tmp.path().join("a_2.txt"), b"second").unwrap();
        assert_eq!(free_path(tmp.path(), "a.txt"), tmp.path().join("a_3.txt"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("data/raw/a.txt"), Some("data_raw_a.txt".to_string()));
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("  "), None);
    }
}
