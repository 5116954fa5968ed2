use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use tracing::{debug, warn};

use crate::errors::{Result, SegError};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_FETCH_BYTES: usize = 20 * 1024 * 1024;

/// Downloaded image body and the content type the server declared for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Where URL-sourced image bytes come from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}

/// Downloads images over HTTP(S) with a hard timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("voc-seg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SegError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> SegError {
        if err.is_timeout() {
            SegError::FetchTimeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            SegError::Fetch {
                url: url.to_string(),
                reason: "request failed".to_string(),
                source: Some(err),
            }
        }
    }
}

/// Parses `url` and accepts only the http and https schemes.
pub fn parse_image_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| SegError::fetch(url, format!("invalid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(SegError::fetch(url, format!("unsupported URL scheme `{other}`"))),
    }
}

#[async_trait]
impl ImageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage> {
        let parsed = parse_image_url(url)?;
        debug!(url, "downloading image");

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url, %status, "image download rejected");
            return Err(SegError::fetch(url, format!("server responded with {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            warn!(url, content_type = %content_type, "URL does not point to an image");
            return Err(SegError::fetch(
                url,
                format!("URL does not point to an image (content-type: `{content_type}`)"),
            ));
        }

        let declared = response.content_length();
        if let Some(length) = declared {
            if length > self.max_bytes as u64 {
                return Err(SegError::fetch(
                    url,
                    format!("image is {length} bytes, limit is {}", self.max_bytes),
                ));
            }
        }

        // Chunked responses carry no length, so the limit is enforced while reading.
        let capacity = declared.map_or(0, |length| length as usize);
        let mut bytes = Vec::with_capacity(capacity);
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(url, e))? {
            if bytes.len() + chunk.len() > self.max_bytes {
                warn!(url, limit = self.max_bytes, "image download exceeded the size limit");
                return Err(SegError::fetch(
                    url,
                    format!("image is larger than the {} byte limit", self.max_bytes),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(url, bytes = bytes.len(), content_type = %content_type, "image downloaded");
        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn response(status: &str, content_type: Option<&str>, body: &[u8]) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {status}\r\n");
        if let Some(content_type) = content_type {
            head.push_str(&format!("Content-Type: {content_type}\r\n"));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        ));
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    /// Serves a single canned HTTP response and returns its URL.
    async fn serve_once(raw: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&raw).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/image")
    }

    #[tokio::test]
    async fn test_fetch_returns_image_bytes() {
        let url = serve_once(response("200 OK", Some("image/png"), b"\x89PNG-ish")).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 1024).unwrap();

        let image = fetcher.fetch(&url).await.unwrap();
        assert_eq!(image.bytes, b"\x89PNG-ish".to_vec());
        assert_eq!(image.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_image_content() {
        let url = serve_once(response(
            "200 OK",
            Some("text/html; charset=utf-8"),
            b"<html></html>",
        ))
        .await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 1024).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err.kind(), "FetchError");
        assert!(err.to_string().contains("does not point to an image"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_missing_content_type() {
        let url = serve_once(response("200 OK", None, b"\xff\xd8\xff")).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 1024).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, SegError::Fetch { .. }));
        assert!(err.to_string().contains("does not point to an image"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status() {
        let url = serve_once(response("404 Not Found", Some("image/png"), b"missing")).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 1024).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, SegError::Fetch { .. }));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_refused_connection_is_a_fetch_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(Duration::from_secs(5), 1024).unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/gone.png"))
            .await
            .unwrap_err();

        assert!(matches!(err, SegError::Fetch { .. }));
        assert!(err.is_input_error());
    }

    #[tokio::test]
    async fn test_fetch_enforces_size_limit() {
        let url = serve_once(response("200 OK", Some("image/jpeg"), &[0u8; 64])).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 16).unwrap();

        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(SegError::Fetch { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_stops_endless_chunked_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let head = "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nTransfer-Encoding: chunked\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let mut chunk = b"400\r\n".to_vec();
            chunk.extend_from_slice(&[0u8; 0x400]);
            chunk.extend_from_slice(b"\r\n");
            // Never sends the terminating chunk.
            while socket.write_all(&chunk).await.is_ok() {}
        });

        let fetcher = HttpFetcher::new(Duration::from_secs(10), 4096).unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/stream.jpg"))
            .await
            .unwrap_err();

        assert!(matches!(err, SegError::Fetch { .. }));
        assert!(err.to_string().contains("larger than"));
    }

    #[tokio::test]
    async fn test_fetch_times_out_on_stalled_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let fetcher = HttpFetcher::new(Duration::from_millis(200), 1024).unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/slow.jpg"))
            .await
            .unwrap_err();

        assert!(matches!(err, SegError::FetchTimeout { .. }));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_parse_image_url_schemes() {
        assert!(parse_image_url("https://example.com/cat.jpg").is_ok());
        assert!(parse_image_url("http://example.com/cat.jpg").is_ok());
        assert!(parse_image_url("ftp://example.com/cat.jpg").is_err());
        assert!(parse_image_url("file:///etc/passwd").is_err());
        assert!(parse_image_url("not a url").is_err());
    }
}
