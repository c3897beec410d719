//! Chunk transport seam and the HTTP implementation.
//!
//! The endpoint appends each decoded chunk to the named file and answers
//! with a JSON body; `{"error": "..."}` marks a rejected chunk even on a
//! 2xx status.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chunkup_protocol::ChunkRequest;
use reqwest::Method;
use tracing::debug;

/// Future returned by [`ChunkTransport::send_chunk`].
pub type SendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, TransportError>> + Send + 'a>>;

/// Sends one chunk and yields the endpoint's opaque JSON payload.
///
/// Implemented by [`HttpTransport`]; tests substitute scripted mocks.
pub trait ChunkTransport: Send + Sync {
    fn send_chunk<'a>(&'a self, chunk: &'a ChunkRequest) -> SendFuture<'a>;
}

/// A failed chunk send.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned status {status}")]
    Status {
        status: u16,
        payload: Option<serde_json::Value>,
    },

    #[error("chunk rejected: {message}")]
    Rejected {
        message: String,
        payload: serde_json::Value,
    },

    #[error("invalid upload method: {0}")]
    InvalidMethod(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Body returned alongside the failure, if any.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Status { payload, .. } => payload.as_ref(),
            Self::Rejected { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

/// Posts chunks as URL-encoded forms.
pub struct HttpTransport {
    http: reqwest::Client,
    url: String,
    method: Method,
}

impl HttpTransport {
    /// Creates a transport for `url` using `method` (e.g. `"POST"`).
    pub fn new(url: &str, method: &str, timeout: Duration) -> Result<Self, TransportError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| TransportError::InvalidMethod(method.to_string()))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            method,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ChunkTransport for HttpTransport {
    fn send_chunk<'a>(&'a self, chunk: &'a ChunkRequest) -> SendFuture<'a> {
        Box::pin(async move {
            let resp = self
                .http
                .request(self.method.clone(), &self.url)
                .form(chunk)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.bytes().await?;
            let payload: Option<serde_json::Value> = serde_json::from_slice(&body).ok();

            debug!(
                file_id = chunk.file_id,
                part = chunk.current_part,
                status = status.as_u16(),
                "chunk response"
            );

            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    payload,
                });
            }

            let payload = payload.unwrap_or(serde_json::Value::Null);
            if let Some(err) = payload.get("error") {
                let message = err
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                return Err(TransportError::Rejected { message, payload });
            }
            Ok(payload)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one HTTP request with `status` and `body`, returning the raw
    /// request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = sock.read(&mut buf).await.unwrap();
                req.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&req).to_string();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if req.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&req).to_string()
        });
        (format!("http://{addr}/upload"), handle)
    }

    fn sample_chunk() -> ChunkRequest {
        ChunkRequest {
            file_id: 1,
            retries: 0,
            file_name: "photo.jpg".into(),
            current_part: 1,
            total_parts: 2,
            data: b"hi".to_vec(),
        }
    }

    #[tokio::test]
    async fn posts_form_and_returns_payload() {
        let (url, server) = serve_once("200 OK", r#"{"success":"ok"}"#).await;
        let transport = HttpTransport::new(&url, "post", Duration::from_secs(5)).unwrap();

        let payload = transport.send_chunk(&sample_chunk()).await.unwrap();
        assert_eq!(payload["success"], "ok");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /upload"));
        assert!(request.contains("fileId=1"));
        assert!(request.contains("fileName=photo.jpg"));
        assert!(request.contains("currentPart=1"));
        assert!(request.contains("totalParts=2"));
        assert!(request.contains("base64%2CaGk%3D"));
    }

    #[tokio::test]
    async fn error_body_is_rejection() {
        let (url, _server) = serve_once("200 OK", r#"{"error":"disk full"}"#).await;
        let transport = HttpTransport::new(&url, "POST", Duration::from_secs(5)).unwrap();

        let err = transport.send_chunk(&sample_chunk()).await.unwrap_err();
        assert!(matches!(err, TransportError::Rejected { ref message, .. } if message == "disk full"));
        assert_eq!(err.payload().unwrap()["error"], "disk full");
    }

    #[tokio::test]
    async fn non_success_status_fails() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"oops":1}"#).await;
        let transport = HttpTransport::new(&url, "POST", Duration::from_secs(5)).unwrap();

        let err = transport.send_chunk(&sample_chunk()).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 500, .. }));
        assert_eq!(err.payload().unwrap()["oops"], 1);
    }

    #[test]
    fn invalid_method_rejected() {
        let err = HttpTransport::new("http://localhost/", "NOT A METHOD", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::InvalidMethod(_)));
    }
}
