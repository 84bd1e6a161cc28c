use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::outcome::{decode_describe, decode_recognize, Confident, RecognitionOutcome};
use crate::config::EngineConfig;
use crate::error::RecognitionError;
use crate::payload::ImagePayload;
use crate::redact::redact_for_log;

/// Backend seam used by the workflow
///
/// Both calls are single-shot; implementations must resolve within a bounded
/// time instead of hanging.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: &ImagePayload) -> Result<RecognitionOutcome, RecognitionError>;

    async fn describe(&self, object_name: &str) -> Result<Confident, RecognitionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
struct RecognizeRequest {
    image: String,
}

#[derive(Serialize)]
struct DescribeRequest<'a> {
    object_name: &'a str,
}

const RECOGNIZE_PATH: &str = "/api/recognize";
const DESCRIBE_PATH: &str = "/api/describe";
const HEALTH_PATH: &str = "/api/health";

/// Upper bound for the health check, independent of the request timeout
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Server root for `base_url`, dropping a trailing endpoint path if the
/// configured URL points at one
fn server_root(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    [RECOGNIZE_PATH, DESCRIBE_PATH, HEALTH_PATH]
        .iter()
        .find_map(|path| base.strip_suffix(*path))
        .unwrap_or(base)
        .trim_end_matches('/')
        .to_string()
}

/// JSON-over-HTTP recognizer
pub struct HttpRecognizer {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl HttpRecognizer {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: server_root(&config.base_url),
            bearer_token: config.bearer_token.clone().filter(|t| !t.is_empty()),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> RecognitionError {
        self.transport_error_within(url, e, self.timeout)
    }

    fn transport_error_within(&self, url: &str, e: reqwest::Error, timeout: Duration) -> RecognitionError {
        if e.is_timeout() {
            RecognitionError::Transport(format!("{} timed out after {:?}", url, timeout))
        } else {
            RecognitionError::Transport(format!("{}: {}", url, e))
        }
    }

    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(u16, String), RecognitionError> {
        let url = self.endpoint(path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        tracing::info!("POST {}", url);
        let start = Instant::now();
        let response = request.send().await.map_err(|e| self.transport_error(&url, e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.transport_error(&url, e))?;
        tracing::info!("POST {} -> {} in {}ms", url, status, start.elapsed().as_millis());
        tracing::debug!("Response body: {}", redact_for_log(&text, 800));
        Ok((status, text))
    }

    pub async fn health(&self) -> Result<HealthStatus, RecognitionError> {
        let url = self.endpoint(HEALTH_PATH);
        let timeout = self.timeout.min(HEALTH_TIMEOUT);
        let mut request = self.client.get(&url).timeout(timeout);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error_within(&url, e, timeout))?;
        if !response.status().is_success() {
            return Err(RecognitionError::Server(format!(
                "health check returned {}",
                response.status()
            )));
        }
        response
            .json::<HealthStatus>()
            .await
            .map_err(|e| RecognitionError::Protocol(format!("bad health response: {}", e)))
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, image: &ImagePayload) -> Result<RecognitionOutcome, RecognitionError> {
        tracing::info!(
            "Submitting image: {} bytes, {}",
            image.len(),
            image.media_type()
        );
        let body = RecognizeRequest {
            image: image.to_data_url(),
        };
        let (status, text) = self.post_json(RECOGNIZE_PATH, &body).await?;
        let outcome = decode_recognize(status, &text);
        match &outcome {
            Ok(o) => tracing::info!("Recognition outcome: {}", o.kind()),
            Err(e) => tracing::warn!("Recognition failed: {}", e),
        }
        outcome
    }

    async fn describe(&self, object_name: &str) -> Result<Confident, RecognitionError> {
        let (status, text) = self
            .post_json(DESCRIBE_PATH, &DescribeRequest { object_name })
            .await?;
        decode_describe(status, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::MediaType;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        if key.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    /// One-shot HTTP server; the handle yields the raw request it saw
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    fn recognizer_for(base_url: String) -> HttpRecognizer {
        let config = EngineConfig {
            base_url,
            ..EngineConfig::default()
        };
        HttpRecognizer::new(&config).unwrap()
    }

    fn tiny_payload() -> ImagePayload {
        ImagePayload::new(vec![0xff, 0xd8, 0xff], MediaType::Jpeg, 1, 1)
    }

    #[tokio::test]
    async fn recognize_posts_data_url_and_decodes_outcome() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"success":true,"result":{"object_name":"cat","description":"A fluffy friend"}}"#,
        )
        .await;

        let outcome = recognizer_for(base).recognize(&tiny_payload()).await.unwrap();
        assert!(matches!(outcome, RecognitionOutcome::Confident(ref c) if c.object_name == "cat"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/recognize "));
        assert!(request.contains(r#""image":"data:image/jpeg;base64,/9j/""#));
    }

    #[tokio::test]
    async fn http_error_status_maps_to_server_error_with_message() {
        let (base, _server) = serve_once(
            "400 Bad Request",
            r#"{"success":false,"error":"No image provided! Please send a photo."}"#,
        )
        .await;

        let err = recognizer_for(base).recognize(&tiny_payload()).await.unwrap_err();
        assert_eq!(
            err,
            RecognitionError::Server("No image provided! Please send a photo.".into())
        );
    }

    #[tokio::test]
    async fn describe_posts_object_name() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"success":true,"result":{"object_name":"fox","description":"A clever orange animal"}}"#,
        )
        .await;

        let confident = recognizer_for(base).describe("fox").await.unwrap();
        assert_eq!(confident.object_name, "fox");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/describe "));
        assert!(request.contains(r#"{"object_name":"fox"}"#));
    }

    #[tokio::test]
    async fn bearer_token_is_sent_when_configured() {
        let (base, server) = serve_once("200 OK", r#"{"status":"healthy","message":"ready"}"#).await;
        let config = EngineConfig {
            base_url: base,
            bearer_token: Some("s3cret".into()),
            ..EngineConfig::default()
        };

        let health = HttpRecognizer::new(&config).unwrap().health().await.unwrap();
        assert_eq!(health.status, "healthy");

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /api/health "));
        assert!(request.contains("authorization: bearer s3cret"));
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = recognizer_for(format!("http://{}", addr))
            .recognize(&tiny_payload())
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Transport(_)));
    }

    #[tokio::test]
    async fn silent_server_times_out_as_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let config = EngineConfig {
            base_url: format!("http://{}", addr),
            request_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let err = HttpRecognizer::new(&config)
            .unwrap()
            .describe("owl")
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Transport(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn health_check_gives_up_before_the_request_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let start = Instant::now();
        let err = recognizer_for(format!("http://{}", addr))
            .health()
            .await
            .unwrap_err();
        assert!(matches!(err, RecognitionError::Transport(ref m) if m.contains("timed out")));
        assert!(start.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn every_endpoint_joins_onto_the_server_root() {
        let r = recognizer_for("http://host:5000/api/recognize/".into());
        assert_eq!(r.endpoint(RECOGNIZE_PATH), "http://host:5000/api/recognize");
        assert_eq!(r.endpoint(DESCRIBE_PATH), "http://host:5000/api/describe");
        assert_eq!(r.endpoint(HEALTH_PATH), "http://host:5000/api/health");

        let r = recognizer_for("http://host:5000".into());
        assert_eq!(r.endpoint(DESCRIBE_PATH), "http://host:5000/api/describe");

        let r = recognizer_for("http://host:5000/detective/".into());
        assert_eq!(r.endpoint(RECOGNIZE_PATH), "http://host:5000/detective/api/recognize");
    }
}
