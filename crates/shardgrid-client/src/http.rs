//! HTTP/1.1 REST client for a single API-server group.
//!
//! Every call opens its own connection:
//!
//! ```text
//!   TcpStream ──► TokioIo ──► http1::handshake ──► send_request
//!                                   │
//!                                   └── connection driven by a spawned task
//! ```
//!
//! Watch responses are newline-delimited JSON; a pump task decodes them
//! into [`WatchEvent`]s and feeds a channel watch until the body ends, the
//! `timeoutSeconds` deadline passes, or the consumer stops.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::{Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use shard_core::{ApiStatus, WatchEvent};
use shardgrid_watch::{BoxWatch, ObjectList, WatchSender, channel_watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};
use crate::request::{ListOptions, ResourcePath};
use crate::rest::RestClient;

const USER_AGENT: &str = "shardgrid-client/0.1";
const WATCH_BUFFER: usize = 64;
/// Grace period past `timeoutSeconds` before the client gives up on a watch.
const WATCH_DEADLINE_SLACK: Duration = Duration::from_secs(5);
/// Longest watch event line accepted.
pub const MAX_WATCH_FRAME: usize = 16 * 1024 * 1024;
/// Most of a refused watch's body kept for the error message.
const ERROR_BODY_LIMIT: usize = 64 * 1024;

pub struct HttpRestClient {
    base_url: String,
    authority: String,
    timeout: Duration,
}

impl HttpRestClient {
    /// A client for `base_url` (`http://host:port`). TLS is terminated in
    /// front of the API servers, so only plain `http` is accepted.
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let invalid = |reason: &str| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = base_url.parse().map_err(|_| invalid("not a valid URI"))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("scheme must be http"));
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let authority = match authority.port_u16() {
            Some(_) => authority.to_string(),
            None => format!("{}:80", authority.host()),
        };
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authority,
            timeout,
        })
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.base_url)
    }

    /// Connect, send one request and wait for the response head.
    async fn open(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<(&Value, &'static str)>,
    ) -> ClientResult<(SendRequest<Full<Bytes>>, Response<Incoming>)> {
        let url = self.url(path_and_query);
        let transport = |e: &dyn std::fmt::Display| ClientError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let exchange = async {
            let stream = tokio::net::TcpStream::connect(&self.authority)
                .await
                .map_err(|e| transport(&e))?;
            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| transport(&e))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let mut builder = Request::builder()
                .method(method)
                .uri(path_and_query)
                .header("host", &self.authority)
                .header("user-agent", USER_AGENT)
                .header("accept", "application/json");
            let payload = match body {
                Some((value, content_type)) => {
                    builder = builder.header("content-type", content_type);
                    Bytes::from(serde_json::to_vec(value)?)
                }
                None => Bytes::new(),
            };
            let req = builder.body(Full::new(payload)).map_err(|e| ClientError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;

            let resp = sender.send_request(req).await.map_err(|e| transport(&e))?;
            Ok::<_, ClientError>((sender, resp))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%url, "request timed out");
                Err(ClientError::Timeout { url })
            }
        }
    }

    /// A full request/response exchange with a JSON body.
    async fn call(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<(&Value, &'static str)>,
    ) -> ClientResult<Value> {
        let url = self.url(path_and_query);
        let started = Instant::now();
        let (_sender, resp) = self.open(method, path_and_query, body).await?;
        let status = resp.status();
        let remaining = self.timeout.saturating_sub(started.elapsed());
        let bytes = match tokio::time::timeout(remaining, resp.into_body().collect()).await {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(e)) => {
                return Err(ClientError::Transport {
                    url,
                    message: e.to_string(),
                });
            }
            Err(_) => return Err(ClientError::Timeout { url }),
        };
        if !status.is_success() {
            return Err(status_error(status, &bytes));
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl RestClient for HttpRestClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn list(&self, path: &ResourcePath, opts: &ListOptions) -> ClientResult<ObjectList<Value>> {
        let value = self
            .call(Method::GET, &with_query(path.collection(), &opts.query(false)), None)
            .await?;
        decode_list(value)
    }

    async fn watch(&self, path: &ResourcePath, opts: &ListOptions) -> ClientResult<BoxWatch<Value>> {
        let pq = with_query(path.collection(), &opts.query(true));
        let url = self.url(&pq);
        let (sender, resp) = self.open(Method::GET, &pq, None).await?;
        let status = resp.status();
        if !status.is_success() {
            let body = Limited::new(resp.into_body(), ERROR_BODY_LIMIT).collect();
            let bytes = match tokio::time::timeout(self.timeout, body).await {
                Ok(Ok(collected)) => collected.to_bytes(),
                Ok(Err(e)) => {
                    debug!(%url, error = %e, "watch error body discarded");
                    Bytes::new()
                }
                Err(_) => {
                    debug!(%url, "watch error body timed out");
                    Bytes::new()
                }
            };
            return Err(status_error(status, &bytes));
        }

        let deadline = opts
            .timeout_seconds
            .map(|secs| Instant::now() + Duration::from_secs(secs) + WATCH_DEADLINE_SLACK);
        let (watcher, tx) = channel_watch(WATCH_BUFFER);
        debug!(%url, "watch established");
        tokio::spawn(pump_watch(url, sender, resp.into_body(), deadline, tx));
        Ok(Box::new(watcher))
    }

    async fn get(&self, path: &ResourcePath, name: &str) -> ClientResult<Value> {
        self.call(Method::GET, &path.item(name), None).await
    }

    async fn create(&self, path: &ResourcePath, body: &Value) -> ClientResult<Value> {
        self.call(Method::POST, &path.collection(), Some((body, "application/json")))
            .await
    }

    async fn update(&self, path: &ResourcePath, name: &str, body: &Value) -> ClientResult<Value> {
        self.call(Method::PUT, &path.item(name), Some((body, "application/json")))
            .await
    }

    async fn patch(&self, path: &ResourcePath, name: &str, body: &Value) -> ClientResult<Value> {
        self.call(
            Method::PATCH,
            &path.item(name),
            Some((body, "application/merge-patch+json")),
        )
        .await
    }

    async fn delete(&self, path: &ResourcePath, name: &str) -> ClientResult<Value> {
        self.call(Method::DELETE, &path.item(name), None).await
    }
}

fn with_query(path: String, query: &str) -> String {
    if query.is_empty() { path } else { format!("{path}?{query}") }
}

fn status_error(status: StatusCode, body: &[u8]) -> ClientError {
    let message = match serde_json::from_slice::<ApiStatus>(body) {
        Ok(s) if !s.message.is_empty() => s.message,
        _ => String::from_utf8_lossy(body).trim().to_string(),
    };
    match status {
        StatusCode::FORBIDDEN => ClientError::Forbidden { message },
        StatusCode::GONE => ClientError::Gone { message },
        other => ClientError::Status {
            code: other.as_u16(),
            message,
        },
    }
}

fn decode_list(mut value: Value) -> ClientResult<ObjectList<Value>> {
    let resource_version = value
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let items = match value.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => return Err(ClientError::Decode("list items is not an array".to_string())),
    };
    Ok(ObjectList {
        items,
        resource_version,
    })
}

async fn pump_watch(
    url: String,
    // Held so the connection stays up while the body streams.
    _sender: SendRequest<Full<Bytes>>,
    mut body: Incoming,
    deadline: Option<Instant>,
    tx: WatchSender<Value>,
) {
    let mut decoder = EventDecoder::default();
    let expiry = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(expiry);

    loop {
        let frame = tokio::select! {
            _ = tx.stopped() => {
                debug!(%url, "watch stopped by consumer");
                return;
            }
            _ = &mut expiry => {
                debug!(%url, "watch deadline reached");
                return;
            }
            frame = body.frame() => frame,
        };
        match frame {
            None => break,
            Some(Err(e)) => {
                debug!(error = %e, %url, "watch stream failed");
                return;
            }
            Some(Ok(frame)) => {
                let Ok(data) = frame.into_data() else { continue };
                for event in decoder.push(&data) {
                    match event {
                        Ok(ev) => {
                            if !tx.send(ev).await {
                                return;
                            }
                        }
                        Err(e @ ClientError::FrameTooLarge { .. }) => {
                            warn!(error = %e, %url, "watch closed");
                            return;
                        }
                        Err(e) => warn!(error = %e, %url, "undecodable watch event skipped"),
                    }
                }
            }
        }
    }

    match decoder.finish() {
        Some(Ok(ev)) => {
            tx.send(ev).await;
        }
        Some(Err(e)) => warn!(error = %e, %url, "truncated watch event skipped"),
        None => {}
    }
    debug!(%url, "watch stream ended");
}

/// Splits a byte stream into newline-delimited watch events.
///
/// A line longer than the frame limit is reported once as
/// [`ClientError::FrameTooLarge`]; the decoder yields nothing after that.
pub struct EventDecoder {
    buf: BytesMut,
    // Bytes of `buf` already known to hold no newline.
    scanned: usize,
    max_frame: usize,
    overflowed: bool,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::with_max_frame(MAX_WATCH_FRAME)
    }
}

impl EventDecoder {
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_frame,
            overflowed: false,
        }
    }

    /// Feed a chunk; returns every complete line decoded so far.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ClientResult<WatchEvent<Value>>> {
        let mut events = Vec::new();
        if self.overflowed {
            return events;
        }
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') {
            let end = self.scanned + pos + 1;
            self.scanned = 0;
            if end - 1 > self.max_frame {
                return self.overflow(events);
            }
            let line = self.buf.split_to(end);
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        self.scanned = self.buf.len();
        if self.buf.len() > self.max_frame {
            return self.overflow(events);
        }
        events
    }

    /// Decode whatever remains after the stream ended without a newline.
    pub fn finish(&mut self) -> Option<ClientResult<WatchEvent<Value>>> {
        self.scanned = 0;
        let rest = self.buf.split();
        decode_line(&rest)
    }

    fn overflow(&mut self, mut events: Vec<ClientResult<WatchEvent<Value>>>) -> Vec<ClientResult<WatchEvent<Value>>> {
        self.overflowed = true;
        self.scanned = 0;
        self.buf = BytesMut::new();
        events.push(Err(ClientError::FrameTooLarge { limit: self.max_frame }));
        events
    }
}

fn decode_line(line: &[u8]) -> Option<ClientResult<WatchEvent<Value>>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_slice(line).map_err(ClientError::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpRestClient::new("https://10.0.0.1:6443", Duration::from_secs(1)).is_err());
        assert!(HttpRestClient::new("not a url", Duration::from_secs(1)).is_err());

        let client = HttpRestClient::new("http://10.0.0.1/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://10.0.0.1");
        assert_eq!(client.authority, "10.0.0.1:80");
    }

    #[test]
    fn decoder_handles_split_lines() {
        let mut decoder = EventDecoder::default();
        let first = decoder.push(b"{\"type\":\"ADDED\",\"object\":{\"a\":1}}\n{\"type\":\"MOD");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].as_ref().unwrap(), &WatchEvent::Added(json!({"a": 1})));

        let second = decoder.push(b"IFIED\",\"object\":{\"a\":2}}\n\n");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].as_ref().unwrap(), &WatchEvent::Modified(json!({"a": 2})));

        assert!(decoder.finish().is_none());
    }

    #[test]
    fn decoder_flushes_trailing_event() {
        let mut decoder = EventDecoder::default();
        assert!(decoder.push(b"{\"type\":\"DELETED\",\"object\":{}}").is_empty());
        assert!(matches!(decoder.finish(), Some(Ok(WatchEvent::Deleted(_)))));
    }

    #[test]
    fn decoder_rejects_oversized_lines() {
        let mut decoder = EventDecoder::with_max_frame(32);
        let events = decoder.push(b"{\"type\":\"DELETED\",\"object\":{}}\n{\"type\":\"ADDED\",");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Ok(WatchEvent::Deleted(_))));

        let events = decoder.push(b"\"object\":{\"padding\":\"xxxxxxxxxxxxxxxx\"}}");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap_err(), &ClientError::FrameTooLarge { limit: 32 });

        assert!(decoder.push(b"\n{\"type\":\"DELETED\",\"object\":{}}\n").is_empty());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn decoder_resumes_scanning_where_it_left_off() {
        let mut decoder = EventDecoder::default();
        for byte in b"{\"type\":\"ADDED\",\"object\":{\"a\":1}}" {
            assert!(decoder.push(&[*byte]).is_empty());
        }
        let events = decoder.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &WatchEvent::Added(json!({"a": 1})));
    }

    #[test]
    fn decoder_reports_garbage() {
        let mut decoder = EventDecoder::default();
        let events = decoder.push(b"not json\n");
        assert!(matches!(events[0], Err(ClientError::Decode(_))));
    }

    #[test]
    fn status_errors_use_api_message() {
        let body = br#"{"kind":"Status","code":403,"message":"no relationship found between node 'n1'"}"#;
        let err = status_error(StatusCode::FORBIDDEN, body);
        assert!(err.is_not_my_shard());

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, b"boom");
        assert_eq!(
            err,
            ClientError::Status {
                code: 500,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn list_decoding() {
        let list = decode_list(json!({
            "metadata": {"resourceVersion": "42"},
            "items": [{"metadata": {"name": "a"}}]
        }))
        .unwrap();
        assert_eq!(list.resource_version, "42");
        assert_eq!(list.items.len(), 1);

        let empty = decode_list(json!({"metadata": {}, "items": null})).unwrap();
        assert!(empty.items.is_empty());
    }
}
