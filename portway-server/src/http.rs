//! The HTTP/1.1 connection adapter: reads a request off a `tokio` socket,
//! parses it with `httparse`, and writes a response back with the
//! `itoa`-based fast-path formatting the teacher's
//! `ando-proxy/src/proxy.rs::build_response`/`build_upstream_request` use.
//! Adapted from `ando-proxy/src/connection.rs`'s buffer-reuse keepalive loop
//! to tokio's `AsyncReadExt`/`AsyncWriteExt` — see DESIGN.md for the
//! monoio-to-tokio worker-model adaptation this is part of.
//!
//! Unlike the teacher, request and response bodies here are fully buffered
//! rather than streamed: the Backend Dispatcher hands a complete `Vec<u8>`
//! to `reqwest`, so there is no benefit to the teacher's partial-read/
//! partial-write upstream relay and considerable complexity cost.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use portway_core::context::{Request, Response};
use portway_core::entities::HttpMethod;
use portway_core::snapshot::SnapshotHandle;

use crate::oauth2_endpoint;
use crate::pipeline::{self, PipelineDeps};

const MAX_HEADER_BYTES: usize = 64 * 1024;
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
const MAX_HEADERS: usize = 64;

struct ParsedRequest {
    method: String,
    path: String,
    query: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    keep_alive: bool,
}

/// Reads and parses exactly one HTTP/1.1 request from `buf`, growing it from
/// `stream` as needed. Returns `None` on a clean EOF before any bytes of a
/// new request arrive (the ordinary end of a keepalive connection).
async fn read_request(stream: &mut TcpStream, buf: &mut Vec<u8>) -> anyhow::Result<Option<ParsedRequest>> {
    let mut filled = 0usize;
    let header_end = loop {
        if filled == buf.len() {
            if buf.len() >= MAX_HEADER_BYTES {
                anyhow::bail!("request header exceeds {MAX_HEADER_BYTES} bytes");
            }
            buf.resize((buf.len() * 2).max(4096).min(MAX_HEADER_BYTES), 0);
        }
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            anyhow::bail!("connection closed mid-request");
        }
        filled += n;

        let mut headers_raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers_raw);
        match req.parse(&buf[..filled])? {
            httparse::Status::Complete(offset) => break offset,
            httparse::Status::Partial => continue,
        }
    };

    let mut headers_raw = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers_raw);
    let _ = req.parse(&buf[..filled])?;

    let method = req.method.unwrap_or("GET").to_string();
    let raw_path = req.path.unwrap_or("/").to_string();
    let (path, query) = match raw_path.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (raw_path, String::new()),
    };

    let mut headers = Vec::with_capacity(req.headers.len());
    let mut content_length: usize = 0;
    let mut keep_alive = true;
    for h in req.headers.iter() {
        if h.name.is_empty() {
            break;
        }
        let value = String::from_utf8_lossy(h.value).into_owned();
        if h.name.eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse().unwrap_or(0);
        } else if h.name.eq_ignore_ascii_case("connection") {
            keep_alive = !value.eq_ignore_ascii_case("close");
        }
        headers.push((h.name.to_string(), value));
    }

    if content_length > MAX_BODY_BYTES {
        anyhow::bail!("request body exceeds {MAX_BODY_BYTES} bytes");
    }

    let needed = header_end + content_length;
    while buf.len() < needed {
        buf.resize(needed, 0);
    }
    while filled < needed {
        let n = stream.read(&mut buf[filled..needed]).await?;
        if n == 0 {
            anyhow::bail!("connection closed while reading request body");
        }
        filled += n;
    }

    let body = buf[header_end..needed].to_vec();
    // Shift any pipelined bytes already read for the next request to the
    // front — HTTP/1.1 keepalive clients may send the next request before
    // this one's response goes out.
    buf.copy_within(needed..filled, 0);
    buf.truncate(filled - needed);

    Ok(Some(ParsedRequest { method, path, query, headers, body, keep_alive }))
}

fn write_response(buf: &mut Vec<u8>, response: &Response, keep_alive: bool) {
    buf.clear();
    buf.extend_from_slice(b"HTTP/1.1 ");
    let mut itoa_buf = itoa::Buffer::new();
    buf.extend_from_slice(itoa_buf.format(response.status).as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(status_text(response.status).as_bytes());
    buf.extend_from_slice(b"\r\ncontent-length: ");
    buf.extend_from_slice(itoa_buf.format(response.body.len()).as_bytes());
    buf.extend_from_slice(b"\r\nconnection: ");
    buf.extend_from_slice(if keep_alive { b"keep-alive" } else { b"close" });
    buf.extend_from_slice(b"\r\n");
    for (name, value) in &response.headers {
        if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
            continue;
        }
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&response.body);
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

fn bad_request_response(message: &str) -> Response {
    let mut response = Response {
        status: 400,
        headers: Vec::new(),
        body: format!(r#"{{"reason":"tokenMalformed","message":"{message}"}}"#).into_bytes(),
    };
    response.set_header("content-type", "application/json");
    response
}

/// Prometheus text exposition, served directly off the gateway listener at
/// `[observability].metrics_path` — the teacher serves this from its admin
/// API, which this gateway's Non-goals exclude, so the data-plane listener
/// is the substitute.
fn metrics_response(deps: &PipelineDeps) -> Response {
    let mut response = Response { status: 200, headers: Vec::new(), body: deps.metrics.gather_text().into_bytes() };
    response.set_header("content-type", "text/plain; version=0.0.4");
    response
}

/// Handles one accepted connection end-to-end: parses requests in a loop
/// and dispatches each through the pipeline (or the special-cased OAuth2
/// token endpoint) until the client closes or sends `Connection: close`.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    snapshots: Arc<SnapshotHandle>,
    deps: Arc<PipelineDeps>,
    oauth2: Arc<oauth2_endpoint::Oauth2Deps>,
) {
    let _ = stream.set_nodelay(true);
    let client_ip = peer_addr.ip().to_string();
    let mut read_buf = vec![0u8; 8192];
    let mut write_buf = Vec::with_capacity(4096);
    let _connection_guard = deps.metrics.track_connection();

    loop {
        let parsed = match read_request(&mut stream, &mut read_buf).await {
            Ok(Some(p)) => p,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, peer = %peer_addr, "closing connection after request read error");
                let response = bad_request_response(&e.to_string());
                write_response(&mut write_buf, &response, false);
                let _ = stream.write_all(&write_buf).await;
                return;
            }
        };

        let Some(method) = HttpMethod::parse(&parsed.method) else {
            let response = bad_request_response("unsupported method");
            write_response(&mut write_buf, &response, parsed.keep_alive);
            if stream.write_all(&write_buf).await.is_err() || !parsed.keep_alive {
                return;
            }
            continue;
        };

        let response = if parsed.path == "/oauth2/token" && method == HttpMethod::Post {
            oauth2_endpoint::handle(&parsed.headers, &parsed.body, &oauth2).await
        } else if parsed.path == deps.metrics_path && method == HttpMethod::Get {
            metrics_response(&deps)
        } else {
            let request = Request {
                method,
                path: parsed.path,
                query: parsed.query,
                headers: parsed.headers,
                body: parsed.body,
                client_ip: client_ip.clone(),
            };
            let snapshot = snapshots.load();
            pipeline::handle_request(request, snapshot, &deps).await
        };

        write_response(&mut write_buf, &response, parsed.keep_alive);
        if stream.write_all(&write_buf).await.is_err() {
            return;
        }
        if !parsed.keep_alive {
            return;
        }
    }
}
