//! Scripted HTTP/1.1 backend for integration tests.
//!
//! Each accepted connection gets the next reply from the script; once the
//! script runs out the last reply repeats. Every request is recorded so tests
//! can assert on attempt counts, headers, and bodies.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    /// `application/json` answer with a Content-Length.
    Json(u16, String),
    /// `text/plain` answer with a Content-Length.
    Text(u16, String),
    /// 200 `text/event-stream`, chunked, one chunk per entry with a short
    /// pause between them. `truncate` drops the connection before the
    /// terminating chunk.
    Stream { chunks: Vec<String>, truncate: bool },
    /// Read the request, then say nothing for `Duration`.
    Hang(Duration),
    /// 200 `text/event-stream`, chunked: send `chunks`, then keep the
    /// connection open and silent for `hold`.
    Stall { chunks: Vec<String>, hold: Duration },
    /// Status line and a `Content-Length` of `declared` bytes, but no body
    /// for `hold`.
    ShortBody {
        status: u16,
        declared: usize,
        hold: Duration,
    },
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Reply::Json(status, body.to_string())
    }

    pub fn stream(chunks: &[&str]) -> Self {
        Reply::Stream {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            truncate: false,
        }
    }

    pub fn stall(chunks: &[&str], hold: Duration) -> Self {
        Reply::Stall {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            hold,
        }
    }

    pub fn truncated_stream(chunks: &[&str]) -> Self {
        Reply::Stream {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            truncate: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    /// Header names are lowercased.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

pub struct BackendServer {
    /// Base URL without a trailing slash, e.g. "http://127.0.0.1:12345".
    pub base: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl BackendServer {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Serve `script` in order. The server runs until the process exits.
pub fn start(script: Vec<Reply>) -> BackendServer {
    assert!(!script.is_empty(), "script needs at least one reply");
    start_routed(move |_, n| script[n.min(script.len() - 1)].clone())
}

/// Like `start` but the reply is chosen per request: `route(request, n)`
/// where `n` counts requests seen so far (0-based).
pub fn start_routed<F>(route: F) -> BackendServer
where
    F: Fn(&Recorded, usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&requests);
    let route = Arc::new(route);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let recorder = Arc::clone(&recorder);
            let route = Arc::clone(&route);
            thread::spawn(move || {
                let Some(request) = read_request(&stream) else {
                    return;
                };
                let reply = {
                    let mut seen = recorder.lock().unwrap();
                    let n = seen.len();
                    seen.push(request.clone());
                    route(&request, n)
                };
                write_reply(stream, reply);
            });
        }
    });
    BackendServer {
        base: format!("http://127.0.0.1:{}", port),
        requests,
    }
}

/// A base URL nothing listens on.
pub fn refused_base() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

fn read_request(mut stream: &TcpStream) -> Option<Recorded> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
    let mut lines = head.lines();
    let mut start = lines.next()?.split_whitespace();
    let method = start.next()?.to_string();
    let path = start.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(n, v)| (n.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while raw.len() < head_end + length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }
    let body_end = raw.len().min(head_end + length);
    let body = String::from_utf8_lossy(&raw[head_end..body_end]).to_string();
    Some(Recorded {
        method,
        path,
        headers,
        body,
    })
}

fn write_reply(mut stream: TcpStream, reply: Reply) {
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    match reply {
        Reply::Json(status, body) => write_fixed(&mut stream, status, "application/json", &body),
        Reply::Text(status, body) => write_fixed(&mut stream, status, "text/plain", &body),
        Reply::Stream { chunks, truncate } => {
            if !write_chunks(&mut stream, &chunks) {
                return;
            }
            if !truncate {
                let _ = stream.write_all(b"0\r\n\r\n");
            }
            let _ = stream.flush();
        }
        Reply::Stall { chunks, hold } => {
            if write_chunks(&mut stream, &chunks) {
                thread::sleep(hold);
            }
        }
        Reply::ShortBody {
            status,
            declared,
            hold,
        } => {
            let head = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                reason(status),
                declared
            );
            if stream.write_all(head.as_bytes()).is_ok() {
                let _ = stream.flush();
                thread::sleep(hold);
            }
        }
        Reply::Hang(d) => thread::sleep(d),
    }
}

/// Chunked SSE head plus one chunk per entry. False once the client is gone.
fn write_chunks(stream: &mut TcpStream, chunks: &[String]) -> bool {
    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\n\
                Transfer-Encoding: chunked\r\nConnection: close\r\n\r\n";
    if stream.write_all(head.as_bytes()).is_err() {
        return false;
    }
    for chunk in chunks {
        let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
        if stream.write_all(frame.as_bytes()).is_err() {
            return false;
        }
        let _ = stream.flush();
        thread::sleep(Duration::from_millis(20));
    }
    true
}

fn write_fixed(stream: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason(status),
        content_type,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Status",
    }
}
