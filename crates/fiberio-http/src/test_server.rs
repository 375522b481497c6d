//! Minimal HTTP/1.1 object server for tests.
//!
//! Serves one in-memory object per path with Range support and keep-alive.
//! Can cut a response body short and drop the connection to simulate
//! truncation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone, Copy, Debug)]
pub(crate) enum Truncate {
    Never,
    /// First response only, after this many body bytes.
    FirstAt(usize),
    /// Every response, right after the headers.
    Always,
}

struct State {
    objects: HashMap<String, Arc<Vec<u8>>>,
    truncate: Truncate,
    responses: AtomicUsize,
    requests: AtomicUsize,
    connections: AtomicUsize,
    ranges: Mutex<Vec<Option<String>>>,
}

#[derive(Clone)]
pub(crate) struct TestServer {
    state: Arc<State>,
    pub(crate) authority: String,
}

impl TestServer {
    pub(crate) async fn start(objects: Vec<(&str, Vec<u8>)>, truncate: Truncate) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let authority = listener.local_addr().unwrap().to_string();
        let state = Arc::new(State {
            objects: objects
                .into_iter()
                .map(|(p, d)| (p.to_string(), Arc::new(d)))
                .collect(),
            truncate,
            responses: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
            connections: AtomicUsize::new(0),
            ranges: Mutex::new(Vec::new()),
        });
        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(Arc::clone(&accept_state), stream));
            }
        });
        Self { state, authority }
    }

    pub(crate) fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn ranges(&self) -> Vec<Option<String>> {
        self.state.ranges.lock().unwrap().clone()
    }
}

/// Read one request head; `None` on EOF.
async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return None,
        }
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

async fn serve(state: Arc<State>, mut stream: TcpStream) {
    while let Some(head) = read_head(&mut stream).await {
        state.requests.fetch_add(1, Ordering::SeqCst);
        let mut lines = head.lines();
        let path = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .unwrap_or("/")
            .to_string();
        let range = lines.find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("range").then(|| value.trim().to_string())
        });
        state.ranges.lock().unwrap().push(range.clone());

        let Some(data) = state.objects.get(&path).cloned() else {
            let _ = stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await;
            continue;
        };

        let total = data.len();
        let from = range
            .as_deref()
            .and_then(|r| r.strip_prefix("bytes="))
            .and_then(|r| r.strip_suffix('-'))
            .and_then(|r| r.parse::<usize>().ok());

        let (head, body) = match from {
            None => (
                format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", total),
                &data[..],
            ),
            Some(from) if from >= total => (
                format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n",
                    total
                ),
                &data[..0],
            ),
            Some(from) => (
                format!(
                    "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\n\r\n",
                    from,
                    total - 1,
                    total,
                    total - from
                ),
                &data[from..],
            ),
        };

        let nth = state.responses.fetch_add(1, Ordering::SeqCst);
        let cut = match state.truncate {
            Truncate::Never => None,
            Truncate::FirstAt(n) if nth == 0 => Some(n.min(body.len())),
            Truncate::FirstAt(_) => None,
            Truncate::Always => Some(0),
        };

        if stream.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        match cut {
            Some(n) if n < body.len() || body.is_empty() => {
                let _ = stream.write_all(&body[..n]).await;
                let _ = stream.flush().await;
                // Drop the connection mid-body.
                return;
            }
            _ => {
                if stream.write_all(body).await.is_err() {
                    return;
                }
            }
        }
    }
}
