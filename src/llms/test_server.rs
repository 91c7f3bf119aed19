//! Single-connection HTTP server for backend tests.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

/// Accepts exactly one connection, reads the full request, then answers with
/// a canned response once released. Later connections are refused.
pub(crate) struct OneShotServer {
    pub host: String,
    release: mpsc::Sender<()>,
    handle: JoinHandle<String>,
}

impl OneShotServer {
    /// Holds the response back until `release()`.
    pub fn gated(status: &str, content_type: &str, body: impl Into<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = format!("http://{}", listener.local_addr().unwrap());
        let (status, content_type, body) = (status.to_string(), content_type.to_string(), body.into());

        let (release, release_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let request = read_request(&mut socket);
            release_rx.recv().ok();
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                content_type,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).unwrap();
            request
        });
        Self { host, release, handle }
    }

    /// Answers as soon as the request is in.
    pub fn respond(status: &str, content_type: &str, body: impl Into<String>) -> Self {
        let server = Self::gated(status, content_type, body);
        server.release();
        server
    }

    /// NDJSON chat stream as served by ollama, one line per fragment plus the `done` line.
    pub fn ollama_chat(fragments: &[&str]) -> Self {
        let mut body = String::new();
        for f in fragments {
            let line = serde_json::json!({"message": {"role": "assistant", "content": f}, "done": false});
            body.push_str(&line.to_string());
            body.push('\n');
        }
        body.push_str("{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n");
        Self::gated("200 OK", "application/x-ndjson", body)
    }

    pub fn release(&self) {
        self.release.send(()).ok();
    }

    /// Release if still gated, wait for the exchange and return the raw request.
    pub fn finish(self) -> String {
        self.release();
        self.handle.join().unwrap()
    }
}

fn read_request(socket: &mut impl Read) -> String {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).unwrap();
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if request.len() >= end + 4 + length {
                break;
            }
        }
        if n == 0 {
            break;
        }
    }
    String::from_utf8_lossy(&request).to_string()
}
