use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

pub(crate) struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub(crate) fn csv(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub method: String,
    pub target: String,
    pub body: String,
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        414 => "URI Too Long",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

// One connection per reply, served in order.
pub(crate) fn serve(replies: Vec<Reply>) -> (String, JoinHandle<Vec<SeenRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let endpoint = format!("http://{}/TAP", listener.local_addr().expect("addr"));

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for reply in replies {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let target = parts.next().unwrap_or_default().to_string();

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header line");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("content-length");
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("request body");

            let response = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                reply.status,
                reason(reply.status),
                reply.body.len(),
                reply.body
            );
            stream.write_all(response.as_bytes()).expect("write response");
            stream.flush().expect("flush");

            seen.push(SeenRequest {
                method,
                target,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        seen
    });

    (endpoint, handle)
}
