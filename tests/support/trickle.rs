//! Raw TCP server that streams one file body in timed pieces, so tests can act
//! on a transfer while bytes are already flowing.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::listing_html;

/// Listing page served by [`TrickleServer`].
pub const LISTING_PATH: &str = "/maps/";
/// File linked from the listing.
pub const FILE_NAME: &str = "slow.bsp";

/// Serves `/maps/` linking `slow.bsp`, whose GET body is written piece by
/// piece with a pause between pieces.
pub struct TrickleServer {
    uri: String,
    pieces: Arc<Vec<Vec<u8>>>,
    accept: JoinHandle<()>,
}

impl TrickleServer {
    pub async fn start(pieces: Vec<Vec<u8>>, gap: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        let pieces = Arc::new(pieces);
        let served = Arc::clone(&pieces);
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&served), gap));
            }
        });
        Self {
            uri,
            pieces,
            accept,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The full file body.
    pub fn body(&self) -> Vec<u8> {
        self.pieces.concat()
    }

    pub fn body_len(&self) -> u64 {
        self.pieces.iter().map(Vec::len).sum::<usize>() as u64
    }
}

impl Drop for TrickleServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn serve(mut stream: TcpStream, pieces: Arc<Vec<Vec<u8>>>, gap: Duration) {
    let Some(head) = read_head(&mut stream).await else {
        return;
    };
    let mut request_line = head.split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let file_path = format!("{LISTING_PATH}{FILE_NAME}");
    let len: usize = pieces.iter().map(Vec::len).sum();

    // Write errors mean the client went away (cancellation); just stop.
    if target == LISTING_PATH {
        let body = listing_html(&[FILE_NAME]);
        let _ = stream
            .write_all(response_head(body.len(), "text/html").as_bytes())
            .await;
        if method != "HEAD" {
            let _ = stream.write_all(body.as_bytes()).await;
        }
    } else if target == file_path {
        let head = response_head(len, "application/octet-stream");
        if stream.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        if method != "HEAD" {
            for (i, piece) in pieces.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(gap).await;
                }
                if stream.write_all(piece).await.is_err() || stream.flush().await.is_err() {
                    return;
                }
            }
        }
    } else {
        let _ = stream
            .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await;
    }
    let _ = stream.shutdown().await;
}

fn response_head(len: usize, content_type: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {content_type}\r\ncontent-length: {len}\r\nconnection: close\r\n\r\n"
    )
}

async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}
