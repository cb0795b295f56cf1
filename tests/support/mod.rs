//! Shared fixtures: a wiremock server serving Apache-style listings and files.

#![allow(dead_code)]

pub mod trickle;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dirpull::{
    ExtensionFilter, HistorySink, HttpClient, RetryPolicy, SessionConfig, SessionController,
    SessionOptions,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Renders an autoindex page linking to `entries`, with the usual parent and
/// column-sort links around them.
pub fn listing_html(entries: &[&str]) -> String {
    let mut html = String::from(
        "<html><head><title>Index of /</title></head><body><h1>Index of /</h1><pre>\
         <a href=\"?C=N;O=D\">Name</a> <a href=\"?C=M;O=A\">Last modified</a>\n\
         <a href=\"../\">Parent Directory</a>\n",
    );
    for entry in entries {
        html.push_str(&format!("<a href=\"{entry}\">{entry}</a>  01-Jan-2024 00:00  -\n"));
    }
    html.push_str("</pre></body></html>");
    html
}

/// Serves a listing page at `page_path`.
pub async fn mount_listing(server: &MockServer, page_path: &str, entries: &[&str]) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(listing_html(entries))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Serves `body` for GET and its size for HEAD at `file_path`.
pub async fn mount_file(server: &MockServer, file_path: &str, body: &[u8]) {
    mount_head(server, file_path, body.len()).await;
    Mock::given(method("GET"))
        .and(path(file_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Answers HEAD at `file_path` with an explicit `Content-Length`.
pub async fn mount_head(server: &MockServer, file_path: &str, len: usize) {
    Mock::given(method("HEAD"))
        .and(path(file_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; len])
                .insert_header("content-length", len.to_string().as_str()),
        )
        .mount(server)
        .await;
}

/// Session configuration rooted at `base_path` on `server`.
pub fn session_config(
    server: &MockServer,
    base_path: &str,
    max_depth: u32,
    types: &str,
    destination: &Path,
) -> SessionConfig {
    SessionConfig::new(
        &format!("{}{base_path}", server.uri()),
        max_depth,
        ExtensionFilter::parse(types).unwrap(),
        destination,
    )
    .unwrap()
}

/// Options with short delays so retries and sampling finish quickly.
pub fn fast_options(concurrency: usize, max_rounds: u32) -> SessionOptions {
    SessionOptions {
        concurrency,
        retry: RetryPolicy::new(max_rounds, Duration::from_millis(20)),
        sample_period: Duration::from_millis(20),
        skip_count_pass: false,
    }
}

/// Controller with a short-timeout client.
pub fn controller(options: SessionOptions, history: Arc<dyn HistorySink>) -> SessionController {
    SessionController::new(HttpClient::new_with_timeouts(5, 10), options, history).unwrap()
}
