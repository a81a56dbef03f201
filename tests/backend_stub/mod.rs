use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

#[derive(Debug, Clone)]
pub struct BackendStubConfig {
    /// `/check-lock` answers with an error status.
    pub reject_pattern: bool,
    /// Field name carrying scraped text (`content` or the legacy `text`).
    pub content_field: &'static str,
    /// `/scrape` answers HTTP 500 with an error body.
    pub scrape_fails: bool,
    /// Target returned by `/navigate`; `None` means no sibling.
    pub navigate_to: Option<String>,
}

impl Default for BackendStubConfig {
    fn default() -> Self {
        Self {
            reject_pattern: false,
            content_field: "content",
            scrape_fails: false,
            navigate_to: None,
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: Value,
}

pub struct BackendStub {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl BackendStub {
    pub fn spawn(config: BackendStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start backend stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post {
                    let _ = request.respond(
                        tiny_http::Response::from_string("method not allowed")
                            .with_status_code(405),
                    );
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };
                recorded.lock().expect("lock requests").push(RecordedRequest {
                    path: path.clone(),
                    body: parsed.clone(),
                });

                let (status, response_body) = route(&config, &path, &parsed);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(response_body.to_string())
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("lock requests").clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }
}

impl Drop for BackendStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn route(config: &BackendStubConfig, path: &str, body: &Value) -> (u16, Value) {
    let url = body.get("url").and_then(|v| v.as_str()).unwrap_or("");
    match path {
        "/check-lock" if config.reject_pattern => (
            200,
            json!({ "status": "error", "message": "No chapter pattern found" }),
        ),
        "/check-lock" => (
            200,
            json!({
                "status": "success",
                "auto_detected": true,
                "chapter_info": {
                    "current_chapter": chapter_of(url),
                    "has_previous": true,
                    "has_next": true
                }
            }),
        ),
        "/scrape" if config.scrape_fails => (
            500,
            json!({ "status": "error", "message": "upstream failed" }),
        ),
        "/scrape" => {
            let mut response = json!({ "status": "success" });
            response[config.content_field] = Value::String(format!("Text of {url}"));
            (200, response)
        }
        "/navigate" => match &config.navigate_to {
            Some(target) => (
                200,
                json!({ "status": "success", "new_url": target, "chapter": "Unknown" }),
            ),
            None => (
                200,
                json!({ "status": "error", "message": "No next link found." }),
            ),
        },
        _ => (404, json!({ "status": "error", "message": "not found" })),
    }
}

fn chapter_of(url: &str) -> Value {
    url.rsplit('-')
        .next()
        .and_then(|tail| tail.parse::<u64>().ok())
        .map_or_else(|| Value::String("Unknown".to_owned()), Value::from)
}
