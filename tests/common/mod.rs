//! Shared fixtures: a fake dataset reader and a local dataset host.

#![allow(dead_code)]

use geolookup::{DatasetReader, ReaderError, Record};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Response, Server};

/// Close count per dataset file content.
static CLOSED: Lazy<Mutex<HashMap<String, usize>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Address no fake dataset has an entry for.
pub const UNKNOWN_IP: Ipv4Addr = Ipv4Addr::new(1, 2, 3, 4);

/// Fake reader over a text file of the form `<tag>:<epoch>`.
///
/// - content starting with `corrupt` fails to open
/// - content starting with `panic` panics while opening
/// - content starting with `broken` opens but fails every lookup
/// - every other address answers `{"tag", "epoch"}`, except [`UNKNOWN_IP`]
pub struct EpochReader {
    content: String,
    tag: String,
    epoch: u64,
}

impl DatasetReader for EpochReader {
    fn open(path: &Path) -> Result<Self, ReaderError> {
        let content = fs::read_to_string(path).map_err(ReaderError::new)?;
        if content.starts_with("corrupt") {
            return Err(ReaderError::new("invalid metadata section"));
        }
        if content.starts_with("panic") {
            panic!("reader crashed opening {:?}", path);
        }
        let (tag, epoch) = content.split_once(':').unwrap_or((content.as_str(), "0"));
        let epoch = epoch.trim().parse::<u64>().map_err(ReaderError::new)?;
        Ok(Self {
            tag: tag.to_string(),
            epoch,
            content,
        })
    }

    fn lookup(&self, ip: Ipv4Addr) -> Result<Option<Record>, ReaderError> {
        if self.tag.starts_with("broken") {
            return Err(ReaderError::new("invalid search tree"));
        }
        if ip == UNKNOWN_IP {
            return Ok(None);
        }
        Ok(Some(json!({ "tag": self.tag, "epoch": self.epoch })))
    }

    fn build_epoch(&self) -> Option<u64> {
        Some(self.epoch)
    }
}

impl Drop for EpochReader {
    fn drop(&mut self) {
        *CLOSED.lock().entry(self.content.clone()).or_insert(0) += 1;
    }
}

/// How many readers over `content` have been dropped.
pub fn closed_count(content: &str) -> usize {
    CLOSED.lock().get(content).copied().unwrap_or(0)
}

/// Epoch carried by a record produced by [`EpochReader`].
pub fn epoch_of(record: &Option<Record>) -> u64 {
    record
        .as_ref()
        .and_then(|r| r.get("epoch"))
        .and_then(|e| e.as_u64())
        .expect("record carries an epoch")
}

/// Local HTTP server standing in for the dataset source.
pub struct DatasetHost {
    pub base: String,
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    requests: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DatasetHost {
    pub fn start() -> Self {
        let server = Server::http("127.0.0.1:0").expect("http server");
        let addr = server.server_addr().to_ip().expect("tcp listener");
        let base = format!("http://{}", addr);
        let routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>> = Arc::default();
        let requests = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let routes = routes.clone();
            let requests = requests.clone();
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let req = match server.recv_timeout(Duration::from_millis(50)) {
                        Ok(Some(req)) => req,
                        Ok(None) => continue,
                        Err(_) => break,
                    };
                    requests.fetch_add(1, Ordering::SeqCst);
                    let route = routes.lock().get(req.url()).cloned();
                    let response = match route {
                        Some((status, body)) => Response::from_data(body).with_status_code(status),
                        None => Response::from_data(Vec::new()).with_status_code(404),
                    };
                    let _ = req.respond(response);
                }
            })
        };

        Self {
            base,
            routes,
            requests,
            running,
            handle: Some(handle),
        }
    }

    /// Serve `body` with `status` at `path`.
    pub fn serve(&self, path: &str, status: u16, body: impl Into<Vec<u8>>) {
        self.routes
            .lock()
            .insert(path.to_string(), (status, body.into()));
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Number of requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for DatasetHost {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
