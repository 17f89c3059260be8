//! HTTP frontend on `tiny_http` with a pool of OS worker threads.
//!
//! Routes:
//! - `GET /health`: liveness check, plain `OK`
//! - `GET /{ip}`: look up the given address
//! - `GET /`: look up the caller, taken from the first configured
//!   real-ip header or the peer address

use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tiny_http::{Header, Method, Request, Response, Server};

use crate::addr::{self, Rejection};
use crate::config::Config;
use crate::dataset::DatasetReader;
use crate::logging::ACCESS_TARGET;
use crate::lookup::LookupService;

const SERVER_ERROR: &str = "something wrong with the server";

/// Frontend settings.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub listen: SocketAddr,
    pub workers: usize,
    pub real_ip_header: Vec<String>,
    pub access_log: bool,
}

impl HttpSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            listen: config.listen,
            workers: config.worker_count(),
            real_ip_header: config.real_ip_header.clone(),
            access_log: config.log.access.is_some(),
        }
    }
}

/// Running HTTP frontend.
pub struct HttpServer {
    server: Arc<Server>,
    cont: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    addr: SocketAddr,
}

impl HttpServer {
    /// Bind the listener and start the worker threads.
    pub fn bind<R: DatasetReader>(settings: HttpSettings, lookup: LookupService<R>) -> io::Result<Self> {
        let server = Server::http(settings.listen).map_err(io::Error::other)?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| io::Error::other("listener has no IP address"))?;
        log::info!("Listening on {}", addr);

        let server = Arc::new(server);
        let cont = Arc::new(AtomicBool::new(true));
        let settings = Arc::new(settings);

        let mut workers = Vec::with_capacity(settings.workers);
        for id in 0..settings.workers.max(1) {
            let server = server.clone();
            let cont = cont.clone();
            let settings = settings.clone();
            let lookup = lookup.clone();
            let handle = thread::Builder::new()
                .name(format!("http-worker-{}", id))
                .spawn(move || worker(&server, &cont, &settings, &lookup))?;
            workers.push(handle);
        }

        Ok(Self {
            server,
            cont,
            workers,
            addr,
        })
    }

    /// Bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting requests and join every worker.
    pub fn shutdown(mut self) {
        self.cont.store(false, Ordering::SeqCst);
        for _ in 0..self.workers.len() {
            self.server.unblock();
        }
        while let Some(handle) = self.workers.pop() {
            if handle.join().is_err() {
                log::error!("HTTP worker thread panicked");
            }
        }
        log::info!("HTTP server on {} stopped", self.addr);
    }
}

fn worker<R: DatasetReader>(
    server: &Server,
    cont: &AtomicBool,
    settings: &HttpSettings,
    lookup: &LookupService<R>,
) {
    while cont.load(Ordering::SeqCst) {
        let req = match server.recv() {
            Ok(req) => req,
            Err(e) => {
                if cont.load(Ordering::SeqCst) {
                    log::warn!("Failed to receive request: {}", e);
                    continue;
                }
                break;
            }
        };
        handle(req, settings, lookup);
    }
    log::debug!("HTTP worker exiting");
}

/// Response payload before it is turned into bytes.
enum Reply {
    Text(&'static str),
    Json(serde_json::Value),
}

fn handle<R: DatasetReader>(req: Request, settings: &HttpSettings, lookup: &LookupService<R>) {
    let started = Instant::now();
    let path = req.url().split('?').next().unwrap_or("").to_string();
    let client = client_address(req.headers(), req.remote_addr(), &settings.real_ip_header);

    let routed = panic::catch_unwind(AssertUnwindSafe(|| route(&req, &path, &client, lookup)));
    let (status, reply) = routed.unwrap_or_else(|_| {
        log::error!("Handler panicked on {} {}", req.method(), path);
        (500, Reply::Json(json!({ "msg": SERVER_ERROR })))
    });

    let (body, content_type) = match reply {
        Reply::Text(text) => (text.as_bytes().to_vec(), "text/plain; charset=utf-8"),
        Reply::Json(value) => (value.to_string().into_bytes(), "application/json; charset=utf-8"),
    };
    let mut response = Response::from_data(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
        response = response.with_header(header);
    }

    if settings.access_log && path != "/health" {
        log::info!(
            target: ACCESS_TARGET,
            "{:3} {:>12?} {:>15} {:<7} {}",
            status,
            started.elapsed(),
            if client.is_empty() { "-" } else { client.as_str() },
            req.method().as_str(),
            path
        );
    }

    if let Err(e) = req.respond(response) {
        log::debug!("Failed to write response for {}: {}", path, e);
    }
}

fn route<R: DatasetReader>(
    req: &Request,
    path: &str,
    client: &str,
    lookup: &LookupService<R>,
) -> (u16, Reply) {
    if *req.method() != Method::Get {
        return not_found();
    }

    match path {
        "/health" => (200, Reply::Text("OK")),
        "/" => handle_ip(client, lookup),
        _ => match path.strip_prefix('/') {
            Some(raw) if !raw.contains('/') => handle_ip(raw, lookup),
            _ => not_found(),
        },
    }
}

fn not_found() -> (u16, Reply) {
    (404, Reply::Json(json!({ "msg": "not found" })))
}

/// First non-empty configured header, else the peer address.
fn client_address(headers: &[Header], peer: Option<&SocketAddr>, real_ip_header: &[String]) -> String {
    for name in real_ip_header {
        let value = headers
            .iter()
            .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str().trim());
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            // X-Forwarded-For carries a chain; the client is the first hop.
            return value.split(',').next().unwrap_or("").trim().to_string();
        }
    }
    peer.map(|a| a.ip().to_string()).unwrap_or_default()
}

fn handle_ip<R: DatasetReader>(raw: &str, lookup: &LookupService<R>) -> (u16, Reply) {
    let ip = match addr::classify(raw) {
        Ok(ip) => ip,
        Err(Rejection::Empty) => {
            return (400, Reply::Json(json!({ "msg": Rejection::Empty.message() })));
        }
        Err(rejection) => return (200, Reply::Json(json!({ "msg": rejection.message() }))),
    };

    match lookup.resolve(ip) {
        Ok(result) => (200, Reply::Json(json!({ "msg": "OK", "result": result }))),
        Err(e) => {
            log::error!("Lookup of {} failed: {}", ip, e);
            (500, Reply::Json(json!({ "msg": SERVER_ERROR })))
        }
    }
}
