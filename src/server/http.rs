//! HTTP submission endpoint.
//!
//! | Request                        | Effect                           |
//! |--------------------------------|----------------------------------|
//! | `PUT /` or `POST /` with body  | client submission (`X-Filepath`) |
//! | `GET /PATH`                    | file-path request for `PATH`     |
//!
//! Accepted requests answer `202`; rendering happens asynchronously and
//! results reach viewers over the WebSocket.

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use percent_encoding::percent_decode_str;
use tiny_http::{Method, Request, Response, Server};

use super::MAX_PORT_RETRIES;
use crate::error::PipelineError;
use crate::ingest::UpdateRequest;
use crate::pipeline::PipelineHandle;

/// Header naming the target document of a submission.
const TARGET_HEADER: &str = "X-Filepath";

/// Running HTTP endpoint.
pub struct HttpServer {
    addr: SocketAddr,
    server: Arc<Server>,
    worker: Option<JoinHandle<()>>,
}

impl HttpServer {
    pub fn bind(
        interface: IpAddr,
        base_port: u16,
        handle: PipelineHandle,
    ) -> Result<Self, PipelineError> {
        let (server, addr) = bind_with_retry(interface, base_port)?;
        let server = Arc::new(server);

        let requests = Arc::clone(&server);
        let worker = thread::Builder::new()
            .name("panlive-http".into())
            .spawn(move || run_request_loop(&requests, &handle))
            .map_err(|e| PipelineError::Startup(format!("http worker: {e}")))?;

        Ok(Self {
            addr,
            server,
            worker: Some(worker),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Unblock the request loop and wait for it.
    pub fn stop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind to the specified interface and port, with automatic port retry.
fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr), PipelineError> {
    let mut last_error = String::new();

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match Server::http(SocketAddr::new(interface, port)) {
            Ok(server) => {
                let addr = server
                    .server_addr()
                    .to_ip()
                    .unwrap_or_else(|| SocketAddr::new(interface, port));
                if offset > 0 {
                    crate::log!("http"; "port {} in use, using {} instead", base_port, addr.port());
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(PipelineError::Startup(format!(
        "cannot bind http server after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error
    )))
}

fn run_request_loop(server: &Server, handle: &PipelineHandle) {
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, handle) {
            crate::debug!("http"; "failed to respond: {}", e);
        }
    }
}

fn handle_request(mut request: Request, handle: &PipelineHandle) -> std::io::Result<()> {
    let (status, body) = match accept(&mut request) {
        Ok(update) => {
            crate::debug!("http"; "{} {} accepted", request.method(), request.url());
            handle.submit_update(update);
            (202, "accepted")
        }
        Err(Rejection { status, reason }) => {
            crate::debug!("http"; "{} {} rejected: {}", request.method(), request.url(), reason);
            (status, reason)
        }
    };
    request.respond(Response::from_string(body).with_status_code(status))
}

/// Reason a request was not turned into an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rejection {
    status: u16,
    reason: &'static str,
}

impl Rejection {
    const fn new(status: u16, reason: &'static str) -> Self {
        Self { status, reason }
    }
}

/// What a request asks for, before its body is read.
#[derive(Debug, PartialEq, Eq)]
enum Route {
    Submit,
    Open(PathBuf),
}

fn route(method: &Method, url: &str) -> Result<Route, Rejection> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| Rejection::new(400, "path is not valid UTF-8"))?;
    let relative = path.trim_start_matches('/');

    match method {
        Method::Put | Method::Post if relative.is_empty() => Ok(Route::Submit),
        Method::Put | Method::Post => Err(Rejection::new(404, "submit to /")),
        Method::Get if relative.is_empty() => Err(Rejection::new(400, "missing document path")),
        Method::Get => Ok(Route::Open(PathBuf::from(relative))),
        _ => Err(Rejection::new(405, "method not allowed")),
    }
}

fn accept(request: &mut Request) -> Result<UpdateRequest, Rejection> {
    match route(request.method(), request.url())? {
        Route::Open(path) => Ok(UpdateRequest::file_path(path)),
        Route::Submit => {
            let target = request
                .headers()
                .iter()
                .find(|h| h.field.equiv(TARGET_HEADER))
                .map(|h| h.value.as_str().trim())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);

            let mut body = Vec::new();
            request
                .as_reader()
                .read_to_end(&mut body)
                .map_err(|_| Rejection::new(400, "unreadable body"))?;
            if body.is_empty() {
                return Err(Rejection::new(400, "empty body"));
            }
            Ok(UpdateRequest::submission(body, target))
        }
    }
}
