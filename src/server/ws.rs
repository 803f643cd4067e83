//! WebSocket server for live viewers.
//!
//! An acceptor thread polls a non-blocking listener; every accepted
//! connection gets its own session thread that owns the socket:
//!
//! ```text
//! acceptor ──TcpStream──▶ session ─┬─ hub queue ──send──▶ viewer
//!                                  └─ viewer ──read──▶ handle_client_request
//! ```

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::TryRecvError;
use tungstenite::protocol::Message;
use tungstenite::{Error as WsError, WebSocket};

use super::MAX_PORT_RETRIES;
use crate::error::PipelineError;
use crate::hub::ClientHandle;
use crate::pipeline::PipelineHandle;

/// Acceptor back-off when no connection is pending.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Session back-off when neither side had anything to say.
const SESSION_POLL: Duration = Duration::from_millis(15);

/// Running WebSocket endpoint.
pub struct WsServer {
    addr: SocketAddr,
    stopped: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl WsServer {
    /// Bind `interface:port` (trying the next ports when taken) and start
    /// accepting viewers.
    pub fn bind(
        interface: IpAddr,
        base_port: u16,
        handle: PipelineHandle,
    ) -> Result<Self, PipelineError> {
        let listener = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
        let addr = listener
            .local_addr()
            .map_err(|e| PipelineError::Startup(format!("websocket listener: {e}")))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| PipelineError::Startup(format!("websocket listener: {e}")))?;
        if addr.port() != base_port && base_port != 0 {
            crate::log!("ws"; "port {} in use, using {} instead", base_port, addr.port());
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);
        let acceptor = thread::Builder::new()
            .name("panlive-ws".into())
            .spawn(move || accept_loop(listener, handle, flag))
            .map_err(|e| PipelineError::Startup(format!("websocket acceptor: {e}")))?;

        Ok(Self {
            addr,
            stopped,
            acceptor: Some(acceptor),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting; open sessions close on their next poll.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(acceptor) = self.acceptor.take() {
            let _ = acceptor.join();
        }
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, handle: PipelineHandle, stopped: Arc<AtomicBool>) {
    while !stopped.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                crate::debug!("ws"; "connection from {}", peer);
                let handle = handle.clone();
                let stopped = Arc::clone(&stopped);
                let spawned = thread::Builder::new()
                    .name(format!("panlive-ws-{peer}"))
                    .spawn(move || run_session(stream, handle, stopped));
                if let Err(e) = spawned {
                    crate::log!("ws"; "failed to spawn session for {}: {}", peer, e);
                }
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                crate::log!("ws"; "accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn run_session(stream: TcpStream, handle: PipelineHandle, stopped: Arc<AtomicBool>) {
    // Blocking handshake, then non-blocking polling.
    let _ = stream.set_nonblocking(false);
    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            crate::log!("ws"; "handshake failed: {}", e);
            return;
        }
    };
    let _ = ws.get_ref().set_nonblocking(true);

    let client = handle.register_client();
    crate::debug!("ws"; "client {} connected (total: {})", client.id, handle.hub().len());

    let reason = pump(&mut ws, &client, &handle, &stopped);

    handle.unregister_client(client.id);
    let _ = ws.close(None);
    let _ = ws.flush();
    crate::debug!("ws"; "client {} disconnected: {}", client.id, reason);
}

/// Shuttle frames both ways until either side goes away.
fn pump(
    ws: &mut WebSocket<TcpStream>,
    client: &ClientHandle,
    handle: &PipelineHandle,
    stopped: &AtomicBool,
) -> String {
    loop {
        if stopped.load(Ordering::SeqCst) {
            return "server stopping".into();
        }
        let mut idle = true;

        loop {
            match client.rx.try_recv() {
                Ok(frame) => {
                    idle = false;
                    if let Err(e) = ws.send(Message::Text(frame.to_string().into()))
                        && !would_block(&e)
                    {
                        return format!("send failed: {e}");
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return "unregistered".into(),
            }
        }
        if let Err(e) = ws.flush()
            && !would_block(&e)
        {
            return format!("flush failed: {e}");
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                idle = false;
                handle.handle_client_request(&text);
            }
            Ok(Message::Close(_)) => return "closed by viewer".into(),
            Ok(_) => idle = false,
            Err(ref e) if would_block(e) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                return "connection closed".into();
            }
            Err(e) => return format!("read failed: {e}"),
        }

        if idle {
            thread::sleep(SESSION_POLL);
        }
    }
}

fn would_block(err: &WsError) -> bool {
    matches!(err, WsError::Io(e) if e.kind() == ErrorKind::WouldBlock)
}

/// Try binding to port, retry with incremented port if in use.
fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<TcpListener, PipelineError> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => return Ok(listener),
            Err(e) => last_error = Some(e),
        }
    }

    Err(PipelineError::Startup(format!(
        "cannot bind websocket server after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}
