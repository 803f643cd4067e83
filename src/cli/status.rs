//! `panlive status`: probe the WebSocket port.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use anyhow::Result;

use super::serve::read_port_marker;
use crate::config::PreviewConfig;

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

pub fn run(config: &PreviewConfig) -> Result<()> {
    let port = read_port_marker(&config.serve.runtime_dir()).unwrap_or(config.serve.port);
    let addr = probe_addr(config.serve.interface, port);

    if is_listening(addr) {
        println!("running (ws://{addr})");
    } else {
        println!("stopped");
    }
    Ok(())
}

/// Address to connect to; a wildcard bind is reached through loopback.
fn probe_addr(interface: IpAddr, port: u16) -> SocketAddr {
    let host = if interface.is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        interface
    };
    SocketAddr::new(host, port)
}

fn is_listening(addr: SocketAddr) -> bool {
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
}
