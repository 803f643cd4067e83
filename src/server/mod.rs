//! Network front ends of the pipeline.
//!
//! ```text
//! server/
//! ├── ws.rs      # viewer sessions over WebSocket (port)
//! └── http.rs    # content submission over HTTP (port + 1)
//! ```
//!
//! Both run on plain OS threads and talk to the pipeline only through a
//! cloned [`PipelineHandle`](crate::pipeline::PipelineHandle).

mod http;
mod ws;

pub use http::HttpServer;
pub use ws::WsServer;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;
