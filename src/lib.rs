//! # frpc
//!
//! Remote method dispatch onto a frame-scoped API object.
//!
//! A target type lists the methods it exposes with [`remote`]; a
//! [`Dispatcher`](dispatch::Dispatcher) resolves incoming method names against
//! that whitelist and invokes them, passing results through unchanged,
//! whether they are ready or still [`Pending`](pending::Pending). The
//! [`Router`](router::Router) binds dispatchers to named channels, which the
//! [`Server`](server::Server) and [`Client`](client::Client) carry over TCP.
//!
//! ```no_run
//! use std::sync::Arc;
//! use frpc::frame::{ self, Frame, script::ScriptQueue };
//! use frpc::messages::RENDERER_WEB_FRAME_METHOD;
//!
//! let mut router = frpc::router::Router::new();
//! let frame = Arc::new(Frame::new(1, Arc::new(ScriptQueue::new())));
//! frame::init(&mut router, frame).unwrap();
//!
//! let reply = router.route(RENDERER_WEB_FRAME_METHOD, "setZoomLevel", frpc::args![2.0]).unwrap();
//! ```

extern crate self as frpc;

#[macro_use]
pub mod macros;

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod messages;
pub mod pending;
pub mod router;
pub mod server;

pub use error::Error;
pub use frpc_macros::remote;

#[doc(hidden)]
pub mod __private {
  pub use serde_json;
  pub use serde_json::Value;
}
