//! A reentrant remote-execution and multiplexed pipe transport.
//!
//! Two peers exchange typed, framed messages over a bidirectional byte
//! stream — typically a child process connected via standard input and
//! output. Either side can synchronously invoke named functions on the
//! other, pass opaque values, stream file data through a remote handle, or
//! route a call through an intermediate peer to a non-adjacent one.
//!
//! # Example
//!
//! ```no_run
//! use rift_conn::{ids::ConnNumber, peer::Peer, security::AllowAll, session::Session};
//! use std::sync::Arc;
//!
//! let session = Session::new(ConnNumber::CLIENT, Arc::new(AllowAll));
//! let local = rift_conn::peer::LocalPeer::new(session);
//! let result = local.reval("pow", vec![rift_conn::value::Value::opaque(&2i64)?, rift_conn::value::Value::opaque(&10i64)?])?;
//! let n: i64 = result.into_typed()?;
//! assert_eq!(n, 1024);
//! # Ok::<(), rift_conn::error::Failure>(())
//! ```
//!
//! # Architecture
//!
//! - [`frame`] — the wire codec: tag byte, request-number byte, 7-byte
//!   big-endian length, payload.
//! - [`value`] — the closed set of values that cross the wire.
//! - [`vfile`] — the virtual-file table for remote stream access.
//! - [`iterfile`] — lazy-sequence adaptors layered on top of it.
//! - [`session`] — the explicit, non-global peer/virtual-file/resolver
//!   context each peer is built against.
//! - [`resolver`] — the curated dotted-name registry.
//! - [`security`] — the inbound request gate.
//! - [`peer`], [`call`] — the `Peer` trait, local and routed peer kinds,
//!   and the dotted-name call-proxy builder.
//! - [`pipe_peer`] — the reentrant engine tying it all together over a
//!   real pipe.
//! - [`reaper`] — child-process reap escalation.
//! - [`error`], [`errno`] — the failure taxonomy and OS-errno translation.
//! - [`wire`] — the response envelope used only by [`pipe_peer`].

#![warn(missing_docs)]
#![cfg_attr(ci_test, deny(warnings))]

pub mod call;
pub mod error;
pub mod errno;
pub mod frame;
pub mod ids;
pub mod iterfile;
pub mod peer;
pub mod pipe_peer;
pub mod reaper;
pub mod resolver;
pub mod security;
pub mod session;
pub mod value;
pub mod vfile;
pub mod wire;

pub use call::Call;
pub use error::Failure;
pub use peer::{LocalPeer, Peer, PeerExt, RoutedPeer};
pub use pipe_peer::PipePeer;
pub use session::Session;
pub use value::Value;
