//! Peer handles (spec §3 "Peer", §4.6, §4.7). A `Peer` is anything that can
//! answer `reval(name, args)`: the in-process local peer, a pipe-connected
//! neighbour ([`crate::pipe_peer::PipePeer`]), or a routed peer reachable
//! only through an intermediate.

use std::sync::Arc;

use crate::call::Call;
use crate::error::{Failure, ProtocolError};
use crate::ids::ConnNumber;
use crate::session::Session;
use crate::value::Value;

/// Anything that can evaluate a dotted name with arguments and return a
/// value (spec §3: "every peer exposes `reval(name, args…)`"). Object-safe
/// so sessions can hold `Arc<dyn Peer>` without knowing the concrete kind.
pub trait Peer: Send + Sync {
	fn conn_number(&self) -> ConnNumber;
	fn reval(&self, name: &str, args: Vec<Value>) -> Result<Value, Failure>;
}

/// Ergonomic call sugar (spec §4.8, §9 "Attribute-based RPC"):
/// `peer.call("a.b.c", args)` directly, or `peer.ns("a").ns("b").call("c",
/// args)` to build the dotted name incrementally.
pub trait PeerExt: Peer {
	fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, Failure>
	where
		Self: Sized,
	{
		self.reval(name, args)
	}

	fn ns(self: Arc<Self>, segment: impl Into<String>) -> Call
	where
		Self: Sized + 'static,
	{
		Call::new(self).ns(segment)
	}
}

impl<P: Peer + ?Sized> PeerExt for P {}

/// The in-process sibling of a pipe peer: resolves names directly against
/// a session's resolver with no framing (spec §4.6).
pub struct LocalPeer {
	session: Arc<Session>,
}

impl LocalPeer {
	pub fn new(session: Arc<Session>) -> Self {
		Self { session }
	}
}

impl Peer for LocalPeer {
	fn conn_number(&self) -> ConnNumber {
		self.session.local_peer_number()
	}

	fn reval(&self, name: &str, args: Vec<Value>) -> Result<Value, Failure> {
		let callable = self.session.resolver().resolve(name)?;
		callable(&self.session, args)
	}
}

/// A peer reachable only through a neighbour (spec §4.7). Rewrites every
/// call as `RedirectedRun(target, name, args…)` on the routing peer.
pub struct RoutedPeer {
	target: ConnNumber,
	routing_peer: Arc<dyn Peer>,
}

impl RoutedPeer {
	pub fn new(target: ConnNumber, routing_peer: Arc<dyn Peer>) -> Result<Self, Failure> {
		if target == routing_peer.conn_number() {
			return Err(ProtocolError::RedirectedRunToLocalPeer.into());
		}
		Ok(Self { target, routing_peer })
	}
}

impl std::fmt::Debug for RoutedPeer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RoutedPeer").field("target", &self.target).field("routing_peer", &self.routing_peer.conn_number()).finish()
	}
}

impl Peer for RoutedPeer {
	fn conn_number(&self) -> ConnNumber {
		self.target
	}

	fn reval(&self, name: &str, args: Vec<Value>) -> Result<Value, Failure> {
		let mut redirected = vec![Value::Peer(self.target), Value::Bytes(name.as_bytes().to_vec())];
		redirected.extend(args);
		self.routing_peer.reval("RedirectedRun", redirected)
	}
}
