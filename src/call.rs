//! The call-proxy builder (spec §4.8, §9 "Attribute-based RPC"). The
//! source's `peer.a.b.c(x)` syntax relies on Python's dynamic attribute
//! interception; this reimplementation accumulates the dotted segments
//! explicitly instead; no meta-programming required.

use std::sync::Arc;

use crate::error::Failure;
use crate::peer::Peer;
use crate::value::Value;

/// Accumulates dotted-name segments for one eventual `reval` call.
/// `peer.ns("a").ns("b").call("c", args)` desugars to
/// `peer.reval("a.b.c", args)`.
pub struct Call {
	peer: Arc<dyn Peer>,
	segments: Vec<String>,
}

impl Call {
	pub fn new(peer: Arc<dyn Peer>) -> Self {
		Self { peer, segments: Vec::new() }
	}

	/// Append another dotted segment without yet invoking anything.
	pub fn ns(mut self, segment: impl Into<String>) -> Self {
		self.segments.push(segment.into());
		self
	}

	/// Append the final segment and issue the call.
	pub fn call(self, name: impl Into<String>, args: Vec<Value>) -> Result<Value, Failure> {
		let mut segments = self.segments;
		segments.push(name.into());
		self.peer.reval(&segments.join("."), args)
	}
}
