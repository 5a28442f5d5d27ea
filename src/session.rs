//! Session context (spec §3 "Peer", §4.4 "Connection setup"). The source
//! keeps the peer registry, local connection number and security policy on
//! module-level globals (`connection.Globals`, `SetConnections`); this
//! reimplementation makes all of that explicit state on a `Session` object
//! instead, per the redesign note in spec §9 ("no hidden global mutable
//! state").

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Failure, ProtocolError};
use crate::ids::ConnNumber;
use crate::peer::Peer;
use crate::resolver::Resolver;
use crate::security::SecurityGate;
use crate::vfile::VirtualFileTable;

/// Everything one side of a connection needs to answer and issue requests:
/// who it is, who it can reach, what it can stream, what it's allowed to
/// run, and what gate inbound requests must clear first.
pub struct Session {
	local_peer: ConnNumber,
	security: Arc<dyn SecurityGate>,
	peers: Mutex<HashMap<ConnNumber, Arc<dyn Peer>>>,
	vfiles: VirtualFileTable,
	resolver: Resolver,
}

impl Session {
	/// Build a session with the default resolver (spec §6's builtin table,
	/// see [`crate::resolver::Resolver::default`]).
	pub fn new(local_peer: ConnNumber, security: Arc<dyn SecurityGate>) -> Arc<Self> {
		Self::with_resolver(local_peer, security, Resolver::default())
	}

	pub fn with_resolver(local_peer: ConnNumber, security: Arc<dyn SecurityGate>, resolver: Resolver) -> Arc<Self> {
		Arc::new(Self { local_peer, security, peers: Mutex::new(HashMap::new()), vfiles: VirtualFileTable::new(), resolver })
	}

	pub fn local_peer_number(&self) -> ConnNumber {
		self.local_peer
	}

	pub fn security(&self) -> &Arc<dyn SecurityGate> {
		&self.security
	}

	pub fn vfiles(&self) -> &VirtualFileTable {
		&self.vfiles
	}

	pub fn resolver(&self) -> &Resolver {
		&self.resolver
	}

	/// Register a peer so that references to it (spec's `c`/`R`/`Q` tags)
	/// validate on this side (spec §4.4's connection-number renumbering
	/// happens by choosing the key here).
	pub fn register_peer(&self, conn_number: ConnNumber, peer: Arc<dyn Peer>) {
		self.peers.lock().insert(conn_number, peer);
	}

	pub fn peer(&self, conn_number: ConnNumber) -> Option<Arc<dyn Peer>> {
		self.peers.lock().get(&conn_number).cloned()
	}

	/// All currently registered peer connection numbers, in ascending
	/// order. Used by server shutdown to fan out `quit` (spec §4.11).
	pub fn peer_numbers(&self) -> Vec<ConnNumber> {
		let mut numbers: Vec<_> = self.peers.lock().keys().copied().collect();
		numbers.sort();
		numbers
	}

	/// Validate a `conn_number` embedded in an incoming value against this
	/// side's registry (spec invariant 3, testable property 5): the local
	/// peer itself is always valid, anything else must be registered.
	pub fn require_peer(&self, conn_number: ConnNumber) -> Result<(), Failure> {
		if conn_number == self.local_peer || self.peers.lock().contains_key(&conn_number) {
			Ok(())
		} else {
			Err(ProtocolError::UnknownPeer(conn_number.0).into())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::security::AllowAll;

	#[test]
	fn local_peer_is_always_a_valid_reference() {
		let session = Session::new(ConnNumber::CLIENT, Arc::new(AllowAll));
		assert!(session.require_peer(ConnNumber::CLIENT).is_ok());
	}

	#[test]
	fn unregistered_peer_is_rejected() {
		let session = Session::new(ConnNumber::CLIENT, Arc::new(AllowAll));
		let err = session.require_peer(ConnNumber(9)).unwrap_err();
		assert!(matches!(err, Failure::Protocol(ProtocolError::UnknownPeer(9))));
	}
}
