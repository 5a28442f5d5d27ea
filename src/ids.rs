//! Small identifiers shared across the transport (spec §3).

use std::fmt;

/// Identifies a peer, unique per process (spec §3 "Peer"). The client's
/// local peer is always `0`; a server assigns its own local peer a positive
/// number when the connection-setup layer renumbers it (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ConnNumber(pub u32);

impl fmt::Display for ConnNumber {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl ConnNumber {
	/// The conn_number always assigned to the client's local peer.
	pub const CLIENT: ConnNumber = ConnNumber(0);
}

/// An 8-bit request number tying together all frames of one call (spec §3).
/// `255` is reserved for the quit signal.
pub type ReqNum = u8;

/// Request number reserved for the quit signal (spec §3, §4.1).
pub const QUIT_REQ_NUM: ReqNum = 255;

/// Identifies an entry in the virtual-file table (spec §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VirtualFileId(pub u64);

impl fmt::Display for VirtualFileId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}
