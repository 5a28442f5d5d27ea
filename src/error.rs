//! The closed error taxonomy of the transport (see spec §7).
//!
//! Every fallible public operation returns `Result<_, Failure>`. This
//! replaces "raise across the wire" with an explicit `Result` the caller
//! converts into whatever local failure discipline they use, as called for
//! in the design notes.

use std::fmt;

/// Failure reading or writing frames on a pipe. Fatal to the peer: it tears
/// down the peer loop rather than being marshaled back to a caller.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
	#[error("truncated header (problem probably originated remotely)")]
	TruncatedHeader,

	#[error("impossibly high data amount evaluated in header (problem probably originated remotely)")]
	DataTooLarge,

	#[error("exhausted the 256 available request numbers on this peer")]
	RequestNumberExhaustion,

	#[error("peer sent a quit signal while a response was still outstanding")]
	UnexpectedQuit,

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

/// Well-formed bytes that are semantically invalid.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
	#[error("format character '{0}' invalid (problem probably originated remotely)")]
	UnknownTag(char),

	#[error("argument request number {arg_req_num} doesn't match request {req_num}")]
	RequestNumberMismatch { req_num: u8, arg_req_num: u8 },

	#[error("peer reference to unknown connection {0}")]
	UnknownPeer(u32),

	#[error("expected a request record, got {0}")]
	NotARequest(&'static str),

	#[error("RedirectedRun must not target the local peer")]
	RedirectedRunToLocalPeer,
}

/// The remote name was not present in the curated registry.
#[derive(thiserror::Error, Debug)]
#[error("name '{0}' is not defined")]
pub struct NameError(pub String);

/// The security gate rejected an inbound request.
#[derive(thiserror::Error, Debug)]
#[error("request for '{0}' was rejected by the security gate")]
pub struct SecurityError(pub String);

/// An OS error, with the *symbolic* errno name preserved for cross-platform
/// translation (spec §4.12).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OsErrorWire {
	pub original_code: i32,
	pub symbol: String,
	pub message: String,
}

/// Wire representation of a failure captured while evaluating an inbound
/// request (spec §4.12, §7). `Display`/`Error` are implemented by hand so
/// this type can round-trip through bincode without requiring `thiserror`
/// on the wire type itself.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum RemoteFailureWire {
	Os(OsErrorWire),
	Message(String),
}

impl fmt::Display for RemoteFailureWire {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Os(os) => write!(f, "[original: Errno {} {}] {}", os.original_code, os.symbol, os.message),
			Self::Message(msg) => write!(f, "{msg}"),
		}
	}
}

/// A failure from a remote callable, marshaled back and re-raised locally.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{wire}")]
pub struct RemoteFailure {
	pub wire: RemoteFailureWire,
}

impl RemoteFailure {
	/// The local platform's numeric errno for this failure, translated from
	/// the symbolic name if possible, falling back to the original number.
	pub fn local_errno(&self) -> Option<i32> {
		match &self.wire {
			RemoteFailureWire::Os(os) => Some(crate::errno::symbol_to_local(&os.symbol).unwrap_or(os.original_code)),
			RemoteFailureWire::Message(_) => None,
		}
	}
}

/// The single error type returned by every fallible operation in this crate.
#[derive(thiserror::Error, Debug)]
pub enum Failure {
	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error(transparent)]
	Protocol(#[from] ProtocolError),

	#[error(transparent)]
	Name(#[from] NameError),

	#[error(transparent)]
	Security(#[from] SecurityError),

	#[error(transparent)]
	Remote(#[from] RemoteFailure),

	#[error("local callable panicked: {0}")]
	Panicked(String),
}

impl Failure {
	/// Routine-fatal failures are not marshaled back to a caller (spec
	/// §4.12, §7): they tear the peer loop down instead. Transport failures
	/// are the only variant that classify as such here, since this crate
	/// has no signal/keyboard-interrupt taxonomy of its own — a caller
	/// embedding this transport in a larger program can still choose to
	/// treat additional local conditions as fatal before they ever reach
	/// `answer_request`.
	pub fn is_routine_fatal(&self) -> bool {
		matches!(self, Failure::Transport(_))
	}

	/// Turn this failure into its wire representation, recording the
	/// *symbolic* errno name for OS errors per §4.12.
	pub fn into_wire(self) -> RemoteFailureWire {
		if let Failure::Remote(remote) = self {
			return remote.wire;
		}
		RemoteFailureWire::Message(self.to_string())
	}
}

/// Build a `RemoteFailureWire` from a raw `std::io::Error`, recording the
/// symbolic errno name per §4.12's "OS-error code translation" rule.
pub fn os_error_wire(err: &std::io::Error) -> RemoteFailureWire {
	match err.raw_os_error() {
		Some(code) => {
			let symbol = crate::errno::local_to_symbol(code).unwrap_or_else(|| "EUNKWN".to_string());
			RemoteFailureWire::Os(OsErrorWire {
				original_code: code,
				symbol,
				message: err.to_string(),
			})
		}
		None => RemoteFailureWire::Message(err.to_string()),
	}
}

/// Convenience for callables in [`crate::resolver`] that surface a local
/// `std::io::Error` (e.g. from the virtual-file table) as the `Failure`
/// their call returns, carrying the symbolic errno translation.
pub fn os_error_wire_into_failure(err: std::io::Error) -> Failure {
	RemoteFailure { wire: os_error_wire(&err) }.into()
}
