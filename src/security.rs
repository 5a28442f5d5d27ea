//! The security gate (spec §4.10: "Security"). Every inbound request is
//! vetted before dispatch; grounded on `Security.vet_request` in the
//! original, which checks the requested function name and the calling
//! peer's declared role before the resolver ever sees the call.

use crate::error::{Failure, SecurityError};
use crate::ids::ConnNumber;

/// The role a peer connection was established under. The original
/// distinguishes backup-reading, restore-writing, and validate-only
/// sessions; server mode is its own class since it accepts connections
/// rather than spawning them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityClass {
	Backup,
	Restore,
	Validate,
	Server,
}

/// Checks one inbound request before the resolver dispatches it.
/// Implementations must be `Send + Sync` since a session may be shared
/// across the recursive reentrant call stack.
pub trait SecurityGate: Send + Sync {
	fn vet_request(&self, from: ConnNumber, class: SecurityClass, function_name: &str) -> Result<(), Failure>;
}

/// Accepts every request unconditionally. Useful for tests and for local
/// peers that never cross a security boundary; a real deployment should
/// supply a gate that consults the negotiated [`SecurityClass`] and an
/// allow-list the way `vet_request` does in the original.
#[derive(Debug, Default)]
pub struct AllowAll;

impl SecurityGate for AllowAll {
	fn vet_request(&self, _from: ConnNumber, _class: SecurityClass, _function_name: &str) -> Result<(), Failure> {
		Ok(())
	}
}

/// Rejects every request. Useful as a quarantine gate for a peer that's
/// been renumbered but not yet vetted.
#[derive(Debug, Default)]
pub struct DenyAll;

impl SecurityGate for DenyAll {
	fn vet_request(&self, _from: ConnNumber, _class: SecurityClass, function_name: &str) -> Result<(), Failure> {
		Err(SecurityError(function_name.to_string()).into())
	}
}

/// Only permits calls whose function name appears in an explicit
/// allow-list, regardless of class. Grounded on the original's comment
/// that `vet_request` is meant to be tightened per-deployment rather than
/// trusted as-is.
#[derive(Debug, Default)]
pub struct AllowListed {
	allowed: Vec<String>,
}

impl AllowListed {
	pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self { allowed: allowed.into_iter().map(Into::into).collect() }
	}
}

impl SecurityGate for AllowListed {
	fn vet_request(&self, _from: ConnNumber, _class: SecurityClass, function_name: &str) -> Result<(), Failure> {
		if self.allowed.iter().any(|name| name == function_name) {
			Ok(())
		} else {
			Err(SecurityError(function_name.to_string()).into())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allow_all_never_rejects() {
		let gate = AllowAll;
		assert!(gate.vet_request(ConnNumber(1), SecurityClass::Backup, "anything.at.all").is_ok());
	}

	#[test]
	fn deny_all_always_rejects() {
		let gate = DenyAll;
		let err = gate.vet_request(ConnNumber(1), SecurityClass::Restore, "x.y").unwrap_err();
		assert!(matches!(err, Failure::Security(_)));
	}

	#[test]
	fn allow_listed_only_permits_named_functions() {
		let gate = AllowListed::new(["VirtualFile.readfromid"]);
		assert!(gate.vet_request(ConnNumber(0), SecurityClass::Backup, "VirtualFile.readfromid").is_ok());
		assert!(gate.vet_request(ConnNumber(0), SecurityClass::Backup, "os.system").is_err());
	}
}
