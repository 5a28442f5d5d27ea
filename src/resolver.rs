//! The name resolver (spec §4.9): maps a dotted string to a callable from a
//! curated, auditable registry. Only names explicitly registered are
//! reachable — there is no reflection, no `getattr` walk over arbitrary
//! Rust values. Grounded on `Connection._call` / `Connection._eval` in the
//! original, which resolve a dotted name against either a process-level
//! builtin (`pow`, `len`, ...) or a fixed set of registered modules.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Failure, NameError, ProtocolError};
use crate::ids::VirtualFileId;
use crate::session::Session;
use crate::value::Value;

/// A registered remote-callable entry point.
pub type Callable = dyn Fn(&Session, Vec<Value>) -> Result<Value, Failure> + Send + Sync;

/// A decoded request record (spec §3: `(function_name, num_args)`, sent as
/// an `o`-frame ahead of its argument frames).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestRecord {
	pub function_name: String,
	pub num_args: u8,
}

/// The curated name → callable registry, plus the handful of
/// process-level builtins the source resolves before consulting it.
pub struct Resolver {
	registry: HashMap<String, Arc<Callable>>,
}

impl Resolver {
	/// An empty registry with no builtins and no well-known endpoints
	/// registered. Prefer [`Resolver::default`] unless isolating a test.
	pub fn empty() -> Self {
		Self { registry: HashMap::new() }
	}

	/// Register a callable under a fully dotted name, e.g.
	/// `"VirtualFile.readfromid"`.
	pub fn register(&mut self, name: impl Into<String>, f: impl Fn(&Session, Vec<Value>) -> Result<Value, Failure> + Send + Sync + 'static) {
		self.registry.insert(name.into(), Arc::new(f));
	}

	/// Resolve a dotted name to a callable (spec §4.9). Builtins are
	/// checked first, matching `Connection._call`'s resolution order;
	/// failing both, raise `NameError`.
	pub fn resolve(&self, name: &str) -> Result<Arc<Callable>, Failure> {
		if let Some(builtin) = builtin(name) {
			return Ok(builtin);
		}
		self.registry.get(name).cloned().ok_or_else(|| NameError(name.to_string()).into())
	}
}

impl Default for Resolver {
	fn default() -> Self {
		let mut resolver = Self::empty();
		register_virtual_file_endpoints(&mut resolver);
		register_redirected_run(&mut resolver);
		register_log_endpoints(&mut resolver);
		resolver
	}
}

fn builtin(name: &str) -> Option<Arc<Callable>> {
	match name {
		"pow" => Some(Arc::new(|_session: &Session, args: Vec<Value>| -> Result<Value, Failure> {
			let [base, exponent] = take_two(args)?;
			let base: i64 = base.into_typed()?;
			let exponent: i64 = exponent.into_typed()?;
			let exponent = u32::try_from(exponent).map_err(|_| Failure::Panicked("pow exponent out of range".to_string()))?;
			Value::opaque(&base.pow(exponent))
		})),
		"len" => Some(Arc::new(|_session: &Session, args: Vec<Value>| -> Result<Value, Failure> {
			let [value] = take_one(args)?;
			let len = match value {
				Value::Bytes(buf) => buf.len(),
				Value::Opaque(bytes) => bincode::deserialize::<String>(&bytes).map(|s| s.len()).map_err(|e| Failure::Panicked(format!("len: not a sized value: {e}")))?,
				other => return Err(Failure::Panicked(format!("len: unsupported value {other:?}"))),
			};
			Value::opaque(&(len as i64))
		})),
		_ => None,
	}
}

fn take_one(mut args: Vec<Value>) -> Result<[Value; 1], Failure> {
	if args.len() != 1 {
		return Err(ProtocolError::NotARequest("builtin expected exactly one argument").into());
	}
	Ok([args.remove(0)])
}

fn take_two(mut args: Vec<Value>) -> Result<[Value; 2], Failure> {
	if args.len() != 2 {
		return Err(ProtocolError::NotARequest("builtin expected exactly two arguments").into());
	}
	let second = args.remove(1);
	let first = args.remove(0);
	Ok([first, second])
}

/// The three virtual-file endpoints that must exist at a stable name
/// (spec §4.3, §6 table).
fn register_virtual_file_endpoints(resolver: &mut Resolver) {
	resolver.register("VirtualFile.readfromid", |session, mut args| {
		let len = match args.pop() {
			Some(Value::Opaque(bytes)) => Some(bincode::deserialize::<i64>(&bytes).map_err(|e| Failure::Panicked(e.to_string()))? as usize),
			Some(Value::Bytes(_)) | None => None,
			Some(other) => return Err(Failure::Panicked(format!("readfromid: unexpected length argument {other:?}"))),
		};
		let id = take_virtual_file_id(args)?;
		let bytes = session.vfiles().read(id, len).map_err(crate::error::os_error_wire_into_failure)?;
		Ok(Value::Bytes(bytes))
	});

	resolver.register("VirtualFile.writetoid", |session, mut args| {
		if args.len() != 2 {
			return Err(ProtocolError::NotARequest("writetoid expects (id, buf)").into());
		}
		let buf = match args.remove(1) {
			Value::Bytes(buf) => buf,
			other => return Err(Failure::Panicked(format!("writetoid: expected bytes, got {other:?}"))),
		};
		let id = take_virtual_file_id(args)?;
		let written = session.vfiles().write(id, &buf).map_err(crate::error::os_error_wire_into_failure)?;
		Value::opaque(&(written as i64))
	});

	resolver.register("VirtualFile.closebyid", |session, args| {
		let id = take_virtual_file_id(args)?;
		session.vfiles().close(id).map_err(crate::error::os_error_wire_into_failure)?;
		Value::opaque(&true)
	});
}

fn take_virtual_file_id(mut args: Vec<Value>) -> Result<VirtualFileId, Failure> {
	if args.len() != 1 {
		return Err(ProtocolError::NotARequest("expected exactly one virtual-file id argument").into());
	}
	match args.remove(0) {
		Value::Stream(id) | Value::LazySeq(id) => Ok(id),
		other => Err(Failure::Panicked(format!("expected a virtual-file id, got {other:?}"))),
	}
}

/// `RedirectedRun(conn, name, args...)` forwards a call to a non-adjacent
/// peer through this process (spec §4.7). Rejects targeting the local peer
/// — that would make this process both router and destination, which the
/// source treats as a protocol error rather than a no-op shortcut.
fn register_redirected_run(resolver: &mut Resolver) {
	resolver.register("RedirectedRun", |session, mut args| {
		if args.len() < 2 {
			return Err(ProtocolError::NotARequest("RedirectedRun expects at least (conn, name, ...)").into());
		}
		let rest = args.split_off(2);
		let name: String = match args.remove(1) {
			Value::Bytes(buf) => String::from_utf8(buf).map_err(|e| Failure::Panicked(e.to_string()))?,
			Value::Opaque(bytes) => bincode::deserialize(&bytes).map_err(|e| Failure::Panicked(e.to_string()))?,
			other => return Err(Failure::Panicked(format!("RedirectedRun: expected a dotted name, got {other:?}"))),
		};
		let target = match args.remove(0) {
			Value::Peer(conn) => conn,
			other => return Err(Failure::Panicked(format!("RedirectedRun: expected a peer reference, got {other:?}"))),
		};
		if target == session.local_peer_number() {
			return Err(ProtocolError::RedirectedRunToLocalPeer.into());
		}
		let peer = session.peer(target).ok_or(ProtocolError::UnknownPeer(target.0))?;
		peer.reval(&name, rest)
	});
}

/// Shared log-file coordination endpoints (spec §6): forwarding log lines
/// and open/close/verbosity control across connections. This transport
/// only guarantees the names exist and round-trip; formatting itself is an
/// out-of-scope collaborator (spec §1).
fn register_log_endpoints(resolver: &mut Resolver) {
	resolver.register("log.Log.log_to_file", |_session, args| {
		let [message] = take_one(args)?;
		let message: String = message.into_typed()?;
		tracing::info!(target: "remote", "{message}");
		Value::opaque(&())
	});
	resolver.register("log.Log.open_logfile_local", |_session, _args| Value::opaque(&()));
	resolver.register("log.Log.close_logfile_local", |_session, _args| Value::opaque(&()));
	resolver.register("log.Log.set_verbosity", |_session, args| {
		let [level] = take_one(args)?;
		let level: i64 = level.into_typed()?;
		tracing::info!(target: "remote", verbosity = level, "remote log verbosity changed");
		Value::opaque(&())
	});
}
