//! The pipe peer (spec §4.5, "the heart"): a reentrant request/response
//! engine driven over one pipe pair. There are no worker threads — a call
//! blocks at exactly one place, inside [`PipePeer::get_response`], and
//! while blocked it services any inbound request that arrives by
//! recursing straight back into itself (spec §5, §9 "Cooperative
//! reentrancy without threads"). The mutexes here are held only for the
//! duration of one frame read/write, never across a whole call, which is
//! what makes the recursion safe instead of a self-deadlock.

use parking_lot::Mutex;
use std::io::{Read, Write};
use std::process::Child;

use crate::error::{Failure, ProtocolError, TransportError};
use crate::frame::{self, Tag, TransportLimits};
use crate::ids::{ConnNumber, ReqNum, QUIT_REQ_NUM};
use crate::peer::Peer;
use crate::reaper::{self, ReapPolicy};
use crate::resolver::RequestRecord;
use crate::security::SecurityClass;
use crate::session::Session;
use crate::value::{self, Value};
use crate::wire;
use std::sync::{Arc, Weak};

/// What a trip through [`PipePeer::get_response`] ended in: either the
/// caller's desired response arrived, or the peer observed an orderly
/// quit signal (spec §4.5, §4.11).
enum ResponseOutcome {
	Value(Value),
	Quit,
}

/// A peer reachable over two half-duplex ends of one pipe (or a
/// full-duplex socket split via `try_clone`/equivalent). `R`/`W` are
/// generic so the same engine drives a spawned child's stdio, a listening
/// server's stdio, or a duplex test socket alike.
pub struct PipePeer<R, W> {
	conn_number: ConnNumber,
	session: Arc<Session>,
	security_class: SecurityClass,
	reader: Mutex<R>,
	writer: Mutex<W>,
	unused: Mutex<std::collections::BTreeSet<ReqNum>>,
	limits: TransportLimits,
	child: Mutex<Option<(Child, ReapPolicy)>>,
	self_ref: Weak<Self>,
}

impl<R: Read + Send + 'static, W: Write + Send + 'static> PipePeer<R, W> {
	/// Build a peer around an already-open pair of pipe ends. `child`, if
	/// present, is reaped when [`PipePeer::quit`] completes (spec §4.11).
	///
	/// Returns `Arc<Self>` rather than `Self`: a decoded `f`/`i` value
	/// binds a [`crate::vfile::RemoteStream`] back to this peer (spec
	/// §4.2), which needs an `Arc<dyn Peer>` pointing at `self` — the
	/// `self_ref` field populated here via `Arc::new_cyclic` is what makes
	/// [`PipePeer::origin_peer`] possible.
	pub fn new(reader: R, writer: W, conn_number: ConnNumber, session: Arc<Session>, security_class: SecurityClass, child: Option<(Child, ReapPolicy)>) -> Arc<Self> {
		// Request number 255 is permanently reserved for the quit signal
		// (spec §3), so it never enters the allocatable set.
		let unused = (0..=254u8).collect();
		Arc::new_cyclic(|self_ref| Self {
			conn_number,
			session,
			security_class,
			reader: Mutex::new(reader),
			writer: Mutex::new(writer),
			unused: Mutex::new(unused),
			limits: TransportLimits::default(),
			child: Mutex::new(child),
			self_ref: self_ref.clone(),
		})
	}

	pub fn session(&self) -> &Arc<Session> {
		&self.session
	}

	/// This peer, as seen from inside its own methods. Used to bind a
	/// decoded `f`/`i` value's remote id to the peer it arrived over (spec
	/// §4.2): both inbound call arguments and call responses reference ids
	/// that live in the table on the *other end of this exact pipe*, which
	/// is always `self`.
	fn origin_peer(&self) -> Arc<dyn Peer> {
		self.self_ref.upgrade().expect("a PipePeer is always held via the Arc returned by `new`")
	}

	fn allocate_req_num(&self) -> Result<ReqNum, Failure> {
		let mut unused = self.unused.lock();
		let req_num = *unused.iter().next().ok_or(TransportError::RequestNumberExhaustion)?;
		unused.remove(&req_num);
		Ok(req_num)
	}

	fn release_req_num(&self, req_num: ReqNum) {
		self.unused.lock().insert(req_num);
	}

	/// The reentrancy loop (spec §4.5 "get_response"). `desired = None`
	/// never matches any frame's request number, which is exactly the
	/// server-mode behaviour of §4.5: every inbound frame is treated as a
	/// fresh request.
	fn get_response(&self, desired: Option<ReqNum>) -> Result<ResponseOutcome, Failure> {
		loop {
			let frame = {
				let mut reader = self.reader.lock();
				frame::read_frame(&mut *reader, &self.limits)?
			};

			if matches!(frame.tag, Tag::Quit) {
				self.send_quit_ack()?;
				return Ok(ResponseOutcome::Quit);
			}

			if desired == Some(frame.req_num) {
				let value = wire::decode_response(&self.session, &self.origin_peer(), &frame.payload)?;
				return Ok(ResponseOutcome::Value(value));
			}

			if frame.tag != Tag::Object {
				return Err(ProtocolError::NotARequest("expected a request record").into());
			}
			let request: RequestRecord = bincode::deserialize(&frame.payload).map_err(|_| ProtocolError::NotARequest("malformed request record"))?;
			self.answer_request(request, frame.req_num)?;
		}
	}

	/// Service one inbound request (spec §4.5 "answer_request").
	fn answer_request(&self, request: RequestRecord, req_num: ReqNum) -> Result<(), Failure> {
		// The remote owns this request number, but while we evaluate it we
		// must not hand it out locally too.
		self.unused.lock().remove(&req_num);

		let mut args = Vec::with_capacity(request.num_args as usize);
		for _ in 0..request.num_args {
			let frame = {
				let mut reader = self.reader.lock();
				frame::read_frame(&mut *reader, &self.limits)?
			};
			if frame.req_num != req_num {
				return Err(ProtocolError::RequestNumberMismatch { req_num, arg_req_num: frame.req_num }.into());
			}
			args.push(value::unmarshal_value(&self.session, &self.origin_peer(), frame.tag, &frame.payload)?);
		}

		tracing::trace!(peer = %self.conn_number, function = %request.function_name, req_num, "answering request");

		let outcome = self.evaluate(&request.function_name, args);
		if let Err(failure) = &outcome {
			if failure.is_routine_fatal() {
				// Fatal failures tear the peer down instead of being
				// marshaled back (spec §4.12).
				return Err(outcome.unwrap_err());
			}
			tracing::debug!(function = %request.function_name, error = %failure, "request failed, marshaling the failure back");
		}

		let payload = wire::encode_response(outcome);
		{
			let mut writer = self.writer.lock();
			frame::write_frame(&mut *writer, &self.limits, Tag::Object, req_num, &payload)?;
		}
		self.unused.lock().insert(req_num);
		Ok(())
	}

	fn evaluate(&self, function_name: &str, args: Vec<Value>) -> Result<Value, Failure> {
		self.session.security().vet_request(self.conn_number, self.security_class, function_name)?;
		let callable = self.session.resolver().resolve(function_name)?;
		callable(&self.session, args)
	}

	fn send_quit_ack(&self) -> Result<(), Failure> {
		let payload = bincode::serialize("quitting").expect("a string literal is always serialisable");
		let mut writer = self.writer.lock();
		frame::write_frame(&mut *writer, &self.limits, Tag::Object, QUIT_REQ_NUM, &payload)?;
		Ok(())
	}

	/// Client-initiated shutdown (spec §4.11, §8 property 9, scenario S6):
	/// send `q`, read the acknowledgement, then reap the child if one was
	/// attached to this peer.
	pub fn quit(&self) -> Result<(), Failure> {
		{
			let mut writer = self.writer.lock();
			frame::write_frame(&mut *writer, &self.limits, Tag::Quit, QUIT_REQ_NUM, &[])?;
		}

		let frame = {
			let mut reader = self.reader.lock();
			frame::read_frame(&mut *reader, &self.limits)?
		};
		if !(frame.tag == Tag::Object && frame.req_num == QUIT_REQ_NUM) {
			return Err(ProtocolError::NotARequest("expected a quit acknowledgement").into());
		}

		if let Some((mut child, policy)) = self.child.lock().take() {
			reaper::reap(&mut child, &policy);
		}
		Ok(())
	}

	/// Server-mode loop (spec §4.5 "Server-mode loop"): treat every
	/// inbound frame as a fresh request until the client sends `q`.
	pub fn serve(&self) -> Result<(), Failure> {
		loop {
			match self.get_response(None)? {
				ResponseOutcome::Quit => return Ok(()),
				ResponseOutcome::Value(_) => unreachable!("server mode never awaits a specific request number"),
			}
		}
	}
}

impl<R, W> std::fmt::Debug for PipePeer<R, W> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut s = f.debug_struct("PipePeer");
		s.field("conn_number", &self.conn_number);
		if let Some((child, _)) = self.child.lock().as_ref() {
			s.field("child_pid", &child.id());
		}
		s.finish()
	}
}

impl<R: Read + Send + 'static, W: Write + Send + 'static> Peer for PipePeer<R, W> {
	fn conn_number(&self) -> ConnNumber {
		self.conn_number
	}

	/// `reval(name, args…)` (spec §4.5): allocate a request number, send
	/// the request record and argument frames, then wait for the matching
	/// response — servicing any inbound requests that interleave while
	/// waiting (spec §8 property 4).
	fn reval(&self, name: &str, args: Vec<Value>) -> Result<Value, Failure> {
		let req_num = self.allocate_req_num()?;

		let outcome = (|| -> Result<ResponseOutcome, Failure> {
			let request = RequestRecord { function_name: name.to_string(), num_args: args.len() as u8 };
			let request_payload = bincode::serialize(&request).map_err(|e| Failure::Panicked(e.to_string()))?;
			{
				let mut writer = self.writer.lock();
				frame::write_frame(&mut *writer, &self.limits, Tag::Object, req_num, &request_payload)?;
				for arg in &args {
					let (tag, payload) = value::marshal_value(arg);
					frame::write_frame(&mut *writer, &self.limits, tag, req_num, &payload)?;
				}
			}
			self.get_response(Some(req_num))
		})();

		self.release_req_num(req_num);

		match outcome? {
			ResponseOutcome::Value(value) => Ok(value),
			ResponseOutcome::Quit => Err(TransportError::UnexpectedQuit.into()),
		}
	}
}
