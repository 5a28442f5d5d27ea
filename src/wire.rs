//! The response envelope (spec §4.12, §9 "Exception transport"). A call's
//! outcome — success value or captured failure — is sent back as a single
//! `o`-frame wrapping an explicit `Result`-shaped envelope, rather than
//! raising across the wire the way the original does. This is the only
//! place `Failure` itself gets serialised.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Failure, RemoteFailure};
use crate::frame::Tag;
use crate::peer::Peer;
use crate::session::Session;
use crate::value::{marshal_value, unmarshal_value, Value};

#[derive(Debug, Serialize, Deserialize)]
enum ResponseEnvelope {
	Ok { tag: u8, payload: Vec<u8> },
	Err(crate::error::RemoteFailureWire),
}

/// Encode the outcome of answering a request into the bytes of one
/// `o`-frame (spec §4.5 step 5). Call only with failures that are not
/// [`Failure::is_routine_fatal`] — fatal failures must tear the peer down
/// instead of being marshaled back (spec §4.12 "fatal signals").
pub fn encode_response(outcome: Result<Value, Failure>) -> Vec<u8> {
	let envelope = match outcome {
		Ok(value) => {
			let (tag, payload) = marshal_value(&value);
			ResponseEnvelope::Ok { tag: tag.to_byte(), payload }
		}
		Err(failure) => ResponseEnvelope::Err(failure.into_wire()),
	};
	bincode::serialize(&envelope).expect("ResponseEnvelope is always serialisable")
}

/// Invert [`encode_response`] on the calling side: reconstruct the
/// original value, or re-raise the remote failure locally (spec §4.12's
/// "detect that the result is a failure and re-raise a matching failure").
/// `origin` is the peer the response arrived from, needed to bind any `f`/`i`
/// value the response carries (see [`unmarshal_value`]).
pub fn decode_response(session: &Session, origin: &Arc<dyn Peer>, bytes: &[u8]) -> Result<Value, Failure> {
	let envelope: ResponseEnvelope = bincode::deserialize(bytes).map_err(|e| Failure::Panicked(format!("malformed response envelope: {e}")))?;
	match envelope {
		ResponseEnvelope::Ok { tag, payload } => {
			let tag = Tag::from_byte(tag)?;
			unmarshal_value(session, origin, tag, &payload)
		}
		ResponseEnvelope::Err(wire) => Err(RemoteFailure { wire }.into()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ids::ConnNumber;
	use crate::peer::LocalPeer;
	use crate::security::AllowAll;

	fn session() -> Arc<Session> {
		Session::new(ConnNumber::CLIENT, Arc::new(AllowAll))
	}

	fn origin(session: &Arc<Session>) -> Arc<dyn Peer> {
		Arc::new(LocalPeer::new(session.clone()))
	}

	#[test]
	fn successful_outcome_round_trips() {
		let session = session();
		let origin = origin(&session);
		let bytes = encode_response(Ok(Value::Bytes(b"hello".to_vec())));
		let decoded = decode_response(&session, &origin, &bytes).unwrap();
		assert!(matches!(decoded, Value::Bytes(b) if b == b"hello"));
	}

	#[test]
	fn failure_outcome_re_raises_as_remote_failure() {
		let session = session();
		let origin = origin(&session);
		let failure = Failure::Panicked("boom".to_string());
		let bytes = encode_response(Err(failure));
		let err = decode_response(&session, &origin, &bytes).unwrap_err();
		assert!(matches!(err, Failure::Remote(_)));
		assert!(err.to_string().contains("boom"));
	}
}
