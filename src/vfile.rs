//! The virtual-file table (spec §4.3): a process-wide (here, per-session)
//! mapping from small integer ids to open streams, so the other peer can
//! read/write/close them remotely by id.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::ids::VirtualFileId;
use crate::peer::Peer;
use crate::value::Value;

/// A stream that can be registered in the virtual-file table. Blanket-
/// implemented for anything that's `Read + Write + Send`; read-only or
/// write-only streams can implement it directly and return
/// `Unsupported` from the side they don't support.
pub trait VirtualStream: Send {
	fn read_bytes(&mut self, len: Option<usize>) -> io::Result<Vec<u8>>;
	fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize>;
	fn close(&mut self) -> io::Result<()>;
}

/// Adapts any `Read + Write` type into a [`VirtualStream`]. `n == None`
/// means read-to-end, matching `VirtualFile.readfromid`'s contract (spec §6).
pub struct ReadWriteStream<T>(pub T);

impl<T: Read + Write + Send> VirtualStream for ReadWriteStream<T> {
	fn read_bytes(&mut self, len: Option<usize>) -> io::Result<Vec<u8>> {
		match len {
			Some(n) => {
				let mut buf = vec![0u8; n];
				let read = self.0.read(&mut buf)?;
				buf.truncate(read);
				Ok(buf)
			}
			None => {
				let mut buf = Vec::new();
				self.0.read_to_end(&mut buf)?;
				Ok(buf)
			}
		}
	}

	fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.write(buf)
	}

	fn close(&mut self) -> io::Result<()> {
		self.0.flush()
	}
}

/// Adapts a read-only stream (e.g. a file opened for reading) into a
/// [`VirtualStream`] whose write side always fails.
pub struct ReadOnlyStream<T>(pub T);

impl<T: Read + Send> VirtualStream for ReadOnlyStream<T> {
	fn read_bytes(&mut self, len: Option<usize>) -> io::Result<Vec<u8>> {
		match len {
			Some(n) => {
				let mut buf = vec![0u8; n];
				let read = self.0.read(&mut buf)?;
				buf.truncate(read);
				Ok(buf)
			}
			None => {
				let mut buf = Vec::new();
				self.0.read_to_end(&mut buf)?;
				Ok(buf)
			}
		}
	}

	fn write_bytes(&mut self, _buf: &[u8]) -> io::Result<usize> {
		Err(io::Error::new(io::ErrorKind::Unsupported, "this virtual file is read-only"))
	}

	fn close(&mut self) -> io::Result<()> {
		Ok(())
	}
}

/// A thin handle to a stream that actually lives in a *remote* peer's
/// virtual-file table, not this one (spec §4.2, §4.3). Reads, writes, and
/// close all forward over `reval` to the three well-known `VirtualFile.*`
/// endpoints on the bound peer. Grounded on the original's `VirtualFile`
/// class, which does exactly this: every method call turns into
/// `self.connection.VirtualFile.readfromid(self.id, ...)` and friends.
pub struct RemoteStream {
	peer: Arc<dyn Peer>,
	id: VirtualFileId,
}

impl RemoteStream {
	pub fn new(peer: Arc<dyn Peer>, id: VirtualFileId) -> Self {
		Self { peer, id }
	}
}

fn failure_to_io(failure: crate::error::Failure) -> io::Error {
	io::Error::new(io::ErrorKind::Other, failure.to_string())
}

impl VirtualStream for RemoteStream {
	fn read_bytes(&mut self, len: Option<usize>) -> io::Result<Vec<u8>> {
		let mut args = vec![Value::Stream(self.id)];
		if let Some(n) = len {
			args.push(Value::opaque(&(n as i64)).map_err(failure_to_io)?);
		}
		match self.peer.reval("VirtualFile.readfromid", args).map_err(failure_to_io)? {
			Value::Bytes(buf) => Ok(buf),
			other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("remote read returned {other:?}, expected bytes"))),
		}
	}

	fn write_bytes(&mut self, buf: &[u8]) -> io::Result<usize> {
		let args = vec![Value::Stream(self.id), Value::Bytes(buf.to_vec())];
		let written = self.peer.reval("VirtualFile.writetoid", args).map_err(failure_to_io)?;
		written.into_typed::<i64>().map(|n| n as usize).map_err(failure_to_io)
	}

	fn close(&mut self) -> io::Result<()> {
		self.peer.reval("VirtualFile.closebyid", vec![Value::Stream(self.id)]).map_err(failure_to_io)?;
		Ok(())
	}
}

impl Read for RemoteStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let data = self.read_bytes(Some(buf.len()))?;
		buf[..data.len()].copy_from_slice(&data);
		Ok(data.len())
	}
}

/// The process-wide table itself: `new` registers a stream under a
/// strictly increasing id (spec invariant 5); `read`/`write`/`close`
/// operate on it by id.
#[derive(Default)]
pub struct VirtualFileTable {
	next_id: Mutex<u64>,
	entries: Mutex<HashMap<u64, Box<dyn VirtualStream>>>,
}

impl VirtualFileTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a new stream, returning its id.
	pub fn register(&self, stream: Box<dyn VirtualStream>) -> VirtualFileId {
		let mut next_id = self.next_id.lock();
		let id = *next_id;
		*next_id += 1;
		self.entries.lock().insert(id, stream);
		VirtualFileId(id)
	}

	pub fn read(&self, id: VirtualFileId, len: Option<usize>) -> io::Result<Vec<u8>> {
		let mut entries = self.entries.lock();
		let stream = entries
			.get_mut(&id.0)
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no virtual file with id {}", id.0)))?;
		stream.read_bytes(len)
	}

	pub fn write(&self, id: VirtualFileId, buf: &[u8]) -> io::Result<usize> {
		let mut entries = self.entries.lock();
		let stream = entries
			.get_mut(&id.0)
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no virtual file with id {}", id.0)))?;
		stream.write_bytes(buf)
	}

	pub fn close(&self, id: VirtualFileId) -> io::Result<()> {
		let mut stream = self
			.entries
			.lock()
			.remove(&id.0)
			.ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no virtual file with id {}", id.0)))?;
		stream.close()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn ids_are_strictly_increasing() {
		let table = VirtualFileTable::new();
		let a = table.register(Box::new(ReadWriteStream(Cursor::new(Vec::<u8>::new()))));
		let b = table.register(Box::new(ReadWriteStream(Cursor::new(Vec::<u8>::new()))));
		assert!(b.0 > a.0);
	}

	#[test]
	fn write_then_read_round_trips() {
		let table = VirtualFileTable::new();
		let id = table.register(Box::new(ReadWriteStream(Cursor::new(Vec::<u8>::new()))));
		table.write(id, b"hello").unwrap();
		// Cursor position is now past what was written; rewinding happens
		// at the stream-implementation level in real usage (e.g. files),
		// so here we just exercise the write path and the close-removes
		// behaviour below.
		table.close(id).unwrap();
		assert!(table.read(id, None).is_err());
	}

	#[test]
	fn close_removes_entry() {
		let table = VirtualFileTable::new();
		let id = table.register(Box::new(ReadWriteStream(Cursor::new(b"abc".to_vec()))));
		let data = table.read(id, Some(3)).unwrap();
		assert_eq!(data, b"abc");
		table.close(id).unwrap();
		assert!(table.read(id, None).is_err());
	}
}
