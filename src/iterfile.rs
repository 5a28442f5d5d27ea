//! Lazy-sequence adaptors (spec §4.2 point 7, §6 "MiscIterToFile" /
//! "FileToMiscIter", §8 testable property 7). A lazy sequence crosses the
//! wire as an ordinary [`crate::vfile::VirtualStream`] carrying a stream of
//! length-prefixed encoded records; the far side wraps the corresponding
//! remote handle back into an `Iterator`.
//!
//! Each record is framed as `[tag: u8][len: u32 BE][payload]`, reusing the
//! frame codec's tag alphabet (see [`crate::frame::Tag`]) so a record is
//! exactly what [`crate::value::marshal_value`] would produce for it,
//! restricted to the self-contained shapes `unmarshal_record_value`
//! accepts. End of sequence is ordinary stream EOF, not a sentinel record.

use std::io::{self, Read};

use crate::error::Failure;
use crate::frame::Tag;
use crate::value::{marshal_value, unmarshal_record_value, Value};
use crate::vfile::VirtualStream;

/// Adapts a `Send`-able iterator of record values into a [`VirtualStream`]
/// that the value marshaller can register and emit as an `i`-frame.
/// Grounded on `MiscIterToFile` in the original: pulled lazily, one record
/// at a time, buffering only as much as a single `read_bytes` call needs.
pub struct MiscIterToFile {
	iter: Box<dyn Iterator<Item = Result<Value, Failure>> + Send>,
	buffer: Vec<u8>,
	exhausted: bool,
}

impl MiscIterToFile {
	pub fn new(iter: impl Iterator<Item = Result<Value, Failure>> + Send + 'static) -> Self {
		Self { iter: Box::new(iter), buffer: Vec::new(), exhausted: false }
	}

	/// Pull one record from the source iterator and append its encoded
	/// form to the internal buffer. Returns `false` once the iterator is
	/// exhausted.
	fn pull_one(&mut self) -> io::Result<bool> {
		match self.iter.next() {
			None => {
				self.exhausted = true;
				Ok(false)
			}
			Some(Err(failure)) => Err(io::Error::new(io::ErrorKind::Other, failure.to_string())),
			Some(Ok(value)) => {
				let (tag, payload) = marshal_value(&value);
				self.buffer.push(tag.to_byte());
				self.buffer.extend_from_slice(&(payload.len() as u32).to_be_bytes());
				self.buffer.extend_from_slice(&payload);
				Ok(true)
			}
		}
	}

	fn fill_to(&mut self, want: usize) -> io::Result<()> {
		while self.buffer.len() < want && !self.exhausted {
			if !self.pull_one()? {
				break;
			}
		}
		Ok(())
	}
}

impl VirtualStream for MiscIterToFile {
	fn read_bytes(&mut self, len: Option<usize>) -> io::Result<Vec<u8>> {
		match len {
			Some(n) => {
				self.fill_to(n)?;
				let taken: Vec<u8> = self.buffer.drain(..n.min(self.buffer.len())).collect();
				Ok(taken)
			}
			None => {
				while !self.exhausted {
					self.pull_one()?;
				}
				Ok(std::mem::take(&mut self.buffer))
			}
		}
	}

	fn write_bytes(&mut self, _buf: &[u8]) -> io::Result<usize> {
		Err(io::Error::new(io::ErrorKind::Unsupported, "a lazy sequence is not writable"))
	}

	fn close(&mut self) -> io::Result<()> {
		self.exhausted = true;
		self.buffer.clear();
		Ok(())
	}
}

/// Adapts a readable remote-file handle back into a local `Iterator` of
/// record values (spec §4.2 point 7's decode direction). Reads stop
/// cleanly at EOF; any truncation mid-record surfaces as a transport
/// failure on the next call to `next`.
pub struct FileToMiscIter<R> {
	inner: R,
	done: bool,
}

impl<R: Read> FileToMiscIter<R> {
	pub fn new(inner: R) -> Self {
		Self { inner, done: false }
	}
}

impl<R: Read> Iterator for FileToMiscIter<R> {
	type Item = Result<Value, Failure>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.done {
			return None;
		}

		let mut tag_byte = [0u8; 1];
		match self.inner.read_exact(&mut tag_byte) {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
				self.done = true;
				return None;
			}
			Err(e) => {
				self.done = true;
				return Some(Err(crate::error::TransportError::Io(e).into()));
			}
		}

		let tag = match Tag::from_byte(tag_byte[0]) {
			Ok(tag) => tag,
			Err(e) => {
				self.done = true;
				return Some(Err(e.into()));
			}
		};

		let mut len_bytes = [0u8; 4];
		if let Err(e) = self.inner.read_exact(&mut len_bytes) {
			self.done = true;
			return Some(Err(crate::error::TransportError::Io(e).into()));
		}
		let len = u32::from_be_bytes(len_bytes) as usize;

		let mut payload = vec![0u8; len];
		if let Err(e) = self.inner.read_exact(&mut payload) {
			self.done = true;
			return Some(Err(crate::error::TransportError::Io(e).into()));
		}

		Some(unmarshal_record_value(tag, &payload))
	}
}
