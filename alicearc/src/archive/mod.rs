use std::io::{Read, Seek, SeekFrom};
use crate::{Error, Result};

pub mod afa;
pub mod ald;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArchiveKind {
	Ald,
	Afa
}

/// One file inside an archive. The entry list index is the identity; names
/// may be empty and are not guaranteed unique.
#[derive(Clone, Debug)]
pub struct ArchiveEntry {
	pub name: String,
	/// Absolute byte offset of the entry body in the archive file.
	pub offset: u64,
	pub size: u64
}

/// Parsed archive directory. Immutable once opened; the backing byte source
/// stays with the caller and is passed to [`Archive::read_entry`].
pub struct Archive {
	pub kind: ArchiveKind,
	pub entries: Box<[ArchiveEntry]>
}

impl Archive {
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Read one entry body in full. Zero-size entries yield an empty buffer
	/// without touching the reader.
	pub fn read_entry<R: Read + Seek>(&self, r: &mut R, index: usize) -> Result<Vec<u8>> {
		let entry = self.entries.get(index).ok_or(Error::InvalidEntry(index))?;
		if entry.size == 0 {
			return Ok(Vec::new());
		}
		r.seek(SeekFrom::Start(entry.offset))?;
		let mut buf = vec![0u8; entry.size as usize];
		r.read_exact(&mut buf)?;
		Ok(buf)
	}
}

// both directory formats promise that entry bodies lie inside the file
fn check_bounds(entries: &[ArchiveEntry], file_len: u64) -> Result<()> {
	for e in entries {
		if e.offset + e.size > file_len {
			return Err(Error::invalid_archive(format!(
				"entry \"{}\" ends at {:#x}, past the end of the {:#x}-byte archive",
				e.name,
				e.offset + e.size,
				file_len
			)));
		}
	}
	Ok(())
}
