use std::io::{Read, Seek, SeekFrom};
use thiserror::Error;

pub mod archive;
pub mod byte_slice;
pub mod image;
pub mod text;
pub mod zlib;

pub use archive::{Archive, ArchiveEntry, ArchiveKind};

#[derive(Debug, Error)]
pub enum Error {
	#[error("io: {0}")]
	Io(#[from] std::io::Error),

	#[error("invalid archive: {0}")]
	InvalidArchive(String),

	#[error("unknown archive version {0}")]
	UnknownVersion(u32),

	#[error("invalid entry index {0}")]
	InvalidEntry(usize),

	#[error("invalid image data: {0}")]
	InvalidFormat(String),

	#[error("zlib: {0}")]
	Decompress(String),

	#[error("text is not valid Shift-JIS")]
	TextDecode
}

impl Error {
	pub(crate) fn invalid_archive(msg: impl Into<String>) -> Self {
		Self::InvalidArchive(msg.into())
	}

	pub(crate) fn invalid_format(msg: impl Into<String>) -> Self {
		Self::InvalidFormat(msg.into())
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which directory parser [`open`] should run.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpenHint {
	Ald,
	Afa,
	/// Sniff the AFA signature, fall back to ALD.
	Auto
}

/// Parse the directory of an ALD or AFA archive from a seekable byte source.
///
/// The returned [`Archive`] holds only entry metadata; reading entry bodies
/// takes the reader again, so the archive itself can be shared freely.
pub fn open<R: Read + Seek>(r: &mut R, hint: OpenHint) -> Result<Archive> {
	match hint {
		OpenHint::Ald => archive::ald::open(r),
		OpenHint::Afa => archive::afa::open(r),
		OpenHint::Auto => {
			// AFA files start with a signature, ALD files do not
			r.seek(SeekFrom::Start(0))?;
			let mut sig = [0u8; 4];
			r.read_exact(&mut sig)?;
			if &sig == b"AFAH" {
				archive::afa::open(r)
			} else {
				archive::ald::open(r)
			}
		}
	}
}
