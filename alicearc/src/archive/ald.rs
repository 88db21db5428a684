use std::io::{Read, Seek, SeekFrom};
use crate::{byte_slice::ByteSlice, text, Error, Result};
use super::{check_bounds, Archive, ArchiveEntry, ArchiveKind};

// ALD layout, all little-endian:
// +0x00  u24 tableSize          actual region size is tableSize<<8
// +0x03  packed u24 offsets     actual offsets are each value<<8, zero-terminated
// each recorded offset points at an entry header:
//   +0x00  u32 headerLen        16..=256
//   +0x04  u32 dataSize
//   +0x10  NUL-terminated Shift-JIS name
// the entry body starts at recordedOffset + headerLen

const NAME_OFFSET: usize = 0x10;

pub fn open<R: Read + Seek>(r: &mut R) -> Result<Archive> {
	let file_len = r.seek(SeekFrom::End(0))?;
	r.seek(SeekFrom::Start(0))?;
	let mut head = [0u8; 3];
	r.read_exact(&mut head)?;
	let table_size = (u32::from(head[0]) | u32::from(head[1]) << 8 | u32::from(head[2]) << 16) as u64;
	let table_size = table_size << 8;
	if table_size < 3 || table_size > file_len {
		return Err(Error::invalid_archive(format!("offset table size {table_size:#x} out of range")));
	}

	// the table has no entry count, only a zero terminator or the region end
	let mut table = vec![0u8; (table_size - 3) as usize];
	r.read_exact(&mut table)?;
	let mut offsets = Vec::new();
	let mut last = 0u64;
	let mut pos = 0;
	while let Some(v) = table.get_u24_at(pos) {
		let offset = u64::from(v) << 8;
		if offset == 0 {
			break;
		}
		if offset <= last {
			return Err(Error::invalid_archive(format!("file offsets are not increasing at slot {}", offsets.len())));
		}
		offsets.push(offset);
		last = offset;
		pos += 3;
	}

	let count = offsets.len();
	let mut entries = Vec::with_capacity(count);
	for (i, &offset) in offsets.iter().enumerate() {
		r.seek(SeekFrom::Start(offset))?;
		let mut len_buf = [0u8; 4];
		r.read_exact(&mut len_buf)?;
		let header_len = u32::from_le_bytes(len_buf);
		if !(16..=256).contains(&header_len) {
			if i == count - 1 {
				// the last slot is often a sentinel rather than a file entry
				continue;
			}
			return Err(Error::invalid_archive(format!("entry header length {header_len} out of range")));
		}
		let mut header = vec![0u8; header_len as usize];
		header[..4].copy_from_slice(&len_buf);
		r.read_exact(&mut header[4..])?;
		let size = header
			.get_u32_at(4)
			.ok_or_else(|| Error::invalid_archive("truncated entry header"))?;
		let name = text::decode_sjis(text::until_nul(&header[NAME_OFFSET..]))?;
		entries.push(ArchiveEntry {
			name,
			offset: offset + u64::from(header_len),
			size: u64::from(size)
		});
	}
	check_bounds(&entries, file_len)?;
	Ok(Archive {kind: ArchiveKind::Ald, entries: entries.into()})
}

#[cfg(test)]
pub(crate) mod tests {
	use std::io::Cursor;
	use crate::Error;
	use super::{open, NAME_OFFSET};

	const TABLE_SIZE: usize = 256;
	const HEADER_LEN: usize = 32;

	// lays out each entry at the next 256-aligned offset, with an optional
	// trailing sentinel slot the way shipped archives have one
	pub(crate) fn build_ald(entries: &[(&str, &[u8])], with_sentinel: bool) -> Vec<u8> {
		let mut offsets = Vec::new();
		let mut out = vec![0u8; TABLE_SIZE];
		out[0] = (TABLE_SIZE >> 8) as u8;
		let mut cursor = TABLE_SIZE;
		for (name, data) in entries {
			assert!(name.len() < HEADER_LEN - NAME_OFFSET);
			offsets.push(cursor);
			out.resize(cursor + HEADER_LEN, 0);
			out[cursor..cursor + 4].copy_from_slice(&(HEADER_LEN as u32).to_le_bytes());
			out[cursor + 4..cursor + 8].copy_from_slice(&(data.len() as u32).to_le_bytes());
			out[cursor + NAME_OFFSET..cursor + NAME_OFFSET + name.len()].copy_from_slice(name.as_bytes());
			out.extend_from_slice(data);
			cursor = out.len().next_multiple_of(256);
		}
		if with_sentinel {
			offsets.push(cursor);
			out.resize(cursor, 0);
			// bogus header length, as observed in the trailing slot of real files
			out.extend_from_slice(&[0x4E, 0x4C, 0x01, 0x00, 0x10, 0x00, 0x00, 0x00]);
		}
		for (i, off) in offsets.iter().enumerate() {
			let v = (*off >> 8) as u32;
			out[3 + i * 3..6 + i * 3].copy_from_slice(&v.to_le_bytes()[..3]);
		}
		out
	}

	#[test]
	fn parses_entries() {
		let data = build_ald(&[("first.qnt", b"AAAA".as_slice()), ("second.dcf", b"BBBBBBBB".as_slice())], false);
		let arch = open(&mut Cursor::new(&data)).unwrap();
		assert_eq!(arch.len(), 2);
		assert_eq!(arch.entries[0].name, "first.qnt");
		assert_eq!(arch.entries[1].name, "second.dcf");
		assert_eq!(arch.entries[0].size, 4);
		assert_eq!(arch.entries[1].size, 8);
		for e in arch.entries.iter() {
			// recorded offsets are 256-aligned, the body follows the header
			assert_eq!((e.offset - HEADER_LEN as u64) % 256, 0);
			assert!(e.offset + e.size <= data.len() as u64);
		}
	}

	#[test]
	fn sentinel_slot_is_dropped() {
		let data = build_ald(&[("a.bin", b"xy".as_slice()), ("b.bin", b"z".as_slice())], true);
		let arch = open(&mut Cursor::new(&data)).unwrap();
		assert_eq!(arch.len(), 2);
	}

	#[test]
	fn non_monotone_offsets() {
		let mut data = build_ald(&[("a.bin", b"xy".as_slice()), ("b.bin", b"z".as_slice())], false);
		let first = &data[3..6].to_vec();
		data[6..9].copy_from_slice(first);
		assert!(matches!(open(&mut Cursor::new(&data)), Err(Error::InvalidArchive(_))));
	}

	#[test]
	fn bad_header_length_mid_list() {
		let mut data = build_ald(&[("a.bin", b"xy".as_slice()), ("b.bin", b"z".as_slice())], false);
		data[TABLE_SIZE..TABLE_SIZE + 4].copy_from_slice(&4000u32.to_le_bytes());
		assert!(matches!(open(&mut Cursor::new(&data)), Err(Error::InvalidArchive(_))));
	}

	#[test]
	fn entry_past_end_of_file() {
		let mut data = build_ald(&[("a.bin", b"xyxyxyxy".as_slice())], false);
		data.truncate(data.len() - 4);
		assert!(matches!(open(&mut Cursor::new(&data)), Err(Error::InvalidArchive(_))));
	}

	#[test]
	fn shift_jis_names() {
		let mut data = build_ald(&[("XXst.qnt", b"q".as_slice())], false);
		// katakana "te" in place of the XX marker
		data[TABLE_SIZE + NAME_OFFSET..TABLE_SIZE + NAME_OFFSET + 2].copy_from_slice(b"\x83\x65");
		let arch = open(&mut Cursor::new(&data)).unwrap();
		assert_eq!(arch.entries[0].name, "テst.qnt");
	}
}
