use std::io::{Read, Seek, SeekFrom};
use crate::{byte_slice::ByteSlice, text, zlib, Error, Result};
use super::{check_bounds, Archive, ArchiveEntry, ArchiveKind};

// AFA is a sequence of chunks, each a 4-byte tag plus a u32 total length
// that covers the tag and the length word themselves:
//   "AFAH" 0x1C "AlicArch" u32 version  u32 unknown  u32 dataOffset
//   "INFO" len  u32 decompressedSize  u32 entryCount  (len-0x10 bytes of zlib)
// a DUMM chunk may sit between INFO and the DATA body; dataOffset locates
// the data region, so neither needs to be walked

pub fn open<R: Read + Seek>(r: &mut R) -> Result<Archive> {
	let file_len = r.seek(SeekFrom::End(0))?;
	r.seek(SeekFrom::Start(0))?;
	let mut head = [0u8; 0x1C];
	r.read_exact(&mut head)?;
	if &head[0..4] != b"AFAH" || &head[8..16] != b"AlicArch" {
		return Err(Error::invalid_archive("missing AFAH signature"));
	}
	let head_len = head
		.get_u32_at(4)
		.ok_or_else(|| Error::invalid_archive("truncated AFAH chunk"))?;
	if head_len != 0x1C {
		return Err(Error::invalid_archive(format!("AFAH chunk length {head_len:#x}, expected 0x1c")));
	}
	let version = head
		.get_u32_at(0x10)
		.ok_or_else(|| Error::invalid_archive("truncated AFAH chunk"))?;
	if version != 1 && version != 2 {
		return Err(Error::UnknownVersion(version));
	}
	// +0x14 holds an unknown word, observed 1
	let data_offset = head
		.get_u32_at(0x18)
		.map(u64::from)
		.ok_or_else(|| Error::invalid_archive("truncated AFAH chunk"))?;

	let mut info_head = [0u8; 0x10];
	r.read_exact(&mut info_head)?;
	if &info_head[0..4] != b"INFO" {
		return Err(Error::invalid_archive("missing INFO chunk"));
	}
	let info_len = info_head
		.get_u32_at(4)
		.ok_or_else(|| Error::invalid_archive("truncated INFO chunk"))?;
	if info_len < 0x10 || u64::from(info_len) > file_len {
		return Err(Error::invalid_archive(format!("INFO chunk length {info_len:#x} out of range")));
	}
	let decompressed_size = info_head
		.get_u32_at(8)
		.ok_or_else(|| Error::invalid_archive("truncated INFO chunk"))? as usize;
	let entry_count = info_head
		.get_u32_at(12)
		.ok_or_else(|| Error::invalid_archive("truncated INFO chunk"))? as usize;
	let mut compressed = vec![0u8; info_len as usize - 0x10];
	r.read_exact(&mut compressed)?;
	let info = zlib::inflate(&compressed, decompressed_size)?;
	if info.len() != decompressed_size {
		return Err(Error::invalid_archive(format!(
			"directory decompressed to {} bytes, header says {}",
			info.len(),
			decompressed_size
		)));
	}

	let entries = parse_entries(&info, version, entry_count, data_offset)?;
	check_bounds(&entries, file_len)?;
	Ok(Archive {kind: ArchiveKind::Afa, entries: entries.into()})
}

// per-entry record:
//   u32 nameLen, u32 paddedLen, nameLen bytes of Shift-JIS name,
//   paddedLen-nameLen bytes of pad, then three unknown u32s in version 1
//   (two in version 2), u32 entryOffset, u32 entrySize
fn parse_entries(info: &[u8], version: u32, entry_count: usize, data_offset: u64) -> Result<Vec<ArchiveEntry>> {
	let unknown_words = if version == 1 {3} else {2};
	let truncated = || Error::invalid_archive("truncated directory record");
	let mut entries = Vec::with_capacity(entry_count);
	let mut pos = 0usize;
	for _ in 0..entry_count {
		let name_len = info.get_u32_at(pos).ok_or_else(truncated)? as usize;
		let padded_len = info.get_u32_at(pos + 4).ok_or_else(truncated)? as usize;
		if padded_len < name_len {
			return Err(Error::invalid_archive("name padding shorter than the name"));
		}
		let name_bytes = info.get(pos + 8..pos + 8 + name_len).ok_or_else(truncated)?;
		let name = text::decode_sjis(name_bytes)?;
		pos += 8 + padded_len + 4 * unknown_words;
		let entry_offset = info.get_u32_at(pos).ok_or_else(truncated)?;
		let entry_size = info.get_u32_at(pos + 4).ok_or_else(truncated)?;
		pos += 8;
		entries.push(ArchiveEntry {
			name,
			offset: data_offset + u64::from(entry_offset),
			size: u64::from(entry_size)
		});
	}
	if pos != info.len() {
		return Err(Error::invalid_archive(format!(
			"{} bytes of directory records, {} left over",
			pos,
			info.len() - pos
		)));
	}
	Ok(entries)
}

#[cfg(test)]
pub(crate) mod tests {
	use std::io::Cursor;
	use miniz_oxide::deflate::compress_to_vec_zlib;
	use crate::Error;
	use super::open;

	fn push_u32(out: &mut Vec<u8>, v: u32) {
		out.extend_from_slice(&v.to_le_bytes());
	}

	// entry bodies are concatenated right after a DATA chunk header; offsets
	// in the directory are relative to the chunk start
	pub(crate) fn build_afa(version: u32, entries: &[(&str, &[u8])]) -> Vec<u8> {
		let mut records = Vec::new();
		let mut body = Vec::new();
		for (name, data) in entries {
			let padded_len = (name.len() + 4) & !3;
			push_u32(&mut records, name.len() as u32);
			push_u32(&mut records, padded_len as u32);
			records.extend_from_slice(name.as_bytes());
			records.resize(records.len() + padded_len - name.len(), 0);
			push_u32(&mut records, 1);
			push_u32(&mut records, 0x20);
			if version == 1 {
				push_u32(&mut records, 0);
			}
			push_u32(&mut records, 8 + body.len() as u32);
			push_u32(&mut records, data.len() as u32);
			body.extend_from_slice(data);
		}
		let packed = compress_to_vec_zlib(&records, 6);

		let info_len = 0x10 + packed.len();
		let data_offset = 0x1C + info_len;
		let mut out = Vec::new();
		out.extend_from_slice(b"AFAH");
		push_u32(&mut out, 0x1C);
		out.extend_from_slice(b"AlicArch");
		push_u32(&mut out, version);
		push_u32(&mut out, 1);
		push_u32(&mut out, data_offset as u32);
		out.extend_from_slice(b"INFO");
		push_u32(&mut out, info_len as u32);
		push_u32(&mut out, records.len() as u32);
		push_u32(&mut out, entries.len() as u32);
		out.extend_from_slice(&packed);
		out.extend_from_slice(b"DATA");
		push_u32(&mut out, (8 + body.len()) as u32);
		out.extend_from_slice(&body);
		out
	}

	#[test]
	fn parses_v1_directory() {
		let data = build_afa(1, &[("one.qnt", b"11".as_slice()), ("two.dcf", b"2222".as_slice())]);
		let mut r = Cursor::new(&data);
		let arch = open(&mut r).unwrap();
		assert_eq!(arch.len(), 2);
		assert_eq!(arch.entries[0].name, "one.qnt");
		assert_eq!(arch.entries[1].name, "two.dcf");
		assert_eq!(arch.read_entry(&mut r, 0).unwrap(), b"11");
		assert_eq!(arch.read_entry(&mut r, 1).unwrap(), b"2222");
	}

	#[test]
	fn parses_v2_directory() {
		let data = build_afa(2, &[("a", b"A".as_slice()), ("b", b"B".as_slice()), ("c", b"C".as_slice())]);
		let mut r = Cursor::new(&data);
		let arch = open(&mut r).unwrap();
		assert_eq!(arch.len(), 3);
		for (i, body) in [b"A", b"B", b"C"].iter().enumerate() {
			assert!(arch.entries[i].offset + arch.entries[i].size <= data.len() as u64);
			assert_eq!(&arch.read_entry(&mut r, i).unwrap(), body);
		}
	}

	#[test]
	fn rejects_unknown_version() {
		let data = build_afa(3, &[("a", b"A".as_slice())]);
		assert!(matches!(open(&mut Cursor::new(&data)), Err(Error::UnknownVersion(3))));
	}

	#[test]
	fn rejects_wrong_record_width() {
		// v1 records parsed with the v2 record width cannot consume the
		// directory exactly
		let mut data = build_afa(1, &[("a", b"A".as_slice())]);
		data[0x10..0x14].copy_from_slice(&2u32.to_le_bytes());
		assert!(matches!(open(&mut Cursor::new(&data)), Err(Error::InvalidArchive(_))));
	}

	#[test]
	fn rejects_decompressed_size_mismatch() {
		let mut data = build_afa(2, &[("a", b"A".as_slice())]);
		let declared = u32::from_le_bytes(data[0x24..0x28].try_into().unwrap());
		data[0x24..0x28].copy_from_slice(&(declared + 1).to_le_bytes());
		assert!(matches!(open(&mut Cursor::new(&data)), Err(Error::InvalidArchive(_))));
	}

	#[test]
	fn rejects_missing_signature() {
		let data = b"AFAX????AlicArch????????????".to_vec();
		assert!(matches!(open(&mut Cursor::new(&data)), Err(Error::InvalidArchive(_))));
	}
}
