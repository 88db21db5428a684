use std::io::{Read, Seek, SeekFrom};
use crate::{byte_slice::ByteSlice, text, zlib, Error, Result};
use super::{qnt, Raster};

// DCF is three chunks in fixed order, each a 4-byte tag plus a u32 body
// length:
//   "dcf "  u32 version, u32 width, u32 height, u32 reserved,
//           u32 nameLen, nameLen obfuscated base-image name bytes
//   "dfdl"  u32 decompressedSize, zlib-packed 16x16 block alpha mask
//   "dcgd"  an embedded QNT payload

const BLOCK: usize = 16;

fn chunk_len<R: Read>(r: &mut R, tag: &[u8; 4]) -> Result<usize> {
	let mut head = [0u8; 8];
	r.read_exact(&mut head)?;
	if &head[0..4] != tag {
		return Err(Error::invalid_format(format!("missing {} chunk", String::from_utf8_lossy(tag).trim_end())));
	}
	Ok(u32::from_le_bytes([head[4], head[5], head[6], head[7]]) as usize)
}

struct Header {
	width: u32,
	height: u32,
	base_name: String
}

fn read_header<R: Read>(r: &mut R) -> Result<Header> {
	let len = chunk_len(r, b"dcf ")?;
	let mut body = vec![0u8; len];
	r.read_exact(&mut body)?;
	let truncated = || Error::invalid_format("truncated dcf chunk");
	// +0 is a version word (observed 1), +12 a reserved word (observed 0x20)
	let width = body.get_u32_at(4).ok_or_else(truncated)?;
	let height = body.get_u32_at(8).ok_or_else(truncated)?;
	let name_len = body.get_u32_at(16).ok_or_else(truncated)? as usize;
	if len != 20 + name_len {
		return Err(Error::invalid_format(format!("dcf chunk is {len} bytes, its fields need {}", 20 + name_len)));
	}
	// the stored name is each Shift-JIS byte rotated right by
	// (nameLen % 7) + 1; a left rotation recovers it
	let rot = (name_len % 7 + 1) as u32;
	let name_bytes: Vec<u8> = body[20..].iter().map(|b| b.rotate_left(rot)).collect();
	Ok(Header {width, height, base_name: text::decode_sjis(&name_bytes)?})
}

/// Parse only the `dcf ` header chunk and recover the base-image name, for
/// listings that do not need pixels.
pub fn read_base_name<R: Read>(r: &mut R) -> Result<String> {
	Ok(read_header(r)?.base_name)
}

/// Decode a DCF overlay into its raster and the name of the base image it
/// composites onto.
pub fn decode<R: Read + Seek>(r: &mut R) -> Result<(Raster, String)> {
	let header = read_header(r)?;

	let len = chunk_len(r, b"dfdl")?;
	if len < 4 {
		return Err(Error::invalid_format("dfdl chunk too short"));
	}
	let mut body = vec![0u8; len];
	r.read_exact(&mut body)?;
	let decompressed_size = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
	let raw = zlib::inflate(&body[4..], decompressed_size)?;
	if raw.len() != decompressed_size {
		return Err(Error::invalid_format(format!(
			"alpha mask decompressed to {} bytes, its chunk says {decompressed_size}",
			raw.len()
		)));
	}
	let mask_count = raw
		.get_u32_at(0)
		.ok_or_else(|| Error::invalid_format("alpha mask too short"))? as usize;
	let mask = &raw[4..];
	if mask.len() != mask_count {
		return Err(Error::invalid_format(format!(
			"alpha mask holds {} bytes, its count field says {mask_count}",
			mask.len()
		)));
	}

	// the embedded image; the chunk length decides where the stream resumes,
	// not however many bytes the decoder consumed
	let len = chunk_len(r, b"dcgd")? as u64;
	let body_start = r.stream_position()?;
	let mut raster = qnt::decode(r)?;
	r.seek(SeekFrom::Start(body_start + len))?;

	apply_mask(&mut raster, mask, header.width, header.height)?;
	Ok((raster, header.base_name))
}

// each mask byte covers a 16x16 block; 1 clears the block's alpha, 0 keeps
// it. the grid floors to whole blocks, so partial right/bottom tiles keep
// their decoded alpha
fn apply_mask(raster: &mut Raster, mask: &[u8], width: u32, height: u32) -> Result<()> {
	let tx = width as usize / BLOCK;
	let ty = height as usize / BLOCK;
	if tx * ty != mask.len() {
		return Err(Error::invalid_format(format!(
			"expected {} mask blocks for {width}x{height}, got {}",
			tx * ty,
			mask.len()
		)));
	}
	let w = width.min(raster.width) as usize;
	let h = height.min(raster.height) as usize;
	let mut k = 0;
	for i in 0..ty {
		for j in 0..tx {
			let value = mask[k];
			k += 1;
			if value == 0 {
				continue;
			}
			if value != 1 {
				return Err(Error::invalid_format(format!("bad alpha mask byte {value:#x}")));
			}
			let x0 = (j * BLOCK).min(w);
			let x1 = (j * BLOCK + BLOCK).min(w);
			let y1 = (i * BLOCK + BLOCK).min(h);
			for y in i * BLOCK..y1 {
				for p in &mut raster.row_mut(y as u32)[x0..x1] {
					p.a = 0;
				}
			}
		}
	}
	Ok(())
}
