use std::io::{Read, Seek, SeekFrom};
use crate::{zlib, Error, Result};
use super::{Pixel, Raster};

// QNT header, all little-endian:
// +0x00  "QNT\0"
// +0x04  u32 version
// +0x08  u32 headerLen      only present when version != 0, else 48
// then eight u32s: x, y, width, height, depth, reserved, rgbSize,
// alphaSize; anything left before headerLen is skipped

const BASE_HEADER_LEN: u64 = 48;
// plane allocation ceiling against absurd declared dimensions
const MAX_PIXELS: u64 = 0x0400_0000;

pub fn decode<R: Read + Seek>(r: &mut R) -> Result<Raster> {
	let mut head = [0u8; 8];
	r.read_exact(&mut head)?;
	if &head[0..4] != b"QNT\0" {
		return Err(Error::invalid_format("missing QNT signature"));
	}
	let version = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
	let mut read_so_far = 8u64;
	let header_len = if version == 0 {
		BASE_HEADER_LEN
	} else {
		let mut b = [0u8; 4];
		r.read_exact(&mut b)?;
		read_so_far += 4;
		u64::from(u32::from_le_bytes(b))
	};

	let mut info = [0u8; 32];
	r.read_exact(&mut info)?;
	read_so_far += 32;
	let mut fields = [0u32; 8];
	for (i, f) in fields.iter_mut().enumerate() {
		*f = u32::from_le_bytes([info[i * 4], info[i * 4 + 1], info[i * 4 + 2], info[i * 4 + 3]]);
	}
	let [x, y, width, height, depth, _reserved, rgb_size, alpha_size] = fields;
	if depth != 24 {
		return Err(Error::invalid_format(format!("unsupported color depth {depth}, only 24bpp QNT is handled")));
	}
	if read_so_far < header_len {
		r.seek(SeekFrom::Current((header_len - read_so_far) as i64))?;
	}

	if width == 0 || height == 0 {
		return Ok(Raster {x, y, width, height, pixels: Box::default()});
	}
	if u64::from(width) * u64::from(height) > MAX_PIXELS {
		return Err(Error::invalid_format(format!("unreasonable image size {width}x{height}")));
	}

	// planes are padded to even dimensions
	let pw = (width + (width & 1)) as usize;
	let ph = (height + (height & 1)) as usize;
	let plane_size = pw * ph;

	let pos = r.stream_position()?;
	let end = r.seek(SeekFrom::End(0))?;
	r.seek(SeekFrom::Start(pos))?;
	if u64::from(rgb_size) + u64::from(alpha_size) > end.saturating_sub(pos) {
		return Err(Error::invalid_format(format!(
			"{} bytes of plane data declared, {} available",
			u64::from(rgb_size) + u64::from(alpha_size),
			end.saturating_sub(pos)
		)));
	}

	let mut planes: [Vec<u8>; 4] = std::array::from_fn(|_| vec![0u8; plane_size]);
	if rgb_size > 0 {
		// reading the declared compressed size up front also skips whatever
		// the zlib stream leaves unconsumed, keeping the next chunk aligned
		let mut compressed = vec![0u8; rgb_size as usize];
		r.read_exact(&mut compressed)?;
		let raw = zlib::inflate(&compressed, 3 * plane_size)?;
		if raw.len() != 3 * plane_size {
			return Err(Error::invalid_format(format!(
				"rgb planes decompressed to {} bytes, expected {}",
				raw.len(),
				3 * plane_size
			)));
		}
		// planes are stored blue first
		for (i, chunk) in raw.chunks_exact(plane_size).enumerate() {
			let plane = &mut planes[2 - i];
			unshuffle_tiles(chunk, plane, pw, ph);
			unpredict(plane, pw, ph);
		}
	}
	if alpha_size > 0 {
		let mut compressed = vec![0u8; alpha_size as usize];
		r.read_exact(&mut compressed)?;
		let raw = zlib::inflate(&compressed, plane_size)?;
		if raw.len() != plane_size {
			return Err(Error::invalid_format(format!(
				"alpha plane decompressed to {} bytes, expected {plane_size}",
				raw.len()
			)));
		}
		// the alpha plane is predicted but not tiled
		planes[3].copy_from_slice(&raw);
		unpredict(&mut planes[3], pw, ph);
	} else {
		planes[3].fill(0xFF);
	}

	let mut raster = Raster::new(x, y, width, height);
	for i in 0..height {
		let base = i as usize * pw;
		for (j, p) in raster.row_mut(i).iter_mut().enumerate() {
			*p = Pixel {
				r: planes[0][base + j],
				g: planes[1][base + j],
				b: planes[2][base + j],
				a: planes[3][base + j]
			};
		}
	}
	Ok(raster)
}

// the compressed plane is a sequence of 2x2 tiles in row-major tile order,
// four bytes per tile as left-upper, left-lower, right-upper, right-lower
fn unshuffle_tiles(raw: &[u8], dst: &mut [u8], w: usize, h: usize) {
	let mut k = 0;
	for j in (0..h).step_by(2) {
		let mut p = j * w;
		for _ in (0..w).step_by(2) {
			dst[p] = raw[k];
			dst[p + w] = raw[k + 1];
			dst[p + 1] = raw[k + 2];
			dst[p + w + 1] = raw[k + 3];
			p += 2;
			k += 4;
		}
	}
}

// the first row and column predict from their single neighbor, everything
// else from the average of the left and upper neighbors; all stored values
// are prediction minus pixel, wrapping
fn unpredict(buf: &mut [u8], w: usize, h: usize) {
	let mut k = 1;
	for _ in 1..w {
		buf[k] = buf[k - 1].wrapping_sub(buf[k]);
		k += 1;
	}
	let mut prev = 0;
	for _ in 1..h {
		buf[k] = buf[prev].wrapping_sub(buf[k]);
		k += 1;
		prev += 1;
		for _ in 1..w {
			let avg = ((u16::from(buf[prev]) + u16::from(buf[k - 1])) >> 1) as u8;
			buf[k] = avg.wrapping_sub(buf[k]);
			k += 1;
			prev += 1;
		}
	}
}
