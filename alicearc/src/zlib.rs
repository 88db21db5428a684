use zune_inflate::{DeflateDecoder, DeflateOptions};
use crate::{Error, Result};

/// Decompress one whole zlib stream. `limit` caps the output allocation;
/// callers check the resulting length against whatever size their format
/// declares.
pub fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
	DeflateDecoder::new_with_options(
		data,
		DeflateOptions::default().set_limit(limit).set_size_hint(limit)
	)
	.decode_zlib()
	.map_err(|e| Error::Decompress(format!("{:?}", e.error)))
}
