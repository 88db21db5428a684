use encoding_rs::SHIFT_JIS;
use crate::{Error, Result};

/// Decode a Shift-JIS byte run. Invalid sequences are an error, never a
/// replacement character.
pub fn decode_sjis(bytes: &[u8]) -> Result<String> {
	SHIFT_JIS
		.decode_without_bom_handling_and_without_replacement(bytes)
		.map(|s| s.into_owned())
		.ok_or(Error::TextDecode)
}

/// Fixed-width name fields are NUL-padded; everything from the first NUL on
/// is padding.
pub fn until_nul(bytes: &[u8]) -> &[u8] {
	&bytes[..bytes.iter().position(|x| *x == 0).unwrap_or(bytes.len())]
}
