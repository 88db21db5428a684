macro_rules! impl_byte_readers {
	($($t:ty),*) => {paste::paste! {$(
		fn [<get_ $t _at>](&self, offset: usize) -> Option<$t> {
			Some($t::from_le_bytes(self.get(offset..offset + size_of::<$t>())?.try_into().unwrap()))
		}
	)*}}
}

/// Bounded little-endian integer reads over a byte slice.
pub trait ByteSlice {
	fn get_u8_at(&self, offset: usize) -> Option<u8>;
	fn get_u16_at(&self, offset: usize) -> Option<u16>;
	fn get_u32_at(&self, offset: usize) -> Option<u32>;
	/// Three bytes packed low to high, as used by the ALD offset table.
	fn get_u24_at(&self, offset: usize) -> Option<u32>;
}

impl ByteSlice for [u8] {
	impl_byte_readers!(u8, u16, u32);

	fn get_u24_at(&self, offset: usize) -> Option<u32> {
		let b = self.get(offset..offset + 3)?;
		Some(u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16)
	}
}
