use crate::{TileDataError, TileView};

/// Owned tile bytes, stored in 32-bit words so [`TileView`] can borrow the
/// sections in place.
#[derive(Clone, PartialEq, Eq)]
pub struct TilePayload {
    words: Vec<u32>,
    len: usize,
}

impl TilePayload {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut words = vec![0u32; bytes.len().div_ceil(4)];
        bytemuck::cast_slice_mut::<u32, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);
        Self { words, len: bytes.len() }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u32, u8>(&self.words)[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn view(&self) -> Result<TileView<'_>, TileDataError> {
        TileView::parse(self.as_bytes())
    }
}

impl std::fmt::Debug for TilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TilePayload").field("len", &self.len).finish()
    }
}

impl AsRef<[u8]> for TilePayload {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
