/// Growable byte buffer that tracks a filled region.
///
/// ```not_rust
/// [          Vec capacity             ]
/// [ filled | unfilled |               ]
/// [    initialized    | uninitialized ]
/// ```
pub struct WriteBuf {
    inner: Vec<u8>,
    filled: usize,
}

impl WriteBuf {
    #[inline]
    pub const fn new() -> Self {
        Self {
            inner: Vec::new(),
            filled: 0,
        }
    }

    #[inline]
    pub fn into_inner(mut self) -> Vec<u8> {
        self.inner.truncate(self.filled);
        self.inner
    }

    #[inline]
    pub const fn filled_len(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.inner[..self.filled]
    }

    /// Ensures the initialized, unfilled portion can hold `additional` more bytes.
    #[inline]
    pub fn initialize(&mut self, additional: usize) {
        if self.inner.len() < self.filled + additional {
            self.inner.resize(self.filled + additional, 0);
        }
    }

    /// Returns the first `n` bytes of the unfilled region, growing as necessary.
    #[inline]
    pub fn unfilled_to(&mut self, n: usize) -> &mut [u8] {
        self.initialize(n);
        &mut self.inner[self.filled..self.filled + n]
    }

    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.filled += n;
    }

    #[inline]
    pub fn write_slice(&mut self, slice: &[u8]) {
        let n = slice.len();
        self.initialize(n);
        self.inner[self.filled..self.filled + n].copy_from_slice(slice);
        self.filled += n;
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.write_slice(&[value]);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}

impl Default for WriteBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for WriteBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WriteBuf")
            .field("filled_len", &self.filled)
            .field("capacity", &self.inner.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfilled_to_grows_and_advance_tracks() {
        let mut buf = WriteBuf::new();
        buf.unfilled_to(4).copy_from_slice(&[1, 2, 3, 4]);
        buf.advance(4);
        buf.write_slice(&[5, 6]);
        assert_eq!(buf.filled(), &[1, 2, 3, 4, 5, 6]);
        buf.clear();
        assert!(buf.is_empty());
    }
}
