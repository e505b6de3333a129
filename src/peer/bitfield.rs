use bytes::Bytes;

/// Piece possession vector, one bit per piece.
///
/// Bits are numbered from the high bit of the first byte, as on the wire.
/// The piece count is fixed at construction and never changes; indices past
/// the end read as unset and are ignored by [`set`](Bitfield::set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    /// An empty bitfield (no pieces).
    pub fn new(piece_count: usize) -> Self {
        Self {
            bits: vec![0; piece_count.div_ceil(8)],
            piece_count,
        }
    }

    /// A bitfield with every piece set.
    pub fn full(piece_count: usize) -> Self {
        let mut bf = Self {
            bits: vec![0xFF; piece_count.div_ceil(8)],
            piece_count,
        };
        bf.clear_spare_bits();
        bf
    }

    /// Builds a bitfield from wire bytes. Short input is zero-padded, extra
    /// bytes and spare trailing bits are dropped.
    pub fn from_bytes(bytes: &[u8], piece_count: usize) -> Self {
        let mut bits = bytes.to_vec();
        bits.resize(piece_count.div_ceil(8), 0);
        let mut bf = Self { bits, piece_count };
        bf.clear_spare_bits();
        bf
    }

    fn locate(&self, index: usize) -> Option<(usize, u8)> {
        (index < self.piece_count).then(|| (index / 8, 0x80u8 >> (index % 8)))
    }

    pub fn has(&self, index: usize) -> bool {
        self.locate(index)
            .is_some_and(|(byte, mask)| self.bits[byte] & mask != 0)
    }

    /// Sets bit `index`. Returns true if the bit was previously unset.
    pub fn set(&mut self, index: usize) -> bool {
        match self.locate(index) {
            Some((byte, mask)) => {
                let was_set = self.bits[byte] & mask != 0;
                self.bits[byte] |= mask;
                !was_set
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == self.piece_count
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Number of pieces (not bytes).
    pub fn len(&self) -> usize {
        self.piece_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }

    /// Indices of unset pieces.
    pub fn missing(&self) -> Vec<usize> {
        (0..self.piece_count).filter(|&i| !self.has(i)).collect()
    }

    /// Indices this bitfield has that `ours` lacks.
    pub fn wanted_by(&self, ours: &Bitfield) -> Vec<usize> {
        (0..self.piece_count)
            .filter(|&i| self.has(i) && !ours.has(i))
            .collect()
    }

    fn clear_spare_bits(&mut self) {
        let spare = self.bits.len() * 8 - self.piece_count;
        if let (1..=7, Some(last)) = (spare, self.bits.last_mut()) {
            *last &= 0xFFu8 << spare;
        }
    }
}
