use bytes::Bytes;

/// Chunks a peer advertises. Bit `i` lives in byte `i / 8`, high bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    num_chunks: usize,
}

impl Bitfield {
    /// Wrap a received bitfield payload.
    ///
    /// Short payloads are padded with zeroes so lookups past the end report the
    /// chunk as missing. Spare trailing bits are ignored.
    pub fn from_payload(payload: &Bytes, num_chunks: usize) -> Self {
        let mut bits = payload.to_vec();
        let expected = num_chunks.div_ceil(8);
        if bits.len() < expected {
            bits.resize(expected, 0);
        }
        Self { bits, num_chunks }
    }

    pub fn has_piece(&self, index: usize) -> bool {
        if index >= self.num_chunks {
            return false;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        (self.bits[byte_index] >> bit_index) & 1 == 1
    }

    /// Record a `have` announcement.
    pub fn set_piece(&mut self, index: usize) {
        if index >= self.num_chunks {
            return;
        }
        self.bits[index / 8] |= 1 << (7 - (index % 8));
    }

    pub fn count(&self) -> usize {
        (0..self.num_chunks).filter(|&i| self.has_piece(i)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msb_first() {
        let bf = Bitfield::from_payload(&Bytes::from_static(&[0b1000_0001, 0b0100_0000]), 16);
        assert!(bf.has_piece(0));
        assert!(!bf.has_piece(1));
        assert!(bf.has_piece(7));
        assert!(bf.has_piece(9));
        assert_eq!(bf.count(), 3);
    }

    #[test]
    fn test_short_payload_reads_as_missing() {
        let bf = Bitfield::from_payload(&Bytes::from_static(&[0xff]), 12);
        assert!(bf.has_piece(7));
        assert!(!bf.has_piece(8));
        assert!(!bf.has_piece(11));
    }

    #[test]
    fn test_spare_bits_out_of_range() {
        let bf = Bitfield::from_payload(&Bytes::from_static(&[0xff]), 3);
        assert!(bf.has_piece(2));
        assert!(!bf.has_piece(3));
        assert_eq!(bf.count(), 3);
    }

    #[test]
    fn test_set_piece() {
        let mut bf = Bitfield::from_payload(&Bytes::new(), 10);
        assert!(!bf.has_piece(9));
        bf.set_piece(9);
        bf.set_piece(42);
        assert!(bf.has_piece(9));
        assert_eq!(bf.count(), 1);
    }
}
