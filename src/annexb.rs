//! Start-code framing as defined in _ITU-T Recommendation H.264 - Annex B_, as used when H264
//! data is embedded in an MPEG2 Transport Stream.
//!
//! The scanning here works over a chain of buffers so that a start code split between two
//! submitted buffers is still found.

use bytes::Bytes;

/// The three-byte `0x000001` start code prefix.
pub const START_CODE_PREFIX: StartCodePattern = StartCodePattern {
    length_bits: 24,
    value: 0x00_0001,
};

/// A fixed byte pattern delimiting units, such as the Annex B start code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCodePattern {
    /// whole bytes only; at most 32
    pub length_bits: u32,
    pub value: u32,
}
impl StartCodePattern {
    pub fn len_bytes(&self) -> usize {
        (self.length_bits / 8) as usize
    }

    /// The `i`th byte of the pattern, most significant first.
    pub fn byte(&self, i: usize) -> u8 {
        let shift = (self.len_bytes() - 1 - i) * 8;
        (self.value >> shift) as u8
    }
}

/// Returns true if the pattern starts at `offset` within `buffers[index]`, possibly
/// continuing into the following buffers.
pub fn matches_across(
    buffers: &[Bytes],
    index: usize,
    offset: usize,
    pattern: &StartCodePattern,
) -> bool {
    let mut i = 0;
    let mut buf_index = index;
    let mut pos = offset;
    while i < pattern.len_bytes() {
        let Some(buf) = buffers.get(buf_index) else {
            return false;
        };
        if pos >= buf.len() {
            buf_index += 1;
            pos = 0;
            continue;
        }
        if buf[pos] != pattern.byte(i) {
            return false;
        }
        i += 1;
        pos += 1;
    }
    true
}

/// Finds the first offset at or after `from` in `buf` where the pattern could start, judging
/// by its first byte only.
pub fn find_candidate(buf: &[u8], from: usize, pattern: &StartCodePattern) -> Option<usize> {
    memchr::memchr(pattern.byte(0), &buf[from..]).map(|i| from + i)
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::*;

    #[test]
    fn pattern_bytes() {
        assert_eq!(START_CODE_PREFIX.len_bytes(), 3);
        assert_eq!(START_CODE_PREFIX.byte(0), 0);
        assert_eq!(START_CODE_PREFIX.byte(2), 1);
    }

    #[test]
    fn split_start_code() {
        let buffers = vec![
            Bytes::from_static(&hex!("65 88 00")),
            Bytes::from_static(&hex!("00")),
            Bytes::from_static(&hex!("01 67")),
        ];
        assert!(matches_across(&buffers, 0, 2, &START_CODE_PREFIX));
        assert!(!matches_across(&buffers, 0, 1, &START_CODE_PREFIX));
        // runs off the end of the chain
        assert!(!matches_across(&buffers, 2, 1, &START_CODE_PREFIX));
    }

    #[test]
    fn candidate() {
        let buf = hex!("65 88 84 00 21");
        assert_eq!(find_candidate(&buf, 0, &START_CODE_PREFIX), Some(3));
        assert_eq!(find_candidate(&buf, 4, &START_CODE_PREFIX), None);
    }
}
