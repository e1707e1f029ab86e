//! Bit reader over the chain of buffers submitted for one pre-parse call.
//!
//! The reader pulls from its own list of buffers as each one is exhausted, removes emulation
//! prevention bytes as bytes are loaded, and refuses to read past the delimiter of the next
//! unit. A failed read leaves a sticky fault which every later read reports until
//! [`StreamReader::take_exception()`] is called.

use crate::annexb::{self, StartCodePattern};
use crate::rbsp::{BitRead, BitReaderError, ReadFault};
use bytes::Bytes;
use log::*;

/// Escaping applied to unit payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmulationPrevention {
    #[default]
    None,
    /// `0x03` following two zero bytes is dropped (H264 Annex B and length-prefixed).
    ZeroZeroThree,
    /// `0x00` following `0xFF` is dropped.
    FfZero,
    /// `0x02` following two zero bytes is dropped.
    ZeroZeroTwo,
}

/// How unit boundaries are marked in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    StartCode(StartCodePattern),
    /// A big-endian length field of the given width precedes each unit.
    Size { length_bits: u32 },
    /// Unit sizes are supplied by the caller, or the unit runs to the end of the data.
    None,
}

/// A byte location within the chain: index of the buffer in submission order, and offset
/// within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct StreamPosition {
    pub buffer: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seek {
    Delimiter,
    EndOfData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Delimiter,
    EndOfData,
    Neither,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpGolomb {
    Unsigned,
    Signed,
}

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    pos: StreamPosition,
    cache: u8,
    cache_bits: u32,
    zeros: u8,
    last_ff: bool,
    unit_remaining: Option<usize>,
    unit_bits: u64,
    total_bits: u64,
    invalid_emulation: bool,
}

pub struct StreamReader {
    buffers: Vec<Bytes>,
    total_size: usize,
    delimiter: Delimiter,
    emulation: EmulationPrevention,
    cursor: Cursor,
    exception: Option<ReadFault>,
}
impl Default for StreamReader {
    fn default() -> Self {
        StreamReader {
            buffers: Vec::new(),
            total_size: 0,
            delimiter: Delimiter::None,
            emulation: EmulationPrevention::None,
            cursor: Cursor::default(),
            exception: None,
        }
    }
}
impl StreamReader {
    /// Resets all state and takes the buffers of a new call.
    pub fn start(
        &mut self,
        delimiter: Delimiter,
        buffers: Vec<Bytes>,
        emulation: EmulationPrevention,
    ) {
        self.total_size = buffers.iter().map(|b| b.len()).sum();
        self.buffers = buffers;
        self.delimiter = delimiter;
        self.emulation = emulation;
        self.cursor = Cursor::default();
        self.exception = None;
        self.normalize();
    }

    pub fn set_delimiter(&mut self, delimiter: Delimiter) {
        self.delimiter = delimiter;
        self.cursor.unit_remaining = None;
    }

    pub fn set_emulation(&mut self, emulation: EmulationPrevention) {
        self.emulation = emulation;
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn position(&self) -> StreamPosition {
        self.cursor.pos
    }

    pub fn byte_offset_in_current_buffer(&self) -> usize {
        self.cursor.pos.offset
    }

    /// Logical (post emulation removal) bits read since `start()`.
    pub fn total_bits_consumed(&self) -> u64 {
        self.cursor.total_bits
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor.pos.buffer >= self.buffers.len()
    }

    /// Returns the pending fault, clearing it.
    pub fn take_exception(&mut self) -> Option<ReadFault> {
        self.exception.take()
    }

    /// Returns whether an out-of-range emulation prevention byte was seen in the current unit.
    pub fn take_invalid_emulation(&mut self) -> bool {
        std::mem::take(&mut self.cursor.invalid_emulation)
    }

    fn normalize(&mut self) {
        while let Some(buf) = self.buffers.get(self.cursor.pos.buffer) {
            if self.cursor.pos.offset < buf.len() {
                break;
            }
            self.cursor.pos.buffer += 1;
            self.cursor.pos.offset = 0;
        }
    }

    /// The raw byte `ahead` bytes past the cursor.
    fn raw_at(&self, ahead: usize) -> Option<u8> {
        let mut pos = self.cursor.pos;
        let mut ahead = ahead;
        loop {
            let buf = self.buffers.get(pos.buffer)?;
            let avail = buf.len() - pos.offset;
            if ahead < avail {
                return Some(buf[pos.offset + ahead]);
            }
            ahead -= avail;
            pos.buffer += 1;
            pos.offset = 0;
        }
    }

    fn advance_raw(&mut self, n: usize) -> usize {
        let mut left = n;
        while left > 0 {
            let Some(buf) = self.buffers.get(self.cursor.pos.buffer) else {
                break;
            };
            let step = left.min(buf.len() - self.cursor.pos.offset);
            self.cursor.pos.offset += step;
            left -= step;
            self.normalize();
        }
        let advanced = n - left;
        if let Some(rem) = self.cursor.unit_remaining.as_mut() {
            *rem = rem.saturating_sub(advanced);
        }
        advanced
    }

    fn delimiter_at_cursor(&self) -> bool {
        match self.delimiter {
            Delimiter::StartCode(pattern) => annexb::matches_across(
                &self.buffers,
                self.cursor.pos.buffer,
                self.cursor.pos.offset,
                &pattern,
            ),
            _ => false,
        }
    }

    /// Loads the next payload byte, dropping emulation prevention bytes.
    fn next_byte(&mut self) -> Result<u8, ReadFault> {
        loop {
            if self.cursor.unit_remaining == Some(0) {
                return Err(if self.is_at_end() {
                    ReadFault::AccessBeyondEndOfData
                } else {
                    ReadFault::AccessIntoDelimiter
                });
            }
            let b = self.raw_at(0).ok_or(ReadFault::AccessBeyondEndOfData)?;
            if let Delimiter::StartCode(pattern) = self.delimiter {
                if b == pattern.byte(0) && self.delimiter_at_cursor() {
                    return Err(ReadFault::AccessIntoDelimiter);
                }
            }
            self.advance_raw(1);
            let escaped = match self.emulation {
                EmulationPrevention::ZeroZeroThree => self.cursor.zeros >= 2 && b == 0x03,
                EmulationPrevention::ZeroZeroTwo => self.cursor.zeros >= 2 && b == 0x02,
                EmulationPrevention::FfZero => self.cursor.last_ff && b == 0x00,
                EmulationPrevention::None => false,
            };
            if escaped {
                self.cursor.zeros = 0;
                self.cursor.last_ff = false;
                if self.emulation == EmulationPrevention::ZeroZeroThree {
                    if let Some(next) = self.raw_at(0) {
                        if next > 0x03 {
                            warn!("invalid emulation byte: 00 00 03 followed by {:#04x}", next);
                            self.cursor.invalid_emulation = true;
                        }
                    }
                }
                continue;
            }
            self.cursor.zeros = if b == 0 {
                self.cursor.zeros.saturating_add(1)
            } else {
                0
            };
            self.cursor.last_ff = b == 0xFF;
            return Ok(b);
        }
    }

    fn read_bits_inner(&mut self, n: u32) -> Result<u32, ReadFault> {
        assert!(n <= 32, "at most 32 bits may be read at once, not {}", n);
        let mut v: u64 = 0;
        let mut remaining = n;
        while remaining > 0 {
            if self.cursor.cache_bits == 0 {
                self.cursor.cache = self.next_byte()?;
                self.cursor.cache_bits = 8;
            }
            let take = remaining.min(self.cursor.cache_bits);
            let shift = self.cursor.cache_bits - take;
            let bits = (u64::from(self.cursor.cache) >> shift) & ((1 << take) - 1);
            v = (v << take) | bits;
            self.cursor.cache_bits -= take;
            remaining -= take;
        }
        self.cursor.unit_bits += u64::from(n);
        self.cursor.total_bits += u64::from(n);
        Ok(v as u32)
    }

    /// Reads up to 32 bits, most significant first.
    pub fn read_bits(&mut self, n: u32) -> Result<u32, ReadFault> {
        if let Some(e) = self.exception {
            return Err(e);
        }
        self.read_bits_inner(n).map_err(|e| {
            self.exception = Some(e);
            e
        })
    }

    /// Like `read_bits()`, leaving the reader where it was. Never sets the sticky fault.
    pub fn peek_bits(&mut self, n: u32) -> Result<u32, ReadFault> {
        if let Some(e) = self.exception {
            return Err(e);
        }
        let saved = self.cursor;
        let result = self.read_bits_inner(n);
        self.cursor = saved;
        result
    }

    pub fn read_exp_golomb(&mut self, kind: ExpGolomb) -> Result<i64, BitReaderError> {
        match kind {
            ExpGolomb::Unsigned => self.read_ue("exp_golomb").map(i64::from),
            ExpGolomb::Signed => self.read_se("exp_golomb").map(i64::from),
        }
    }

    /// Discards any partially read byte.
    pub fn align(&mut self) {
        let rem = self.cursor.cache_bits;
        self.cursor.cache_bits = 0;
        self.cursor.unit_bits += u64::from(rem);
        self.cursor.total_bits += u64::from(rem);
    }

    /// Reads one whole byte with emulation prevention suspended, for the out-of-band header
    /// fields of a codec-config record.
    pub fn read_raw_u8(&mut self) -> Result<u8, ReadFault> {
        self.align();
        let emulation = std::mem::replace(&mut self.emulation, EmulationPrevention::None);
        let result = self.read_bits(8);
        self.emulation = emulation;
        result.map(|v| v as u8)
    }

    /// Returns true if the unit holds anything other than `rbsp_trailing_bits()` past the
    /// current position.
    pub fn check_more_trailing_data(&mut self) -> bool {
        if self.exception.is_some() {
            return false;
        }
        let saved = self.cursor;
        let mut first_bit = None;
        let mut later_one = false;
        while let Ok(bit) = self.read_bits_inner(1) {
            if first_bit.is_none() {
                first_bit = Some(bit);
            } else if bit == 1 {
                later_one = true;
                break;
            }
        }
        self.cursor = saved;
        later_one
    }

    /// Moves to the next delimiter, or to the end of the data. The skipped bytes are left in
    /// whichever segment is active.
    pub fn seek_delimiter_or_end(&mut self) -> Seek {
        self.cursor.cache_bits = 0;
        match self.delimiter {
            Delimiter::StartCode(pattern) => loop {
                let pos = self.cursor.pos;
                let Some(buf) = self.buffers.get(pos.buffer) else {
                    return Seek::EndOfData;
                };
                match annexb::find_candidate(buf, pos.offset, &pattern) {
                    Some(i) => {
                        self.advance_raw(i - pos.offset);
                        if self.delimiter_at_cursor() {
                            return Seek::Delimiter;
                        }
                        self.advance_raw(1);
                    }
                    None => {
                        self.advance_raw(buf.len() - pos.offset);
                    }
                }
            },
            Delimiter::Size { .. } => {
                if let Some(rem) = self.cursor.unit_remaining.take() {
                    self.advance_raw(rem);
                }
                if self.is_at_end() {
                    Seek::EndOfData
                } else {
                    Seek::Delimiter
                }
            }
            Delimiter::None => {
                match self.cursor.unit_remaining.take() {
                    Some(rem) => {
                        self.advance_raw(rem);
                    }
                    None => {
                        self.advance_raw(self.total_size);
                    }
                }
                if self.is_at_end() {
                    Seek::EndOfData
                } else {
                    Seek::Delimiter
                }
            }
        }
    }

    /// Like `seek_delimiter_or_end()` without consuming anything.
    pub fn check_delimiter_or_end(&self) -> Check {
        if self.is_at_end() {
            return Check::EndOfData;
        }
        match self.delimiter {
            Delimiter::StartCode(_) if self.cursor.cache_bits == 0 && self.delimiter_at_cursor() => {
                Check::Delimiter
            }
            Delimiter::Size { .. } => match self.cursor.unit_remaining {
                None | Some(0) => Check::Delimiter,
                _ => Check::Neither,
            },
            _ => Check::Neither,
        }
    }

    /// Validates and consumes the delimiter at the cursor.
    ///
    /// `classify` is given the unit-type byte following the delimiter, and the position of the
    /// delimiter's first byte, before anything is consumed. For size-delimited units (and
    /// caller-sized units when the format has no delimiter) the unit size is returned.
    pub fn consume_delimiter<F: FnOnce(u8, StreamPosition)>(
        &mut self,
        emulation: EmulationPrevention,
        external_size: Option<usize>,
        classify: F,
    ) -> Result<Option<usize>, ReadFault> {
        self.normalize();
        let start = self.cursor.pos;
        let (header_len, size) = match self.delimiter {
            Delimiter::StartCode(pattern) => {
                if !self.delimiter_at_cursor() {
                    return Err(ReadFault::InsufficientData);
                }
                (pattern.len_bytes(), None)
            }
            Delimiter::Size { length_bits } => {
                let n = (length_bits / 8) as usize;
                let mut size = 0usize;
                for i in 0..n {
                    let b = self.raw_at(i).ok_or(ReadFault::InsufficientData)?;
                    size = (size << 8) | usize::from(b);
                }
                (n, Some(size))
            }
            Delimiter::None => (0, external_size),
        };
        let type_byte = if size == Some(0) {
            0
        } else {
            self.raw_at(header_len).ok_or(ReadFault::InsufficientData)?
        };
        classify(type_byte, start);
        self.cursor.unit_remaining = None;
        self.advance_raw(header_len);
        self.emulation = emulation;
        self.cursor.unit_remaining = size;
        self.cursor.cache_bits = 0;
        self.cursor.zeros = 0;
        self.cursor.last_ff = false;
        self.cursor.unit_bits = 0;
        self.cursor.invalid_emulation = false;
        Ok(size)
    }
}

impl BitRead for StreamReader {
    fn read_u32(&mut self, bit_count: u32, name: &'static str) -> Result<u32, BitReaderError> {
        self.read_bits(bit_count)
            .map_err(|e| BitReaderError::ReaderErrorFor(name, e))
    }

    fn read_bool(&mut self, name: &'static str) -> Result<bool, BitReaderError> {
        self.read_u32(1, name).map(|v| v == 1)
    }

    fn skip(&mut self, bit_count: u32, name: &'static str) -> Result<(), BitReaderError> {
        let mut left = bit_count;
        while left > 0 {
            let step = left.min(32);
            self.read_u32(step, name)?;
            left -= step;
        }
        Ok(())
    }

    fn has_more_rbsp_data(&mut self, _name: &'static str) -> Result<bool, BitReaderError> {
        Ok(self.check_more_trailing_data())
    }

    fn bits_consumed(&self) -> u64 {
        self.cursor.unit_bits
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::annexb::START_CODE_PREFIX;
    use crate::rbsp::EXP_GOLOMB_SENTINEL;
    use hex_literal::*;

    fn reader(delimiter: Delimiter, bufs: &[&'static [u8]]) -> StreamReader {
        let mut r = StreamReader::default();
        r.start(
            delimiter,
            bufs.iter().map(|b| Bytes::from_static(b)).collect(),
            EmulationPrevention::ZeroZeroThree,
        );
        r
    }

    fn annexb(bufs: &[&'static [u8]]) -> StreamReader {
        reader(Delimiter::StartCode(START_CODE_PREFIX), bufs)
    }

    fn consume(r: &mut StreamReader) -> (u8, StreamPosition) {
        let mut seen = None;
        r.consume_delimiter(EmulationPrevention::ZeroZeroThree, None, |b, pos| {
            seen = Some((b, pos))
        })
        .unwrap();
        seen.unwrap()
    }

    #[test]
    fn emulation_removed_across_buffers() {
        let mut r = annexb(&[&hex!("00 00 00 01 67 64 00 00"), &hex!("03 01 80")]);
        assert_eq!(r.seek_delimiter_or_end(), Seek::Delimiter);
        assert_eq!(r.position(), StreamPosition { buffer: 0, offset: 1 });
        let (b, pos) = consume(&mut r);
        assert_eq!(b, 0x67);
        assert_eq!(pos, StreamPosition { buffer: 0, offset: 1 });
        assert_eq!(r.read_bits(8).unwrap(), 0x67);
        assert_eq!(r.read_bits(24).unwrap(), 0x64_00_00);
        assert_eq!(r.read_bits(8).unwrap(), 0x01);
        assert_eq!(r.read_bits(8).unwrap(), 0x80);
        assert!(!r.take_invalid_emulation());
        assert_eq!(r.read_bits(1), Err(ReadFault::AccessBeyondEndOfData));
    }

    #[test]
    fn invalid_emulation_byte_still_removed() {
        let mut r = annexb(&[&hex!("00 00 01 06 00 00 03 44")]);
        r.seek_delimiter_or_end();
        consume(&mut r);
        assert_eq!(r.read_bits(32).unwrap(), 0x06_00_00_44);
        assert!(r.take_invalid_emulation());
    }

    #[test]
    fn escaped_two_is_kept() {
        let mut r = reader(Delimiter::None, &[&hex!("00 00 03 02")]);
        assert_eq!(r.read_bits(24).unwrap(), 0x00_00_02);
        assert!(!r.take_invalid_emulation());
        assert_eq!(r.read_bits(1), Err(ReadFault::AccessBeyondEndOfData));
    }

    #[test]
    fn escape_before_seven_is_flagged() {
        let mut r = reader(Delimiter::None, &[&hex!("00 00 03 07")]);
        assert_eq!(r.read_bits(24).unwrap(), 0x00_00_07);
        assert!(r.take_invalid_emulation());
        assert!(!r.take_invalid_emulation());
    }

    #[test]
    fn read_into_delimiter_is_sticky() {
        let mut r = annexb(&[&hex!("00 00 01 09 F0 00 00 01 65 88")]);
        r.seek_delimiter_or_end();
        let (b, _) = consume(&mut r);
        assert_eq!(b, 0x09);
        assert_eq!(r.read_bits(16).unwrap(), 0x09F0);
        assert_eq!(r.read_bits(1), Err(ReadFault::AccessIntoDelimiter));
        assert_eq!(r.read_bits(1), Err(ReadFault::AccessIntoDelimiter));
        assert_eq!(r.take_exception(), Some(ReadFault::AccessIntoDelimiter));
        assert_eq!(r.take_exception(), None);
        assert_eq!(r.check_delimiter_or_end(), Check::Delimiter);
        assert_eq!(r.seek_delimiter_or_end(), Seek::Delimiter);
        assert_eq!(r.position(), StreamPosition { buffer: 0, offset: 5 });
        let (b, _) = consume(&mut r);
        assert_eq!(b, 0x65);
        assert_eq!(r.seek_delimiter_or_end(), Seek::EndOfData);
        assert_eq!(r.check_delimiter_or_end(), Check::EndOfData);
    }

    #[test]
    fn classify_sees_split_delimiter_position() {
        let mut r = annexb(&[&hex!("AA 00"), &hex!("00 01 67 42")]);
        assert_eq!(r.seek_delimiter_or_end(), Seek::Delimiter);
        let (b, pos) = consume(&mut r);
        assert_eq!(b, 0x67);
        assert_eq!(pos, StreamPosition { buffer: 0, offset: 1 });
        assert_eq!(r.position(), StreamPosition { buffer: 1, offset: 2 });
        assert_eq!(r.byte_offset_in_current_buffer(), 2);
    }

    #[test]
    fn size_delimited() {
        let mut r = reader(
            Delimiter::Size { length_bits: 32 },
            &[&hex!("00 00 00 02 09 F0 00 00 00 01 0C")],
        );
        assert_eq!(r.seek_delimiter_or_end(), Seek::Delimiter);
        let mut seen = None;
        let size = r
            .consume_delimiter(EmulationPrevention::ZeroZeroThree, None, |b, pos| {
                seen = Some((b, pos))
            })
            .unwrap();
        assert_eq!(size, Some(2));
        assert_eq!(seen, Some((0x09, StreamPosition { buffer: 0, offset: 0 })));
        assert_eq!(r.read_bits(16).unwrap(), 0x09F0);
        assert_eq!(r.read_bits(1), Err(ReadFault::AccessIntoDelimiter));
        r.take_exception();
        assert_eq!(r.seek_delimiter_or_end(), Seek::Delimiter);
        assert_eq!(r.position(), StreamPosition { buffer: 0, offset: 6 });
        let size = r
            .consume_delimiter(EmulationPrevention::ZeroZeroThree, None, |b, _| {
                assert_eq!(b, 0x0C)
            })
            .unwrap();
        assert_eq!(size, Some(1));
        assert_eq!(r.seek_delimiter_or_end(), Seek::EndOfData);
    }

    #[test]
    fn truncated_size_field() {
        let mut r = reader(Delimiter::Size { length_bits: 32 }, &[&hex!("00 00")]);
        assert_eq!(
            r.consume_delimiter(EmulationPrevention::None, None, |_, _| panic!()),
            Err(ReadFault::InsufficientData)
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let mut r = annexb(&[&hex!("00 00 01 65 B8 41")]);
        r.seek_delimiter_or_end();
        consume(&mut r);
        r.read_bits(8).unwrap();
        assert_eq!(r.peek_bits(12).unwrap(), 0xB84);
        assert_eq!(r.read_bits(12).unwrap(), 0xB84);
        assert_eq!(r.total_bits_consumed(), 20);
        // peeking past the end reports the fault without making it sticky
        assert_eq!(r.peek_bits(8), Err(ReadFault::AccessBeyondEndOfData));
        assert_eq!(r.read_bits(4).unwrap(), 0x1);
    }

    #[test]
    fn exp_golomb_sentinel() {
        let mut r = reader(Delimiter::None, &[&hex!("00 00 00 01 80")]);
        r.set_emulation(EmulationPrevention::None);
        assert_eq!(r.read_ue("x").unwrap(), EXP_GOLOMB_SENTINEL);
        assert_eq!(r.total_bits_consumed(), 32);
        assert_eq!(r.read_exp_golomb(ExpGolomb::Unsigned).unwrap(), 0);
    }

    #[test]
    fn ff_zero_and_zero_zero_two() {
        let mut r = reader(Delimiter::None, &[&hex!("FF 00 12")]);
        r.set_emulation(EmulationPrevention::FfZero);
        assert_eq!(r.read_bits(16).unwrap(), 0xFF12);

        let mut r = reader(Delimiter::None, &[&hex!("00 00 02 05")]);
        r.set_emulation(EmulationPrevention::ZeroZeroTwo);
        assert_eq!(r.read_bits(24).unwrap(), 0x00_00_05);
    }

    #[test]
    fn trailing_data() {
        // one flag bit, then the stop bit, then a trailing zero byte before the next unit
        let mut r = annexb(&[&hex!("00 00 01 68 40 00 00 00 01 65")]);
        r.seek_delimiter_or_end();
        consume(&mut r);
        r.read_bits(8).unwrap();
        assert!(r.check_more_trailing_data());
        r.read_bits(1).unwrap();
        assert!(!r.check_more_trailing_data());
        assert_eq!(r.bits_consumed(), 9);
    }

    #[test]
    fn raw_bytes_keep_escapes() {
        let mut r = reader(Delimiter::None, &[&hex!("00 00 03 01")]);
        assert_eq!(r.read_raw_u8().unwrap(), 0x00);
        assert_eq!(r.read_raw_u8().unwrap(), 0x00);
        assert_eq!(r.read_raw_u8().unwrap(), 0x03);
        assert_eq!(r.read_raw_u8().unwrap(), 0x01);
        assert_eq!(r.read_raw_u8(), Err(ReadFault::AccessBeyondEndOfData));
    }

    #[test]
    fn external_size() {
        let mut r = reader(Delimiter::None, &[&hex!("01 64 00 0A 00 03 68")]);
        r.set_emulation(EmulationPrevention::None);
        assert_eq!(r.read_bits(8).unwrap(), 0x01);
        assert_eq!(r.read_bits(16).unwrap(), 0x6400);
        r.align();
        let size = r
            .consume_delimiter(EmulationPrevention::ZeroZeroThree, Some(2), |b, pos| {
                assert_eq!(b, 0x0A);
                assert_eq!(pos.offset, 3);
            })
            .unwrap();
        assert_eq!(size, Some(2));
        assert_eq!(r.read_bits(16).unwrap(), 0x0A00);
        assert_eq!(r.read_bits(1), Err(ReadFault::AccessIntoDelimiter));
        r.take_exception();
        assert_eq!(r.seek_delimiter_or_end(), Seek::Delimiter);
        assert_eq!(r.position().offset, 5);
    }
}
