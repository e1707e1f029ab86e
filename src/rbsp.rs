//! Bit-level access to the _Raw Byte Sequence Payload_ (RBSP) of NAL units.
//!
//! The following byte sequences are not allowed to appear in a framed H264 bitstream,
//!
//!  - `0x00` `0x00` `0x00`
//!  - `0x00` `0x00` `0x01`
//!  - `0x00` `0x00` `0x02`
//!  - `0x00` `0x00` `0x03`
//!
//! therefore if these byte sequences do appear in the raw bitstream, an 'escaping' mechanism
//! (called 'emulation prevention' in the spec) is applied by adding a `0x03` byte between the
//! second and third bytes in the above sequence.
//!
//! Every syntax decoder in [`crate::nal`] is written against the [`BitRead`] trait, so the same
//! code runs over a plain RBSP slice ([`BitReader`]) or directly over a chain of encoded
//! buffers ([`crate::stream_reader::StreamReader`]) which removes the escaping as it reads.

use bitstream_io::BitRead as _;
use std::borrow::Cow;
use std::fmt;
use std::io;

/// Value returned by [`BitRead::read_ue()`] for the reserved 31-leading-zero-bit encoding.
pub const EXP_GOLOMB_SENTINEL: u32 = 0xFFFF_FFFF;

/// The low-level reasons a read can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFault {
    /// A delimiter or size field was truncated.
    InsufficientData,
    /// The read would run past the last byte of the last buffer.
    AccessBeyondEndOfData,
    /// The read would run into the delimiter of the following unit.
    AccessIntoDelimiter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitReaderError {
    ReaderError(ReadFault),
    ReaderErrorFor(&'static str, ReadFault),

    /// An Exp-Golomb-coded syntax element value has more than 32 bits, or the reserved
    /// 31-leading-zero encoding was read for a signed element.
    ExpGolombTooLarge(&'static str),

    /// A fixed-width value did not fit the requested integer type.
    ValueTooWide(&'static str, u32),

    /// Data remained in the unit after the trailing bits were expected.
    RemainingData,
}
impl BitReaderError {
    /// The underlying fault, if this error came from running out of data.
    pub fn fault(&self) -> Option<ReadFault> {
        match *self {
            BitReaderError::ReaderError(f) | BitReaderError::ReaderErrorFor(_, f) => Some(f),
            _ => None,
        }
    }
}
impl fmt::Display for BitReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitReaderError::ReaderError(e) => write!(f, "{:?}", e),
            BitReaderError::ReaderErrorFor(name, e) => write!(f, "{:?} while reading {}", e, name),
            BitReaderError::ExpGolombTooLarge(name) => {
                write!(f, "Exp-Golomb value too large for {}", name)
            }
            BitReaderError::ValueTooWide(name, v) => write!(f, "value {} too wide for {}", v, name),
            BitReaderError::RemainingData => write!(f, "unexpected data before rbsp trailing bits"),
        }
    }
}
impl std::error::Error for BitReaderError {}

/// Reads H264 syntax elements.
///
/// Implementors supply the fixed-width primitives; Exp-Golomb decoding and typed reads are
/// provided on top of them.
pub trait BitRead {
    /// Reads `bit_count` (at most 32) bits, most significant first.
    fn read_u32(&mut self, bit_count: u32, name: &'static str) -> Result<u32, BitReaderError>;

    fn read_bool(&mut self, name: &'static str) -> Result<bool, BitReaderError>;

    fn skip(&mut self, bit_count: u32, name: &'static str) -> Result<(), BitReaderError>;

    /// Returns true if there is data before the `rbsp_trailing_bits()` of the current unit.
    fn has_more_rbsp_data(&mut self, name: &'static str) -> Result<bool, BitReaderError>;

    /// Number of bits consumed since the start of the current unit's payload.
    fn bits_consumed(&self) -> u64;

    fn read<U: TryFrom<u32>>(
        &mut self,
        bit_count: u32,
        name: &'static str,
    ) -> Result<U, BitReaderError> {
        let v = self.read_u32(bit_count, name)?;
        U::try_from(v).map_err(|_| BitReaderError::ValueTooWide(name, v))
    }

    /// Reads an unsigned Exp-Golomb value, `ue(v)`.
    ///
    /// Thirty-one leading zero bits is a reserved encoding: those bits plus the following one
    /// are consumed and [`EXP_GOLOMB_SENTINEL`] is returned.
    fn read_ue(&mut self, name: &'static str) -> Result<u32, BitReaderError> {
        let mut leading_zeros = 0;
        while !self.read_bool(name)? {
            leading_zeros += 1;
            if leading_zeros == 31 {
                self.read_bool(name)?;
                return Ok(EXP_GOLOMB_SENTINEL);
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let v = self.read_u32(leading_zeros, name)?;
        Ok((1 << leading_zeros) - 1 + v)
    }

    /// Reads a signed Exp-Golomb value, `se(v)`.
    fn read_se(&mut self, name: &'static str) -> Result<i32, BitReaderError> {
        let v = self.read_ue(name)?;
        if v == EXP_GOLOMB_SENTINEL {
            return Err(BitReaderError::ExpGolombTooLarge(name));
        }
        Ok(golomb_to_signed(v))
    }

    fn is_byte_aligned(&self) -> bool {
        self.bits_consumed() % 8 == 0
    }

    fn byte_align(&mut self, name: &'static str) -> Result<(), BitReaderError> {
        let rem = (self.bits_consumed() % 8) as u32;
        if rem != 0 {
            self.skip(8 - rem, name)?;
        }
        Ok(())
    }

    /// Checks that only `rbsp_trailing_bits()` remain in the unit.
    fn finish_rbsp(&mut self) -> Result<(), BitReaderError> {
        if self.has_more_rbsp_data("finish_rbsp")? {
            return Err(BitReaderError::RemainingData);
        }
        Ok(())
    }
}

impl<R: BitRead + ?Sized> BitRead for &mut R {
    fn read_u32(&mut self, bit_count: u32, name: &'static str) -> Result<u32, BitReaderError> {
        (**self).read_u32(bit_count, name)
    }
    fn read_bool(&mut self, name: &'static str) -> Result<bool, BitReaderError> {
        (**self).read_bool(name)
    }
    fn skip(&mut self, bit_count: u32, name: &'static str) -> Result<(), BitReaderError> {
        (**self).skip(bit_count, name)
    }
    fn has_more_rbsp_data(&mut self, name: &'static str) -> Result<bool, BitReaderError> {
        (**self).has_more_rbsp_data(name)
    }
    fn bits_consumed(&self) -> u64 {
        (**self).bits_consumed()
    }
}

/// Maps the `codeNum` of an `se(v)` element to its signed value: odd values are positive.
pub fn golomb_to_signed(val: u32) -> i32 {
    let magnitude = (val >> 1) as i32;
    if val & 1 == 1 {
        magnitude + 1
    } else {
        -magnitude
    }
}

/// Reads bits from an RBSP held in a byte slice (emulation prevention already removed).
pub struct BitReader<'a> {
    reader: bitstream_io::BitReader<io::Cursor<&'a [u8]>, bitstream_io::BigEndian>,
    position: u64,
    /// bit offset of the final `1` bit in the buffer, i.e. the `rbsp_stop_one_bit`
    stop_bit: Option<u64>,
}
impl<'a> BitReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        let stop_bit = buf.iter().rposition(|&b| b != 0).map(|i| {
            let byte = buf[i];
            i as u64 * 8 + 7 - u64::from(byte.trailing_zeros())
        });
        BitReader {
            reader: bitstream_io::BitReader::endian(io::Cursor::new(buf), bitstream_io::BigEndian),
            position: 0,
            stop_bit,
        }
    }

    fn map_err(name: &'static str) -> impl Fn(io::Error) -> BitReaderError {
        move |_| BitReaderError::ReaderErrorFor(name, ReadFault::AccessBeyondEndOfData)
    }
}
impl BitRead for BitReader<'_> {
    fn read_u32(&mut self, bit_count: u32, name: &'static str) -> Result<u32, BitReaderError> {
        if bit_count == 0 {
            return Ok(0);
        }
        let v = self
            .reader
            .read_var::<u32>(bit_count)
            .map_err(Self::map_err(name))?;
        self.position += u64::from(bit_count);
        Ok(v)
    }

    fn read_bool(&mut self, name: &'static str) -> Result<bool, BitReaderError> {
        let v = self.reader.read_bit().map_err(Self::map_err(name))?;
        self.position += 1;
        Ok(v)
    }

    fn skip(&mut self, bit_count: u32, name: &'static str) -> Result<(), BitReaderError> {
        self.reader.skip(bit_count).map_err(Self::map_err(name))?;
        self.position += u64::from(bit_count);
        Ok(())
    }

    fn has_more_rbsp_data(&mut self, _name: &'static str) -> Result<bool, BitReaderError> {
        Ok(match self.stop_bit {
            Some(stop) => self.position < stop,
            None => false,
        })
    }

    fn bits_consumed(&self) -> u64 {
        self.position
    }
}

/// Removes `00 00 03` emulation prevention bytes from an encoded NAL unit.
pub struct ByteReader<'a> {
    data: &'a [u8],
}
impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data }
    }

    /// Returns the unescaped bytes, borrowing the input when no escaping was present.
    pub fn into_rbsp(self) -> Cow<'a, [u8]> {
        let Some(first) = find_emulation_byte(self.data, 0) else {
            return Cow::Borrowed(self.data);
        };
        let mut out = Vec::with_capacity(self.data.len());
        let mut start = 0;
        let mut next = Some(first);
        while let Some(i) = next {
            out.extend_from_slice(&self.data[start..i]);
            start = i + 1;
            next = find_emulation_byte(self.data, start);
        }
        out.extend_from_slice(&self.data[start..]);
        Cow::Owned(out)
    }
}

/// Finds the index of the next `0x03` preceded by two zero bytes, starting the zero-count at
/// `from`.
fn find_emulation_byte(data: &[u8], from: usize) -> Option<usize> {
    let mut zeros = 0;
    for (i, &b) in data.iter().enumerate().skip(from) {
        if zeros >= 2 && b == 0x03 {
            return Some(i);
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
    None
}

/// Strips the one-byte NAL header and the emulation prevention bytes from an encoded NAL unit.
pub fn decode_nal(nal_unit: &[u8]) -> Result<Cow<'_, [u8]>, BitReaderError> {
    if nal_unit.is_empty() {
        return Err(BitReaderError::ReaderErrorFor(
            "NAL header",
            ReadFault::AccessBeyondEndOfData,
        ));
    }
    let rbsp = ByteReader::new(&nal_unit[1..]).into_rbsp();
    Ok(rbsp)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::BitWriter;
    use hex_literal::*;
    use test_case::test_case;

    #[test]
    fn byte_reader() {
        let data = hex!(
            "67 64 00 0A AC 72 84 44 26 84 00 00 03
             00 04 00 00 03 00 CA 3C 48 96 11 80"
        );
        let expected = hex!(
            "64 00 0A AC 72 84 44 26 84 00 00
             00 04 00 00 00 CA 3C 48 96 11 80"
        );
        assert_eq!(&decode_nal(&data[..]).unwrap()[..], &expected[..]);
    }

    #[test]
    fn byte_reader_borrows_when_unescaped() {
        let data = hex!("68 E8 43 8F 13 21 30");
        assert!(matches!(decode_nal(&data[..]).unwrap(), Cow::Borrowed(_)));
    }

    #[test_case(0, 0)]
    #[test_case(1, 1)]
    #[test_case(2, -1)]
    #[test_case(3, 2)]
    #[test_case(4, -2)]
    #[test_case(0x7FFF_FFFE, -0x3FFF_FFFF)]
    fn signed_mapping(code_num: u32, expected: i32) {
        assert_eq!(golomb_to_signed(code_num), expected);
    }

    #[test]
    fn exp_golomb_round_trip() {
        // every code up to 20 bits, then the largest that is not the sentinel
        let values = || (0u32..1 << 20).chain([1 << 24, (1 << 31) - 2]);
        let mut w = BitWriter::new();
        for v in values() {
            w.ue(v);
        }
        w.trailing_bits();
        let data = w.finish();
        let mut r = BitReader::new(&data);
        for v in values() {
            assert_eq!(r.read_ue("v").unwrap(), v);
        }
        assert!(!r.has_more_rbsp_data("end").unwrap());
    }

    #[test]
    fn signed_exp_golomb_round_trip() {
        let values = || (-(1i32 << 19)..1 << 19).chain([(1 << 30) - 1, -((1 << 30) - 1)]);
        let mut w = BitWriter::new();
        for v in values() {
            w.se(v);
        }
        w.trailing_bits();
        let data = w.finish();
        let mut r = BitReader::new(&data);
        for v in values() {
            assert_eq!(r.read_se("v").unwrap(), v, "se {}", v);
        }
        r.finish_rbsp().unwrap();
    }

    #[test]
    fn thirty_one_leading_zeros_is_sentinel() {
        // 31 zero bits, then the marker bit, then a following '1' element (ue 0)
        let mut w = BitWriter::new();
        w.bits(31, 0);
        w.bit(true);
        w.bit(true);
        let data = w.finish();
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_ue("big").unwrap(), EXP_GOLOMB_SENTINEL);
        assert_eq!(r.bits_consumed(), 32);
        assert_eq!(r.read_ue("next").unwrap(), 0);
    }

    #[test]
    fn signed_sentinel_is_error() {
        let mut w = BitWriter::new();
        w.bits(31, 0);
        w.bit(true);
        let data = w.finish();
        let mut r = BitReader::new(&data);
        assert_eq!(
            r.read_se("big"),
            Err(BitReaderError::ExpGolombTooLarge("big"))
        );
    }

    #[test]
    fn more_rbsp_data() {
        // 0 (flag), then stop bit and alignment
        let data = [0b0100_0000];
        let mut r = BitReader::new(&data[..]);
        assert!(r.has_more_rbsp_data("x").unwrap());
        assert!(!r.read_bool("flag").unwrap());
        assert!(!r.has_more_rbsp_data("x").unwrap());
        r.finish_rbsp().unwrap();
    }

    #[test]
    fn read_past_end() {
        let data = [0xFF];
        let mut r = BitReader::new(&data[..]);
        r.skip(4, "x").unwrap();
        assert_eq!(
            r.read_u32(5, "y"),
            Err(BitReaderError::ReaderErrorFor(
                "y",
                ReadFault::AccessBeyondEndOfData
            ))
        );
    }

    #[test]
    fn byte_align() {
        let data = [0b1010_0000, 0xAB];
        let mut r = BitReader::new(&data[..]);
        r.read_u32(3, "x").unwrap();
        assert!(!r.is_byte_aligned());
        r.byte_align("align").unwrap();
        assert_eq!(r.read::<u8>(8, "byte").unwrap(), 0xAB);
    }
}
