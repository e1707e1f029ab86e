//! Access unit delimiter, `access_unit_delimiter_rbsp()` (NAL type 9).

use crate::rbsp::{BitRead, BitReaderError};
use std::fmt;

/// Indicates which slice types may be present in the primary coded picture
/// of the access unit (Table 7-5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimaryPicType {
    /// I slices only
    I = 0,
    /// I, P slices
    IP = 1,
    /// I, P, B slices
    IPB = 2,
    /// SI slices only
    SI = 3,
    /// SI, SP slices
    SISP = 4,
    /// I, SI slices
    ISI = 5,
    /// I, SI, P, SP slices
    ISIPSP = 6,
    /// I, SI, P, SP, B slices
    ISIPSPB = 7,
}
impl PrimaryPicType {
    /// Every 3-bit value is defined.
    fn from_bits(id: u8) -> PrimaryPicType {
        match id & 0b111 {
            0 => PrimaryPicType::I,
            1 => PrimaryPicType::IP,
            2 => PrimaryPicType::IPB,
            3 => PrimaryPicType::SI,
            4 => PrimaryPicType::SISP,
            5 => PrimaryPicType::ISI,
            6 => PrimaryPicType::ISIPSP,
            _ => PrimaryPicType::ISIPSPB,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessUnitDelimiter {
    pub primary_pic_type: PrimaryPicType,
}
impl AccessUnitDelimiter {
    pub fn read<R: BitRead>(r: &mut R) -> Result<AccessUnitDelimiter, AudError> {
        let primary_pic_type = PrimaryPicType::from_bits(r.read(3, "primary_pic_type")?);
        Ok(AccessUnitDelimiter { primary_pic_type })
    }

    pub fn from_bits<R: BitRead>(mut r: R) -> Result<AccessUnitDelimiter, AudError> {
        let aud = Self::read(&mut r)?;
        r.finish_rbsp()?;
        Ok(aud)
    }
}

#[derive(Debug)]
pub enum AudError {
    RbspError(BitReaderError),
}
impl From<BitReaderError> for AudError {
    fn from(e: BitReaderError) -> Self {
        AudError::RbspError(e)
    }
}
impl fmt::Display for AudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudError::RbspError(e) => write!(f, "access unit delimiter: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rbsp::BitReader;

    #[test]
    fn parse_all_pic_types() {
        for id in 0u8..=7 {
            // primary_pic_type(3 bits) + rbsp_stop_one_bit(1) + padding(4 zeros)
            let data = [(id << 5) | 0x10];
            let aud = AccessUnitDelimiter::from_bits(BitReader::new(&data[..])).unwrap();
            assert_eq!(aud.primary_pic_type.id(), id);
        }
    }

    #[test]
    fn trailing_garbage() {
        let data = [0x50, 0x01];
        assert!(matches!(
            AccessUnitDelimiter::from_bits(BitReader::new(&data[..])),
            Err(AudError::RbspError(BitReaderError::RemainingData))
        ));
    }
}
