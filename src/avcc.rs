//! Support for handling _Advanced Video Coding Configuration_ data, used in the _ISO Base Media
//! File Format_ (AKA MP4), as the specified in _ISO/IEC 14496-15_.
//!
//! [`AvcDecoderConfigurationRecord`] parses a record held in one slice. [`ConfigWalker`] steps
//! through a record as it passes through the pre-parser's [`StreamReader`], so that the
//! parameter sets it carries are handled like any other unit and its framing bytes still land
//! in segments.

use crate::nal::pps::{self, PicParameterSet};
use crate::nal::sps::{self, ConstraintFlags, ProfileIdc, SeqParameterSet};
use crate::nal::{NalHeader, NalHeaderError, UnitType};
use crate::rbsp::{decode_nal, BitReader, ReadFault};
use crate::stream_reader::{Delimiter, Seek, StreamPosition, StreamReader};
use crate::Context;
use std::convert::TryFrom;
use std::fmt;

#[derive(Debug)]
pub enum AvccError {
    NotEnoughData {
        expected: usize,
        actual: usize,
    },
    /// The AvcDecoderConfigurationRecord used a version number other than `1`.
    UnsupportedConfigurationVersion(u8),
    ParamSet(ParamSetError),
    Sps(sps::SpsError),
    Pps(pps::PpsError),
    /// The record ended early while being read from a stream.
    Reader(ReadFault),
}
impl From<ReadFault> for AvccError {
    fn from(e: ReadFault) -> Self {
        AvccError::Reader(e)
    }
}
impl fmt::Display for AvccError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvccError::NotEnoughData { expected, actual } => write!(
                f,
                "decoder configuration needs {} bytes, only {} present",
                expected, actual
            ),
            AvccError::UnsupportedConfigurationVersion(v) => {
                write!(f, "unsupported configuration version {}", v)
            }
            AvccError::ParamSet(e) => write!(f, "bad parameter set entry: {:?}", e),
            AvccError::Sps(e) => write!(f, "bad SPS: {:?}", e),
            AvccError::Pps(e) => write!(f, "bad PPS: {:?}", e),
            AvccError::Reader(e) => write!(f, "decoder configuration truncated: {:?}", e),
        }
    }
}
impl std::error::Error for AvccError {}

pub struct AvcDecoderConfigurationRecord<'buf> {
    data: &'buf [u8],
}
impl<'buf> TryFrom<&'buf [u8]> for AvcDecoderConfigurationRecord<'buf> {
    type Error = AvccError;

    fn try_from(data: &'buf [u8]) -> Result<Self, Self::Error> {
        let avcc = AvcDecoderConfigurationRecord { data };
        // we must confirm we have enough bytes for all fixed fields before we do anything else,
        avcc.ck(Self::MIN_CONF_SIZE)?;
        if avcc.configuration_version() != 1 {
            // Decoders are required to ignore records with any other version, since it
            // indicates an incompatible change in the configuration format,
            return Err(AvccError::UnsupportedConfigurationVersion(
                avcc.configuration_version(),
            ));
        }
        // Check that the buffer holds every parameter set the counts promise, so that the
        // accessors below need no checks of their own,
        let mut len = avcc.seq_param_sets_end()?;
        avcc.ck(len + 1)?;
        let num_pps = data[len];
        len += 1;
        for _ in 0..num_pps {
            len = avcc.entry_end(len)?;
        }
        Ok(avcc)
    }
}
impl<'buf> AvcDecoderConfigurationRecord<'buf> {
    const MIN_CONF_SIZE: usize = 6;

    fn entry_end(&self, start: usize) -> Result<usize, AvccError> {
        self.ck(start + 2)?;
        let len = usize::from(u16::from_be_bytes([self.data[start], self.data[start + 1]]));
        self.ck(start + 2 + len)?;
        Ok(start + 2 + len)
    }

    fn seq_param_sets_end(&self) -> Result<usize, AvccError> {
        let mut len = Self::MIN_CONF_SIZE;
        for _ in 0..self.num_of_sequence_parameter_sets() {
            len = self.entry_end(len)?;
        }
        Ok(len)
    }

    fn ck(&self, len: usize) -> Result<(), AvccError> {
        if self.data.len() < len {
            Err(AvccError::NotEnoughData {
                expected: len,
                actual: self.data.len(),
            })
        } else {
            Ok(())
        }
    }

    pub fn configuration_version(&self) -> u8 {
        self.data[0]
    }
    pub fn num_of_sequence_parameter_sets(&self) -> usize {
        (self.data[5] & 0b0001_1111) as usize
    }
    pub fn avc_profile_indication(&self) -> ProfileIdc {
        self.data[1].into()
    }
    pub fn profile_compatibility(&self) -> ConstraintFlags {
        self.data[2].into()
    }
    pub fn avc_level_indication(&self) -> u8 {
        self.data[3]
    }
    /// Number of bytes used to specify the length of each NAL unit
    /// 0 => 1 byte, 1 => 2 bytes, 2 => 3 bytes, 3 => 4 bytes
    pub fn length_size_minus_one(&self) -> u8 {
        self.data[4] & 0b0000_0011
    }
    pub fn sequence_parameter_sets(
        &self,
    ) -> impl Iterator<Item = Result<&'buf [u8], ParamSetError>> + 'buf {
        let num = self.num_of_sequence_parameter_sets();
        let data = &self.data[Self::MIN_CONF_SIZE..];
        ParamSetIter::new(data, UnitType::SeqParameterSet).take(num)
    }
    pub fn picture_parameter_sets(
        &self,
    ) -> impl Iterator<Item = Result<&'buf [u8], ParamSetError>> + 'buf {
        // lengths were all checked by try_from()
        let offset = self
            .seq_param_sets_end()
            .unwrap_or(self.data.len().saturating_sub(1));
        let num = self.data.get(offset).copied().unwrap_or(0);
        let data = self.data.get(offset + 1..).unwrap_or(&[]);
        ParamSetIter::new(data, UnitType::PicParameterSet).take(usize::from(num))
    }

    /// Creates an H264 parser context, using the settings encoded into
    /// this `AvcDecoderConfigurationRecord`.
    ///
    /// In particular, the _sequence parameter set_ and _picture parameter set_ values of this
    /// configuration record will be inserted into the resulting context.
    pub fn create_context(&self) -> Result<Context, AvccError> {
        let mut ctx = Context::new();
        for sps in self.sequence_parameter_sets() {
            let sps = sps.map_err(AvccError::ParamSet)?;
            let rbsp = decode_nal(sps).map_err(|e| AvccError::Sps(e.into()))?;
            let sps = SeqParameterSet::from_bits(BitReader::new(&rbsp)).map_err(AvccError::Sps)?;
            if sps.profile_idc != self.avc_profile_indication() {
                return Err(AvccError::ParamSet(ParamSetError::IncompatibleSps(sps)));
            }
            ctx.put_seq_param_set(sps);
        }
        for pps in self.picture_parameter_sets() {
            let pps = pps.map_err(AvccError::ParamSet)?;
            let rbsp = decode_nal(pps).map_err(|e| AvccError::Pps(e.into()))?;
            let pps = PicParameterSet::from_bits(&ctx, BitReader::new(&rbsp))
                .map_err(AvccError::Pps)?;
            ctx.put_pic_param_set(pps);
        }
        Ok(ctx)
    }
}

#[derive(Debug)]
pub enum ParamSetError {
    NalHeader(NalHeaderError),
    IncorrectNalType {
        expected: UnitType,
        actual: UnitType,
    },
    /// A _sequence parameter set_ found within the AVC decoder config was not consistent with the
    /// settings of the decoder config itself
    IncompatibleSps(SeqParameterSet),
    Truncated,
}

struct ParamSetIter<'buf>(&'buf [u8], UnitType);

impl<'buf> ParamSetIter<'buf> {
    pub fn new(buf: &'buf [u8], unit_type: UnitType) -> ParamSetIter<'buf> {
        ParamSetIter(buf, unit_type)
    }
}
impl<'buf> Iterator for ParamSetIter<'buf> {
    type Item = Result<&'buf [u8], ParamSetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }
        if self.0.len() < 3 {
            self.0 = &[];
            return Some(Err(ParamSetError::Truncated));
        }
        let len = usize::from(u16::from_be_bytes([self.0[0], self.0[1]]));
        let data = &self.0[2..];
        if data.len() < len {
            self.0 = &[];
            return Some(Err(ParamSetError::Truncated));
        }
        let res = match NalHeader::new(data[0]) {
            Ok(nal_header) => {
                if nal_header.nal_unit_type() == self.1 {
                    let (data, remainder) = data.split_at(len);
                    self.0 = remainder;
                    Ok(data)
                } else {
                    Err(ParamSetError::IncorrectNalType {
                        expected: self.1,
                        actual: nal_header.nal_unit_type(),
                    })
                }
            }
            Err(err) => Err(ParamSetError::NalHeader(err)),
        };
        Some(res)
    }
}

/// The fixed fields opening an `AVCDecoderConfigurationRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigHeader {
    pub avc_profile_indication: ProfileIdc,
    pub profile_compatibility: u8,
    pub avc_level_indication: u8,
    pub length_size_minus_one: u8,
    pub num_of_sequence_parameter_sets: u8,
}
impl ConfigHeader {
    /// Width in bits of the length field preceding each picture-data unit.
    pub fn length_bits(&self) -> u32 {
        (u32::from(self.length_size_minus_one) + 1) * 8
    }
}

/// Steps through the parameter set arrays of a record held in a [`StreamReader`].
///
/// Each entry is presented to the caller as a unit behind a 16-bit size delimiter. The count
/// bytes between and after the arrays are read here.
#[derive(Debug)]
pub struct ConfigWalker {
    sps_remaining: u8,
    pps_remaining: Option<u8>,
}

/// What the next [`ConfigWalker::advance()`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStep {
    /// The reader is at the size field of the next parameter set. Bytes from `gap_start` up to
    /// the size field belong to the record framing.
    Unit { gap_start: StreamPosition },
    /// No entries remain; anything from `gap_start` to the end of the data is trailing
    /// extension data.
    End { gap_start: StreamPosition },
}

impl ConfigWalker {
    /// Reads the record header at the start of the data and prepares to walk the entries.
    pub fn start(r: &mut StreamReader) -> Result<(ConfigHeader, ConfigWalker), AvccError> {
        r.set_delimiter(Delimiter::None);
        let version = r.read_raw_u8()?;
        if version != 1 {
            return Err(AvccError::UnsupportedConfigurationVersion(version));
        }
        let header = ConfigHeader {
            avc_profile_indication: ProfileIdc(r.read_raw_u8()?),
            profile_compatibility: r.read_raw_u8()?,
            avc_level_indication: r.read_raw_u8()?,
            length_size_minus_one: r.read_raw_u8()? & 0b0000_0011,
            num_of_sequence_parameter_sets: r.read_raw_u8()? & 0b0001_1111,
        };
        r.set_delimiter(Delimiter::Size { length_bits: 16 });
        Ok((
            header,
            ConfigWalker {
                sps_remaining: header.num_of_sequence_parameter_sets,
                pps_remaining: None,
            },
        ))
    }

    /// Skips whatever remains of the previous entry and moves to the next one.
    pub fn advance(&mut self, r: &mut StreamReader) -> Result<ConfigStep, AvccError> {
        let seek = r.seek_delimiter_or_end();
        let gap_start = r.position();
        if seek == Seek::EndOfData {
            if self.sps_remaining > 0 || self.pps_remaining.map_or(true, |n| n > 0) {
                return Err(AvccError::Reader(ReadFault::InsufficientData));
            }
            return Ok(ConfigStep::End { gap_start });
        }
        if self.sps_remaining > 0 {
            self.sps_remaining -= 1;
            return Ok(ConfigStep::Unit { gap_start });
        }
        let remaining = match self.pps_remaining {
            Some(n) => n,
            None => {
                let n = r.read_raw_u8()?;
                r.align();
                n
            }
        };
        if remaining > 0 {
            if r.is_at_end() {
                return Err(AvccError::Reader(ReadFault::InsufficientData));
            }
            self.pps_remaining = Some(remaining - 1);
            Ok(ConfigStep::Unit { gap_start })
        } else {
            self.pps_remaining = Some(0);
            r.set_delimiter(Delimiter::None);
            Ok(ConfigStep::End { gap_start })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nal::ParamSets;
    use crate::stream_reader::EmulationPrevention;
    use bytes::Bytes;
    use hex_literal::*;

    #[test]
    fn it_works() {
        let avcc_data = hex!("0142c01e ffe10020 6742c01e b91061ff 78088000 00030080 00001971 3006d600 daf7bdc0 7c2211a8 01000468 de3c80");
        let avcc = AvcDecoderConfigurationRecord::try_from(&avcc_data[..]).unwrap();
        assert_eq!(1, avcc.configuration_version());
        assert_eq!(1, avcc.num_of_sequence_parameter_sets());
        assert_eq!(ProfileIdc::BASELINE, avcc.avc_profile_indication());
        assert_eq!(30, avcc.avc_level_indication());
        let flags = avcc.profile_compatibility();
        assert!(flags.flag(0));
        assert!(flags.flag(1));
        assert!(!flags.flag(2));
        assert_eq!(3, avcc.length_size_minus_one());
        let ctx = avcc.create_context().unwrap();
        let sps = ctx
            .sps_by_id(sps::SeqParamSetId::from_u32(0).unwrap())
            .expect("missing sps");
        assert_eq!(avcc.avc_level_indication(), sps.level_idc);
        assert_eq!(avcc.avc_profile_indication(), sps.profile_idc);
        assert_eq!(
            u8::from(avcc.profile_compatibility()),
            u8::from(sps.constraint_flags)
        );
        let _pps = ctx
            .pps_by_id(pps::PicParamSetId::from_u32(0).unwrap())
            .expect("missing pps");
    }

    #[test]
    fn sps_with_emulation_protection() {
        // From a Hikvision 2CD2032-I.
        let avcc_data = hex!(
            "014d401e ffe10017 674d401e 9a660a0f
                               ff350101 01400000 fa000003 01f40101
                               000468ee 3c80"
        );
        let avcc = AvcDecoderConfigurationRecord::try_from(&avcc_data[..]).unwrap();
        let _sps_data = avcc.sequence_parameter_sets().next().unwrap().unwrap();
        let ctx = avcc.create_context().unwrap();
        let sps = ctx
            .sps_by_id(sps::SeqParamSetId::from_u32(0).unwrap())
            .expect("missing sps");
        assert_eq!(sps.profile_idc, ProfileIdc::MAIN);
        assert_eq!(sps.pixel_dimensions().unwrap(), (320, 240));
    }

    #[test]
    fn truncated() {
        let avcc_data = hex!("0142c01e ffe10020 6742c0");
        assert!(matches!(
            AvcDecoderConfigurationRecord::try_from(&avcc_data[..]),
            Err(AvccError::NotEnoughData {
                expected: 40,
                actual: 11
            })
        ));
    }

    #[test]
    fn bad_version() {
        let avcc_data = hex!("0242c01e ffe0 00");
        assert!(matches!(
            AvcDecoderConfigurationRecord::try_from(&avcc_data[..]),
            Err(AvccError::UnsupportedConfigurationVersion(2))
        ));
    }

    #[test]
    fn walk_in_stream() {
        let data = hex!(
            "014d401e ffe10004 674d401e 02000268 ee000268 01fdf8f8 00"
        );
        let mut r = StreamReader::default();
        r.start(
            Delimiter::None,
            vec![Bytes::copy_from_slice(&data)],
            EmulationPrevention::ZeroZeroThree,
        );
        let (header, mut walker) = ConfigWalker::start(&mut r).unwrap();
        assert_eq!(header.avc_profile_indication, ProfileIdc::MAIN);
        assert_eq!(header.length_bits(), 32);
        assert_eq!(header.num_of_sequence_parameter_sets, 1);

        let mut types = vec![];
        loop {
            match walker.advance(&mut r).unwrap() {
                ConfigStep::Unit { gap_start } => {
                    let pos = r.position();
                    assert!(gap_start <= pos);
                    r.consume_delimiter(EmulationPrevention::ZeroZeroThree, None, |b, _| {
                        types.push(b)
                    })
                    .unwrap();
                }
                ConfigStep::End { gap_start } => {
                    // chroma_format, bit depths and an empty SPS extension array
                    assert_eq!(gap_start.offset, data.len() - 4);
                    break;
                }
            }
        }
        assert_eq!(types, vec![0x67, 0x68, 0x68]);
    }

    #[test]
    fn walk_truncated() {
        let data = hex!("0142c01e ffe1 0020 6742");
        let mut r = StreamReader::default();
        r.start(
            Delimiter::None,
            vec![Bytes::copy_from_slice(&data)],
            EmulationPrevention::ZeroZeroThree,
        );
        let (_, mut walker) = ConfigWalker::start(&mut r).unwrap();
        assert!(matches!(
            walker.advance(&mut r),
            Ok(ConfigStep::Unit { .. })
        ));
        r.consume_delimiter(EmulationPrevention::ZeroZeroThree, None, |_, _| ())
            .unwrap();
        assert!(matches!(
            walker.advance(&mut r),
            Err(AvccError::Reader(ReadFault::InsufficientData))
        ));
    }
}
