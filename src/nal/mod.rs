//! Types for reading H264 _Network Abstraction Layer_ Units (NAL Units).
//!
//! The decoders in the submodules read syntax through the [`BitRead`](crate::rbsp::BitRead)
//! trait, so they run over already-unescaped RBSP data or directly over the
//! [`StreamReader`](crate::stream_reader::StreamReader) used by the pre-parser.

pub mod aud;
pub mod fmo;
pub mod pps;
pub mod prefix;
pub mod scaling;
pub mod sei;
pub mod slice;
pub mod sps;
pub mod subset_sps;

use crate::rbsp::{BitRead, BitReaderError};
use bitflags::bitflags;
use std::fmt;

#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub enum UnitType {
    /// The values `0` and `24`-`31` are unspecified in the H264 spec
    Unspecified(u8),
    SliceLayerWithoutPartitioningNonIdr,
    SliceDataPartitionALayer,
    SliceDataPartitionBLayer,
    SliceDataPartitionCLayer,
    SliceLayerWithoutPartitioningIdr,
    /// Supplemental enhancement information
    SEI,
    SeqParameterSet,
    PicParameterSet,
    AccessUnitDelimiter,
    EndOfSeq,
    EndOfStream,
    FillerData,
    SeqParameterSetExtension,
    PrefixNALUnit,
    SubsetSeqParameterSet,
    DepthParameterSet,
    SliceLayerWithoutPartitioningAux,
    SliceExtension,
    SliceExtensionViewComponent,
    /// The values `17`, `18`, `22` and `23` are reserved for future use by the H264 spec
    Reserved(u8),
}
impl UnitType {
    /// Maps the low five bits of `id` to a unit type.
    pub fn for_id(id: u8) -> UnitType {
        match id & 0b0001_1111 {
            1 => UnitType::SliceLayerWithoutPartitioningNonIdr,
            2 => UnitType::SliceDataPartitionALayer,
            3 => UnitType::SliceDataPartitionBLayer,
            4 => UnitType::SliceDataPartitionCLayer,
            5 => UnitType::SliceLayerWithoutPartitioningIdr,
            6 => UnitType::SEI,
            7 => UnitType::SeqParameterSet,
            8 => UnitType::PicParameterSet,
            9 => UnitType::AccessUnitDelimiter,
            10 => UnitType::EndOfSeq,
            11 => UnitType::EndOfStream,
            12 => UnitType::FillerData,
            13 => UnitType::SeqParameterSetExtension,
            14 => UnitType::PrefixNALUnit,
            15 => UnitType::SubsetSeqParameterSet,
            16 => UnitType::DepthParameterSet,
            19 => UnitType::SliceLayerWithoutPartitioningAux,
            20 => UnitType::SliceExtension,
            21 => UnitType::SliceExtensionViewComponent,
            v @ (17 | 18 | 22 | 23) => UnitType::Reserved(v),
            v => UnitType::Unspecified(v),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            UnitType::Unspecified(v) => v,
            UnitType::SliceLayerWithoutPartitioningNonIdr => 1,
            UnitType::SliceDataPartitionALayer => 2,
            UnitType::SliceDataPartitionBLayer => 3,
            UnitType::SliceDataPartitionCLayer => 4,
            UnitType::SliceLayerWithoutPartitioningIdr => 5,
            UnitType::SEI => 6,
            UnitType::SeqParameterSet => 7,
            UnitType::PicParameterSet => 8,
            UnitType::AccessUnitDelimiter => 9,
            UnitType::EndOfSeq => 10,
            UnitType::EndOfStream => 11,
            UnitType::FillerData => 12,
            UnitType::SeqParameterSetExtension => 13,
            UnitType::PrefixNALUnit => 14,
            UnitType::SubsetSeqParameterSet => 15,
            UnitType::DepthParameterSet => 16,
            UnitType::SliceLayerWithoutPartitioningAux => 19,
            UnitType::SliceExtension => 20,
            UnitType::SliceExtensionViewComponent => 21,
            UnitType::Reserved(v) => v,
        }
    }

    /// True for the types carrying the three-byte header extension (14, 20 and 21).
    pub fn has_header_extension(self) -> bool {
        matches!(
            self,
            UnitType::PrefixNALUnit
                | UnitType::SliceExtension
                | UnitType::SliceExtensionViewComponent
        )
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct NalHeader(u8);

#[derive(Debug, PartialEq, Eq)]
pub enum NalHeaderError {
    ForbiddenZeroBit,
}
impl NalHeader {
    pub fn new(header_value: u8) -> Result<NalHeader, NalHeaderError> {
        if header_value & 0b1000_0000 != 0 {
            Err(NalHeaderError::ForbiddenZeroBit)
        } else {
            Ok(NalHeader(header_value))
        }
    }

    pub fn nal_ref_idc(self) -> u8 {
        (self.0 & 0b0110_0000) >> 5
    }

    pub fn nal_unit_type(self) -> UnitType {
        UnitType::for_id(self.0)
    }
}
impl From<NalHeader> for u8 {
    fn from(v: NalHeader) -> Self {
        v.0
    }
}
impl fmt::Debug for NalHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("NalHeader")
            .field("nal_ref_idc", &self.nal_ref_idc())
            .field("nal_unit_type", &self.nal_unit_type())
            .finish()
    }
}

/// The `nal_unit_header_mvc_extension()` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MvcHeader {
    pub non_idr_flag: bool,
    pub priority_id: u8,
    pub view_id: u16,
    pub temporal_id: u8,
    pub anchor_pic_flag: bool,
    pub inter_view_flag: bool,
}

/// The header extension following the NAL header byte of unit types 14, 20 and 21.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalHeaderExtension {
    /// SVC extensions are recognised but their fields are not needed.
    Svc,
    Mvc(MvcHeader),
}
impl NalHeaderExtension {
    pub fn read<R: BitRead>(r: &mut R) -> Result<NalHeaderExtension, BitReaderError> {
        let svc_extension_flag = r.read_bool("svc_extension_flag")?;
        if svc_extension_flag {
            r.skip(23, "nal_unit_header_svc_extension")?;
            return Ok(NalHeaderExtension::Svc);
        }
        let ext = MvcHeader {
            non_idr_flag: r.read_bool("non_idr_flag")?,
            priority_id: r.read(6, "priority_id")?,
            view_id: r.read(10, "view_id")?,
            temporal_id: r.read(3, "temporal_id")?,
            anchor_pic_flag: r.read_bool("anchor_pic_flag")?,
            inter_view_flag: r.read_bool("inter_view_flag")?,
        };
        r.skip(1, "reserved_one_bit")?;
        Ok(NalHeaderExtension::Mvc(ext))
    }

    pub fn mvc(&self) -> Option<&MvcHeader> {
        match self {
            NalHeaderExtension::Mvc(h) => Some(h),
            NalHeaderExtension::Svc => None,
        }
    }
}

/// How the pre-parser treats a unit, judged from its header byte alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitClass {
    /// SPS or subset SPS
    Sequence,
    Pps,
    /// A coded slice that starts or continues a picture
    Picture,
    /// Slice data that belongs with the picture but is not parsed
    SkipPicture,
    NonPicture,
    Unclassified,
    /// Data partitioning and depth view components
    Unsupported,
}
impl UnitClass {
    pub fn classify(header_byte: u8, mvc: bool) -> UnitClass {
        if header_byte & 0b1000_0000 != 0 {
            return UnitClass::Unclassified;
        }
        match UnitType::for_id(header_byte) {
            UnitType::SliceLayerWithoutPartitioningNonIdr
            | UnitType::SliceLayerWithoutPartitioningIdr => UnitClass::Picture,
            UnitType::SliceExtension if mvc => UnitClass::Picture,
            UnitType::SliceExtension | UnitType::SliceLayerWithoutPartitioningAux => {
                UnitClass::SkipPicture
            }
            UnitType::SliceDataPartitionALayer
            | UnitType::SliceDataPartitionBLayer
            | UnitType::SliceDataPartitionCLayer
            | UnitType::SliceExtensionViewComponent => UnitClass::Unsupported,
            UnitType::SeqParameterSet | UnitType::SubsetSeqParameterSet => UnitClass::Sequence,
            UnitType::PicParameterSet => UnitClass::Pps,
            UnitType::Unspecified(_) => UnitClass::Unclassified,
            _ => UnitClass::NonPicture,
        }
    }

    /// Units that go into the picture segment buckets rather than the pre-picture ones.
    pub fn is_picture_data(self) -> bool {
        matches!(
            self,
            UnitClass::Picture | UnitClass::SkipPicture | UnitClass::Unsupported
        )
    }
}

bitflags! {
    /// Problems found while decoding a single unit. None of these stop the pre-parse call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UnitErrors: u16 {
        const UNSUPPORTED = 1 << 0;
        /// A field was outside its legal range and was clamped.
        const RANGE_CLAMPED = 1 << 1;
        /// The reader failed part way through the unit.
        const READER_EXCEPTION = 1 << 2;
        /// A parameter set referenced by the unit is not known.
        const MISSING_REFERENCE = 1 << 3;
        const MALFORMED = 1 << 4;
        const INVALID_EMULATION = 1 << 5;
        const TRAILING_DATA = 1 << 6;
        const VIEW_LIMIT = 1 << 7;
    }
}

/// Lookup of the parameter sets a unit refers to by id.
pub trait ParamSets {
    fn sps_by_id(&self, id: sps::SeqParamSetId) -> Option<&sps::SeqParameterSet>;
    fn subset_sps_by_id(&self, id: sps::SeqParamSetId) -> Option<&subset_sps::SubsetSps>;
    fn pps_by_id(&self, id: pps::PicParamSetId) -> Option<&pps::PicParameterSet>;

    /// The SPS for `id`, falling back to the SPS data embedded in a subset SPS.
    fn any_sps_by_id(&self, id: sps::SeqParamSetId) -> Option<&sps::SeqParameterSet> {
        self.sps_by_id(id)
            .or_else(|| self.subset_sps_by_id(id).map(|s| &s.sps))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rbsp::BitReader;
    use test_case::test_case;

    #[test]
    fn header() {
        let h = NalHeader::new(0b0101_0001).unwrap();
        assert_eq!(0b10, h.nal_ref_idc());
        assert_eq!(UnitType::Reserved(17), h.nal_unit_type());
        assert_eq!(
            NalHeader::new(0b1000_0000),
            Err(NalHeaderError::ForbiddenZeroBit)
        );
    }

    #[test]
    fn unit_type_ids() {
        for id in 0..32 {
            assert_eq!(id, UnitType::for_id(id).id());
        }
    }

    #[test_case(0x65, false, UnitClass::Picture)]
    #[test_case(0x41, false, UnitClass::Picture)]
    #[test_case(0x74, true, UnitClass::Picture; "slice extension with mvc")]
    #[test_case(0x74, false, UnitClass::SkipPicture; "slice extension without mvc")]
    #[test_case(0x13, false, UnitClass::SkipPicture; "auxiliary slice")]
    #[test_case(0x22, false, UnitClass::Unsupported; "partition a")]
    #[test_case(0x75, true, UnitClass::Unsupported; "depth view component")]
    #[test_case(0x67, false, UnitClass::Sequence)]
    #[test_case(0x6F, true, UnitClass::Sequence; "subset sps")]
    #[test_case(0x68, false, UnitClass::Pps)]
    #[test_case(0x06, false, UnitClass::NonPicture; "sei")]
    #[test_case(0x09, false, UnitClass::NonPicture; "aud")]
    #[test_case(0x6E, true, UnitClass::NonPicture; "prefix")]
    #[test_case(0x17, false, UnitClass::NonPicture; "reserved")]
    #[test_case(0x00, false, UnitClass::Unclassified)]
    #[test_case(0x18, false, UnitClass::Unclassified; "unspecified 24")]
    #[test_case(0xE5, false, UnitClass::Unclassified; "forbidden bit")]
    fn classification(byte: u8, mvc: bool, expected: UnitClass) {
        assert_eq!(UnitClass::classify(byte, mvc), expected);
    }

    #[test]
    fn mvc_extension() {
        // svc=0 non_idr=1 priority=0 view_id=1 temporal=0 anchor=0 inter_view=1 reserved=1
        let data = [0b0100_0000, 0b0000_0000, 0b0100_0011];
        let ext = NalHeaderExtension::read(&mut BitReader::new(&data[..])).unwrap();
        assert_eq!(
            ext,
            NalHeaderExtension::Mvc(MvcHeader {
                non_idr_flag: true,
                priority_id: 0,
                view_id: 1,
                temporal_id: 0,
                anchor_pic_flag: false,
                inter_view_flag: true,
            })
        );
    }

    #[test]
    fn svc_extension_skipped() {
        let data = [0x80, 0x00, 0x00];
        let mut r = BitReader::new(&data[..]);
        assert_eq!(NalHeaderExtension::read(&mut r).unwrap(), NalHeaderExtension::Svc);
        assert_eq!(r.bits_consumed(), 24);
    }
}
